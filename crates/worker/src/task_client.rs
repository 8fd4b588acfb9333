//! HTTP client for the task queue API.
//!
//! Wraps the three calls a worker makes against the queue: claiming a
//! task, pushing a status snapshot, and uploading a result asset. All
//! calls carry a bearer token when an API key is configured.

use serde::{Deserialize, Serialize};

use fabrik_core::task::{Task, TaskError, TaskInput, TaskOutput, TaskStatus, TASK_TYPE_TEXT_TO_IMAGE};

/// Client for the task queue API, bound to one worker identity.
pub struct TaskClient {
    client: reqwest::Client,
    api_base: String,
    api_key: Option<String>,
    worker_id: String,
}

/// Errors from the task queue API layer.
#[derive(Debug, thiserror::Error)]
pub enum TaskApiError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The task queue returned a non-2xx status code.
    #[error("Task API error ({status}): {body}")]
    ApiError {
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },
}

#[derive(Debug, Serialize)]
struct ClaimPayload<'a> {
    worker_id: &'a str,
    task_type: &'a str,
}

/// `POST /tasks/claim` returns `{}` when no work is available, so every
/// field is optional here.
#[derive(Debug, Deserialize)]
struct ClaimResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    input: Option<TaskInput>,
}

/// Full status snapshot; repeating an identical report is harmless.
#[derive(Debug, Serialize)]
struct ReportPayload<'a> {
    worker_id: &'a str,
    status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    progress: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<&'a TaskOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a TaskError>,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    url: String,
}

impl TaskClient {
    /// Create a client for one worker identity, reusing an existing
    /// [`reqwest::Client`] for connection pooling.
    pub fn new(
        client: reqwest::Client,
        api_base: String,
        api_key: Option<String>,
        worker_id: String,
    ) -> Self {
        Self {
            client,
            api_base,
            api_key,
            worker_id,
        }
    }

    /// This worker's generated identity.
    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Try to claim a text-to-image task.
    ///
    /// Returns `None` when the queue has no available work; the caller
    /// polls again after a delay.
    pub async fn claim(&self) -> Result<Option<Task>, TaskApiError> {
        let payload = ClaimPayload {
            worker_id: &self.worker_id,
            task_type: TASK_TYPE_TEXT_TO_IMAGE,
        };

        let response = self
            .authorize(self.client.post(format!("{}/tasks/claim", self.api_base)))
            .json(&payload)
            .send()
            .await?;
        let response = Self::ensure_success(response).await?;

        let claimed: ClaimResponse = response.json().await?;
        Ok(claimed.id.map(|id| Task {
            id,
            input: claimed.input.unwrap_or_default(),
        }))
    }

    /// Push a status snapshot for a task.
    ///
    /// Idempotent: the remote state is overwritten, not appended, so
    /// retrying an identical report changes nothing. Callers are
    /// responsible for only increasing `progress`.
    pub async fn report(
        &self,
        task_id: &str,
        status: TaskStatus,
        progress: Option<i32>,
        output: Option<&TaskOutput>,
        error: Option<&TaskError>,
    ) -> Result<(), TaskApiError> {
        let payload = ReportPayload {
            worker_id: &self.worker_id,
            status,
            progress,
            output,
            error,
        };

        let response = self
            .authorize(self.client.post(format!("{}/tasks/{}", self.api_base, task_id)))
            .json(&payload)
            .send()
            .await?;
        Self::ensure_success(response).await?;
        Ok(())
    }

    /// Upload a result image for a task. Returns the asset URL.
    pub async fn upload_artifact(
        &self,
        task_id: &str,
        bytes: Vec<u8>,
        filename: &str,
    ) -> Result<String, TaskApiError> {
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str("image/png")?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("taskId", task_id.to_string());

        let response = self
            .authorize(
                self.client
                    .post(format!("{}/tasks/{}/assets", self.api_base, task_id)),
            )
            .multipart(form)
            .send()
            .await?;
        let response = Self::ensure_success(response).await?;

        Ok(response.json::<UploadResponse>().await?.url)
    }

    // ---- private helpers ----

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    /// Ensure the response has a success status code, or return a
    /// [`TaskApiError::ApiError`] with the status and body text.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, TaskApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(TaskApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}
