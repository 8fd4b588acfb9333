//! REST API client for the ComfyUI HTTP endpoints.
//!
//! Wraps the endpoints the worker needs: workflow submission
//! (`POST /prompt`), execution history (`GET /history`), and output
//! image retrieval (`GET /view`), using [`reqwest`].

use serde::Deserialize;

/// HTTP client for a single ComfyUI server.
pub struct ComfyApi {
    client: reqwest::Client,
    api_url: String,
}

/// Response returned by `POST /prompt` after successfully queuing a
/// workflow.
#[derive(Debug, Deserialize)]
pub struct SubmitResponse {
    /// Server-assigned identifier for the queued prompt. Correlates
    /// stream events and the later history lookup to this submission.
    pub prompt_id: String,
}

/// Errors from the ComfyUI REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum ComfyApiError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// ComfyUI returned a non-2xx status code.
    #[error("ComfyUI API error ({status}): {body}")]
    ApiError {
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },
}

impl ComfyApi {
    /// Create a new API client for a ComfyUI server.
    ///
    /// * `api_url` - Base HTTP URL, e.g. `http://127.0.0.1:8188`.
    pub fn new(api_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url,
        }
    }

    /// Create an API client reusing an existing [`reqwest::Client`]
    /// (shares the connection pool with other clients in the process).
    pub fn with_client(client: reqwest::Client, api_url: String) -> Self {
        Self { client, api_url }
    }

    /// Submit a workflow for execution.
    ///
    /// Sends `POST /prompt` with the workflow graph and the WebSocket
    /// client ID, so execution events are addressed to that connection.
    /// Returns the server-assigned `prompt_id`.
    pub async fn submit_workflow(
        &self,
        workflow: &serde_json::Value,
        client_id: &str,
    ) -> Result<SubmitResponse, ComfyApiError> {
        let body = serde_json::json!({
            "prompt": workflow,
            "client_id": client_id,
        });

        let response = self
            .client
            .post(format!("{}/prompt", self.api_url))
            .json(&body)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Retrieve the full execution history.
    ///
    /// Sends `GET /history`. The returned JSON maps prompt IDs to
    /// execution records containing per-node outputs.
    pub async fn get_history(&self) -> Result<serde_json::Value, ComfyApiError> {
        let response = self
            .client
            .get(format!("{}/history", self.api_url))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Fetch the raw bytes of an output image by filename.
    ///
    /// Sends `GET /view?filename=...`.
    pub async fn view(&self, filename: &str) -> Result<Vec<u8>, ComfyApiError> {
        let response = self
            .client
            .get(format!("{}/view", self.api_url))
            .query(&[("filename", filename)])
            .send()
            .await?;

        let response = Self::ensure_success(response).await?;
        Ok(response.bytes().await?.to_vec())
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`ComfyApiError::ApiError`]
    /// containing the status and body text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ComfyApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ComfyApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ComfyApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn submit_workflow_returns_prompt_id() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/prompt")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "client_id": "c1",
            })))
            .with_body(r#"{"prompt_id":"p1","number":4}"#)
            .create_async()
            .await;

        let api = ComfyApi::new(server.url());
        let workflow = serde_json::json!({"6": {"inputs": {"text": "hi"}}});
        let response = api.submit_workflow(&workflow, "c1").await.unwrap();

        assert_eq!(response.prompt_id, "p1");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn submit_workflow_non_success_is_api_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/prompt")
            .with_status(500)
            .with_body("node validation failed")
            .create_async()
            .await;

        let api = ComfyApi::new(server.url());
        let err = api
            .submit_workflow(&serde_json::json!({}), "c1")
            .await
            .unwrap_err();

        assert_matches!(err, ComfyApiError::ApiError { status: 500, body } => {
            assert_eq!(body, "node validation failed");
        });
    }

    #[tokio::test]
    async fn view_returns_raw_bytes() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/view")
            .match_query(mockito::Matcher::UrlEncoded(
                "filename".into(),
                "out.png".into(),
            ))
            .with_body([0x89, 0x50, 0x4e, 0x47])
            .create_async()
            .await;

        let api = ComfyApi::new(server.url());
        let bytes = api.view("out.png").await.unwrap();

        assert_eq!(bytes, vec![0x89, 0x50, 0x4e, 0x47]);
        mock.assert_async().await;
    }
}
