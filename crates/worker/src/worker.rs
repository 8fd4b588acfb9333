//! The worker poll loop and per-task orchestration.
//!
//! One [`Worker`] processes tasks strictly sequentially: a new claim is
//! only attempted when no task is in flight, and the in-flight slot is
//! cleared on every exit path from task processing. Horizontal scaling
//! is a matter of running more worker processes; the queue's claim
//! semantics prevent double-claims.

use std::time::Duration;

use fabrik_comfyui::api::ComfyApi;
use fabrik_comfyui::client::ComfyClient;
use fabrik_comfyui::{execution, history, workflow};
use fabrik_core::task::{Task, TaskError, TaskOutput, TaskStatus};

use crate::config::WorkerConfig;
use crate::error::WorkerError;
use crate::task_client::{TaskApiError, TaskClient};

/// Delay between claim polls.
const POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Backoff after an unexpected loop-level error (e.g. queue unreachable).
const ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// A single-task generation worker.
pub struct Worker {
    config: WorkerConfig,
    tasks: TaskClient,
    comfy_client: ComfyClient,
    comfy_api: ComfyApi,
    /// The one task in flight, if any. Cleared on every exit path from
    /// [`process_task`](Self::process_task) so the next poll can claim
    /// again.
    current_task: Option<Task>,
}

impl Worker {
    /// Build a worker with a freshly generated identity.
    pub fn new(config: WorkerConfig) -> Self {
        let worker_id = uuid::Uuid::new_v4().to_string();
        let http = reqwest::Client::new();

        let tasks = TaskClient::new(
            http.clone(),
            config.api_base.clone(),
            config.api_key.clone(),
            worker_id,
        );
        let comfy_client = ComfyClient::new(config.comfy_url.clone());
        let comfy_api = ComfyApi::with_client(http, config.comfy_url.clone());

        Self {
            config,
            tasks,
            comfy_client,
            comfy_api,
            current_task: None,
        }
    }

    /// This worker's generated identity.
    pub fn worker_id(&self) -> &str {
        self.tasks.worker_id()
    }

    /// Whether a task is currently being processed.
    pub fn has_task_in_flight(&self) -> bool {
        self.current_task.is_some()
    }

    /// Run the claim-process loop indefinitely.
    ///
    /// Per-task failures are reported to the queue and never crash the
    /// worker; loop-level errors (e.g. the queue unreachable) are logged
    /// and retried after a longer backoff.
    pub async fn run(&mut self) {
        tracing::info!(worker_id = %self.worker_id(), "Worker started");

        loop {
            match self.poll_once().await {
                Ok(()) => tokio::time::sleep(POLL_INTERVAL).await,
                Err(e) => {
                    tracing::error!(error = %e, "Error in worker loop");
                    tokio::time::sleep(ERROR_BACKOFF).await;
                }
            }
        }
    }

    /// One loop iteration: claim and process a task if none is in
    /// flight. A claim failure is returned so the loop can back off.
    pub async fn poll_once(&mut self) -> Result<(), TaskApiError> {
        if self.current_task.is_none() {
            if let Some(task) = self.tasks.claim().await? {
                tracing::info!(task_id = %task.id, "Claimed task");
                self.process_task(task).await;
            }
        }
        Ok(())
    }

    /// Process one task end-to-end.
    ///
    /// Any error becomes a `failed` report with the fixed error code;
    /// the in-flight slot is cleared on success and failure alike.
    pub async fn process_task(&mut self, task: Task) {
        let task_id = task.id.clone();
        tracing::info!(task_id = %task_id, "Starting to process task");
        self.current_task = Some(task.clone());

        match self.run_task(&task).await {
            Ok(url) => {
                tracing::info!(task_id = %task_id, url = %url, "Task completed");
            }
            Err(e) => {
                tracing::error!(task_id = %task_id, error = %e, "Task failed");
                let error = TaskError::from_message(e.to_string());
                if let Err(report_err) = self
                    .tasks
                    .report(&task_id, TaskStatus::Failed, None, None, Some(&error))
                    .await
                {
                    tracing::error!(
                        task_id = %task_id,
                        error = %report_err,
                        "Failed to report task failure",
                    );
                }
            }
        }

        self.current_task = None;
    }

    /// The fallible part of task processing: validate, parameterize,
    /// execute, resolve, upload, report success.
    async fn run_task(&self, task: &Task) -> Result<String, WorkerError> {
        let prompt = task
            .input
            .prompt
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| WorkerError::Validation("no prompt provided in task input".into()))?;

        let mut workflow = workflow::load_workflow(&self.config.workflow_path)?;
        workflow::inject_prompt(&mut workflow, &self.config.prompt_node_id, prompt)?;
        tracing::info!(task_id = %task.id, "Workflow prepared with prompt");

        let deadline = self.config.execution_timeout_secs.map(Duration::from_secs);
        let tasks = &self.tasks;
        let task_id = task.id.as_str();

        let prompt_id = execution::execute(
            &self.comfy_client,
            &self.comfy_api,
            &workflow,
            deadline,
            // A failed progress report fails the whole task; a queue we
            // cannot reach could not receive the final report either.
            move |percent| async move {
                tasks
                    .report(task_id, TaskStatus::Processing, Some(percent), None, None)
                    .await?;
                tracing::info!(task_id = %task_id, percent, "Progress updated");
                Ok(())
            },
        )
        .await?;

        let artifact = history::resolve(&self.comfy_api, &prompt_id).await?;
        let url = tasks
            .upload_artifact(task_id, artifact.bytes, &artifact.filename)
            .await?;
        tracing::info!(task_id = %task_id, url = %url, "Image uploaded");

        let output = TaskOutput {
            image_urls: vec![url.clone()],
        };
        tasks
            .report(task_id, TaskStatus::Success, None, Some(&output), None)
            .await?;

        Ok(url)
    }
}
