//! Per-task error aggregation.
//!
//! Any error raised while processing a single task converts into
//! [`WorkerError`] at the task-processing boundary, where it becomes a
//! `failed` status report. The worker itself never crashes on a
//! per-task failure.

use fabrik_comfyui::execution::ExecutionError;
use fabrik_comfyui::history::HistoryError;
use fabrik_comfyui::workflow::WorkflowError;

use crate::task_client::TaskApiError;

/// Everything that can fail one task.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// Required task input is missing or empty.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Template loading or parameterization failed.
    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    /// Submission or event-stream consumption failed.
    #[error(transparent)]
    Execution(#[from] ExecutionError),

    /// Result resolution failed after completion.
    #[error(transparent)]
    History(#[from] HistoryError),

    /// A task queue API call failed.
    #[error("Task API error: {0}")]
    TaskApi(#[from] TaskApiError),
}
