//! Task queue domain model.
//!
//! These types mirror the task queue API's JSON payloads: the task a
//! worker claims, the status snapshots it pushes back, and the output /
//! error bodies attached to terminal reports.

use serde::{Deserialize, Serialize};

/// Task type requested when claiming work.
pub const TASK_TYPE_TEXT_TO_IMAGE: &str = "text-to-image";

/// Fixed machine-readable code attached to every `failed` report.
pub const TASK_FAILURE_CODE: i32 = 10001;

/// A unit of work claimed from the task queue.
#[derive(Debug, Clone, Deserialize)]
pub struct Task {
    pub id: String,
    #[serde(default)]
    pub input: TaskInput,
}

/// Generation parameters carried by a task.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskInput {
    /// Text prompt for the image generation. Required; its absence is a
    /// validation failure caught before any backend call.
    #[serde(default)]
    pub prompt: Option<String>,
}

/// Lifecycle status reported back to the task queue.
///
/// Each report is a full snapshot, so repeating one is harmless.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Processing,
    Success,
    Failed,
}

/// Output attached to a `success` report.
#[derive(Debug, Clone, Serialize)]
pub struct TaskOutput {
    pub image_urls: Vec<String>,
}

/// Error body attached to a `failed` report.
#[derive(Debug, Clone, Serialize)]
pub struct TaskError {
    pub code: i32,
    pub message: String,
}

impl TaskError {
    /// Build the standard failure body from any displayable error.
    pub fn from_message(message: impl Into<String>) -> Self {
        Self {
            code: TASK_FAILURE_CODE,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_deserializes_with_prompt() {
        let task: Task =
            serde_json::from_str(r#"{"id":"t1","input":{"prompt":"a red fox"}}"#).unwrap();
        assert_eq!(task.id, "t1");
        assert_eq!(task.input.prompt.as_deref(), Some("a red fox"));
    }

    #[test]
    fn task_deserializes_without_input() {
        let task: Task = serde_json::from_str(r#"{"id":"t2"}"#).unwrap();
        assert!(task.input.prompt.is_none());
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&TaskStatus::Processing).unwrap(),
            r#""processing""#
        );
        assert_eq!(
            serde_json::to_string(&TaskStatus::Success).unwrap(),
            r#""success""#
        );
        assert_eq!(
            serde_json::to_string(&TaskStatus::Failed).unwrap(),
            r#""failed""#
        );
    }

    #[test]
    fn error_body_carries_fixed_code() {
        let err = TaskError::from_message("boom");
        assert_eq!(err.code, TASK_FAILURE_CODE);
        assert_eq!(err.message, "boom");
    }
}
