//! Result resolution from ComfyUI execution history.
//!
//! Once the execution monitor signals completion, the history record
//! for the submission is looked up, its output-bearing nodes are
//! enumerated, and the first produced image is fetched.

use serde_json::Value;

use crate::api::{ComfyApi, ComfyApiError};

/// Errors from result resolution.
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    /// The history or view request failed.
    #[error(transparent)]
    Api(#[from] ComfyApiError),

    /// No history record exists for the submission. Should not occur
    /// after a completion signal; treated as a consistency fault.
    #[error("No history record for prompt {prompt_id}")]
    NotFound { prompt_id: String },

    /// The history record exists but references no output images.
    #[error("Execution {prompt_id} produced no output images")]
    NoOutputs { prompt_id: String },
}

/// An output image fetched from ComfyUI.
#[derive(Debug)]
pub struct ResolvedArtifact {
    /// Filename of the fetched image.
    pub filename: String,
    /// Raw image bytes.
    pub bytes: Vec<u8>,
    /// Every output filename referenced by the history record, in
    /// node-map order.
    pub all_filenames: Vec<String>,
}

/// Look up a completed submission in history and fetch its first
/// output image.
pub async fn resolve(api: &ComfyApi, prompt_id: &str) -> Result<ResolvedArtifact, HistoryError> {
    let history = api.get_history().await?;
    let record = history.get(prompt_id).ok_or_else(|| HistoryError::NotFound {
        prompt_id: prompt_id.to_string(),
    })?;

    let all_filenames = collect_output_images(record);
    let filename = all_filenames
        .first()
        .cloned()
        .ok_or_else(|| HistoryError::NoOutputs {
            prompt_id: prompt_id.to_string(),
        })?;

    tracing::info!(
        prompt_id = %prompt_id,
        filename = %filename,
        output_count = all_filenames.len(),
        "Resolved execution outputs",
    );

    let bytes = api.view(&filename).await?;
    Ok(ResolvedArtifact {
        filename,
        bytes,
        all_filenames,
    })
}

/// Collect every output image filename referenced by a history record.
///
/// Iterates the `outputs` node map (deterministic order for a given
/// payload) and flattens each node's `images[].filename` entries.
pub fn collect_output_images(record: &Value) -> Vec<String> {
    let mut filenames = Vec::new();
    let Some(outputs) = record.get("outputs").and_then(Value::as_object) else {
        return filenames;
    };

    for (node_id, node_output) in outputs {
        let Some(images) = node_output.get("images").and_then(Value::as_array) else {
            continue;
        };
        for image in images {
            if let Some(name) = image.get("filename").and_then(Value::as_str) {
                tracing::debug!(node_id = %node_id, filename = %name, "Found output image");
                filenames.push(name.to_string());
            }
        }
    }
    filenames
}
