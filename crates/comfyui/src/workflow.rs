//! Workflow template loading and prompt injection.
//!
//! A workflow template is a ComfyUI node graph stored as JSON. Before
//! submission the worker overwrites the designated text-encode node's
//! `inputs.text` field with the task prompt wrapped in the fixed style
//! directives.

use std::path::Path;

/// Node ID of the prompt text-encode node in the shipped template.
pub const DEFAULT_PROMPT_NODE_ID: &str = "6";

/// Errors from template loading and parameterization.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// The template file could not be read.
    #[error("Failed to read workflow template {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The template is not valid JSON.
    #[error("Malformed workflow template: {0}")]
    Format(#[from] serde_json::Error),

    /// The designated prompt node or its text input is absent. This is
    /// a template/backend mismatch, not a transient condition, and must
    /// not be retried.
    #[error("Workflow template has no text input at node {node_id}")]
    Schema { node_id: String },
}

/// Wrap a user prompt with the fixed style directives used for every
/// generation.
pub fn style_prompt(prompt: &str) -> String {
    format!(
        "A 3D render of {prompt}, smooth lighting, no reflections, no shadows, \
         keep the main subject center, 3d"
    )
}

/// Load a workflow template from disk.
pub fn load_workflow(path: &Path) -> Result<serde_json::Value, WorkflowError> {
    let text = std::fs::read_to_string(path).map_err(|source| WorkflowError::Read {
        path: path.display().to_string(),
        source,
    })?;
    parse_workflow(&text)
}

/// Parse a workflow template from a JSON string.
pub fn parse_workflow(text: &str) -> Result<serde_json::Value, WorkflowError> {
    Ok(serde_json::from_str(text)?)
}

/// Overwrite the designated node's `inputs.text` with the styled prompt.
///
/// The workflow is mutated in place and must not change after
/// submission.
pub fn inject_prompt(
    workflow: &mut serde_json::Value,
    node_id: &str,
    prompt: &str,
) -> Result<(), WorkflowError> {
    let text_input = workflow
        .get_mut(node_id)
        .and_then(|node| node.get_mut("inputs"))
        .and_then(|inputs| inputs.get_mut("text"))
        .ok_or_else(|| WorkflowError::Schema {
            node_id: node_id.to_string(),
        })?;

    *text_input = serde_json::Value::String(style_prompt(prompt));
    Ok(())
}
