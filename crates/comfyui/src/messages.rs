//! ComfyUI WebSocket message types and parser.
//!
//! ComfyUI sends JSON text frames shaped as `{"type": "<kind>", "data":
//! {...}}`. This module deserializes the kinds the worker acts on into a
//! closed [`ComfyMessage`] enum. The live protocol is a superset of
//! these; frames with an unknown `type` should be skipped by callers,
//! not treated as failures.

use serde::Deserialize;

/// WebSocket message kinds the execution monitor consumes.
///
/// Deserialized via the internally-tagged `"type"` field with
/// associated `"data"` content.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ComfyMessage {
    /// Server status broadcast carrying the remaining queue depth.
    #[serde(rename = "status")]
    Status(StatusData),

    /// A node is executing, or the whole prompt finished when `node`
    /// is `None`.
    #[serde(rename = "executing")]
    Executing(ExecutingData),

    /// Step-level progress from a long-running node (e.g. a sampler).
    #[serde(rename = "progress")]
    Progress(ProgressData),

    /// A node finished and produced output.
    #[serde(rename = "executed")]
    Executed(ExecutedData),
}

/// Payload for `status` messages.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusData {
    pub status: QueueStatus,
}

/// Current queue state.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueStatus {
    pub exec_info: ExecInfo,
}

/// Execution queue statistics.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecInfo {
    pub queue_remaining: i32,
}

/// Payload for `executing` messages.
///
/// `node == None` means execution of the prompt has completed.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutingData {
    pub node: Option<String>,
    pub prompt_id: String,
}

/// Payload for `progress` messages.
#[derive(Debug, Clone, Deserialize)]
pub struct ProgressData {
    /// Current step number.
    pub value: i32,
    /// Total number of steps.
    pub max: i32,
}

/// Payload for `executed` messages (per-node output).
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutedData {
    pub node: String,
    /// Raw output value (images, filenames, etc.).
    pub output: serde_json::Value,
    pub prompt_id: String,
}

/// Parse a ComfyUI WebSocket text frame into a typed message.
///
/// Returns `Err` for malformed JSON and for `type` values the worker
/// does not track.
pub fn parse_message(text: &str) -> Result<ComfyMessage, serde_json::Error> {
    serde_json::from_str(text)
}

/// The `type` values [`parse_message`] can produce.
const TRACKED_KINDS: [&str; 4] = ["status", "executing", "progress", "executed"];

/// Whether a text frame is a well-formed ComfyUI envelope (a JSON
/// object with a string `type` field) of a kind the worker does not
/// track.
///
/// Callers skip these; everything else that fails to parse is a
/// malformed frame and fails the execution. A tracked kind with a bad
/// `data` payload is *not* an untracked envelope, so a broken
/// `executing` frame cannot silently swallow a completion signal.
pub fn is_untracked_envelope(text: &str) -> bool {
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(v) => match v.get("type").and_then(|t| t.as_str()) {
            Some(kind) => !TRACKED_KINDS.contains(&kind),
            None => false,
        },
        Err(_) => false,
    }
}
