//! Worker configuration from CLI flags with environment fallback.

use std::path::PathBuf;

use clap::Parser;
use fabrik_comfyui::workflow::DEFAULT_PROMPT_NODE_ID;

/// Configuration for one worker instance.
///
/// Every flag falls back to an environment variable, so the worker can
/// run unattended from a `.env` file alone.
#[derive(Debug, Clone, Parser)]
#[command(name = "fabrik-worker", about = "ComfyUI text-to-image task worker")]
pub struct WorkerConfig {
    /// Base URL of the task queue API.
    #[arg(
        long = "api-base",
        env = "API_BASE_URL",
        default_value = "http://localhost:3000/api/v1"
    )]
    pub api_base: String,

    /// Bearer token for the task queue API. The Authorization header is
    /// omitted when unset.
    #[arg(long = "api-key", env = "API_KEY")]
    pub api_key: Option<String>,

    /// Base URL of the ComfyUI server.
    #[arg(
        long = "comfy-url",
        env = "COMFY_URL",
        default_value = "http://127.0.0.1:8188"
    )]
    pub comfy_url: String,

    /// Path to the workflow template JSON.
    #[arg(
        long = "workflow",
        env = "WORKFLOW_PATH",
        default_value = "workflows/flux_dev_q8.json"
    )]
    pub workflow_path: PathBuf,

    /// Node ID of the template's prompt text input.
    #[arg(
        long = "prompt-node",
        env = "PROMPT_NODE_ID",
        default_value = DEFAULT_PROMPT_NODE_ID
    )]
    pub prompt_node_id: String,

    /// Hard deadline for one execution, in seconds. Waits are unbounded
    /// when unset.
    #[arg(long = "execution-timeout-secs", env = "EXECUTION_TIMEOUT_SECS")]
    pub execution_timeout_secs: Option<u64>,
}
