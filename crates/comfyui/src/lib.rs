//! ComfyUI protocol client for the fabrik worker.
//!
//! Provides typed WebSocket message parsing, connection setup, HTTP API
//! wrappers, workflow template parameterization, the execution monitor
//! that drives a submitted workflow to completion, and history-based
//! result resolution.

pub mod api;
pub mod client;
pub mod execution;
pub mod history;
pub mod messages;
pub mod workflow;
