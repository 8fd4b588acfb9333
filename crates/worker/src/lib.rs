//! `fabrik-worker` -- single-task ComfyUI generation worker.
//!
//! Claims text-to-image tasks from the task queue API, parameterizes a
//! ComfyUI workflow template with the task prompt, drives the workflow
//! to completion over the ComfyUI WebSocket, uploads the produced image
//! to the queue's asset endpoint, and reports final status.

pub mod config;
pub mod error;
pub mod task_client;
pub mod worker;
