//! Shared domain types for the fabrik worker.
//!
//! Holds the task model exchanged with the task queue API and the
//! constants both sides agree on (task type, failure code).

pub mod task;
