//! Execution monitor: drives one submitted workflow to completion.
//!
//! The monitor owns the `Idle -> Submitted -> Running -> Completed |
//! Failed` lifecycle of a single submission. [`execute`] connects the
//! WebSocket *before* submitting the workflow so no early event can be
//! missed, then consumes events strictly in arrival order until one of
//! two completion conditions fires.
//!
//! Per-event state lives in [`ExecutionTracker`], a synchronous core
//! that classifies one message at a time. The async loop merely feeds
//! frames through it.

use std::future::Future;
use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio_tungstenite::tungstenite::{self, Message};

use crate::api::{ComfyApi, ComfyApiError};
use crate::client::{ComfyClient, ComfyClientError, ComfyConnection};
use crate::messages::{is_untracked_envelope, parse_message, ComfyMessage};

/// Error type progress callbacks may fail with.
pub type ProgressError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that fail a single execution.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    /// The WebSocket connection could not be established.
    #[error(transparent)]
    Connect(#[from] ComfyClientError),

    /// The workflow could not be queued.
    #[error("Failed to queue workflow: {0}")]
    Submit(#[source] ComfyApiError),

    /// The WebSocket failed while consuming events.
    #[error("WebSocket receive error: {0}")]
    Stream(#[from] tungstenite::Error),

    /// The WebSocket closed before a completion signal arrived.
    #[error("WebSocket closed before execution completed")]
    ChannelClosed,

    /// A text frame was not a well-formed event envelope.
    #[error("Malformed event frame: {0}")]
    MalformedFrame(String),

    /// The progress callback failed; the execution is abandoned.
    #[error("Progress report failed: {0}")]
    Progress(#[source] ProgressError),

    /// The configured execution deadline expired.
    #[error("Execution did not complete within {secs}s")]
    Timeout { secs: u64 },
}

/// What the tracker concluded from one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Progress crossed the high-water mark; report this percentage.
    Progress(i32),
    /// The workflow finished; stop consuming events.
    Completed,
}

/// Per-execution event classifier.
///
/// Tracks the progress high-water mark and the queue-drain start flag
/// for one submission. Completion is signalled by whichever of two
/// independent conditions fires first:
///
/// 1. an `executing` event with a null node for this submission's
///    prompt ID, or
/// 2. the queue depth reaching zero a second time (the first drain
///    marks the job as started; some backends emit no explicit per-job
///    completion event on this channel).
///
/// Keeping both paths is deliberate redundancy, not a bug.
#[derive(Debug)]
pub struct ExecutionTracker {
    prompt_id: String,
    /// Set once the queue has drained with this job in flight.
    started: bool,
    /// Highest percentage reported so far; reports only on increase.
    percent: i32,
}

impl ExecutionTracker {
    pub fn new(prompt_id: impl Into<String>) -> Self {
        Self {
            prompt_id: prompt_id.into(),
            started: false,
            percent: 0,
        }
    }

    /// Classify one event. Events for other prompt IDs are ignored.
    pub fn observe(&mut self, msg: &ComfyMessage) -> Option<Signal> {
        match msg {
            ComfyMessage::Executing(data) => {
                if data.prompt_id != self.prompt_id {
                    tracing::debug!(
                        prompt_id = %data.prompt_id,
                        "Ignoring executing event for another submission",
                    );
                    return None;
                }
                match &data.node {
                    Some(node) => {
                        tracing::debug!(node = %node, "Executing node");
                        None
                    }
                    None => Some(Signal::Completed),
                }
            }
            ComfyMessage::Progress(data) => {
                let percent = progress_percent(data.value, data.max)?;
                if percent > self.percent {
                    self.percent = percent;
                    Some(Signal::Progress(percent))
                } else {
                    None
                }
            }
            ComfyMessage::Status(data) => {
                if data.status.exec_info.queue_remaining == 0 {
                    if self.started {
                        Some(Signal::Completed)
                    } else {
                        self.started = true;
                        None
                    }
                } else {
                    None
                }
            }
            ComfyMessage::Executed(data) => {
                // Outputs are resolved from history after completion.
                tracing::debug!(node = %data.node, "Node executed with output");
                None
            }
        }
    }
}

/// Percentage completed, `floor(value / max * 100)`.
///
/// Returns `None` for a non-positive `max` (nothing to report).
pub fn progress_percent(value: i32, max: i32) -> Option<i32> {
    if max <= 0 {
        return None;
    }
    Some((i64::from(value) * 100 / i64::from(max)) as i32)
}

/// Submit a workflow and observe it end-to-end.
///
/// Connects the WebSocket first, submits the workflow under the
/// connection's client ID, then consumes events until completion. The
/// WebSocket is closed on every exit path. `on_progress` is invoked,
/// in event order, with each strictly-increasing percentage; if it
/// fails, the execution is abandoned and the error surfaces as
/// [`ExecutionError::Progress`].
///
/// `deadline` bounds the whole event-consumption phase; `None` waits
/// indefinitely.
///
/// Returns the submission's prompt ID so the caller can resolve
/// results from history.
pub async fn execute<F, Fut>(
    client: &ComfyClient,
    api: &ComfyApi,
    workflow: &serde_json::Value,
    deadline: Option<Duration>,
    on_progress: F,
) -> Result<String, ExecutionError>
where
    F: FnMut(i32) -> Fut,
    Fut: Future<Output = Result<(), ProgressError>>,
{
    let mut conn = client.connect().await?;

    let prompt_id = match api.submit_workflow(workflow, &conn.client_id).await {
        Ok(response) => response.prompt_id,
        Err(e) => {
            close_quietly(&mut conn).await;
            return Err(ExecutionError::Submit(e));
        }
    };
    tracing::info!(prompt_id = %prompt_id, "Workflow queued");

    let result = wait_for_completion(&mut conn, &prompt_id, deadline, on_progress).await;
    close_quietly(&mut conn).await;
    result.map(|()| prompt_id)
}

/// Consume events from an established connection until the given
/// submission completes or fails.
///
/// Does not close the connection; the caller owns its lifetime.
pub async fn wait_for_completion<F, Fut>(
    conn: &mut ComfyConnection,
    prompt_id: &str,
    deadline: Option<Duration>,
    mut on_progress: F,
) -> Result<(), ExecutionError>
where
    F: FnMut(i32) -> Fut,
    Fut: Future<Output = Result<(), ProgressError>>,
{
    let mut tracker = ExecutionTracker::new(prompt_id);
    let consume = consume_events(&mut conn.ws_stream, &mut tracker, &mut on_progress);

    match deadline {
        Some(limit) => match tokio::time::timeout(limit, consume).await {
            Ok(result) => result,
            Err(_) => Err(ExecutionError::Timeout {
                secs: limit.as_secs(),
            }),
        },
        None => consume.await,
    }
}

/// The event-consumption loop, generic over the frame source so the
/// state machine can be exercised without a live server.
async fn consume_events<S, F, Fut>(
    frames: &mut S,
    tracker: &mut ExecutionTracker,
    on_progress: &mut F,
) -> Result<(), ExecutionError>
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
    F: FnMut(i32) -> Fut,
    Fut: Future<Output = Result<(), ProgressError>>,
{
    while let Some(frame) = frames.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                let msg = match parse_message(&text) {
                    Ok(msg) => msg,
                    Err(e) if is_untracked_envelope(&text) => {
                        tracing::debug!(error = %e, "Skipping untracked message kind");
                        continue;
                    }
                    Err(e) => return Err(ExecutionError::MalformedFrame(e.to_string())),
                };
                match tracker.observe(&msg) {
                    Some(Signal::Progress(percent)) => {
                        on_progress(percent).await.map_err(ExecutionError::Progress)?
                    }
                    Some(Signal::Completed) => {
                        tracing::info!(prompt_id = %tracker.prompt_id, "Workflow execution completed");
                        return Ok(());
                    }
                    None => {}
                }
            }
            Ok(Message::Binary(_)) => {
                // Preview thumbnails; not part of the completion contract.
                tracing::trace!("Ignoring binary frame (preview image)");
            }
            Ok(Message::Ping(_) | Message::Pong(_)) => {
                // Handled automatically by tungstenite.
            }
            Ok(Message::Close(frame)) => {
                tracing::info!(?frame, "ComfyUI closed WebSocket");
                return Err(ExecutionError::ChannelClosed);
            }
            Ok(Message::Frame(_)) => {}
            Err(e) => return Err(ExecutionError::Stream(e)),
        }
    }
    Err(ExecutionError::ChannelClosed)
}

async fn close_quietly(conn: &mut ComfyConnection) {
    if let Err(e) = conn.ws_stream.close(None).await {
        tracing::debug!(error = %e, "WebSocket close failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::cell::RefCell;
    use std::future::ready;

    fn progress(value: i32, max: i32) -> ComfyMessage {
        parse_message(&format!(
            r#"{{"type":"progress","data":{{"value":{value},"max":{max}}}}}"#
        ))
        .unwrap()
    }

    fn executing(node: Option<&str>, prompt_id: &str) -> ComfyMessage {
        let node = node.map_or("null".to_string(), |n| format!(r#""{n}""#));
        parse_message(&format!(
            r#"{{"type":"executing","data":{{"node":{node},"prompt_id":"{prompt_id}"}}}}"#
        ))
        .unwrap()
    }

    fn status(queue_remaining: i32) -> ComfyMessage {
        parse_message(&format!(
            r#"{{"type":"status","data":{{"status":{{"exec_info":{{"queue_remaining":{queue_remaining}}}}}}}}}"#
        ))
        .unwrap()
    }

    // ---- tracker ----

    #[test]
    fn progress_reports_are_strictly_increasing() {
        let mut tracker = ExecutionTracker::new("p1");

        assert_eq!(
            tracker.observe(&progress(5, 10)),
            Some(Signal::Progress(50))
        );
        // Same percentage again: deduplicated.
        assert_eq!(tracker.observe(&progress(5, 10)), None);
        // Lower ratio: never report a decrease.
        assert_eq!(tracker.observe(&progress(4, 10)), None);
        assert_eq!(
            tracker.observe(&progress(6, 10)),
            Some(Signal::Progress(60))
        );
    }

    #[test]
    fn progress_percentage_is_floored() {
        let mut tracker = ExecutionTracker::new("p1");
        assert_eq!(
            tracker.observe(&progress(1, 3)),
            Some(Signal::Progress(33))
        );
        assert_eq!(
            tracker.observe(&progress(2, 3)),
            Some(Signal::Progress(66))
        );
    }

    #[test]
    fn zero_max_progress_is_ignored() {
        let mut tracker = ExecutionTracker::new("p1");
        assert_eq!(tracker.observe(&progress(5, 0)), None);
    }

    #[test]
    fn null_node_for_active_prompt_completes() {
        let mut tracker = ExecutionTracker::new("p1");
        assert_eq!(tracker.observe(&executing(Some("6"), "p1")), None);
        assert_eq!(
            tracker.observe(&executing(None, "p1")),
            Some(Signal::Completed)
        );
    }

    #[test]
    fn null_node_for_foreign_prompt_is_ignored() {
        let mut tracker = ExecutionTracker::new("p1");
        assert_eq!(tracker.observe(&executing(None, "other")), None);
        assert_eq!(tracker.observe(&executing(Some("3"), "other")), None);
    }

    #[test]
    fn queue_drain_twice_completes() {
        let mut tracker = ExecutionTracker::new("p1");
        // First drain: the job has started.
        assert_eq!(tracker.observe(&status(0)), None);
        // Non-zero depth in between has no effect.
        assert_eq!(tracker.observe(&status(2)), None);
        // Second drain: completion via the fallback path.
        assert_eq!(tracker.observe(&status(0)), Some(Signal::Completed));
    }

    #[test]
    fn nonzero_queue_depth_does_not_mark_started() {
        let mut tracker = ExecutionTracker::new("p1");
        assert_eq!(tracker.observe(&status(3)), None);
        assert_eq!(tracker.observe(&status(0)), None);
    }

    // ---- consumption loop ----

    fn text_frame(s: &str) -> Result<Message, tungstenite::Error> {
        Ok(Message::Text(s.to_string()))
    }

    async fn run_loop(
        frames: Vec<Result<Message, tungstenite::Error>>,
        prompt_id: &str,
    ) -> (Result<(), ExecutionError>, Vec<i32>) {
        let reports = RefCell::new(Vec::new());
        let mut stream = futures::stream::iter(frames);
        let mut tracker = ExecutionTracker::new(prompt_id);
        let result = consume_events(&mut stream, &mut tracker, &mut |percent| {
            reports.borrow_mut().push(percent);
            ready(Ok(()))
        })
        .await;
        (result, reports.into_inner())
    }

    #[tokio::test]
    async fn consumes_until_null_node_completion() {
        let frames = vec![
            text_frame(r#"{"type":"status","data":{"status":{"exec_info":{"queue_remaining":0}}}}"#),
            text_frame(r#"{"type":"executing","data":{"node":"6","prompt_id":"p1"}}"#),
            text_frame(r#"{"type":"progress","data":{"value":5,"max":10}}"#),
            text_frame(r#"{"type":"progress","data":{"value":5,"max":10}}"#),
            text_frame(r#"{"type":"executing","data":{"node":null,"prompt_id":"other"}}"#),
            text_frame(r#"{"type":"progress","data":{"value":6,"max":10}}"#),
            text_frame(r#"{"type":"executing","data":{"node":null,"prompt_id":"p1"}}"#),
            // Anything after completion must not be consumed.
            text_frame("garbage"),
        ];

        let (result, reports) = run_loop(frames, "p1").await;
        assert!(result.is_ok());
        assert_eq!(reports, vec![50, 60]);
    }

    #[tokio::test]
    async fn completes_via_queue_drain_fallback() {
        let frames = vec![
            text_frame(r#"{"type":"status","data":{"status":{"exec_info":{"queue_remaining":0}}}}"#),
            text_frame(r#"{"type":"progress","data":{"value":9,"max":10}}"#),
            text_frame(r#"{"type":"status","data":{"status":{"exec_info":{"queue_remaining":0}}}}"#),
        ];

        let (result, reports) = run_loop(frames, "p1").await;
        assert!(result.is_ok());
        assert_eq!(reports, vec![90]);
    }

    #[tokio::test]
    async fn binary_and_unknown_frames_are_skipped() {
        let frames = vec![
            Ok(Message::Binary(vec![1, 2, 3])),
            text_frame(r#"{"type":"execution_cached","data":{"prompt_id":"p1","nodes":[]}}"#),
            Ok(Message::Ping(vec![])),
            text_frame(r#"{"type":"executing","data":{"node":null,"prompt_id":"p1"}}"#),
        ];

        let (result, reports) = run_loop(frames, "p1").await;
        assert!(result.is_ok());
        assert!(reports.is_empty());
    }

    #[tokio::test]
    async fn malformed_frame_fails_the_execution() {
        let frames = vec![text_frame("{ not json")];
        let (result, _) = run_loop(frames, "p1").await;
        assert_matches!(result, Err(ExecutionError::MalformedFrame(_)));
    }

    #[tokio::test]
    async fn tracked_kind_with_bad_payload_fails_the_execution() {
        // An `executing` frame missing its prompt_id must not be
        // skipped as unknown; it could be the completion signal.
        let frames = vec![text_frame(r#"{"type":"executing","data":{}}"#)];
        let (result, _) = run_loop(frames, "p1").await;
        assert_matches!(result, Err(ExecutionError::MalformedFrame(_)));
    }

    #[tokio::test]
    async fn progress_callback_error_abandons_the_execution() {
        let frames = vec![
            text_frame(r#"{"type":"progress","data":{"value":5,"max":10}}"#),
            // Never reached: the failed report aborts first.
            text_frame(r#"{"type":"executing","data":{"node":null,"prompt_id":"p1"}}"#),
        ];
        let mut stream = futures::stream::iter(frames);
        let mut tracker = ExecutionTracker::new("p1");

        let result = consume_events(&mut stream, &mut tracker, &mut |_| {
            ready(Err("task queue unreachable".into()))
        })
        .await;

        assert_matches!(result, Err(ExecutionError::Progress(_)));
    }

    #[tokio::test]
    async fn exhausted_stream_without_completion_fails() {
        let frames = vec![text_frame(
            r#"{"type":"progress","data":{"value":1,"max":10}}"#,
        )];
        let (result, reports) = run_loop(frames, "p1").await;
        assert_matches!(result, Err(ExecutionError::ChannelClosed));
        assert_eq!(reports, vec![10]);
    }

    #[tokio::test]
    async fn close_frame_without_completion_fails() {
        let frames = vec![Ok(Message::Close(None))];
        let (result, _) = run_loop(frames, "p1").await;
        assert_matches!(result, Err(ExecutionError::ChannelClosed));
    }

    #[tokio::test]
    async fn receive_error_fails_the_execution() {
        let frames = vec![Err(tungstenite::Error::ConnectionClosed)];
        let (result, _) = run_loop(frames, "p1").await;
        assert_matches!(result, Err(ExecutionError::Stream(_)));
    }
}
