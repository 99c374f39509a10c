//! Message producers.
//!
//! The map runtime never talks to a broker directly.  Anything that can
//! deliver `(topic, payload)` pairs in order implements [`MessageSource`]:
//!
//! - [`ReplaySource`] – replays a recorded NDJSON log, optionally paced.
//! - [`ChannelSource`] – adapts an in-process `mpsc` channel, for transports
//!   that push messages from their own task.
//!
//! # Replay format
//!
//! One JSON record per line:
//!
//! ```text
//! {"topic": "robot/position", "payload": {"x": 50, "y": 50}}
//! {"topic": "sensors/recalculated", "payload": "{\"n\":50,\"e\":50,\"s\":50,\"w\":50}"}
//! ```
//!
//! `payload` may be a JSON object or a string holding the raw payload.  Blank
//! lines and lines starting with `#` are skipped.

use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use serde::Deserialize;
use sonarmap_types::MapError;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::debug;

/// A payload as delivered by a transport, before decoding.
#[derive(Debug, Clone, PartialEq)]
pub struct RawMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl RawMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Stream item: a message, or a per-message failure that does not end the
/// stream.
pub type MessageStream = BoxStream<'static, Result<RawMessage, MapError>>;

/// Every message producer must implement this trait.
///
/// # Contract
///
/// * Messages are yielded in delivery order.
/// * A bad message yields `Err` for that message only; the stream carries on.
/// * The stream ends when the producer has nothing more to deliver.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Open the producer and return its message stream.
    async fn message_stream(&self) -> Result<MessageStream, MapError>;
}

// ────────────────────────────────────────────────────────────────────────────
// ReplaySource
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum ReplayInput {
    File(PathBuf),
    Stdin,
    Text(String),
}

/// Replays a recorded NDJSON message log.
#[derive(Debug, Clone)]
pub struct ReplaySource {
    input: ReplayInput,
    delay: Duration,
}

impl ReplaySource {
    /// Replay the log stored at `path`.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self::with_input(ReplayInput::File(path.into()))
    }

    /// Replay a log piped on standard input.
    pub fn from_stdin() -> Self {
        Self::with_input(ReplayInput::Stdin)
    }

    /// Replay an in-memory log.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self::with_input(ReplayInput::Text(text.into()))
    }

    fn with_input(input: ReplayInput) -> Self {
        Self {
            input,
            delay: Duration::ZERO,
        }
    }

    /// Wait `delay` between consecutive messages (builder-style).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl MessageSource for ReplaySource {
    async fn message_stream(&self) -> Result<MessageStream, MapError> {
        let reader: Box<dyn AsyncBufRead + Unpin + Send> = match &self.input {
            ReplayInput::File(path) => {
                let file = tokio::fs::File::open(path)
                    .await
                    .map_err(|e| MapError::Io(format!("open {}: {e}", path.display())))?;
                Box::new(BufReader::new(file))
            }
            ReplayInput::Stdin => Box::new(BufReader::new(tokio::io::stdin())),
            ReplayInput::Text(text) => Box::new(std::io::Cursor::new(text.clone().into_bytes())),
        };
        Ok(replay_stream(reader, self.delay))
    }
}

#[derive(Deserialize)]
struct ReplayRecord {
    topic: String,
    payload: serde_json::Value,
}

struct ReplayState {
    lines: tokio::io::Lines<Box<dyn AsyncBufRead + Unpin + Send>>,
    line_no: usize,
    delay: Duration,
    started: bool,
}

fn replay_stream(reader: Box<dyn AsyncBufRead + Unpin + Send>, delay: Duration) -> MessageStream {
    let state = ReplayState {
        lines: reader.lines(),
        line_no: 0,
        delay,
        started: false,
    };
    stream::unfold(state, |mut state| async move {
        loop {
            let line = match state.lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => return None,
                Err(e) => {
                    // The reader is unusable after an I/O error; end after reporting it.
                    debug!(error = %e, "replay input failed");
                    return None;
                }
            };
            state.line_no += 1;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            if state.started && !state.delay.is_zero() {
                tokio::time::sleep(state.delay).await;
            }
            state.started = true;
            let item = parse_record(trimmed, state.line_no);
            return Some((item, state));
        }
    })
    .boxed()
}

fn parse_record(line: &str, line_no: usize) -> Result<RawMessage, MapError> {
    let record: ReplayRecord = serde_json::from_str(line)
        .map_err(|e| MapError::MalformedEvent(format!("replay line {line_no}: {e}")))?;
    let payload = match record.payload {
        serde_json::Value::String(raw) => raw.into_bytes(),
        other => other.to_string().into_bytes(),
    };
    Ok(RawMessage {
        topic: record.topic,
        payload,
    })
}

// ────────────────────────────────────────────────────────────────────────────
// ChannelSource
// ────────────────────────────────────────────────────────────────────────────

/// Adapts an `mpsc` receiver fed by another task.
///
/// The stream can be opened once; it ends when every sender is dropped.
pub struct ChannelSource {
    receiver: Mutex<Option<mpsc::Receiver<RawMessage>>>,
}

impl ChannelSource {
    /// Create a source together with the sender that feeds it.
    pub fn channel(capacity: usize) -> (mpsc::Sender<RawMessage>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            tx,
            Self {
                receiver: Mutex::new(Some(rx)),
            },
        )
    }
}

#[async_trait]
impl MessageSource for ChannelSource {
    async fn message_stream(&self) -> Result<MessageStream, MapError> {
        let receiver = self
            .receiver
            .lock()
            .map_err(|_| MapError::Channel("channel source lock poisoned".to_string()))?
            .take()
            .ok_or_else(|| MapError::Channel("channel source already consumed".to_string()))?;
        Ok(stream::unfold(receiver, |mut rx| async move {
            rx.recv().await.map(|msg| (Ok(msg), rx))
        })
        .boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn collect(source: &dyn MessageSource) -> Vec<Result<RawMessage, MapError>> {
        source.message_stream().await.unwrap().collect().await
    }

    #[tokio::test]
    async fn replay_accepts_object_and_string_payloads() {
        let log = concat!(
            "{\"topic\":\"robot/position\",\"payload\":{\"x\":50,\"y\":50}}\n",
            "{\"topic\":\"sensors/recalculated\",\"payload\":\"{\\\"n\\\":1}\"}\n",
        );
        let items = collect(&ReplaySource::from_text(log)).await;
        assert_eq!(items.len(), 2);
        let first = items[0].as_ref().unwrap();
        assert_eq!(first.topic, "robot/position");
        let payload: serde_json::Value = serde_json::from_slice(&first.payload).unwrap();
        assert_eq!(payload["x"], 50);
        assert_eq!(items[1].as_ref().unwrap().payload, br#"{"n":1}"#.to_vec());
    }

    #[tokio::test]
    async fn replay_skips_blank_and_comment_lines() {
        let log = "\n# warm-up\n   \n{\"topic\":\"t\",\"payload\":{}}\n";
        let items = collect(&ReplaySource::from_text(log)).await;
        assert_eq!(items.len(), 1);
    }

    #[tokio::test]
    async fn replay_bad_line_does_not_end_stream() {
        let log = "not json\n{\"topic\":\"t\",\"payload\":{}}\n";
        let items = collect(&ReplaySource::from_text(log)).await;
        assert_eq!(items.len(), 2);
        match &items[0] {
            Err(MapError::MalformedEvent(msg)) => assert!(msg.contains("line 1"), "{msg}"),
            other => panic!("expected MalformedEvent, got {other:?}"),
        }
        assert!(items[1].is_ok());
    }

    #[tokio::test]
    async fn replay_missing_file_is_io_error() {
        let source = ReplaySource::from_path("/definitely/not/here.ndjson");
        let err = source.message_stream().await.err().unwrap();
        assert!(matches!(err, MapError::Io(_)));
    }

    #[tokio::test]
    async fn replay_delay_paces_messages() {
        let log = "{\"topic\":\"a\",\"payload\":{}}\n{\"topic\":\"b\",\"payload\":{}}\n";
        let source = ReplaySource::from_text(log).with_delay(Duration::from_millis(40));
        let start = std::time::Instant::now();
        let items = collect(&source).await;
        assert_eq!(items.len(), 2);
        // One gap between two messages; none before the first.
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn channel_source_streams_until_senders_drop() {
        let (tx, source) = ChannelSource::channel(4);
        tx.send(RawMessage::new("robot/position", br#"{"x":0,"y":0}"#.to_vec()))
            .await
            .unwrap();
        drop(tx);
        let items = collect(&source).await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].as_ref().unwrap().topic, "robot/position");
    }

    #[tokio::test]
    async fn channel_source_opens_once() {
        let (_tx, source) = ChannelSource::channel(1);
        assert!(source.message_stream().await.is_ok());
        let err = source.message_stream().await.err().unwrap();
        assert!(matches!(err, MapError::Channel(_)));
    }
}
