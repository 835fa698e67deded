//! Event sources: where the raw events of an agent run come from.

use std::path::{Path, PathBuf};
use std::pin::Pin;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::wrappers::LinesStream;
use tracing::{debug, warn};

use crate::capture::RawEvent;
use crate::error::RunError;

/// Stream of raw events for one run.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<RawEvent, RunError>> + Send>>;

/// Transcript line that simulates a transport failure.
pub const ERROR_MARKER: &str = "__error__";

/// Transcript line that makes the source hang forever.
pub const STALL_MARKER: &str = "__stall__";

/// A request for one agent run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRequest {
    /// 1-based question index.
    pub index: usize,
    pub question: String,
    /// Recorded events for this run, when replaying.
    pub transcript: Option<PathBuf>,
}

impl RunRequest {
    pub fn new(index: usize, question: impl Into<String>) -> Self {
        Self {
            index,
            question: question.into(),
            transcript: None,
        }
    }

    pub fn with_transcript(mut self, path: impl Into<PathBuf>) -> Self {
        self.transcript = Some(path.into());
        self
    }
}

/// Something that can start an agent run and stream its events.
///
/// The stream ends when the run is done. An `Err` item ends the run early.
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn stream_run(&self, request: &RunRequest) -> Result<EventStream, RunError>;
}

/// Replays runs from JSON Lines transcripts, one raw event per line.
#[derive(Debug, Clone, Default)]
pub struct ReplayClient;

impl ReplayClient {
    pub fn new() -> Self {
        Self
    }
}

/// What one transcript line means to the replay.
#[derive(Debug, Clone, PartialEq)]
pub enum TranscriptLine {
    Event(RawEvent),
    Error(String),
    Stall,
    Skip,
}

/// Parses one transcript line. Blank lines are skipped; lines that are not
/// JSON objects are kept as events so the classifier can flag them.
pub fn parse_transcript_line(line: &str) -> TranscriptLine {
    let line = line.trim();
    if line.is_empty() {
        return TranscriptLine::Skip;
    }

    let value: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "Transcript line is not valid JSON, keeping as raw text");
            Value::String(line.to_string())
        }
    };

    if let Some(object) = value.as_object() {
        if let Some(message) = object.get(ERROR_MARKER) {
            let message = match message {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            return TranscriptLine::Error(message);
        }
        if object.get(STALL_MARKER).and_then(Value::as_bool) == Some(true) {
            return TranscriptLine::Stall;
        }
    }
    TranscriptLine::Event(RawEvent::from_value(value))
}

async fn open_transcript(path: &Path) -> Result<tokio::fs::File, RunError> {
    tokio::fs::File::open(path)
        .await
        .map_err(|e| RunError::Source(format!("cannot open transcript '{}': {e}", path.display())))
}

#[async_trait]
impl EventSource for ReplayClient {
    async fn stream_run(&self, request: &RunRequest) -> Result<EventStream, RunError> {
        let path = request
            .transcript
            .clone()
            .ok_or_else(|| RunError::Source(format!("question {} has no transcript", request.index)))?;
        let file = open_transcript(&path).await?;
        debug!(index = request.index, path = %path.display(), "Replaying transcript");

        let out = async_stream::try_stream! {
            let mut lines = LinesStream::new(BufReader::new(file).lines());
            while let Some(line) = lines.next().await {
                let line = line.map_err(|e| RunError::Transport(format!("transcript read failed: {e}")))?;
                match parse_transcript_line(&line) {
                    TranscriptLine::Event(event) => {
                        yield event;
                    }
                    TranscriptLine::Error(message) => {
                        Err::<(), _>(RunError::Transport(message))?;
                    }
                    TranscriptLine::Stall => {
                        futures::future::pending::<()>().await;
                    }
                    TranscriptLine::Skip => {}
                }
            }
        };
        Ok(Box::pin(out))
    }
}

/// Serves a fixed list of stream items, for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    items: Vec<Result<RawEvent, RunError>>,
}

impl StaticSource {
    pub fn new(items: Vec<Result<RawEvent, RunError>>) -> Self {
        Self { items }
    }

    pub fn from_events(events: Vec<RawEvent>) -> Self {
        Self::new(events.into_iter().map(Ok).collect())
    }
}

#[async_trait]
impl EventSource for StaticSource {
    async fn stream_run(&self, _request: &RunRequest) -> Result<EventStream, RunError> {
        Ok(Box::pin(futures::stream::iter(self.items.clone())))
    }
}
