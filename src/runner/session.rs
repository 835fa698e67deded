//! One agent run: stream events into a recorder under a timeout.

use std::time::{Duration, Instant};

use futures::StreamExt;
use tracing::{error, info, warn};

use super::source::{EventSource, RunRequest};
use crate::capture::{agent_error_message, ContextExtractor, RunRecord, RunRecorder};
use crate::error::RunError;

/// Result of one run. A record is always present, even on failure.
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub record: RunRecord,
    /// Wall time of the run in seconds.
    pub response_time_s: f64,
    /// `agent_error` column text when the run failed.
    pub agent_error: Option<String>,
    pub error: Option<RunError>,
}

impl SessionOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Runs agent sessions with a fixed timeout.
#[derive(Debug, Clone)]
pub struct RunSession {
    timeout: Duration,
    extractor: ContextExtractor,
}

impl RunSession {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            extractor: ContextExtractor::default(),
        }
    }

    pub fn with_extractor(mut self, extractor: ContextExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Executes one run.
    ///
    /// Events are accepted until the stream ends, yields an error, or the
    /// timeout elapses. The recorder is finalized in every case.
    pub async fn run(&self, source: &dyn EventSource, request: &RunRequest) -> SessionOutcome {
        let mut recorder = RunRecorder::new().with_extractor(self.extractor.clone());
        let started = Instant::now();
        info!(index = request.index, run_id = %recorder.run_id(), "Starting agent run");

        let result = match tokio::time::timeout(self.timeout, consume(source, request, &mut recorder)).await {
            Ok(result) => result,
            Err(_) => Err(RunError::Timeout(self.timeout)),
        };
        let response_time_s = started.elapsed().as_secs_f64();

        if let Err(e) = &result {
            recorder.record_error(e, Some(self.timeout));
        }
        let record = recorder.finalize();

        match result {
            Ok(()) => {
                info!(
                    index = request.index,
                    seconds = format!("{response_time_s:.2}"),
                    tools = record.tool_executions.len(),
                    "Agent run completed"
                );
                SessionOutcome {
                    record,
                    response_time_s,
                    agent_error: None,
                    error: None,
                }
            }
            Err(e) => {
                if matches!(e, RunError::Timeout(_)) {
                    warn!(index = request.index, timeout = self.timeout.as_secs_f64(), "Agent run timed out");
                } else {
                    error!(index = request.index, error = %e, "Agent run failed");
                }
                let agent_error = agent_error_message(&e, record.error_details.as_ref());
                SessionOutcome {
                    record,
                    response_time_s,
                    agent_error: Some(agent_error),
                    error: Some(e),
                }
            }
        }
    }
}

async fn consume(source: &dyn EventSource, request: &RunRequest, recorder: &mut RunRecorder) -> Result<(), RunError> {
    let mut stream = source.stream_run(request).await?;
    while let Some(item) = stream.next().await {
        recorder.accept(item?);
    }
    Ok(())
}
