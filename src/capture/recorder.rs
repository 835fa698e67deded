//! Run recorder for capturing one agent run.
//!
//! The [`RunRecorder`] accumulates classified events in arrival order and
//! produces a [`RunRecord`] snapshot on [`RunRecorder::finalize`].
//!
//! # Lifecycle
//!
//! A recorder starts out accepting events. The first call to `finalize`
//! freezes the end time; later calls return an identical snapshot and any
//! event offered after that is logged and dropped. A run that ends in an
//! error calls [`RunRecorder::record_error`] before finalizing so the
//! snapshot carries the failure next to whatever was captured.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use super::classifier::{classify, EventBucket, StepContext, ThinkingPayload, ToolCall, ToolCompletion};
use super::extractor::ContextExtractor;
use super::types::{
    source_separator, Artifact, ContextItem, ErrorDetails, ExecutionMetadata, RawEvent,
    RawEventRecord, RunRecord, ThinkingStep, ToolExecution, ToolStatus,
};
use crate::error::RunError;

/// Number of most recent tool names kept in error details.
const LAST_TOOLS_IN_ERROR: usize = 5;

/// Maximum length of the error message kept in error details.
const MAX_ERROR_MESSAGE_CHARS: usize = 500;

/// Accumulates the events of one agent run.
pub struct RunRecorder {
    run_id: Uuid,
    started: Instant,
    extractor: ContextExtractor,

    thinking_steps: Vec<ThinkingStep>,
    tool_executions: Vec<ToolExecution>,
    /// Latest record per tool id, in first-seen order.
    tool_panels: Vec<ToolExecution>,
    /// Ids handed to calls that arrived without one.
    synthetic_ids: usize,
    /// Synthetic ids of id-less starts still waiting for a completion.
    open_synthetic: VecDeque<String>,
    retrieved_context: Vec<ContextItem>,
    sources: Vec<String>,
    artifacts: Vec<Artifact>,
    raw_events: Vec<RawEventRecord>,
    response_tokens: Vec<String>,
    final_response: Option<String>,
    total_usage: Option<Value>,
    unrecognized_events: usize,

    error_details: Option<ErrorDetails>,
    finished: Option<(Duration, DateTime<Utc>)>,
}

impl Default for RunRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl RunRecorder {
    /// Creates an empty recorder; the run clock starts now.
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started: Instant::now(),
            extractor: ContextExtractor::default(),
            thinking_steps: Vec::new(),
            tool_executions: Vec::new(),
            tool_panels: Vec::new(),
            synthetic_ids: 0,
            open_synthetic: VecDeque::new(),
            retrieved_context: Vec::new(),
            sources: Vec::new(),
            artifacts: Vec::new(),
            raw_events: Vec::new(),
            response_tokens: Vec::new(),
            final_response: None,
            total_usage: None,
            unrecognized_events: 0,
            error_details: None,
            finished: None,
        }
    }

    /// Replaces the context extractor.
    pub fn with_extractor(mut self, extractor: ContextExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn is_finalized(&self) -> bool {
        self.finished.is_some()
    }

    pub fn elapsed(&self) -> Duration {
        match self.finished {
            Some((elapsed, _)) => elapsed,
            None => self.started.elapsed(),
        }
    }

    pub fn raw_event_count(&self) -> usize {
        self.raw_events.len()
    }

    pub fn tool_executions(&self) -> &[ToolExecution] {
        &self.tool_executions
    }

    pub fn thinking_steps(&self) -> &[ThinkingStep] {
        &self.thinking_steps
    }

    /// Classifies an event and records everything it carries.
    ///
    /// Every accepted event is appended to the audit log, including
    /// unrecognized ones.
    pub fn accept(&mut self, event: RawEvent) {
        if self.is_finalized() {
            warn!(
                run_id = %self.run_id,
                kind = event.kind_label(),
                "Event received after finalize, dropping"
            );
            return;
        }

        let timestamp = Utc::now();
        let relative_time_seconds = self.started.elapsed().as_secs_f64();
        let classification = classify(&event);

        for error in &classification.errors {
            debug!(run_id = %self.run_id, error = %error, "Event decode problem");
        }

        self.raw_events.push(RawEventRecord {
            timestamp,
            relative_time_seconds,
            buckets: classification.labels(),
            errors: classification.errors.iter().map(|e| e.to_string()).collect(),
            event: event.to_value(),
        });

        for bucket in classification.buckets {
            self.apply(bucket, timestamp, relative_time_seconds);
        }
    }

    fn apply(&mut self, bucket: EventBucket, timestamp: DateTime<Utc>, relative_time_seconds: f64) {
        match bucket {
            EventBucket::Thinking(payload) => {
                self.record_thinking(payload, timestamp, relative_time_seconds)
            }
            EventBucket::ToolCallStart { calls, step } => {
                for call in calls {
                    self.record_call_start(call, &step, timestamp);
                }
            }
            EventBucket::ToolCallEnd { completion, step } => {
                self.record_completion(completion, &step, timestamp)
            }
            EventBucket::Reference(references) => {
                for reference in references {
                    if !reference.content.is_empty() {
                        let mut header = format!("[Reference {}]", reference.index + 1);
                        if !reference.title.is_empty() {
                            header.push(' ');
                            header.push_str(&reference.title);
                        }
                        if !reference.source.is_empty() {
                            header.push_str(" from ");
                            header.push_str(&reference.source);
                        }
                        let source = format!("{header}\n{}", reference.content);
                        if !self.sources.contains(&source) {
                            self.sources.push(source);
                        }
                    }
                    self.retrieved_context
                        .push(ContextItem::FinalResponseReference {
                            reference_index: reference.index,
                            id: reference.id,
                            title: reference.title,
                            source: reference.source,
                            content: reference.content,
                        });
                }
            }
            EventBucket::ResponseToken(token) => self.response_tokens.push(token),
            EventBucket::ResponseFinal {
                content,
                total_usage,
            } => {
                if content.is_some() {
                    self.final_response = content;
                }
                if total_usage.is_some() {
                    self.total_usage = total_usage;
                }
            }
            EventBucket::Artifact(artifacts) => {
                self.artifacts.extend(artifacts.into_iter().map(|a| Artifact {
                    artifact_id: a.artifact_id,
                    name: a.name,
                    file_name: a.file_name,
                    content_type: a.content_type,
                    mime_type: a.mime_type,
                    file_uri: a.file_uri,
                    has_file_data: a.has_file_data,
                    timestamp,
                }));
            }
            EventBucket::Unrecognized { kind, reason } => {
                debug!(run_id = %self.run_id, kind = %kind, reason = %reason, "Unrecognized event");
                self.unrecognized_events += 1;
            }
        }
    }

    fn record_thinking(&mut self, payload: ThinkingPayload, timestamp: DateTime<Utc>, relative_time_seconds: f64) {
        self.thinking_steps.push(ThinkingStep {
            timestamp,
            content: payload.content,
            kind: payload.kind,
            relative_time_seconds,
            step_id: payload.step.step_id,
            agent_name: payload.step.agent_name,
            is_delegation: !payload.delegating_to.is_empty(),
            delegating_to: payload.delegating_to,
            delegation_queries: payload.delegation_queries,
        });
    }

    fn record_call_start(&mut self, call: ToolCall, step: &StepContext, timestamp: DateTime<Utc>) {
        let tool_id = match call.id {
            Some(id) => id,
            None => {
                let id = self.next_synthetic_id();
                self.open_synthetic.push_back(id.clone());
                id
            }
        };
        let execution = ToolExecution {
            tool_name: call.name,
            arguments: call.args,
            output: Value::String(String::new()),
            status: ToolStatus::DelegationStart,
            duration_ms: 0,
            step_id: step.step_id.clone().unwrap_or_else(|| tool_id.clone()),
            tool_id,
            agent_name: step.agent_name.clone().unwrap_or_default(),
            previous_step_ids: step.previous_step_ids.clone(),
            timestamp,
        };
        self.upsert_panel(execution.clone());
        self.tool_executions.push(execution);
    }

    fn record_completion(&mut self, completion: ToolCompletion, step: &StepContext, timestamp: DateTime<Utc>) {
        // An id-less completion closes the oldest id-less start.
        let tool_id = match completion.id {
            Some(id) => id,
            None => match self.open_synthetic.pop_front() {
                Some(id) => id,
                None => self.next_synthetic_id(),
            },
        };

        // Completions often omit the arguments; fall back to the call-start.
        let arguments = if is_empty_args(&completion.args) {
            self.tool_panels
                .iter()
                .find(|panel| panel.tool_id == tool_id)
                .map(|panel| panel.arguments.clone())
                .unwrap_or(completion.args)
        } else {
            completion.args
        };

        let status = if completion.name.contains("delegate_to_") {
            ToolStatus::DelegationComplete
        } else {
            ToolStatus::Finished
        };

        let execution = ToolExecution {
            tool_name: completion.name,
            arguments,
            output: completion.output,
            status,
            duration_ms: completion
                .execution_time
                .map(|secs| (secs * 1000.0).round() as u64)
                .unwrap_or(0),
            step_id: step.step_id.clone().unwrap_or_else(|| tool_id.clone()),
            tool_id,
            agent_name: step.agent_name.clone().unwrap_or_default(),
            previous_step_ids: step.previous_step_ids.clone(),
            timestamp,
        };

        let context_step = StepContext {
            step_id: Some(execution.step_id.clone()),
            agent_name: Some(execution.agent_name.clone()),
            previous_step_ids: Vec::new(),
        };
        let items = self.extractor.extract(
            &execution.tool_name,
            &execution.output,
            &execution.arguments,
            &context_step,
        );
        self.retrieved_context.extend(items);

        self.upsert_panel(execution.clone());
        self.tool_executions.push(execution);
    }

    fn next_synthetic_id(&mut self) -> String {
        let id = format!("tool_{}", self.synthetic_ids);
        self.synthetic_ids += 1;
        id
    }

    fn upsert_panel(&mut self, execution: ToolExecution) {
        match self
            .tool_panels
            .iter_mut()
            .find(|panel| panel.tool_id == execution.tool_id)
        {
            Some(panel) => *panel = execution,
            None => self.tool_panels.push(execution),
        }
    }

    /// Records a run failure.
    ///
    /// # Arguments
    ///
    /// * `error` - The error that ended the run
    /// * `timeout` - Configured run timeout, reported for timeouts
    pub fn record_error(&mut self, error: &RunError, timeout: Option<Duration>) {
        if self.is_finalized() {
            warn!(run_id = %self.run_id, error = %error, "Error recorded after finalize, ignoring");
            return;
        }

        let is_timeout = error.error_type() == "TIMEOUT";
        let timeout_seconds = match error {
            RunError::Timeout(limit) => Some(limit.as_secs_f64()),
            _ if is_timeout => timeout.map(|t| t.as_secs_f64()),
            _ => None,
        };

        let last_start = self.tool_executions.len().saturating_sub(LAST_TOOLS_IN_ERROR);
        self.error_details = Some(ErrorDetails {
            error_type: error.error_type().to_string(),
            error_class: error.class_name().to_string(),
            error_message: crate::utils::preview(&error.to_string(), MAX_ERROR_MESSAGE_CHARS),
            timeout_seconds,
            actual_duration: self.started.elapsed().as_secs_f64(),
            tools_executed: self.tool_executions.len(),
            last_tools: self.tool_executions[last_start..]
                .iter()
                .map(|t| t.tool_name.clone())
                .collect(),
            thinking_steps: self.thinking_steps.len(),
            raw_events_count: self.raw_events.len(),
        });
    }

    /// Produces the run snapshot.
    ///
    /// The end time is frozen on the first call, so repeated calls return
    /// equal records. Accumulated lists are never modified here.
    pub fn finalize(&mut self) -> RunRecord {
        let (elapsed, finished_at) = *self
            .finished
            .get_or_insert_with(|| (self.started.elapsed(), Utc::now()));

        let final_response = match &self.final_response {
            Some(response) => response.clone(),
            None => self.response_tokens.concat(),
        };

        let mut tool_executions = self.tool_executions.clone();
        let has_completion = tool_executions.iter().any(|t| t.status.is_completion());
        if !has_completion {
            // Calls that started but never returned.
            tool_executions.extend(
                self.tool_panels
                    .iter()
                    .filter(|panel| panel.status == ToolStatus::DelegationStart)
                    .map(|panel| ToolExecution {
                        status: ToolStatus::Failed,
                        ..panel.clone()
                    }),
            );
        }

        let execution_metadata = ExecutionMetadata {
            duration_s: elapsed.as_secs_f64(),
            finished_at,
            total_events: self.raw_events.len(),
            unrecognized_events: self.unrecognized_events,
            thinking_steps_count: self.thinking_steps.len(),
            tool_executions_count: tool_executions.len(),
            retrieved_context_count: self.retrieved_context.len(),
            sources_count: self.sources.len(),
            artifacts_count: self.artifacts.len(),
        };

        RunRecord {
            run_id: self.run_id,
            final_response,
            thinking_steps: self.thinking_steps.clone(),
            tool_executions,
            retrieved_context: self.retrieved_context.clone(),
            sources: self.sources.clone(),
            artifacts: self.artifacts.clone(),
            raw_events: self.raw_events.clone(),
            total_usage: self.total_usage.clone(),
            execution_metadata,
            error_occurred: self.error_details.is_some(),
            error_details: self.error_details.clone(),
        }
    }

    /// Sources captured so far, joined by the source separator.
    pub fn formatted_sources(&self) -> String {
        self.sources.join(&source_separator())
    }
}

fn is_empty_args(args: &Value) -> bool {
    match args {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Builds an `agent_error` message for a failed run, embedding the error
/// details as JSON debug info.
pub fn agent_error_message(error: &RunError, details: Option<&ErrorDetails>) -> String {
    let debug_info = details
        .and_then(|d| serde_json::to_value(d).ok())
        .unwrap_or_else(|| Value::Object(Map::new()));
    format!("{}: {}. Debug info: {}", error.class_name(), error, debug_info)
}
