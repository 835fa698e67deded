//! Event classification.
//!
//! Maps one [`RawEvent`] to the semantic buckets it carries. An event can
//! land in several buckets at once: an `agent_thinking_step` announcing a
//! tool call is both a thinking step and a tool-call start, and a
//! `final_response` usually carries references next to its text.
//!
//! Classification never fails. Decode problems are collected in
//! [`Classification::errors`], and an event that yields no bucket at all is
//! reported as [`EventBucket::Unrecognized`].

use serde_json::{Map, Value};

use super::types::RawEvent;
use crate::error::ClassificationError;

/// The `metadata.kind` of an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    AgentThinkingStep,
    FinalAgentThinkingStep,
    Thinking,
    Reasoning,
    Token,
    Text,
    FinalResponse,
    Completed,
    Other(String),
}

impl EventKind {
    pub fn from_label(label: &str) -> Self {
        match label {
            "agent_thinking_step" => EventKind::AgentThinkingStep,
            "final_agent_thinking_step" => EventKind::FinalAgentThinkingStep,
            "thinking" => EventKind::Thinking,
            "reasoning" => EventKind::Reasoning,
            "token" => EventKind::Token,
            "text" => EventKind::Text,
            "final_response" => EventKind::FinalResponse,
            "completed" => EventKind::Completed,
            other => EventKind::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            EventKind::AgentThinkingStep => "agent_thinking_step",
            EventKind::FinalAgentThinkingStep => "final_agent_thinking_step",
            EventKind::Thinking => "thinking",
            EventKind::Reasoning => "reasoning",
            EventKind::Token => "token",
            EventKind::Text => "text",
            EventKind::FinalResponse => "final_response",
            EventKind::Completed => "completed",
            EventKind::Other(label) => label,
        }
    }

    fn is_thinking(&self) -> bool {
        matches!(
            self,
            EventKind::AgentThinkingStep
                | EventKind::FinalAgentThinkingStep
                | EventKind::Thinking
                | EventKind::Reasoning
        )
    }

    fn is_token(&self) -> bool {
        matches!(self, EventKind::Token | EventKind::Text)
    }

    fn is_final(&self) -> bool {
        matches!(self, EventKind::FinalResponse | EventKind::Completed)
    }
}

/// Step coordinates taken from event metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepContext {
    pub step_id: Option<String>,
    pub agent_name: Option<String>,
    pub previous_step_ids: Vec<String>,
}

impl StepContext {
    fn from_metadata(metadata: &Map<String, Value>) -> Self {
        Self {
            step_id: metadata.get("step_id").and_then(id_string),
            agent_name: metadata
                .get("agent_name")
                .and_then(Value::as_str)
                .map(str::to_string),
            previous_step_ids: metadata
                .get("previous_step_ids")
                .and_then(Value::as_array)
                .map(|ids| ids.iter().filter_map(id_string).collect())
                .unwrap_or_default(),
        }
    }
}

/// A thinking step and any delegation it announces.
#[derive(Debug, Clone, PartialEq)]
pub struct ThinkingPayload {
    pub content: String,
    pub kind: String,
    pub step: StepContext,
    pub delegating_to: Vec<String>,
    pub delegation_queries: Vec<String>,
}

/// A tool call announced by the agent.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub id: Option<String>,
    pub name: String,
    pub args: Value,
}

/// A tool call that returned.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCompletion {
    pub id: Option<String>,
    pub name: String,
    pub args: Value,
    pub output: Value,
    /// Seconds, as reported by the agent.
    pub execution_time: Option<f64>,
}

/// One entry of `metadata.references`, with its position in the list.
#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    pub index: usize,
    pub id: String,
    pub title: String,
    pub source: String,
    pub content: String,
}

/// One entry of the event's `artifacts` list.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactPayload {
    pub artifact_id: String,
    pub name: String,
    pub file_name: String,
    pub content_type: String,
    pub mime_type: String,
    pub file_uri: String,
    pub has_file_data: bool,
}

/// A semantic bucket an event was classified into.
#[derive(Debug, Clone, PartialEq)]
pub enum EventBucket {
    Thinking(ThinkingPayload),
    ToolCallStart {
        calls: Vec<ToolCall>,
        step: StepContext,
    },
    ToolCallEnd {
        completion: ToolCompletion,
        step: StepContext,
    },
    Reference(Vec<Reference>),
    ResponseToken(String),
    ResponseFinal {
        content: Option<String>,
        total_usage: Option<Value>,
    },
    Artifact(Vec<ArtifactPayload>),
    Unrecognized {
        kind: String,
        reason: String,
    },
}

impl EventBucket {
    /// Short label recorded in the audit log.
    pub fn label(&self) -> &'static str {
        match self {
            EventBucket::Thinking(_) => "thinking",
            EventBucket::ToolCallStart { .. } => "tool_call_start",
            EventBucket::ToolCallEnd { .. } => "tool_call_end",
            EventBucket::Reference(_) => "reference",
            EventBucket::ResponseToken(_) => "response_token",
            EventBucket::ResponseFinal { .. } => "response_final",
            EventBucket::Artifact(_) => "artifact",
            EventBucket::Unrecognized { .. } => "unrecognized",
        }
    }
}

/// Result of classifying one event.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    /// Never empty.
    pub buckets: Vec<EventBucket>,
    pub errors: Vec<ClassificationError>,
}

impl Classification {
    pub fn labels(&self) -> Vec<String> {
        self.buckets.iter().map(|b| b.label().to_string()).collect()
    }

    pub fn is_unrecognized(&self) -> bool {
        matches!(self.buckets.as_slice(), [EventBucket::Unrecognized { .. }])
    }
}

/// Classifies an event into its buckets.
pub fn classify(event: &RawEvent) -> Classification {
    let kind = EventKind::from_label(event.kind_label());
    let mut buckets = Vec::new();
    let mut errors = Vec::new();

    if let Some(thinking) = thinking_bucket(event, &kind) {
        buckets.push(thinking);
    }

    match tool_bucket(event, &kind, &mut errors) {
        Ok(Some(bucket)) => buckets.push(bucket),
        Ok(None) => {}
        Err(e) => errors.push(e),
    }

    if kind == EventKind::FinalResponse {
        match reference_bucket(&event.metadata) {
            Ok(Some(bucket)) => buckets.push(bucket),
            Ok(None) => {}
            Err(e) => errors.push(e),
        }
    }

    if kind.is_token() {
        if let Some(token) = event.text() {
            buckets.push(EventBucket::ResponseToken(token.to_string()));
        }
    }

    if kind.is_final() {
        buckets.push(final_bucket(event));
    }

    match artifact_bucket(&event.artifacts) {
        Ok(Some(bucket)) => buckets.push(bucket),
        Ok(None) => {}
        Err(e) => errors.push(e),
    }

    if buckets.is_empty() {
        let reason = errors
            .first()
            .cloned()
            .unwrap_or_else(|| ClassificationError::UnhandledKind(kind.as_str().to_string()));
        buckets.push(EventBucket::Unrecognized {
            kind: kind.as_str().to_string(),
            reason: reason.to_string(),
        });
    }

    Classification { buckets, errors }
}

fn thinking_bucket(event: &RawEvent, kind: &EventKind) -> Option<EventBucket> {
    if !kind.is_thinking() {
        return None;
    }
    let content = event.text()?;

    let (delegating_to, delegation_queries) = delegation_targets(&event.metadata);

    Some(EventBucket::Thinking(ThinkingPayload {
        content: content.to_string(),
        kind: kind.as_str().to_string(),
        step: StepContext::from_metadata(&event.metadata),
        delegating_to,
        delegation_queries,
    }))
}

/// Delegation calls announced in an activity step.
///
/// Only steps whose `thinking_and_activity_info.data_type` is `activity`
/// count; their `tool_info.tool_calls` named `delegate_to*` hand work to a
/// sub-agent.
fn delegation_targets(metadata: &Map<String, Value>) -> (Vec<String>, Vec<String>) {
    let is_activity = metadata
        .get("thinking_and_activity_info")
        .and_then(|info| info.get("data_type"))
        .and_then(Value::as_str)
        == Some("activity");
    if !is_activity {
        return (Vec::new(), Vec::new());
    }

    let mut targets = Vec::new();
    let mut queries = Vec::new();
    for call in metadata
        .get("tool_info")
        .and_then(|info| info.get("tool_calls"))
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_object)
    {
        let Some(name) = call.get("name").and_then(Value::as_str) else {
            continue;
        };
        if name.contains("delegate_to") {
            targets.push(name.to_string());
            queries.push(
                call.get("args")
                    .and_then(|args| args.get("query"))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            );
        }
    }
    (targets, queries)
}

fn tool_bucket(
    event: &RawEvent,
    kind: &EventKind,
    errors: &mut Vec<ClassificationError>,
) -> Result<Option<EventBucket>, ClassificationError> {
    if *kind != EventKind::AgentThinkingStep {
        return Ok(None);
    }
    let tool_info = match event.metadata.get("tool_info") {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Object(info)) if info.is_empty() => return Ok(None),
        Some(Value::Object(info)) => info,
        Some(_) => return Err(ClassificationError::ToolInfoNotObject),
    };
    let step = StepContext::from_metadata(&event.metadata);

    if let Some(calls) = tool_info.get("tool_calls") {
        let calls = calls.as_array().ok_or(ClassificationError::ToolCallsNotList)?;
        let mut parsed = Vec::with_capacity(calls.len());
        for (index, call) in calls.iter().enumerate() {
            match parse_tool_call(index, call) {
                Ok(call) => parsed.push(call),
                Err(e) => errors.push(e),
            }
        }
        if parsed.is_empty() {
            return Ok(None);
        }
        return Ok(Some(EventBucket::ToolCallStart {
            calls: parsed,
            step,
        }));
    }

    if tool_info.contains_key("name") && tool_info.contains_key("output") {
        let completion = parse_completion(tool_info)?;
        return Ok(Some(EventBucket::ToolCallEnd { completion, step }));
    }

    Ok(None)
}

fn parse_tool_call(index: usize, call: &Value) -> Result<ToolCall, ClassificationError> {
    let call = call
        .as_object()
        .ok_or_else(|| ClassificationError::MalformedToolCall {
            index,
            reason: "not an object".to_string(),
        })?;
    let name = match call.get("name") {
        None | Some(Value::Null) => "unknown".to_string(),
        Some(Value::String(name)) => name.clone(),
        Some(_) => {
            return Err(ClassificationError::MalformedToolCall {
                index,
                reason: "name is not a string".to_string(),
            })
        }
    };
    Ok(ToolCall {
        id: call.get("id").and_then(id_string),
        name,
        args: call
            .get("args")
            .cloned()
            .filter(|args| !args.is_null())
            .unwrap_or_else(|| Value::Object(Map::new())),
    })
}

fn parse_completion(info: &Map<String, Value>) -> Result<ToolCompletion, ClassificationError> {
    let name = info
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| ClassificationError::MalformedCompletion("name is not a string".to_string()))?;
    let execution_time = match info.get("execution_time") {
        None | Some(Value::Null) => None,
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => {
            return Err(ClassificationError::MalformedCompletion(
                "execution_time is not a number".to_string(),
            ))
        }
    };
    Ok(ToolCompletion {
        id: info.get("id").and_then(id_string),
        name: name.to_string(),
        args: info
            .get("args")
            .cloned()
            .filter(|args| !args.is_null())
            .unwrap_or_else(|| Value::Object(Map::new())),
        output: info.get("output").cloned().unwrap_or(Value::Null),
        execution_time: execution_time.filter(|t| t.is_finite()).map(|t| t.max(0.0)),
    })
}

fn reference_bucket(metadata: &Map<String, Value>) -> Result<Option<EventBucket>, ClassificationError> {
    let references = match metadata.get("references") {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Array(refs)) => refs,
        Some(_) => return Err(ClassificationError::ReferencesNotList),
    };

    let parsed: Vec<Reference> = references
        .iter()
        .enumerate()
        .filter_map(|(index, reference)| {
            let reference = reference.as_object()?;
            let field = |key: &str| reference.get(key).and_then(id_string).unwrap_or_default();
            Some(Reference {
                index,
                id: field("id"),
                title: field("title"),
                source: field("source"),
                content: field("content"),
            })
        })
        .collect();

    if parsed.is_empty() {
        Ok(None)
    } else {
        Ok(Some(EventBucket::Reference(parsed)))
    }
}

fn final_bucket(event: &RawEvent) -> EventBucket {
    let content = event
        .text()
        .or_else(|| event.output.as_deref().filter(|s| !s.is_empty()))
        .map(str::to_string);
    let total_usage = event
        .metadata
        .get("total_usage")
        .or_else(|| event.metadata.get("usage"))
        .filter(|usage| usage.as_object().is_some_and(|u| !u.is_empty()))
        .cloned();
    EventBucket::ResponseFinal {
        content,
        total_usage,
    }
}

fn artifact_bucket(artifacts: &[Value]) -> Result<Option<EventBucket>, ClassificationError> {
    if artifacts.is_empty() {
        return Ok(None);
    }

    let mut parsed = Vec::with_capacity(artifacts.len());
    for artifact in artifacts {
        let artifact = artifact
            .as_object()
            .ok_or(ClassificationError::MalformedArtifacts)?;
        let field = |key: &str| artifact.get(key).and_then(id_string).unwrap_or_default();
        parsed.push(ArtifactPayload {
            artifact_id: field("artifact_id"),
            name: field("name"),
            file_name: field("file_name"),
            content_type: field("content_type"),
            mime_type: field("mime_type"),
            file_uri: field("file_uri"),
            has_file_data: artifact
                .get("has_file_data")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        });
    }
    Ok(Some(EventBucket::Artifact(parsed)))
}

/// Identifier-like scalar as a string: strings verbatim, numbers formatted.
fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
