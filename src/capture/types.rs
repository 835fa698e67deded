//! Data types for agent run capture.
//!
//! These types describe what the recorder keeps for one agent run: the raw
//! event envelope as received, the semantic records derived from it, and the
//! [`RunRecord`] snapshot produced at finalize time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// One event as emitted by the external agent service.
///
/// The envelope is deliberately loose: only `content`, `output`,
/// `metadata` and `artifacts` are interpreted; any other top-level field is
/// kept in `extra` so the audit log can reproduce the event verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    /// Text payload, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Alternate payload field used by some completion events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,

    /// Free-form metadata; `metadata.kind` drives classification.
    #[serde(default)]
    pub metadata: Map<String, Value>,

    /// Out-of-band file references attached to the event.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<Value>,

    /// Any other top-level fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RawEvent {
    /// Creates an event with the given `metadata.kind`.
    pub fn new(kind: &str) -> Self {
        let mut metadata = Map::new();
        metadata.insert("kind".to_string(), Value::String(kind.to_string()));
        Self {
            metadata,
            ..Default::default()
        }
    }

    /// Sets the text content.
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Inserts a metadata entry.
    pub fn with_metadata(mut self, key: &str, value: Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    /// Appends an artifact entry.
    pub fn with_artifact(mut self, artifact: Value) -> Self {
        self.artifacts.push(artifact);
        self
    }

    /// Builds an event from an arbitrary JSON value without failing.
    ///
    /// Fields with unexpected types are coerced where meaningful (a numeric
    /// `content` becomes its text) and otherwise moved into `extra`, where
    /// the classifier will not interpret them. A non-object value becomes an
    /// empty event carrying the original under `extra["value"]`.
    pub fn from_value(value: Value) -> Self {
        let mut object = match value {
            Value::Object(object) => object,
            other => {
                let mut extra = Map::new();
                extra.insert("value".to_string(), other);
                return Self {
                    extra,
                    ..Default::default()
                };
            }
        };

        let mut event = Self::default();

        match object.remove("content") {
            Some(Value::String(s)) => event.content = Some(s),
            Some(Value::Null) | None => {}
            Some(Value::Number(n)) => event.content = Some(n.to_string()),
            Some(other) => {
                event.extra.insert("content".to_string(), other);
            }
        }

        match object.remove("output") {
            Some(Value::String(s)) => event.output = Some(s),
            Some(Value::Null) | None => {}
            Some(other) => {
                event.extra.insert("output".to_string(), other);
            }
        }

        match object.remove("metadata") {
            Some(Value::Object(metadata)) => event.metadata = metadata,
            Some(Value::Null) | None => {}
            Some(other) => {
                event.extra.insert("metadata".to_string(), other);
            }
        }

        match object.remove("artifacts") {
            Some(Value::Array(artifacts)) => event.artifacts = artifacts,
            Some(Value::Null) | None => {}
            Some(other) => {
                event.extra.insert("artifacts".to_string(), other);
            }
        }

        event.extra.extend(object);
        event
    }

    /// Reassembles the event as a JSON object for the audit log.
    pub fn to_value(&self) -> Value {
        let mut object = self.extra.clone();
        if let Some(content) = &self.content {
            object.insert("content".to_string(), Value::String(content.clone()));
        }
        if let Some(output) = &self.output {
            object.insert("output".to_string(), Value::String(output.clone()));
        }
        object.insert("metadata".to_string(), Value::Object(self.metadata.clone()));
        if !self.artifacts.is_empty() {
            object.insert("artifacts".to_string(), Value::Array(self.artifacts.clone()));
        }
        Value::Object(object)
    }

    /// The `metadata.kind` label, or an empty string.
    pub fn kind_label(&self) -> &str {
        self.metadata
            .get("kind")
            .and_then(Value::as_str)
            .unwrap_or("")
    }

    /// Returns the text content when present and non-empty.
    pub fn text(&self) -> Option<&str> {
        self.content.as_deref().filter(|s| !s.is_empty())
    }
}

/// A reasoning step emitted by the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThinkingStep {
    pub timestamp: DateTime<Utc>,
    pub content: String,
    pub kind: String,
    pub relative_time_seconds: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
    #[serde(default)]
    pub is_delegation: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub delegating_to: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub delegation_queries: Vec<String>,
}

/// Lifecycle phase a tool execution record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    /// Call issued, no output yet.
    DelegationStart,
    /// A `delegate_to_*` call returned.
    DelegationComplete,
    /// A regular tool call returned.
    Finished,
    /// The call never completed.
    Failed,
}

impl ToolStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolStatus::DelegationStart => "delegation_start",
            ToolStatus::DelegationComplete => "delegation_complete",
            ToolStatus::Finished => "finished",
            ToolStatus::Failed => "failed",
        }
    }

    /// True for records that close a call.
    pub fn is_completion(&self) -> bool {
        !matches!(self, ToolStatus::DelegationStart)
    }
}

impl std::fmt::Display for ToolStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One tool execution record. A call typically yields two records sharing a
/// `tool_id`: one at call-start and one at completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolExecution {
    pub tool_name: String,
    pub arguments: Value,
    /// Raw output as received; a string for most tools.
    pub output: Value,
    pub status: ToolStatus,
    pub duration_ms: u64,
    pub step_id: String,
    pub tool_id: String,
    pub agent_name: String,
    #[serde(default)]
    pub previous_step_ids: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl ToolExecution {
    /// The output rendered as text: strings verbatim, anything else as JSON.
    pub fn output_text(&self) -> String {
        value_text(&self.output)
    }

    /// True if this call hands work to another agent.
    pub fn is_delegation(&self) -> bool {
        self.tool_name.contains("delegate_to_")
    }
}

/// Structured data decoded from a tool output or a final-response reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContextItem {
    /// One chunk returned by a vector/search/retrieval tool.
    VectorChunk {
        tool_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        chunk_id: Option<String>,
        content: String,
        step_id: String,
        agent_name: String,
    },

    /// Rows returned by a SQL/query tool. An empty `results` list is kept:
    /// the query ran and matched nothing.
    ToolOutputSqlResult {
        tool_name: String,
        query: String,
        results: Vec<Value>,
        original_rows: usize,
        original_cols: usize,
        step_id: String,
        agent_name: String,
    },

    /// Decodable output of a retrieval tool that is not a chunk list.
    ToolOutputGeneric {
        tool_name: String,
        content: String,
        step_id: String,
        agent_name: String,
    },

    /// A reference attached to the final response.
    FinalResponseReference {
        reference_index: usize,
        id: String,
        title: String,
        source: String,
        content: String,
    },
}

impl ContextItem {
    /// The `type` tag as serialized.
    pub fn type_name(&self) -> &'static str {
        match self {
            ContextItem::VectorChunk { .. } => "vector_chunk",
            ContextItem::ToolOutputSqlResult { .. } => "tool_output_sql_result",
            ContextItem::ToolOutputGeneric { .. } => "tool_output_generic",
            ContextItem::FinalResponseReference { .. } => "final_response_reference",
        }
    }

    /// Step that produced this item; references have none.
    pub fn step_id(&self) -> Option<&str> {
        match self {
            ContextItem::VectorChunk { step_id, .. }
            | ContextItem::ToolOutputSqlResult { step_id, .. }
            | ContextItem::ToolOutputGeneric { step_id, .. } => Some(step_id),
            ContextItem::FinalResponseReference { .. } => None,
        }
    }

    /// Tool that produced this item; references have none.
    pub fn tool_name(&self) -> Option<&str> {
        match self {
            ContextItem::VectorChunk { tool_name, .. }
            | ContextItem::ToolOutputSqlResult { tool_name, .. }
            | ContextItem::ToolOutputGeneric { tool_name, .. } => Some(tool_name),
            ContextItem::FinalResponseReference { .. } => None,
        }
    }
}

/// A file generated during the run (e.g. a chart from a sandbox tool).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub artifact_id: String,
    pub name: String,
    pub file_name: String,
    pub content_type: String,
    pub mime_type: String,
    pub file_uri: String,
    #[serde(default)]
    pub has_file_data: bool,
    pub timestamp: DateTime<Utc>,
}

/// Audit entry for one received event, kept whatever its classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEventRecord {
    pub timestamp: DateTime<Utc>,
    pub relative_time_seconds: f64,
    /// Bucket labels the event was classified into.
    pub buckets: Vec<String>,
    /// Decode problems hit while classifying.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    pub event: Value,
}

/// Counts and timing computed at finalize time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionMetadata {
    pub duration_s: f64,
    pub finished_at: DateTime<Utc>,
    pub total_events: usize,
    pub unrecognized_events: usize,
    pub thinking_steps_count: usize,
    pub tool_executions_count: usize,
    pub retrieved_context_count: usize,
    pub sources_count: usize,
    pub artifacts_count: usize,
}

/// Structured description of a failed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetails {
    /// `TIMEOUT` or `SDK_ERROR`.
    pub error_type: String,
    pub error_class: String,
    pub error_message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<f64>,
    pub actual_duration: f64,
    pub tools_executed: usize,
    pub last_tools: Vec<String>,
    pub thinking_steps: usize,
    pub raw_events_count: usize,
}

/// Snapshot of everything captured for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: Uuid,
    pub final_response: String,
    pub thinking_steps: Vec<ThinkingStep>,
    pub tool_executions: Vec<ToolExecution>,
    pub retrieved_context: Vec<ContextItem>,
    pub sources: Vec<String>,
    pub artifacts: Vec<Artifact>,
    pub raw_events: Vec<RawEventRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_usage: Option<Value>,
    pub execution_metadata: ExecutionMetadata,
    pub error_occurred: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_details: Option<ErrorDetails>,
}

/// Separator placed between formatted source blocks.
pub fn source_separator() -> String {
    format!("\n\n{}\n", "=".repeat(50))
}

impl RunRecord {
    /// All sources joined by the source separator.
    pub fn formatted_sources(&self) -> String {
        self.sources.join(&source_separator())
    }

    /// Thinking step contents joined by blank lines.
    pub fn thinking_text(&self) -> String {
        self.thinking_steps
            .iter()
            .map(|step| step.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Context items produced by the given tool execution.
    pub fn context_for<'a>(&'a self, tool: &'a ToolExecution) -> impl Iterator<Item = &'a ContextItem> {
        self.retrieved_context.iter().filter(move |item| {
            item.step_id() == Some(tool.step_id.as_str())
                && item.tool_name() == Some(tool.tool_name.as_str())
        })
    }
}

/// Renders a JSON value as display text: strings verbatim, `null` empty,
/// everything else as compact JSON.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
