//! Error types for qna-bench operations.
//!
//! Defines error types for every subsystem of the capture pipeline:
//! - Event classification and tool-output decoding (recovered locally)
//! - Agent run failures (timeouts, transport errors)
//! - Result export (the only class allowed to propagate)
//! - Configuration and evaluation

use std::time::Duration;

use thiserror::Error;

/// Errors raised while interpreting a raw event.
///
/// These never leave the classifier: they are rendered into the
/// `Unrecognized` bucket so the event can still be audited.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ClassificationError {
    #[error("metadata.tool_info is not an object")]
    ToolInfoNotObject,

    #[error("tool_info.tool_calls is not a list")]
    ToolCallsNotList,

    #[error("malformed tool call at index {index}: {reason}")]
    MalformedToolCall { index: usize, reason: String },

    #[error("malformed tool completion: {0}")]
    MalformedCompletion(String),

    #[error("metadata.references is not a list")]
    ReferencesNotList,

    #[error("artifacts is not a list of objects")]
    MalformedArtifacts,

    #[error("no handler for event kind '{0}'")]
    UnhandledKind(String),
}

/// Errors raised while decoding a tool output into context items.
///
/// Extraction is best-effort: callers log these at debug level and move on.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ContextDecodeError {
    #[error("tool output is empty")]
    Empty,

    #[error("no decoder accepted the tool output: {0}")]
    Undecodable(String),

    #[error("decoded output has unexpected shape: expected {expected}")]
    UnexpectedShape { expected: &'static str },
}

/// Positioned error from the permissive literal decoder.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("literal parse error at byte {position}: {message}")]
pub struct LiteralError {
    pub position: usize,
    pub message: String,
}

impl LiteralError {
    pub fn new(position: usize, message: impl Into<String>) -> Self {
        Self {
            position,
            message: message.into(),
        }
    }
}

/// Errors that end an agent run early.
///
/// The run session catches these at the consumption boundary and still
/// finalizes the recorder, so partial data is always surfaced.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RunError {
    #[error("Agent run timed out after {} seconds", .0.as_secs_f64())]
    Timeout(Duration),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Event source error: {0}")]
    Source(String),
}

impl RunError {
    /// Coarse category used in error details and reports.
    pub fn error_type(&self) -> &'static str {
        let message = self.to_string().to_lowercase();
        if matches!(self, RunError::Timeout(_))
            || message.contains("timeout")
            || message.contains("timed out")
        {
            "TIMEOUT"
        } else {
            "SDK_ERROR"
        }
    }

    /// Stable class name, analogous to an exception class name.
    pub fn class_name(&self) -> &'static str {
        match self {
            RunError::Timeout(_) => "RunTimeoutError",
            RunError::Transport(_) => "RunTransportError",
            RunError::Source(_) => "RunSourceError",
        }
    }
}

/// Errors that can occur during export operations.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Row {index} has {tools} tool executions but the batch layout allows {max_tools}")]
    LayoutMismatch {
        index: usize,
        tools: usize,
        max_tools: usize,
    },

    #[error("Column '{0}' is not part of the batch layout")]
    UnknownColumn(String),

    #[error("No rows to export")]
    NoRows,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Errors reported by evaluators.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EvaluationError {
    #[error("Evaluator '{name}' failed: {message}")]
    Failed { name: String, message: String },
}

/// Errors that can occur while loading a benchmark dataset.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("Failed to read dataset '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid dataset entry on line {line}: {message}")]
    InvalidEntry { line: usize, message: String },

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Dataset is empty")]
    Empty,
}
