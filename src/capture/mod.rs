//! Agent run capture.
//!
//! This module turns the event stream of one agent run into a [`RunRecord`]:
//!
//! - [`classifier`] maps each raw event to the semantic buckets it carries
//! - [`extractor`] decodes retrieval and SQL tool outputs into context items
//! - [`recorder`] accumulates buckets in arrival order and finalizes the run
//!
//! # Example
//!
//! ```
//! use qna_bench::capture::{RawEvent, RunRecorder};
//!
//! let mut recorder = RunRecorder::new();
//! recorder.accept(RawEvent::new("token").with_content("Hello"));
//! let record = recorder.finalize();
//! assert_eq!(record.final_response, "Hello");
//! ```

pub mod classifier;
pub mod extractor;
pub mod recorder;
pub mod types;

pub use classifier::{classify, Classification, EventBucket, EventKind, StepContext};
pub use extractor::{sql_query, ContextExtractor, ToolFamily};
pub use recorder::{agent_error_message, RunRecorder};
pub use types::{
    source_separator, value_text, Artifact, ContextItem, ErrorDetails, ExecutionMetadata, RawEvent,
    RawEventRecord, RunRecord, ThinkingStep, ToolExecution, ToolStatus,
};
