//! qna-bench: capture and export of Q&A agent benchmark runs.
//!
//! An agent run arrives as a stream of loosely structured events. This
//! library classifies those events, accumulates them into a [`RunRecord`],
//! extracts retrieved context from tool outputs and formats each run as one
//! flat result row with a batch-wide column layout.

pub mod capture;
pub mod cli;
pub mod error;
pub mod evaluation;
pub mod export;
pub mod runner;
pub mod utils;

pub use capture::{RawEvent, RunRecord, RunRecorder};
pub use error::{
    ClassificationError, ConfigError, ContextDecodeError, DatasetError, EvaluationError, ExportError,
    LiteralError, RunError,
};
