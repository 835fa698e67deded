//! Benchmark runner.
//!
//! Drives agent runs from an [`EventSource`], records each one with a fresh
//! recorder and turns the batch into result rows.
//!
//! ```text
//! dataset -> BatchRunner -> RunSession (timeout) -> RunRecorder -> ResultFormatter
//! ```
//!
//! Runs are independent; the only shared state is the read-only
//! [`BenchmarkConfig`]. Concurrency is bounded by `workers`.

pub mod batch;
pub mod config;
pub mod dataset;
pub mod session;
pub mod source;

pub use batch::{BatchReport, BatchRunner, BatchSummary, CaseResult};
pub use config::{timeout_from_secs, BenchmarkConfig};
pub use dataset::{load_dataset, parse_row_indices, select_cases, BenchmarkCase};
pub use session::{RunSession, SessionOutcome};
pub use source::{parse_transcript_line, EventSource, EventStream, ReplayClient, RunRequest, StaticSource, TranscriptLine};
