//! Command-line interface for qna-bench.
//!
//! Provides the `run` and `inspect` commands.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
