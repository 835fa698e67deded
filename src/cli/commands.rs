//! CLI command definitions for qna-bench.
//!
//! `run` replays a dataset of recorded agent runs through the capture
//! pipeline and writes one result row per question. `inspect` shows the
//! run record captured from a single transcript.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use crate::evaluation::{ArtifactValidationMetric, EvaluationSuite, RecordedScoresEvaluator};
use crate::export::{write_rows, write_run_record};
use crate::runner::{
    load_dataset, parse_row_indices, select_cases, timeout_from_secs, BatchRunner, BenchmarkConfig, ReplayClient,
    RunRequest, RunSession,
};

/// Q&A agent benchmark harness.
#[derive(Parser)]
#[command(name = "qna-bench")]
#[command(about = "Capture agent runs and export Q&A benchmark results")]
#[command(version)]
#[command(
    long_about = "qna-bench replays recorded agent event streams, captures thinking steps, tool calls, retrieved context and the final answer, and exports one row per question.\n\nExample usage:\n  qna-bench run --dataset ./bench.yaml --workers 4 --output ./results.csv"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run a benchmark dataset and export result rows as CSV.
    Run(RunArgs),

    /// Capture a single transcript and print its run record.
    Inspect(InspectArgs),
}

/// Arguments for `qna-bench run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Dataset file (.yaml/.yml or .jsonl). Falls back to `input_file` in the config.
    #[arg(short = 'd', long, env = "QNA_BENCH_DATASET")]
    pub dataset: Option<PathBuf>,

    /// Result file. Defaults to a timestamped name.
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,

    /// YAML configuration file.
    #[arg(short = 'c', long, env = "QNA_BENCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Number of concurrent runs.
    #[arg(short = 'w', long, env = "QNA_BENCH_WORKERS")]
    pub workers: Option<usize>,

    /// Seconds before a run is aborted.
    #[arg(short = 't', long, env = "QNA_BENCH_AGENT_TIMEOUT")]
    pub timeout: Option<f64>,

    /// Process at most this many questions.
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,

    /// Rows to process, e.g. "1,3-5,10" (1-based).
    #[arg(short = 'r', long)]
    pub rows: Option<String>,

    /// Only process questions whose text matches one of these exactly.
    #[arg(short = 'q', long, num_args = 1..)]
    pub questions: Vec<String>,

    /// JSON file with precomputed scores, a list ordered by question index.
    #[arg(long)]
    pub scores: Option<PathBuf>,

    /// Emit the detailed manual review columns.
    #[arg(long)]
    pub manual_review_auto_eval: bool,

    /// Model id handed to evaluators.
    #[arg(long, env = "QNA_BENCH_EVALUATION_MODEL")]
    pub evaluation_model: Option<String>,

    /// Directory to save each run record as JSON.
    #[arg(long)]
    pub save_records: Option<PathBuf>,

    /// Print the summary as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for `qna-bench inspect`.
#[derive(Parser, Debug)]
pub struct InspectArgs {
    /// JSONL transcript of raw events.
    pub transcript: PathBuf,

    /// Seconds before the replay is aborted.
    #[arg(short = 't', long, default_value = "600")]
    pub timeout: f64,

    /// Also write the record to this file.
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,
}

/// Parse command-line arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Parse arguments and run the selected command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with already parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => run_benchmark_command(args).await,
        Commands::Inspect(args) => run_inspect_command(args).await,
    }
}

/// Merges the config file (if any) with command-line overrides.
fn resolve_config(args: &RunArgs) -> anyhow::Result<BenchmarkConfig> {
    let mut config = match &args.config {
        Some(path) => BenchmarkConfig::from_yaml_file(path)?,
        None => BenchmarkConfig::default(),
    };

    if let Some(workers) = args.workers {
        config = config.with_workers(workers);
    }
    if let Some(timeout) = args.timeout {
        config.agent_timeout = timeout;
    }
    if let Some(limit) = args.limit {
        config = config.with_limit(limit);
    }
    if let Some(rows) = &args.rows {
        config = config.with_row_indices(rows.clone());
    }
    if !args.questions.is_empty() {
        config = config.with_questions(args.questions.clone());
    }
    if args.manual_review_auto_eval {
        config = config.with_manual_review_auto_eval(true);
    }
    if let Some(model) = &args.evaluation_model {
        config = config.with_evaluation_model(model.clone());
    }
    if let Some(dataset) = &args.dataset {
        config = config.with_input_file(dataset.clone());
    }
    if let Some(output) = &args.output {
        config = config.with_output_file(output.clone());
    }

    config.validate()?;
    Ok(config)
}

async fn build_suite(scores: Option<&Path>) -> anyhow::Result<EvaluationSuite> {
    let mut suite = EvaluationSuite::new();
    if let Some(path) = scores {
        let recorded = RecordedScoresEvaluator::load(path).await?;
        info!(path = %path.display(), entries = recorded.len(), "Loaded recorded scores");
        suite = suite.with_evaluator(Arc::new(recorded));
    }
    Ok(suite.with_evaluator(Arc::new(ArtifactValidationMetric)))
}

async fn run_benchmark_command(args: RunArgs) -> anyhow::Result<()> {
    let config = resolve_config(&args)?;
    let dataset = config
        .input_file
        .clone()
        .ok_or_else(|| anyhow::anyhow!("No dataset given; pass --dataset or set input_file in the config"))?;

    let cases = load_dataset(&dataset)?;
    let rows = match config.row_indices.as_deref() {
        Some(selection) => match parse_row_indices(selection, cases.len()) {
            Some(rows) => Some(rows),
            None => anyhow::bail!("No valid row indices in '{selection}'"),
        },
        None => None,
    };
    let selected = select_cases(cases, rows.as_deref(), &config.questions, config.limit);
    if selected.is_empty() {
        warn!("No questions selected");
        return Ok(());
    }
    info!(
        questions = selected.len(),
        model = %config.evaluation_model,
        "Running benchmark"
    );

    let suite = build_suite(args.scores.as_deref()).await?;
    let runner = BatchRunner::new(config.clone()).with_suite(suite);
    let report = runner.run(&ReplayClient::new(), selected).await?;

    let output = config.output_path();
    write_rows(&output, &report.rows, &report.layout).await?;

    if let Some(dir) = &args.save_records {
        for result in &report.results {
            let path = dir.join(format!("run_{:03}.json", result.index));
            write_run_record(&path, &result.session.record).await?;
        }
        info!(dir = %dir.display(), records = report.results.len(), "Run records saved");
    }

    if args.json {
        let summary = serde_json::json!({
            "status": "success",
            "output": output.display().to_string(),
            "summary": report.summary,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        let summary = &report.summary;
        println!("Benchmark summary");
        println!("  Total questions: {}", summary.total);
        println!("  Completed: {}", summary.completed);
        println!("  Errored: {}", summary.errored);
        if let Some(avg) = summary.average_response_time_s {
            println!("  Average response time: {avg:.2}s");
        }
        if let Some(avg) = summary.average_completeness {
            println!("  Average completeness: {avg:.2}/5");
        }
        if !summary.relevancy_distribution.is_empty() {
            println!("  auto_rr distribution:");
            for (rating, count) in &summary.relevancy_distribution {
                println!("    {rating}: {count}");
            }
        }
        println!("  Results saved to {}", output.display());
    }
    Ok(())
}

async fn run_inspect_command(args: InspectArgs) -> anyhow::Result<()> {
    let session = RunSession::new(timeout_from_secs("--timeout", args.timeout)?);
    let request = RunRequest::new(1, String::new()).with_transcript(args.transcript.clone());
    let outcome = session.run(&ReplayClient::new(), &request).await;

    if let Some(message) = &outcome.agent_error {
        warn!(error = %message, "Transcript replay ended with an error");
    }
    if let Some(path) = &args.output {
        write_run_record(path, &outcome.record).await?;
    }
    println!("{}", serde_json::to_string_pretty(&outcome.record)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use std::time::Duration;

    #[test]
    fn test_cli_parses() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_command_defaults() {
        let cli = Cli::try_parse_from(["qna-bench", "run", "-d", "bench.yaml"]).expect("should parse");
        assert_eq!(cli.log_level, "info");
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.dataset, Some(PathBuf::from("bench.yaml")));
                assert!(args.output.is_none());
                assert!(!args.manual_review_auto_eval);
                assert!(!args.json);
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_run_overrides_config() {
        let cli = Cli::try_parse_from([
            "qna-bench",
            "run",
            "-d",
            "bench.jsonl",
            "-w",
            "4",
            "-t",
            "30",
            "--rows",
            "1,3-5",
            "--questions",
            "Which region?",
            "Top product?",
            "--manual-review-auto-eval",
            "--log-level",
            "debug",
        ])
        .expect("should parse");
        assert_eq!(cli.log_level, "debug");

        let Commands::Run(args) = cli.command else {
            panic!("Expected Run command");
        };
        let config = resolve_config(&args).expect("config should resolve");
        assert_eq!(config.workers, 4);
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(config.row_indices.as_deref(), Some("1,3-5"));
        assert_eq!(config.questions, vec!["Which region?", "Top product?"]);
        assert!(config.manual_review_auto_eval);
        assert_eq!(config.input_file, Some(PathBuf::from("bench.jsonl")));
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let cli = Cli::try_parse_from(["qna-bench", "run", "-w", "0"]).expect("should parse");
        let Commands::Run(args) = cli.command else {
            panic!("Expected Run command");
        };
        assert!(resolve_config(&args).is_err());
    }

    #[tokio::test]
    async fn test_inspect_rejects_unusable_timeouts() {
        for timeout in ["--timeout=1e20", "--timeout=-5", "--timeout=0"] {
            let cli = Cli::try_parse_from(["qna-bench", "inspect", "run.jsonl", timeout])
                .expect("should parse");
            let Commands::Inspect(args) = cli.command else {
                panic!("Expected Inspect command");
            };
            let err = run_inspect_command(args).await.expect_err("timeout should be rejected");
            assert!(err.to_string().contains("--timeout"), "unexpected error: {err}");
        }
    }

    #[test]
    fn test_huge_run_timeout_is_rejected() {
        let cli = Cli::try_parse_from(["qna-bench", "run", "-t", "1e20"]).expect("should parse");
        let Commands::Run(args) = cli.command else {
            panic!("Expected Run command");
        };
        assert!(resolve_config(&args).is_err());
    }

    #[test]
    fn test_inspect_command() {
        let cli = Cli::try_parse_from(["qna-bench", "inspect", "run.jsonl"]).expect("should parse");
        match cli.command {
            Commands::Inspect(args) => {
                assert_eq!(args.transcript, PathBuf::from("run.jsonl"));
                assert_eq!(args.timeout, 600.0);
            }
            _ => panic!("Expected Inspect command"),
        }
    }
}
