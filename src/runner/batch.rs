//! Batch execution: many independent runs, bounded by the worker count.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use super::config::BenchmarkConfig;
use super::dataset::BenchmarkCase;
use super::session::{RunSession, SessionOutcome};
use super::source::{EventSource, RunRequest};
use crate::capture::ContextExtractor;
use crate::error::ExportError;
use crate::evaluation::{EvaluationInput, EvaluationOutcome, EvaluationSuite};
use crate::export::{BatchLayout, ResultFormatter, ResultRow, RowInput};

/// Everything produced for one question.
#[derive(Debug, Clone)]
pub struct CaseResult {
    /// 1-based dataset index.
    pub index: usize,
    pub case: BenchmarkCase,
    pub session: SessionOutcome,
    pub evaluation: EvaluationOutcome,
}

/// Aggregate numbers for a finished batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub completed: usize,
    pub errored: usize,
    pub average_response_time_s: Option<f64>,
    /// Mean completeness on a 0-5 scale, over scored runs.
    pub average_completeness: Option<f64>,
    pub relevancy_distribution: BTreeMap<String, usize>,
}

impl BatchSummary {
    pub fn from_results(results: &[CaseResult]) -> Self {
        let total = results.len();
        let errored = results.iter().filter(|r| !r.session.is_success()).count();

        let average_response_time_s = mean(results.iter().map(|r| r.session.response_time_s));
        let average_completeness = mean(
            results
                .iter()
                .filter_map(|r| r.evaluation.scores.as_ref())
                .filter_map(|s| s.completeness.score),
        );

        let mut relevancy_distribution = BTreeMap::new();
        for rating in results
            .iter()
            .filter_map(|r| r.evaluation.scores.as_ref())
            .filter_map(|s| s.relevancy_rating.as_deref())
            .filter(|r| !r.is_empty())
        {
            *relevancy_distribution.entry(rating.to_string()).or_insert(0) += 1;
        }

        Self {
            total,
            completed: total - errored,
            errored,
            average_response_time_s,
            average_completeness,
            relevancy_distribution,
        }
    }

    /// Logs the summary at info level.
    pub fn log(&self) {
        info!(
            total = self.total,
            completed = self.completed,
            errored = self.errored,
            "Benchmark summary"
        );
        if let Some(avg) = self.average_response_time_s {
            info!("Average response time: {avg:.2}s");
        }
        if let Some(avg) = self.average_completeness {
            info!("Average completeness: {avg:.2}/5");
        }
        if !self.relevancy_distribution.is_empty() {
            info!(distribution = ?self.relevancy_distribution, "auto_rr distribution");
        }
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    (count > 0).then(|| sum / count as f64)
}

/// The rows and per-question results of a batch.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub layout: BatchLayout,
    pub rows: Vec<ResultRow>,
    pub results: Vec<CaseResult>,
    pub summary: BatchSummary,
}

/// Runs a list of benchmark cases against an event source.
pub struct BatchRunner {
    config: BenchmarkConfig,
    suite: EvaluationSuite,
}

impl BatchRunner {
    pub fn new(config: BenchmarkConfig) -> Self {
        Self {
            config,
            suite: EvaluationSuite::new(),
        }
    }

    pub fn with_suite(mut self, suite: EvaluationSuite) -> Self {
        self.suite = suite;
        self
    }

    pub fn config(&self) -> &BenchmarkConfig {
        &self.config
    }

    /// Runs every case and formats one row per case, in input order.
    ///
    /// Run failures never drop a row; only export errors are returned.
    pub async fn run(
        &self,
        source: &dyn EventSource,
        cases: Vec<(usize, BenchmarkCase)>,
    ) -> Result<BatchReport, ExportError> {
        let workers = self.config.workers.max(1);
        info!(
            cases = cases.len(),
            workers,
            timeout = self.config.agent_timeout,
            "Starting benchmark batch"
        );

        let session = RunSession::new(self.config.timeout())
            .with_extractor(ContextExtractor::new().with_max_generic_chars(self.config.max_context_chars));
        let semaphore = Arc::new(Semaphore::new(workers));

        let mut runs = Vec::with_capacity(cases.len());
        for (index, case) in cases {
            let sem = semaphore.clone();
            let session = &session;
            runs.push(async move {
                let _permit = sem.acquire().await.ok();
                self.run_case(session, source, index, case).await
            });
        }
        let results = futures::future::join_all(runs).await;

        let report = self.build_report(results)?;
        report.summary.log();
        Ok(report)
    }

    async fn run_case(
        &self,
        session: &RunSession,
        source: &dyn EventSource,
        index: usize,
        case: BenchmarkCase,
    ) -> CaseResult {
        let request = RunRequest::new(index, case.question.clone()).with_transcript(case.transcript.clone());
        let outcome = session.run(source, &request).await;

        let evaluation = if self.suite.is_empty() {
            EvaluationOutcome::default()
        } else {
            let input = EvaluationInput::from_record(
                index,
                &case.question,
                &case.expected_answer,
                case.requires_visualization,
                &outcome.record,
                self.config.max_context_chars,
            )
            .with_model(self.config.evaluation_model.as_str());
            let evaluation = self.suite.evaluate(&input).await;
            if !evaluation.errors.is_empty() {
                warn!(index, errors = %evaluation.error_text(), "Evaluation finished with errors");
            }
            evaluation
        };

        CaseResult {
            index,
            case,
            session: outcome,
            evaluation,
        }
    }

    /// Sizes the layout over the whole batch and formats the rows.
    pub fn build_report(&self, results: Vec<CaseResult>) -> Result<BatchReport, ExportError> {
        let layout = BatchLayout::for_records(
            results.iter().map(|r| &r.session.record),
            self.config.manual_review_auto_eval,
        );
        let formatter = ResultFormatter::new(layout.clone())
            .with_max_tool_output_bytes(self.config.max_tool_output_bytes)
            .with_max_context_chars(self.config.max_context_chars);

        let rows = results
            .iter()
            .map(|result| {
                let evaluation_error = result.evaluation.error_text();
                let input = RowInput {
                    index: result.index,
                    question: &result.case.question,
                    expected_answer: &result.case.expected_answer,
                    response_time_s: result.session.response_time_s,
                    scores: result.evaluation.scores.as_ref(),
                    evaluation_error: Some(evaluation_error.as_str()).filter(|e| !e.is_empty()),
                    agent_error: result.session.agent_error.as_deref(),
                };
                formatter.format(&input, &result.session.record)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let summary = BatchSummary::from_results(&results);
        Ok(BatchReport {
            layout,
            rows,
            results,
            summary,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::RawEvent;
    use crate::error::{EvaluationError, RunError};
    use crate::evaluation::{EvaluationScores, Evaluator, MetricScore};
    use crate::runner::source::EventStream;
    use async_trait::async_trait;
    use serde_json::json;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Emits one tool completion per unit of question index, then answers
    /// with the index.
    struct CountingSource {
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl CountingSource {
        fn new() -> Self {
            Self {
                active: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl EventSource for CountingSource {
        async fn stream_run(&self, request: &RunRequest) -> Result<EventStream, RunError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);

            let mut events = Vec::new();
            for n in 0..request.index {
                events.push(Ok(RawEvent::new("agent_thinking_step").with_metadata(
                    "tool_info",
                    json!({"id": format!("t{n}"), "name": "search", "output": "hit", "execution_time": 0.1}),
                )));
            }
            if request.question == "fail" {
                events.push(Err(RunError::Transport("dropped".to_string())));
            }
            events.push(Ok(RawEvent::new("final_response").with_content(format!("answer {}", request.index))));
            Ok(Box::pin(futures::stream::iter(events)))
        }
    }

    struct FixedScores;

    #[async_trait]
    impl Evaluator for FixedScores {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn evaluate(&self, input: &EvaluationInput) -> Result<EvaluationScores, EvaluationError> {
            if input.index == 2 {
                return Err(EvaluationError::Failed {
                    name: "fixed".to_string(),
                    message: "no score".to_string(),
                });
            }
            Ok(EvaluationScores {
                completeness: MetricScore::new(4.0, "ok"),
                relevancy_rating: Some("good".to_string()),
                ..Default::default()
            })
        }
    }

    /// Reports the model it was given as the completeness explanation.
    struct ModelEcho;

    #[async_trait]
    impl Evaluator for ModelEcho {
        fn name(&self) -> &str {
            "model-echo"
        }

        async fn evaluate(&self, input: &EvaluationInput) -> Result<EvaluationScores, EvaluationError> {
            Ok(EvaluationScores {
                completeness: MetricScore::new(3.0, input.model.clone()),
                ..Default::default()
            })
        }
    }

    fn case(question: &str) -> BenchmarkCase {
        BenchmarkCase {
            question: question.to_string(),
            expected_answer: "x".to_string(),
            requires_visualization: false,
            transcript: PathBuf::from("unused.jsonl"),
        }
    }

    #[tokio::test]
    async fn test_batch_preserves_order_and_bounds_workers() {
        let source = CountingSource::new();
        let runner = BatchRunner::new(BenchmarkConfig::new().with_workers(2));
        let cases = vec![(1, case("a")), (2, case("b")), (3, case("c")), (4, case("d"))];

        let report = runner.run(&source, cases).await.expect("batch should format");

        assert!(source.peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(report.layout.max_tools(), 4);
        let indices: Vec<_> = report.rows.iter().filter_map(|r| r.get("Index")).collect();
        assert_eq!(indices, vec!["1", "2", "3", "4"]);
        assert_eq!(report.rows[2].get("Answer"), Some("answer 3"));
        assert!(report.rows.iter().all(|r| r.columns().count() == report.layout.columns().len()));
    }

    #[tokio::test]
    async fn test_failed_run_still_produces_row() {
        let source = CountingSource::new();
        let runner = BatchRunner::new(BenchmarkConfig::new());
        let report = runner
            .run(&source, vec![(1, case("ok")), (2, case("fail"))])
            .await
            .expect("batch should format");

        assert_eq!(report.rows.len(), 2);
        assert_eq!(report.summary.total, 2);
        assert_eq!(report.summary.errored, 1);
        assert_eq!(report.summary.completed, 1);
        let agent_error = report.rows[1].get("agent_error").unwrap_or_default();
        assert!(agent_error.starts_with("RunTransportError: Transport error: dropped"));
        assert_eq!(report.rows[0].get("agent_error"), Some(""));
    }

    #[tokio::test]
    async fn test_evaluation_scores_and_summary() {
        let source = CountingSource::new();
        let suite = EvaluationSuite::new().with_evaluator(Arc::new(FixedScores));
        let runner = BatchRunner::new(BenchmarkConfig::new().with_workers(3)).with_suite(suite);
        let report = runner
            .run(&source, vec![(1, case("a")), (2, case("b")), (3, case("c"))])
            .await
            .expect("batch should format");

        assert_eq!(report.rows[0].get("geval_completeness"), Some("4"));
        assert_eq!(report.rows[0].get("auto_rr"), Some("good"));
        assert_eq!(
            report.rows[1].get("evaluation_error"),
            Some("Evaluator 'fixed' failed: no score")
        );
        assert_eq!(report.summary.average_completeness, Some(4.0));
        assert_eq!(report.summary.relevancy_distribution.get("good"), Some(&2));
        assert!(report.summary.average_response_time_s.is_some());
    }

    #[tokio::test]
    async fn test_evaluators_receive_configured_model() {
        let source = CountingSource::new();
        let suite = EvaluationSuite::new().with_evaluator(Arc::new(ModelEcho));
        let config = BenchmarkConfig::new().with_evaluation_model("judge-large");
        let report = BatchRunner::new(config)
            .with_suite(suite)
            .run(&source, vec![(1, case("a"))])
            .await
            .expect("batch should format");

        assert_eq!(report.rows[0].get("geval_completeness_explanation"), Some("judge-large"));
        let scores = report.results[0].evaluation.scores.as_ref().expect("scored");
        assert_eq!(scores.completeness.explanation, "judge-large");
    }

    #[test]
    fn test_summary_of_empty_batch() {
        let summary = BatchSummary::from_results(&[]);
        assert_eq!(summary.total, 0);
        assert!(summary.average_response_time_s.is_none());
        assert!(summary.average_completeness.is_none());
    }
}
