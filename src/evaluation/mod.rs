//! Evaluation of captured runs.
//!
//! Scoring itself is delegated to external evaluators behind the
//! [`Evaluator`] trait. This module defines the score model, the input
//! handed to evaluators, and [`EvaluationSuite`], which runs several
//! evaluators over one run and merges their results.

pub mod artifact;
pub mod recorded;

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::capture::{ContextItem, RunRecord};
use crate::error::EvaluationError;
use crate::export::table::markdown_table;

pub use artifact::ArtifactValidationMetric;
pub use recorded::RecordedScoresEvaluator;

/// Score and explanation of one metric.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricScore {
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub explanation: String,
}

impl MetricScore {
    pub fn new(score: f64, explanation: impl Into<String>) -> Self {
        Self {
            score: Some(score),
            explanation: explanation.into(),
        }
    }
}

/// Scores for one run. Every field is optional so partial results from
/// several evaluators can be merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationScores {
    #[serde(default)]
    pub completeness: MetricScore,
    #[serde(default)]
    pub groundedness: MetricScore,
    #[serde(default)]
    pub redundancy: MetricScore,
    #[serde(default)]
    pub language_consistency: MetricScore,
    #[serde(default)]
    pub refusal_alignment: MetricScore,
    /// Overall relevancy rating, exported as `auto_rr`.
    #[serde(default, alias = "auto_rr", deserialize_with = "relevancy_rating")]
    pub relevancy_rating: Option<String>,
    #[serde(default)]
    pub possible_issues: Vec<String>,
}

/// Accepts a rating given as a string or a number.
fn relevancy_rating<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

impl EvaluationScores {
    /// The five generation metrics with their column stems.
    pub fn metrics(&self) -> [(&'static str, &MetricScore); 5] {
        [
            ("completeness", &self.completeness),
            ("groundedness", &self.groundedness),
            ("redundancy", &self.redundancy),
            ("language_consistency", &self.language_consistency),
            ("refusal_alignment", &self.refusal_alignment),
        ]
    }

    /// Folds `other` into `self`: scores already set are kept, issues are
    /// appended without duplicates.
    pub fn merge(&mut self, other: EvaluationScores) {
        fn take(slot: &mut MetricScore, other: MetricScore) {
            if slot.score.is_none() && other.score.is_some() {
                *slot = other;
            }
        }
        take(&mut self.completeness, other.completeness);
        take(&mut self.groundedness, other.groundedness);
        take(&mut self.redundancy, other.redundancy);
        take(&mut self.language_consistency, other.language_consistency);
        take(&mut self.refusal_alignment, other.refusal_alignment);
        if self.relevancy_rating.is_none() {
            self.relevancy_rating = other.relevancy_rating;
        }
        for issue in other.possible_issues {
            if !self.possible_issues.contains(&issue) {
                self.possible_issues.push(issue);
            }
        }
    }
}

/// Everything an evaluator sees about one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationInput {
    /// 1-based position of the question in the dataset.
    pub index: usize,
    pub query: String,
    pub expected_response: String,
    pub generated_response: String,
    /// Retrieved context flattened to text.
    pub retrieved_context: String,
    pub requires_visualization: bool,
    pub artifact_count: usize,
    /// Model id the evaluator should score with.
    #[serde(default)]
    pub model: String,
}

impl EvaluationInput {
    /// Builds the evaluator input for a finished run.
    ///
    /// # Arguments
    ///
    /// * `index` - 1-based question index
    /// * `query` - The question asked
    /// * `expected_response` - Reference answer
    /// * `requires_visualization` - Whether the question expects a chart
    /// * `record` - The captured run
    /// * `max_context_chars` - Character budget for the flattened context
    pub fn from_record(
        index: usize,
        query: &str,
        expected_response: &str,
        requires_visualization: bool,
        record: &RunRecord,
        max_context_chars: usize,
    ) -> Self {
        Self {
            index,
            query: query.to_string(),
            expected_response: expected_response.to_string(),
            generated_response: record.final_response.clone(),
            retrieved_context: crate::utils::preview(
                &context_to_text(&record.retrieved_context),
                max_context_chars,
            ),
            requires_visualization,
            artifact_count: record.artifacts.len(),
            model: String::new(),
        }
    }

    /// Sets the evaluation model id.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

/// Flattens context items to the plain text scorers read.
///
/// SQL results become `SQL Results:` followed by a table; empty result sets
/// are left out. Chunk, generic and reference contents are used verbatim.
pub fn context_to_text(items: &[ContextItem]) -> String {
    items
        .iter()
        .filter_map(|item| match item {
            ContextItem::ToolOutputSqlResult { results, .. } => {
                if results.is_empty() {
                    return None;
                }
                let body = match markdown_table(results, usize::MAX, usize::MAX) {
                    Some(table) => table.text,
                    None => serde_json::to_string(results).unwrap_or_default(),
                };
                Some(format!("SQL Results:\n{body}"))
            }
            ContextItem::VectorChunk { content, .. }
            | ContextItem::ToolOutputGeneric { content, .. }
            | ContextItem::FinalResponseReference { content, .. } => {
                Some(content.clone()).filter(|c| !c.is_empty())
            }
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// A scorer for one run.
#[async_trait]
pub trait Evaluator: Send + Sync {
    /// Name used in logs and error messages.
    fn name(&self) -> &str;

    /// Scores one run.
    async fn evaluate(&self, input: &EvaluationInput) -> Result<EvaluationScores, EvaluationError>;
}

/// Runs a set of evaluators and merges their scores.
#[derive(Clone, Default)]
pub struct EvaluationSuite {
    evaluators: Vec<Arc<dyn Evaluator>>,
}

/// Merged scores plus the failures of individual evaluators.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluationOutcome {
    pub scores: Option<EvaluationScores>,
    pub errors: Vec<EvaluationError>,
}

impl EvaluationOutcome {
    /// All evaluator errors joined for the `evaluation_error` column.
    pub fn error_text(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl EvaluationSuite {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an evaluator; earlier evaluators win when scores overlap.
    pub fn with_evaluator(mut self, evaluator: Arc<dyn Evaluator>) -> Self {
        self.evaluators.push(evaluator);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.evaluators.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.evaluators.iter().map(|e| e.name().to_string()).collect()
    }

    /// Runs every evaluator in order. Failures are collected, never raised.
    pub async fn evaluate(&self, input: &EvaluationInput) -> EvaluationOutcome {
        let mut outcome = EvaluationOutcome::default();

        for evaluator in &self.evaluators {
            let started = Instant::now();
            match evaluator.evaluate(input).await {
                Ok(scores) => {
                    debug!(
                        evaluator = evaluator.name(),
                        index = input.index,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Evaluation completed"
                    );
                    outcome.scores.get_or_insert_with(EvaluationScores::default).merge(scores);
                }
                Err(e) => {
                    warn!(
                        evaluator = evaluator.name(),
                        index = input.index,
                        error = %e,
                        "Evaluation failed"
                    );
                    outcome.errors.push(e);
                }
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct FixedEvaluator(EvaluationScores);

    #[async_trait]
    impl Evaluator for FixedEvaluator {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn evaluate(&self, _input: &EvaluationInput) -> Result<EvaluationScores, EvaluationError> {
            Ok(self.0.clone())
        }
    }

    struct FailingEvaluator;

    #[async_trait]
    impl Evaluator for FailingEvaluator {
        fn name(&self) -> &str {
            "failing"
        }

        async fn evaluate(&self, _input: &EvaluationInput) -> Result<EvaluationScores, EvaluationError> {
            Err(EvaluationError::Failed {
                name: "failing".to_string(),
                message: "rate limited".to_string(),
            })
        }
    }

    fn input() -> EvaluationInput {
        EvaluationInput {
            index: 1,
            query: "q".to_string(),
            expected_response: "e".to_string(),
            generated_response: "g".to_string(),
            retrieved_context: String::new(),
            requires_visualization: false,
            artifact_count: 0,
            model: "gpt-4o-mini".to_string(),
        }
    }

    #[test]
    fn test_scores_deserialize_from_recorded_shape() {
        let scores: EvaluationScores = serde_json::from_value(json!({
            "completeness": {"score": 3, "explanation": "covers all"},
            "relevancy_rating": "good",
            "possible_issues": ["Missing units"]
        }))
        .expect("scores should deserialize");
        assert_eq!(scores.completeness, MetricScore::new(3.0, "covers all"));
        assert_eq!(scores.groundedness.score, None);
        assert_eq!(scores.relevancy_rating.as_deref(), Some("good"));
    }

    #[test]
    fn test_context_to_text() {
        let items = vec![
            ContextItem::ToolOutputSqlResult {
                tool_name: "sql_tool".to_string(),
                query: String::new(),
                results: vec![json!({"n": 1})],
                original_rows: 1,
                original_cols: 1,
                step_id: "s1".to_string(),
                agent_name: String::new(),
            },
            ContextItem::ToolOutputSqlResult {
                tool_name: "sql_tool".to_string(),
                query: String::new(),
                results: vec![],
                original_rows: 0,
                original_cols: 0,
                step_id: "s2".to_string(),
                agent_name: String::new(),
            },
            ContextItem::VectorChunk {
                tool_name: "vector_search".to_string(),
                chunk_id: None,
                content: "chunk text".to_string(),
                step_id: "s3".to_string(),
                agent_name: String::new(),
            },
        ];
        assert_eq!(
            context_to_text(&items),
            "SQL Results:\n| n |\n| --- |\n| 1 |\n\nchunk text"
        );
    }

    #[tokio::test]
    async fn test_suite_merges_and_collects_errors() {
        let mut first = EvaluationScores::default();
        first.completeness = MetricScore::new(2.0, "partial");
        first.possible_issues = vec!["A".to_string()];
        let mut second = EvaluationScores::default();
        second.completeness = MetricScore::new(5.0, "ignored");
        second.groundedness = MetricScore::new(4.0, "grounded");
        second.possible_issues = vec!["A".to_string(), "B".to_string()];

        let suite = EvaluationSuite::new()
            .with_evaluator(Arc::new(FixedEvaluator(first)))
            .with_evaluator(Arc::new(FailingEvaluator))
            .with_evaluator(Arc::new(FixedEvaluator(second)));

        let outcome = suite.evaluate(&input()).await;
        let scores = outcome.scores.as_ref().expect("scores should be present");
        assert_eq!(scores.completeness.score, Some(2.0));
        assert_eq!(scores.groundedness.score, Some(4.0));
        assert_eq!(scores.possible_issues, vec!["A", "B"]);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.error_text(), "Evaluator 'failing' failed: rate limited");
    }

    #[tokio::test]
    async fn test_empty_suite_has_no_scores() {
        let outcome = EvaluationSuite::new().evaluate(&input()).await;
        assert!(outcome.scores.is_none());
        assert!(outcome.errors.is_empty());
    }
}
