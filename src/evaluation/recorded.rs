//! Evaluator backed by previously recorded scores.
//!
//! Generation metrics are computed by an external scoring service. Its
//! output, a JSON list with one entry (or `null`) per question in dataset
//! order, can be replayed through this evaluator.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use super::{EvaluationInput, EvaluationScores, Evaluator};
use crate::error::EvaluationError;

/// Replays recorded scores keyed by 1-based question index.
#[derive(Debug, Clone, Default)]
pub struct RecordedScoresEvaluator {
    scores: HashMap<usize, EvaluationScores>,
}

impl RecordedScoresEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds scores for one question.
    pub fn with_scores(mut self, index: usize, scores: EvaluationScores) -> Self {
        self.scores.insert(index, scores);
        self
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Builds the evaluator from a recorded score list. Entry `i` belongs to
    /// question `i + 1`; `null` and malformed entries are skipped.
    pub fn from_value(value: Value) -> Result<Self, EvaluationError> {
        let Value::Array(entries) = value else {
            return Err(EvaluationError::Failed {
                name: "recorded_scores".to_string(),
                message: "expected a JSON list of score objects".to_string(),
            });
        };

        let mut evaluator = Self::new();
        for (i, entry) in entries.into_iter().enumerate() {
            if entry.is_null() {
                continue;
            }
            match serde_json::from_value::<EvaluationScores>(entry) {
                Ok(scores) => evaluator.scores.insert(i + 1, scores),
                Err(e) => {
                    warn!(index = i + 1, error = %e, "Skipping malformed recorded scores");
                    continue;
                }
            };
        }
        Ok(evaluator)
    }

    /// Loads a recorded score list from a JSON file.
    pub async fn load(path: &Path) -> Result<Self, EvaluationError> {
        let failed = |message: String| EvaluationError::Failed {
            name: "recorded_scores".to_string(),
            message,
        };
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| failed(format!("cannot read {}: {e}", path.display())))?;
        let value: Value = serde_json::from_str(&content)
            .map_err(|e| failed(format!("invalid JSON in {}: {e}", path.display())))?;
        Self::from_value(value)
    }
}

#[async_trait]
impl Evaluator for RecordedScoresEvaluator {
    fn name(&self) -> &str {
        "recorded_scores"
    }

    async fn evaluate(&self, input: &EvaluationInput) -> Result<EvaluationScores, EvaluationError> {
        match self.scores.get(&input.index) {
            Some(scores) => Ok(scores.clone()),
            None => {
                debug!(index = input.index, "No recorded scores for question");
                Ok(EvaluationScores::default())
            }
        }
    }
}
