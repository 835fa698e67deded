//! Artifact validation metric.

use async_trait::async_trait;

use super::{EvaluationInput, EvaluationScores, Evaluator};
use crate::error::EvaluationError;

/// Issue reported when a chart was expected but none was produced.
pub const MISSING_VISUALIZATION_ISSUE: &str = "Visualization required but no artifacts generated";

/// Verdict of the artifact check for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactVerdict {
    pub passed: bool,
    pub reason: String,
    pub artifact_count: usize,
}

/// Checks that questions requiring a visualization produced artifacts.
#[derive(Debug, Clone, Default)]
pub struct ArtifactValidationMetric;

impl ArtifactValidationMetric {
    pub const NAME: &'static str = "artifact_validation";

    pub fn check(&self, requires_visualization: bool, artifact_count: usize) -> ArtifactVerdict {
        let reason = match (requires_visualization, artifact_count) {
            (true, 0) => MISSING_VISUALIZATION_ISSUE.to_string(),
            (true, n) => format!("Visualization required and {n} artifact(s) generated"),
            (false, 0) => "No visualization required".to_string(),
            (false, n) => format!("No visualization required, but {n} artifact(s) generated"),
        };
        ArtifactVerdict {
            passed: !(requires_visualization && artifact_count == 0),
            reason,
            artifact_count,
        }
    }
}

#[async_trait]
impl Evaluator for ArtifactValidationMetric {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn evaluate(&self, input: &EvaluationInput) -> Result<EvaluationScores, EvaluationError> {
        let verdict = self.check(input.requires_visualization, input.artifact_count);
        let mut scores = EvaluationScores::default();
        if !verdict.passed {
            scores.possible_issues.push(MISSING_VISUALIZATION_ISSUE.to_string());
        }
        Ok(scores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_verdicts() {
        let metric = ArtifactValidationMetric;
        assert!(!metric.check(true, 0).passed);
        assert_eq!(metric.check(true, 2).reason, "Visualization required and 2 artifact(s) generated");
        assert!(metric.check(false, 0).passed);
        assert_eq!(
            metric.check(false, 1).reason,
            "No visualization required, but 1 artifact(s) generated"
        );
    }

    #[tokio::test]
    async fn test_missing_visualization_is_an_issue() {
        let input = EvaluationInput {
            index: 1,
            query: "Plot revenue".to_string(),
            expected_response: String::new(),
            generated_response: String::new(),
            retrieved_context: String::new(),
            requires_visualization: true,
            artifact_count: 0,
            model: String::new(),
        };
        let scores = ArtifactValidationMetric
            .evaluate(&input)
            .await
            .expect("artifact metric never fails");
        assert_eq!(scores.possible_issues, vec![MISSING_VISUALIZATION_ISSUE]);
    }
}
