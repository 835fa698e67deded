//! Column layout shared by every row of a batch.

use crate::capture::RunRecord;

/// Columns every row starts with.
pub const LEADING_COLUMNS: [&str; 5] = ["Index", "Question", "Expected Answer", "Answer", "Response_Time"];

/// Manual review columns when auto-evaluation review is enabled.
pub const DETAILED_REVIEW_COLUMNS: [&str; 4] = [
    "manual_review_answer_relevance",
    "manual_review_answer_quality",
    "manual_review_context_quality",
    "manual_review_notes",
];

/// Manual review columns otherwise.
pub const SIMPLE_REVIEW_COLUMNS: [&str; 3] = ["manual_rr", "issue_category", "additional_notes"];

/// Run detail columns placed after the tool pairs.
pub const DETAIL_COLUMNS: [&str; 3] = ["sources", "thinking_steps", "artifacts"];

/// Metric columns, then the two error columns.
pub const TRAILING_COLUMNS: [&str; 14] = [
    "geval_completeness",
    "geval_completeness_explanation",
    "geval_groundedness",
    "geval_groundedness_explanation",
    "geval_redundancy",
    "geval_redundancy_explanation",
    "geval_language_consistency",
    "geval_language_consistency_explanation",
    "geval_refusal_alignment",
    "geval_refusal_alignment_explanation",
    "auto_rr",
    "possible_issues",
    "evaluation_error",
    "agent_error",
];

/// Name of the N-th (1-based) tool block column.
pub fn source_tool_column(n: usize) -> String {
    format!("source_tool_{n}")
}

/// Name of the N-th (1-based) context column.
pub fn context_column(n: usize) -> String {
    format!("retrieved_context_or_queried_data_{n}")
}

/// Fixed column order for one batch.
///
/// The number of `source_tool_N` / `retrieved_context_or_queried_data_N`
/// pairs is the largest tool execution count seen in the batch, so every
/// row has the same shape.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchLayout {
    max_tools: usize,
    manual_review_auto_eval: bool,
    columns: Vec<String>,
}

impl BatchLayout {
    pub fn new(max_tools: usize, manual_review_auto_eval: bool) -> Self {
        let review: &[&str] = if manual_review_auto_eval {
            &DETAILED_REVIEW_COLUMNS
        } else {
            &SIMPLE_REVIEW_COLUMNS
        };

        let mut columns: Vec<String> = LEADING_COLUMNS
            .iter()
            .chain(review)
            .map(|c| c.to_string())
            .collect();
        for n in 1..=max_tools {
            columns.push(source_tool_column(n));
            columns.push(context_column(n));
        }
        columns.extend(DETAIL_COLUMNS.iter().chain(&TRAILING_COLUMNS).map(|c| c.to_string()));

        Self {
            max_tools,
            manual_review_auto_eval,
            columns,
        }
    }

    /// Sizes the layout from the records of a whole batch.
    pub fn for_records<'a>(records: impl IntoIterator<Item = &'a RunRecord>, manual_review_auto_eval: bool) -> Self {
        let max_tools = records
            .into_iter()
            .map(|r| r.tool_executions.len())
            .max()
            .unwrap_or(0);
        Self::new(max_tools, manual_review_auto_eval)
    }

    pub fn max_tools(&self) -> usize {
        self.max_tools
    }

    pub fn manual_review_auto_eval(&self) -> bool {
        self.manual_review_auto_eval
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn contains(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }
}
