//! Result rows: one flat record per benchmark question.

use serde::ser::{Serialize, SerializeMap, Serializer};

use super::blocks::{format_tool_execution, DEFAULT_TOOL_BLOCK_BUDGET};
use super::layout::{context_column, source_tool_column, BatchLayout};
use super::table::format_context_items;
use crate::capture::{RunRecord, ToolStatus};
use crate::error::ExportError;
use crate::evaluation::EvaluationScores;

/// Default character budget for context text in a row.
pub const DEFAULT_CONTEXT_BUDGET: usize = 20_000;

/// A row with a fixed column order. Serializes as a JSON object whose keys
/// follow that order.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow {
    cells: Vec<(String, String)>,
}

impl ResultRow {
    /// Creates a row with every layout column set to an empty string.
    pub fn empty(layout: &BatchLayout) -> Self {
        Self {
            cells: layout
                .columns()
                .iter()
                .map(|c| (c.clone(), String::new()))
                .collect(),
        }
    }

    /// Sets a cell; the column must exist in the layout.
    pub fn set(&mut self, column: &str, value: impl Into<String>) -> Result<(), ExportError> {
        let cell = self
            .cells
            .iter_mut()
            .find(|(c, _)| c == column)
            .ok_or_else(|| ExportError::UnknownColumn(column.to_string()))?;
        cell.1 = value.into();
        Ok(())
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.cells
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, v)| v.as_str())
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(c, _)| c.as_str())
    }

    pub fn cells(&self) -> &[(String, String)] {
        &self.cells
    }
}

impl Serialize for ResultRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.cells.len()))?;
        for (column, value) in &self.cells {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

/// Per-question data that is not part of the run record.
#[derive(Debug, Clone, Default)]
pub struct RowInput<'a> {
    /// 1-based question index.
    pub index: usize,
    pub question: &'a str,
    pub expected_answer: &'a str,
    pub response_time_s: f64,
    pub scores: Option<&'a EvaluationScores>,
    pub evaluation_error: Option<&'a str>,
    pub agent_error: Option<&'a str>,
}

/// Renders run records into rows of one batch layout.
#[derive(Debug, Clone)]
pub struct ResultFormatter {
    layout: BatchLayout,
    max_tool_output_bytes: usize,
    max_context_chars: usize,
}

impl ResultFormatter {
    pub fn new(layout: BatchLayout) -> Self {
        Self {
            layout,
            max_tool_output_bytes: DEFAULT_TOOL_BLOCK_BUDGET,
            max_context_chars: DEFAULT_CONTEXT_BUDGET,
        }
    }

    /// Sets the byte budget for each tool block.
    pub fn with_max_tool_output_bytes(mut self, max: usize) -> Self {
        self.max_tool_output_bytes = max;
        self
    }

    /// Sets the character budget for chunk contents in context columns.
    pub fn with_max_context_chars(mut self, max: usize) -> Self {
        self.max_context_chars = max;
        self
    }

    pub fn layout(&self) -> &BatchLayout {
        &self.layout
    }

    /// Formats one run into a row.
    ///
    /// Fails with [`ExportError::LayoutMismatch`] if the run has more tool
    /// executions than the layout has column pairs.
    pub fn format(&self, input: &RowInput<'_>, record: &RunRecord) -> Result<ResultRow, ExportError> {
        let tools = record.tool_executions.len();
        if tools > self.layout.max_tools() {
            return Err(ExportError::LayoutMismatch {
                index: input.index,
                tools,
                max_tools: self.layout.max_tools(),
            });
        }

        let mut row = ResultRow::empty(&self.layout);
        row.set("Index", input.index.to_string())?;
        row.set("Question", input.question)?;
        row.set("Expected Answer", input.expected_answer)?;
        row.set("Answer", record.final_response.as_str())?;
        row.set("Response_Time", format!("{:.2}", input.response_time_s))?;

        for (i, tool) in record.tool_executions.iter().enumerate() {
            row.set(
                &source_tool_column(i + 1),
                format_tool_execution(tool, self.max_tool_output_bytes),
            )?;
            if tool.status != ToolStatus::DelegationStart {
                row.set(
                    &context_column(i + 1),
                    format_context_items(record.context_for(tool), self.max_context_chars),
                )?;
            }
        }

        row.set("sources", record.formatted_sources())?;
        row.set("thinking_steps", record.thinking_text())?;
        row.set("artifacts", serde_json::to_string(&record.artifacts)?)?;

        if let Some(scores) = input.scores {
            for (stem, metric) in scores.metrics() {
                row.set(
                    &format!("geval_{stem}"),
                    metric.score.map(|s| s.to_string()).unwrap_or_default(),
                )?;
                row.set(&format!("geval_{stem}_explanation"), metric.explanation.as_str())?;
            }
            row.set("auto_rr", scores.relevancy_rating.clone().unwrap_or_default())?;
            row.set("possible_issues", scores.possible_issues.join(", "))?;
        }

        row.set("evaluation_error", input.evaluation_error.unwrap_or_default())?;
        row.set("agent_error", input.agent_error.unwrap_or_default())?;

        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{RawEvent, RunRecorder};
    use crate::evaluation::MetricScore;
    use serde_json::json;

    fn sql_run() -> RunRecord {
        let mut recorder = RunRecorder::new();
        recorder.accept(
            RawEvent::new("agent_thinking_step")
                .with_metadata("step_id", json!("s1"))
                .with_metadata(
                    "tool_info",
                    json!({"tool_calls": [{"id": "t1", "name": "sql_tool", "args": {"query": "SELECT 1"}}]}),
                ),
        );
        recorder.accept(
            RawEvent::new("agent_thinking_step")
                .with_metadata("step_id", json!("s1"))
                .with_metadata(
                    "tool_info",
                    json!({"id": "t1", "name": "sql_tool", "output": "[{'n': 1}]", "execution_time": 0.5}),
                ),
        );
        recorder.accept(RawEvent::new("final_response").with_content("One"));
        recorder.finalize()
    }

    #[test]
    fn test_row_follows_layout() {
        let record = sql_run();
        let layout = BatchLayout::for_records([&record], false);
        let formatter = ResultFormatter::new(layout.clone());
        let input = RowInput {
            index: 3,
            question: "How many?",
            expected_answer: "One",
            response_time_s: 1.234,
            ..Default::default()
        };

        let row = formatter.format(&input, &record).expect("row should format");
        assert_eq!(row.columns().collect::<Vec<_>>(), layout.columns().iter().map(String::as_str).collect::<Vec<_>>());
        assert_eq!(row.get("Index"), Some("3"));
        assert_eq!(row.get("Answer"), Some("One"));
        assert_eq!(row.get("Response_Time"), Some("1.23"));
        assert!(row
            .get("source_tool_1")
            .is_some_and(|b| b.contains("**Output:** (Delegation in progress...)")));
        assert_eq!(row.get("retrieved_context_or_queried_data_1"), Some(""));
        assert!(row
            .get("retrieved_context_or_queried_data_2")
            .is_some_and(|c| c.contains("| n |")));
        assert_eq!(row.get("artifacts"), Some("[]"));
        assert_eq!(row.get("geval_completeness"), Some(""));
    }

    #[test]
    fn test_scores_fill_metric_columns() {
        let record = sql_run();
        let formatter = ResultFormatter::new(BatchLayout::for_records([&record], true));
        let scores = EvaluationScores {
            completeness: MetricScore::new(4.0, "complete"),
            relevancy_rating: Some("good".to_string()),
            possible_issues: vec!["A".to_string(), "B".to_string()],
            ..Default::default()
        };
        let input = RowInput {
            index: 1,
            scores: Some(&scores),
            agent_error: Some("boom"),
            ..Default::default()
        };
        let row = formatter.format(&input, &record).expect("row should format");
        assert_eq!(row.get("geval_completeness"), Some("4"));
        assert_eq!(row.get("geval_completeness_explanation"), Some("complete"));
        assert_eq!(row.get("auto_rr"), Some("good"));
        assert_eq!(row.get("possible_issues"), Some("A, B"));
        assert_eq!(row.get("agent_error"), Some("boom"));
        assert!(row.get("manual_review_notes").is_some());
    }

    #[test]
    fn test_layout_mismatch_is_an_error() {
        let record = sql_run();
        let formatter = ResultFormatter::new(BatchLayout::new(1, false));
        let err = formatter
            .format(&RowInput::default(), &record)
            .expect_err("two tools do not fit one pair");
        assert!(matches!(
            err,
            ExportError::LayoutMismatch {
                tools: 2,
                max_tools: 1,
                ..
            }
        ));
    }

    #[test]
    fn test_row_serializes_in_column_order() {
        let layout = BatchLayout::new(0, false);
        let mut row = ResultRow::empty(&layout);
        row.set("Index", "1").expect("column exists");
        assert!(row.set("nope", "x").is_err());
        let json = serde_json::to_string(&row).expect("serialize");
        assert!(json.starts_with(r#"{"Index":"1","Question":"","#));
    }
}
