//! Markdown rendering of SQL result rows and context items.

use serde_json::Value;

use crate::capture::{value_text, ContextItem};

/// Row limit for SQL tables in result rows.
pub const MAX_TABLE_ROWS: usize = 100;

/// Column limit for SQL tables in result rows.
pub const MAX_TABLE_COLS: usize = 15;

/// A rendered table plus the dimensions it was cut to.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkdownTable {
    pub text: String,
    pub shown_rows: usize,
    pub shown_cols: usize,
    pub total_rows: usize,
    pub total_cols: usize,
}

impl MarkdownTable {
    pub fn is_truncated(&self) -> bool {
        self.shown_rows < self.total_rows || self.shown_cols < self.total_cols
    }
}

/// Renders a list of row objects as a pipe table.
///
/// Columns are the union of row keys in first-seen order. Returns `None`
/// when the first row is not an object, in which case callers fall back to
/// a JSON dump.
pub fn markdown_table(rows: &[Value], max_rows: usize, max_cols: usize) -> Option<MarkdownTable> {
    rows.first()?.as_object()?;

    let mut columns: Vec<&str> = Vec::new();
    for row in rows.iter().filter_map(Value::as_object) {
        for key in row.keys() {
            if !columns.contains(&key.as_str()) {
                columns.push(key);
            }
        }
    }

    let shown_cols = columns.len().min(max_cols);
    let shown_rows = rows.len().min(max_rows);
    let columns_shown = &columns[..shown_cols];

    let mut text = String::new();
    text.push_str(&table_line(columns_shown.iter().map(|c| escape_cell(c))));
    text.push('\n');
    text.push_str(&table_line(columns_shown.iter().map(|_| "---".to_string())));

    for row in &rows[..shown_rows] {
        text.push('\n');
        text.push_str(&table_line(columns_shown.iter().map(|column| {
            row.get(*column)
                .map(|cell| escape_cell(&value_text(cell)))
                .unwrap_or_default()
        })));
    }

    Some(MarkdownTable {
        text,
        shown_rows,
        shown_cols,
        total_rows: rows.len(),
        total_cols: columns.len(),
    })
}

fn table_line(cells: impl Iterator<Item = String>) -> String {
    let cells: Vec<String> = cells.collect();
    format!("| {} |", cells.join(" | "))
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|").replace(['\r', '\n'], " ")
}

/// Pretty JSON, falling back to compact form.
pub fn pretty_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

/// Renders the context items of one tool as markdown for a result row.
///
/// Vector chunks become numbered `## Chunk` sections, SQL results a query
/// block plus a table cut to [`MAX_TABLE_ROWS`] x [`MAX_TABLE_COLS`], and
/// generic outputs a fenced block. Chunk contents are cut to
/// `max_content_chars` characters.
pub fn format_context_items<'a>(
    items: impl IntoIterator<Item = &'a ContextItem>,
    max_content_chars: usize,
) -> String {
    let mut parts = Vec::new();
    let mut chunk_counter = 0;

    for item in items {
        match item {
            ContextItem::VectorChunk {
                chunk_id, content, ..
            } => {
                chunk_counter += 1;
                let content = super::blocks::truncate_chars_if_needed(
                    content,
                    max_content_chars,
                    &format!("vector_chunk_{chunk_counter}"),
                );
                parts.push(format!(
                    "## Chunk {chunk_counter}\n\n**Chunk ID:** `{}`\n\n**Content:**\n```\n{content}\n```",
                    chunk_id.as_deref().unwrap_or("N/A")
                ));
            }
            ContextItem::ToolOutputSqlResult {
                query,
                results,
                original_rows,
                original_cols,
                ..
            } => parts.push(format_sql_result(query, results, *original_rows, *original_cols)),
            ContextItem::ToolOutputGeneric { content, .. } => {
                if !content.is_empty() {
                    parts.push(format!("**Output:**\n```\n{content}\n```"));
                }
            }
            ContextItem::FinalResponseReference { .. } => {}
        }
    }

    parts.join("\n\n")
}

fn format_sql_result(query: &str, results: &[Value], original_rows: usize, original_cols: usize) -> String {
    let mut out = String::new();
    if !query.is_empty() {
        out.push_str(&format!("**Query:**\n```sql\n{query}\n```\n\n"));
    }

    if results.is_empty() {
        out.push_str("**Results:** (empty)");
        return out;
    }

    match markdown_table(results, MAX_TABLE_ROWS, MAX_TABLE_COLS) {
        Some(table) => {
            out.push_str("**Results:**\n");
            out.push_str(&table.text);
            let total_rows = original_rows.max(table.total_rows);
            let total_cols = original_cols.max(table.total_cols);
            if total_rows > table.shown_rows || total_cols > table.shown_cols {
                out.push_str(&format!(
                    "\n\n*(Showing {} of {} rows, {} of {} columns)*",
                    table.shown_rows, total_rows, table.shown_cols, total_cols
                ));
            }
        }
        None => {
            out.push_str("**Results:**\n```json\n");
            out.push_str(&pretty_json(&Value::Array(results.to_vec())));
            out.push_str("\n```");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sql_item(results: Vec<Value>) -> ContextItem {
        let cols = results
            .first()
            .and_then(Value::as_object)
            .map(|r| r.len())
            .unwrap_or(0);
        ContextItem::ToolOutputSqlResult {
            tool_name: "sql_tool".to_string(),
            query: "SELECT region, total FROM sales".to_string(),
            original_rows: results.len(),
            original_cols: cols,
            results,
            step_id: "s1".to_string(),
            agent_name: String::new(),
        }
    }

    #[test]
    fn test_markdown_table_union_columns() {
        let rows = vec![json!({"a": 1, "b": "x|y"}), json!({"a": 2, "c": null})];
        let table = markdown_table(&rows, 10, 10).expect("rows are objects");
        assert_eq!(
            table.text,
            "| a | b | c |\n| --- | --- | --- |\n| 1 | x\\|y |  |\n| 2 |  |  |"
        );
        assert!(!table.is_truncated());
    }

    #[test]
    fn test_markdown_table_rejects_scalars() {
        assert!(markdown_table(&[json!(1), json!(2)], 10, 10).is_none());
        assert!(markdown_table(&[], 10, 10).is_none());
    }

    #[test]
    fn test_sql_result_rendering() {
        let item = sql_item(vec![json!({"region": "West", "total": 10})]);
        let text = format_context_items([&item], 100);
        assert_eq!(
            text,
            "**Query:**\n```sql\nSELECT region, total FROM sales\n```\n\n**Results:**\n| region | total |\n| --- | --- |\n| West | 10 |"
        );
    }

    #[test]
    fn test_empty_sql_result_rendering() {
        let text = format_context_items([&sql_item(vec![])], 100);
        assert!(text.ends_with("**Results:** (empty)"));
    }

    #[test]
    fn test_large_sql_result_shows_note() {
        let rows: Vec<Value> = (0..120).map(|i| json!({"n": i})).collect();
        let text = format_context_items([&sql_item(rows)], 100);
        assert!(text.contains("*(Showing 100 of 120 rows, 1 of 1 columns)*"));
        assert!(!text.contains("| 100 |"));
    }

    #[test]
    fn test_chunks_are_numbered() {
        let chunk = |content: &str| ContextItem::VectorChunk {
            tool_name: "vector_search".to_string(),
            chunk_id: None,
            content: content.to_string(),
            step_id: "s1".to_string(),
            agent_name: String::new(),
        };
        let (first, second) = (chunk("alpha"), chunk("beta"));
        let text = format_context_items([&first, &second], 100);
        assert_eq!(
            text,
            "## Chunk 1\n\n**Chunk ID:** `N/A`\n\n**Content:**\n```\nalpha\n```\n\n## Chunk 2\n\n**Chunk ID:** `N/A`\n\n**Content:**\n```\nbeta\n```"
        );
    }
}
