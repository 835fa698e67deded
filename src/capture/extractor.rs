//! Retrieved-context extraction from tool outputs.
//!
//! Tools are grouped by name into families. SQL-like tools yield one
//! [`ContextItem::ToolOutputSqlResult`] with the decoded rows, retrieval
//! tools yield one [`ContextItem::VectorChunk`] per non-empty chunk. Other
//! tools are not mined for context.

use serde_json::Value;
use tracing::debug;

use super::classifier::StepContext;
use super::types::ContextItem;
use crate::error::ContextDecodeError;
use crate::utils::{decode_tool_output, preview};

/// Default character budget for generic context content.
pub const DEFAULT_GENERIC_CONTENT_CHARS: usize = 20_000;

/// Tool family, decided from the tool name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolFamily {
    Sql,
    Retrieval,
    Other,
}

impl ToolFamily {
    /// `sql`/`query` wins over `vector`/`search`/`retrieval`; matching is
    /// case-insensitive substring.
    pub fn from_tool_name(name: &str) -> Self {
        let name = name.to_lowercase();
        if name.contains("sql") || name.contains("query") {
            ToolFamily::Sql
        } else if ["vector", "search", "retrieval"]
            .iter()
            .any(|marker| name.contains(marker))
        {
            ToolFamily::Retrieval
        } else {
            ToolFamily::Other
        }
    }
}

/// Keys that may hold a chunk list when `chunks` is absent.
const CHUNK_LIST_KEYS: [&str; 5] = ["chunks", "results", "documents", "context", "data"];

/// Turns completed tool outputs into context items.
#[derive(Debug, Clone)]
pub struct ContextExtractor {
    max_generic_chars: usize,
}

impl Default for ContextExtractor {
    fn default() -> Self {
        Self {
            max_generic_chars: DEFAULT_GENERIC_CONTENT_CHARS,
        }
    }
}

impl ContextExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the character budget for generic context content.
    pub fn with_max_generic_chars(mut self, max_chars: usize) -> Self {
        self.max_generic_chars = max_chars;
        self
    }

    /// Extracts context from one completed tool call, swallowing decode
    /// failures.
    ///
    /// # Arguments
    ///
    /// * `tool_name` - Name of the tool that produced the output
    /// * `output` - Raw output as received
    /// * `arguments` - Call arguments, searched for the SQL query text
    /// * `step` - Step coordinates copied onto each item
    pub fn extract(
        &self,
        tool_name: &str,
        output: &Value,
        arguments: &Value,
        step: &StepContext,
    ) -> Vec<ContextItem> {
        match self.try_extract(tool_name, output, arguments, step) {
            Ok(items) => items,
            Err(e) => {
                debug!(tool = tool_name, error = %e, "No context extracted from tool output");
                Vec::new()
            }
        }
    }

    /// Like [`ContextExtractor::extract`] but reports why nothing was found.
    pub fn try_extract(
        &self,
        tool_name: &str,
        output: &Value,
        arguments: &Value,
        step: &StepContext,
    ) -> Result<Vec<ContextItem>, ContextDecodeError> {
        let family = ToolFamily::from_tool_name(tool_name);
        if family == ToolFamily::Other {
            return Ok(Vec::new());
        }

        let (decoded, strategy) = decode_tool_output(output)?;
        debug!(tool = tool_name, ?strategy, "Decoded tool output");

        let step_id = step.step_id.clone().unwrap_or_default();
        let agent_name = step.agent_name.clone().unwrap_or_default();

        match family {
            ToolFamily::Sql => {
                let Value::Array(rows) = decoded else {
                    return Err(ContextDecodeError::UnexpectedShape { expected: "list of rows" });
                };
                let original_cols = rows
                    .first()
                    .and_then(Value::as_object)
                    .map(|row| row.len())
                    .unwrap_or(0);
                Ok(vec![ContextItem::ToolOutputSqlResult {
                    tool_name: tool_name.to_string(),
                    query: sql_query(arguments).unwrap_or_default(),
                    original_rows: rows.len(),
                    original_cols,
                    results: rows,
                    step_id,
                    agent_name,
                }])
            }
            ToolFamily::Retrieval => {
                let chunks = chunk_items(&decoded, tool_name, &step_id, &agent_name);
                if !chunks.is_empty() {
                    return Ok(chunks);
                }
                match &decoded {
                    Value::Object(_) | Value::Array(_) => {
                        let content = generic_content(&decoded);
                        if content.is_empty() {
                            return Err(ContextDecodeError::Empty);
                        }
                        Ok(vec![ContextItem::ToolOutputGeneric {
                            tool_name: tool_name.to_string(),
                            content: preview(&content, self.max_generic_chars),
                            step_id,
                            agent_name,
                        }])
                    }
                    _ => Err(ContextDecodeError::UnexpectedShape {
                        expected: "mapping with chunks",
                    }),
                }
            }
            ToolFamily::Other => Ok(Vec::new()),
        }
    }
}

/// The SQL text of a call: `args.request.query`, then `args.query`, then
/// `args.sql`.
pub fn sql_query(arguments: &Value) -> Option<String> {
    arguments
        .get("request")
        .and_then(|request| request.get("query"))
        .or_else(|| arguments.get("query"))
        .or_else(|| arguments.get("sql"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn chunk_items(decoded: &Value, tool_name: &str, step_id: &str, agent_name: &str) -> Vec<ContextItem> {
    let Some(object) = decoded.as_object() else {
        return Vec::new();
    };
    let Some(chunks) = CHUNK_LIST_KEYS
        .iter()
        .filter_map(|key| object.get(*key).and_then(Value::as_array))
        .find(|list| !list.is_empty())
    else {
        return Vec::new();
    };

    chunks
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|chunk| {
            let content = chunk
                .get("content")
                .or_else(|| chunk.get("text"))
                .and_then(Value::as_str)
                .filter(|c| !c.is_empty())?;
            let chunk_id = chunk
                .get("chunk_id")
                .or_else(|| chunk.get("id"))
                .and_then(|id| match id {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                });
            Some(ContextItem::VectorChunk {
                tool_name: tool_name.to_string(),
                chunk_id,
                content: content.to_string(),
                step_id: step_id.to_string(),
                agent_name: agent_name.to_string(),
            })
        })
        .collect()
}

fn generic_content(decoded: &Value) -> String {
    if let Some(content) = decoded
        .get("content")
        .or_else(|| decoded.get("text"))
        .and_then(Value::as_str)
    {
        return content.to_string();
    }
    match decoded {
        Value::Array(items) if items.is_empty() => String::new(),
        Value::Object(map) if map.is_empty() => String::new(),
        other => serde_json::to_string_pretty(other).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn step() -> StepContext {
        StepContext {
            step_id: Some("s1".to_string()),
            agent_name: Some("analyst".to_string()),
            previous_step_ids: Vec::new(),
        }
    }

    #[test]
    fn test_tool_family() {
        assert_eq!(ToolFamily::from_tool_name("SQL_Tool"), ToolFamily::Sql);
        assert_eq!(ToolFamily::from_tool_name("query_search"), ToolFamily::Sql);
        assert_eq!(ToolFamily::from_tool_name("vector_lookup"), ToolFamily::Retrieval);
        assert_eq!(ToolFamily::from_tool_name("doc_retrieval"), ToolFamily::Retrieval);
        assert_eq!(ToolFamily::from_tool_name("calculator"), ToolFamily::Other);
    }

    #[test]
    fn test_empty_sql_result_is_kept() {
        let items = ContextExtractor::new().extract(
            "sql_tool",
            &json!("[]"),
            &json!({"request": {"query": "SELECT * FROM t WHERE 1=0"}}),
            &step(),
        );
        assert_eq!(
            items,
            vec![ContextItem::ToolOutputSqlResult {
                tool_name: "sql_tool".to_string(),
                query: "SELECT * FROM t WHERE 1=0".to_string(),
                results: vec![],
                original_rows: 0,
                original_cols: 0,
                step_id: "s1".to_string(),
                agent_name: "analyst".to_string(),
            }]
        );
    }

    #[test]
    fn test_sql_rows_with_placeholders() {
        let items = ContextExtractor::new().extract(
            "sql_tool",
            &json!("[{'region': 'West', 'total': <MONEY_1>}, {'region': 'East', 'total': <MONEY_2>}]"),
            &json!({"query": "SELECT region, total FROM sales"}),
            &step(),
        );
        match &items[..] {
            [ContextItem::ToolOutputSqlResult {
                results,
                original_rows,
                original_cols,
                query,
                ..
            }] => {
                assert_eq!(*original_rows, 2);
                assert_eq!(*original_cols, 2);
                assert_eq!(results[0]["total"], json!("<MONEY_1>"));
                assert_eq!(query, "SELECT region, total FROM sales");
            }
            other => panic!("unexpected items: {other:?}"),
        }
    }

    #[test]
    fn test_sql_non_list_is_rejected() {
        let result = ContextExtractor::new().try_extract(
            "sql_tool",
            &json!("{'error': 'syntax'}"),
            &json!({}),
            &step(),
        );
        assert!(matches!(result, Err(ContextDecodeError::UnexpectedShape { .. })));
    }

    #[test]
    fn test_vector_chunks_skip_empty_content() {
        let output = json!(r#"{"chunks": [{"content": "alpha", "id": 1}, {"content": ""}, {"text": "beta"}]}"#);
        let items = ContextExtractor::new().extract("vector_search", &output, &json!({}), &step());
        assert_eq!(items.len(), 2);
        match &items[0] {
            ContextItem::VectorChunk {
                chunk_id, content, ..
            } => {
                assert_eq!(chunk_id.as_deref(), Some("1"));
                assert_eq!(content, "alpha");
            }
            other => panic!("unexpected item: {other:?}"),
        }
    }

    #[test]
    fn test_retrieval_without_chunks_is_generic() {
        let output = json!({"content": "A summary paragraph", "score": 0.9});
        let items = ContextExtractor::new()
            .with_max_generic_chars(9)
            .extract("doc_retrieval", &output, &json!({}), &step());
        assert_eq!(
            items,
            vec![ContextItem::ToolOutputGeneric {
                tool_name: "doc_retrieval".to_string(),
                content: "A summary...".to_string(),
                step_id: "s1".to_string(),
                agent_name: "analyst".to_string(),
            }]
        );
    }

    #[test]
    fn test_undecodable_output_yields_nothing() {
        let extractor = ContextExtractor::new();
        assert!(extractor
            .extract("vector_search", &json!("no results found"), &json!({}), &step())
            .is_empty());
        assert!(extractor
            .extract("sql_tool", &json!(""), &json!({}), &step())
            .is_empty());
        assert!(extractor
            .extract("calculator", &json!("[1, 2]"), &json!({}), &step())
            .is_empty());
    }
}
