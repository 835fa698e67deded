//! Human-readable tool execution blocks.

use serde_json::Value;
use tracing::warn;

use super::table::pretty_json;
use crate::capture::{value_text, ToolExecution, ToolFamily, ToolStatus};

/// Default byte budget for one tool block.
pub const DEFAULT_TOOL_BLOCK_BUDGET: usize = 40_000;

/// Maximum agent name length shown in a block header.
const MAX_AGENT_NAME_CHARS: usize = 50;

/// Cuts `text` to at most `max_bytes` bytes and appends a visible notice.
///
/// The cut point is floored to a character boundary, so the same input and
/// budget always produce the same output and never split a UTF-8 sequence.
pub fn truncate_if_needed(text: &str, max_bytes: usize, label: &str) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }

    let mut cut = max_bytes;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }

    warn!(
        label = label,
        original_bytes = text.len(),
        kept_bytes = cut,
        "Truncated output"
    );

    format!(
        "{}\n\n[TRUNCATED: {} output cut from {} to {} bytes]",
        &text[..cut],
        label,
        text.len(),
        cut
    )
}

/// Like [`truncate_if_needed`], with the budget counted in characters.
pub fn truncate_chars_if_needed(text: &str, max_chars: usize, label: &str) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => truncate_if_needed(text, cut, label),
        None => text.to_string(),
    }
}

/// Header label for a tool block.
fn tool_type(tool: &ToolExecution) -> &'static str {
    match tool.status {
        ToolStatus::DelegationStart if tool.is_delegation() => "DELEGATION START",
        ToolStatus::DelegationStart => "TOOL START",
        ToolStatus::DelegationComplete => "DELEGATION COMPLETE",
        _ if is_sub_agent(&tool.agent_name) => "SUB-AGENT TOOL",
        _ => "TOOL",
    }
}

/// Sub-agents carry snake_case names; top-level agents are addressed by
/// UUID-like ids with four dashes.
fn is_sub_agent(agent_name: &str) -> bool {
    agent_name.contains('_') && agent_name.matches('-').count() <= 3
}

/// Renders the output of a tool for display.
///
/// Retrieval outputs holding a `chunks` list are shown as numbered
/// `--- Chunk i ---` sections; everything else as text.
pub fn process_tool_output(tool_name: &str, output: &Value) -> String {
    let text = value_text(output);
    if ToolFamily::from_tool_name(tool_name) != ToolFamily::Retrieval || text.is_empty() {
        return text;
    }

    let parsed = match output {
        Value::Object(_) => Some(output.clone()),
        Value::String(s) => serde_json::from_str::<Value>(s)
            .ok()
            .or_else(|| outermost_object(s)),
        _ => None,
    };

    let Some(chunks) = parsed
        .as_ref()
        .and_then(|p| p.get("chunks"))
        .and_then(Value::as_array)
    else {
        return text;
    };

    let rendered: Vec<String> = chunks
        .iter()
        .enumerate()
        .filter_map(|(i, chunk)| {
            let content = chunk.as_object()?.get("content")?;
            Some(format!("--- Chunk {} ---\n{}", i + 1, value_text(content)))
        })
        .collect();

    if rendered.is_empty() {
        text
    } else {
        rendered.join("\n\n")
    }
}

/// Parses the span from the first `{` to the last `}`.
fn outermost_object(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

/// Formats one tool execution record as a text block, cut to `max_bytes`.
pub fn format_tool_execution(tool: &ToolExecution, max_bytes: usize) -> String {
    let mut block = format!("[Type: {}]\n[Tool: {}]\n", tool_type(tool), tool.tool_name);

    if !tool.agent_name.is_empty() {
        let agent = crate::utils::preview(&tool.agent_name, MAX_AGENT_NAME_CHARS);
        block.push_str(&format!("[Agent: {agent}]\n"));
    }
    if !tool.step_id.is_empty() {
        block.push_str(&format!("[Step: {}]\n", tool.step_id));
    }
    if let Some(parent) = tool.previous_step_ids.first().filter(|p| !p.is_empty()) {
        block.push_str(&format!("[Parent Step: {parent}]\n"));
    }
    block.push('\n');

    block.push_str(&format!("**Args:**\n{}\n\n", pretty_json(&tool.arguments)));

    let output = process_tool_output(&tool.tool_name, &tool.output);
    if !output.is_empty() || matches!(tool.status, ToolStatus::Finished | ToolStatus::DelegationComplete) {
        block.push_str(&format!("**Output:**\n{output}\n\n"));
    } else {
        block.push_str("**Output:** (Delegation in progress...)\n\n");
    }

    block.push_str(&format!("**Status:** {}\n", tool.status));
    block.push_str(&format!("**Duration:** {}ms", tool.duration_ms));

    truncate_if_needed(&block, max_bytes, &tool.tool_name)
}
