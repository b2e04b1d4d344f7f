use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::content::{ExtractionRecord, PLACEHOLDER};

static FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*```[\w+#.-]*[ \t]*$").unwrap());

/// Recover the extraction JSON object from model output.
///
/// Never fails: output without a usable object, or whose object has no problem
/// statement, becomes a fallback record whose statement is the cleaned text.
#[must_use]
pub fn parse_extraction(text: &str) -> ExtractionRecord {
    let cleaned = strip_fences(text);

    let Some(fields) = find_object(&cleaned) else {
        tracing::warn!("extraction output is not JSON, using raw text");
        return ExtractionRecord::fallback(&cleaned, text);
    };

    let Some(problem_statement) =
        field(&fields, &["problem_statement", "problemStatement", "problem"])
            .filter(|s| !s.trim().is_empty())
    else {
        tracing::warn!("extraction JSON has no problem_statement, using raw text");
        return ExtractionRecord::fallback(&cleaned, text);
    };

    ExtractionRecord {
        problem_statement,
        constraints: field(&fields, &["constraints"]).unwrap_or_else(|| PLACEHOLDER.into()),
        example_input: field(&fields, &["example_input", "exampleInput"])
            .unwrap_or_else(|| PLACEHOLDER.into()),
        example_output: field(&fields, &["example_output", "exampleOutput"])
            .unwrap_or_else(|| PLACEHOLDER.into()),
        fields,
        fallback_used: false,
        raw_text: text.to_owned(),
    }
}

/// Remove Markdown fence lines, keeping their contents.
#[must_use]
pub fn strip_fences(text: &str) -> String {
    FENCE_RE.replace_all(text, "").trim().to_owned()
}

fn find_object(text: &str) -> Option<Map<String, Value>> {
    let start = text.find('{')?;

    if let Some(end) = text.rfind('}')
        && end > start
        && let Ok(Value::Object(map)) = serde_json::from_str(&text[start..=end])
    {
        return Some(map);
    }

    let end = balanced_end(text, start)?;
    match serde_json::from_str(&text[start..end]) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Byte index just past the brace that closes the one at `start`, skipping
/// braces inside string literals.
fn balanced_end(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(start + i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

fn field(fields: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| fields.get(*k))
        .map(render_value)
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Array(items) => items
            .iter()
            .map(render_value)
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    }
}
