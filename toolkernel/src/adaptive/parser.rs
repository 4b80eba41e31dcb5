//! Extraction of a value from a free-form model reply.

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

static FIELD_VALUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\w+):[ \t]*([^\n\r,]+)").expect("Invalid regex pattern")
});

static NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+(?:\.\d+)?)").expect("Invalid regex pattern")
});

const NOT_FOUND: &str = "NOT_FOUND";

fn is_placeholder_label(label: &str) -> bool {
    matches!(label.to_lowercase().as_str(), "field_name" | "value" | "field")
        || label.starts_with("FIELD")
}

fn to_number(text: &str) -> Option<Value> {
    if text.contains('.') {
        text.parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
    } else {
        text.parse::<i64>().ok().map(Value::from)
    }
}

/// Parses a reply into a value.
///
/// Returns `None` when the reply says `NOT_FOUND` or carries nothing usable.
/// Otherwise the first `LABEL: VALUE` pair wins (placeholder labels such as
/// `FIELD_NAME` are skipped), then the first number, then the trimmed text.
#[must_use]
pub fn parse_response(reply: &str) -> Option<Value> {
    let cleaned = reply.trim();
    if cleaned.is_empty() || cleaned.eq_ignore_ascii_case(NOT_FOUND) {
        return None;
    }

    for caps in FIELD_VALUE.captures_iter(cleaned) {
        let label = caps[1].trim();
        let value = caps[2].trim();
        if is_placeholder_label(label) || value.is_empty() {
            continue;
        }
        return Some(
            to_number(value)
                .unwrap_or_else(|| Value::String(value.trim_matches(|c| c == '"' || c == '\'').to_string())),
        );
    }

    if let Some(caps) = NUMBER.captures(cleaned) {
        if let Some(number) = to_number(&caps[1]) {
            return Some(number);
        }
    }

    Some(Value::String(cleaned.to_string()))
}
