use serde_json::Value;
use unicode_general_category::{get_general_category, GeneralCategory};

/// True for characters that must never reach the report or the cache: every
/// code point in the Unicode "Other" group (Cc, Cf, Cs, Co, Cn).
pub fn is_unprintable(c: char) -> bool {
    matches!(
        get_general_category(c),
        GeneralCategory::Control
            | GeneralCategory::Format
            | GeneralCategory::Surrogate
            | GeneralCategory::PrivateUse
            | GeneralCategory::Unassigned
    )
}

/// Strips unprintable characters, then surrounding whitespace. Idempotent.
pub fn sanitize(value: &str) -> String {
    let filtered: String = value.chars().filter(|c| !is_unprintable(*c)).collect();
    filtered.trim().to_string()
}

/// Coerces a directory attribute of any JSON shape to a sanitized string.
/// Multi-valued attributes are joined with `,`.
pub fn clean_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => sanitize(s),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items
            .iter()
            .map(clean_value)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => sanitize(&value.to_string()),
    }
}

/// Directory booleans arrive as JSON bools, strings or null.
pub fn clean_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => s.trim().eq_ignore_ascii_case("true"),
        Value::Number(n) => n.as_i64().map(|v| v != 0).unwrap_or(false),
        _ => false,
    }
}
