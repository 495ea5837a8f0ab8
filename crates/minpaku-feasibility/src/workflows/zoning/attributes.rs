use serde_json::{Map, Value};

/// Attribute names that have carried the zoning classification across
/// dataset vintages, highest priority first.
pub const ZONING_TYPE_KEYS: &[&str] = &[
    "A29_005",
    "用途地域",
    "name",
    "ZoningType",
    "zoning_type",
    "ZONING_TYPE",
    "用途地域名",
];

pub const ZONING_CODE_KEYS: &[&str] = &[
    "A29_004",
    "用途地域コード",
    "code",
    "ZoningCode",
    "zoning_code",
    "ZONING_CODE",
];

pub const UNKNOWN_ZONING: &str = "不明";

/// The first alias that holds a real classification.
pub fn zoning_type(properties: &Map<String, Value>) -> Option<String> {
    first_value(properties, ZONING_TYPE_KEYS, |value| value != UNKNOWN_ZONING)
}

/// The first alias that holds a code, or an empty string.
pub fn zoning_code(properties: &Map<String, Value>) -> String {
    first_value(properties, ZONING_CODE_KEYS, |_| true).unwrap_or_default()
}

fn first_value(
    properties: &Map<String, Value>,
    keys: &[&str],
    accept: impl Fn(&str) -> bool,
) -> Option<String> {
    keys.iter()
        .filter_map(|key| properties.get(*key))
        .filter_map(as_text)
        .find(|value| accept(value))
}

fn as_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(text) => text.trim().to_string(),
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        _ => return None,
    };
    (!text.is_empty() && text != "None").then_some(text)
}
