use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

lazy_static! {
    static ref INT_PREFIX: Regex = Regex::new(r"^\s*([+-]?\d+)").unwrap();
    static ref FLOAT_PREFIX: Regex =
        Regex::new(r"^\s*([+-]?(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?)").unwrap();
}

/// Renders a parameter value the way it would be typed in a form field.
/// Absent values render as the empty string.
fn stringify(input: &Value) -> String {
    match input {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(stringify).collect::<Vec<_>>().join(","),
        other => other.to_string(),
    }
}

/// Coerces a classifier parameter to an integer.
///
/// The value is stringified and its leading integer is parsed, so `"3.9"`
/// becomes `3` and `"12 trees"` becomes `12`. Anything without a leading
/// integer yields `None`, which the engine treats as "use the default".
pub fn to_int(input: &Value) -> Option<i64> {
    let text = stringify(input);
    INT_PREFIX
        .captures(&text)
        .and_then(|caps| caps[1].parse::<i64>().ok())
}

/// Coerces a classifier parameter to a float, with the same leading-prefix
/// rule as [`to_int`]. Non-finite results yield `None`.
pub fn to_float(input: &Value) -> Option<f64> {
    let text = stringify(input);
    FLOAT_PREFIX
        .captures(&text)
        .and_then(|caps| caps[1].parse::<f64>().ok())
        .filter(|v| v.is_finite())
}
