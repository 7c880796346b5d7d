//! Normalization of raw query results into a single match signal.

use serde_json::Value;

/// Collapse an evaluator result into a boolean.
///
/// - arrays match if any element matches (empty arrays never match)
/// - objects match if they have at least one field
/// - strings match unless they are literally `"false"`
/// - numbers match unless zero, `null` never matches
pub fn is_true(value: &Value) -> bool {
    match value {
        Value::Array(items) => items.iter().any(is_true),
        Value::Object(fields) => !fields.is_empty(),
        Value::String(text) => text != "false",
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::Null => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_structures_do_not_match() {
        assert!(!is_true(&json!([])));
        assert!(!is_true(&json!({})));
        assert!(!is_true(&Value::Null));
        assert!(!is_true(&json!([null])));
    }

    #[test]
    fn literal_false_string_does_not_match() {
        assert!(!is_true(&json!("false")));
        assert!(!is_true(&json!(["false", null, [], {}])));
    }

    #[test]
    fn populated_values_match() {
        assert!(is_true(&json!("x")));
        assert!(is_true(&json!("true")));
        assert!(is_true(&json!("")));
        assert!(is_true(&json!([1])));
        assert!(is_true(&json!({"a": 1})));
        assert!(is_true(&json!({"hey": ""})));
        assert!(is_true(&json!(true)));
    }

    #[test]
    fn numbers_follow_zero_check() {
        assert!(!is_true(&json!(0)));
        assert!(!is_true(&json!(0.0)));
        assert!(is_true(&json!(-2)));
    }

    #[test]
    fn nested_arrays_match_on_any_leaf() {
        assert!(is_true(&json!([[], [{}], [[false, "ok"]]])));
        assert!(!is_true(&json!([[], [{}], [[false]]])));
    }
}
