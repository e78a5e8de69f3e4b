//! Loose coercions for node-config values.
//!
//! Graph editors and older exports store flags and ids inconsistently
//! (`1`, `"1"`, `true`, `"true"`; numbers where strings are expected).
//! These helpers accept every historical encoding.

use serde_json::Value;

/// Truthy check accepting bool, positive numbers, and `"1"`/`"true"`.
pub fn as_bool_loose(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f > 0.0).unwrap_or(false),
        Value::String(s) => s == "1" || s == "true",
        _ => false,
    }
}

/// String coercion accepting strings and numbers (integers render without
/// a fractional part).
pub fn as_string_loose(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(i.to_string())
            } else {
                n.as_f64().map(|f| (f as i64).to_string())
            }
        }
        _ => None,
    }
}

/// Integer coercion accepting numbers and numeric strings.
pub fn as_i64_loose(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bool_accepts_all_encodings() {
        for v in [json!(true), json!(1), json!(1.0), json!("1"), json!("true")] {
            assert!(as_bool_loose(&v), "{v} should be truthy");
        }
        for v in [json!(false), json!(0), json!("0"), json!("no"), json!(null)] {
            assert!(!as_bool_loose(&v), "{v} should be falsy");
        }
    }

    #[test]
    fn string_renders_numbers_without_fraction() {
        assert_eq!(as_string_loose(&json!(3)).as_deref(), Some("3"));
        assert_eq!(as_string_loose(&json!(3.0)).as_deref(), Some("3"));
        assert_eq!(as_string_loose(&json!("id-7")).as_deref(), Some("id-7"));
        assert_eq!(as_string_loose(&json!([])), None);
    }

    #[test]
    fn i64_parses_numeric_strings() {
        assert_eq!(as_i64_loose(&json!("42")), Some(42));
        assert_eq!(as_i64_loose(&json!(42.9)), Some(42));
        assert_eq!(as_i64_loose(&json!("x")), None);
    }
}
