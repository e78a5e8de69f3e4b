//! `__KEY__` placeholder substitution.

use regex::Regex;
use serde_json::{Map, Value};

/// Replace `__KEY__` tokens with the stringified value of `vars[KEY]`.
/// Unmatched tokens are left unchanged.
pub fn replace_placeholders(input: &str, vars: &Map<String, Value>) -> String {
    let re = Regex::new(r"__([a-zA-Z0-9_]+)__").expect("placeholder regex");
    re.replace_all(input, |caps: &regex::Captures<'_>| {
        let key = &caps[1];
        match vars.get(key) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => caps[0].to_string(),
        }
    })
    .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars() -> Map<String, Value> {
        let mut m = Map::new();
        m.insert("subject".into(), json!("renewed"));
        m.insert("count".into(), json!(3));
        m
    }

    #[test]
    fn substitutes_strings_without_quotes() {
        assert_eq!(
            replace_placeholders("msg: __subject__ (__count__)", &vars()),
            "msg: renewed (3)"
        );
    }

    #[test]
    fn unmatched_tokens_are_preserved() {
        assert_eq!(replace_placeholders("__missing__ ok", &vars()), "__missing__ ok");
    }

    #[test]
    fn repeated_tokens_all_replaced() {
        assert_eq!(
            replace_placeholders("__subject__/__subject__", &vars()),
            "renewed/renewed"
        );
    }
}
