use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// A value held in the variable bag: caller input, a text reply, or a
/// reply parsed as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VariableValue {
    Text(String),
    Json(serde_json::Value),
}

impl VariableValue {
    /// Text substituted for `{{name}}` when this value is referenced.
    ///
    /// JSON strings render as their contents, other JSON values as
    /// compact JSON.
    pub fn as_prompt_text(&self) -> Cow<'_, str> {
        match self {
            Self::Text(s) => Cow::Borrowed(s),
            Self::Json(serde_json::Value::String(s)) => Cow::Borrowed(s),
            Self::Json(v) => Cow::Owned(v.to_string()),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Json(_) => None,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Json(v) => Some(v),
            Self::Text(_) => None,
        }
    }
}

impl From<String> for VariableValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for VariableValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<serde_json::Value> for VariableValue {
    fn from(value: serde_json::Value) -> Self {
        Self::Json(value)
    }
}

/// Variables accumulated over one run, keyed by name.
pub type VariableBag = FxHashMap<String, VariableValue>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_renders_verbatim() {
        let v = VariableValue::from("plain");
        assert_eq!(v.as_prompt_text(), "plain");
        assert_eq!(v.as_text(), Some("plain"));
        assert!(v.as_json().is_none());
    }

    #[test]
    fn json_string_renders_contents() {
        let v = VariableValue::from(json!("inner"));
        assert_eq!(v.as_prompt_text(), "inner");
    }

    #[test]
    fn json_object_renders_compact() {
        let v = VariableValue::from(json!({"a": 1, "b": [true]}));
        assert_eq!(v.as_prompt_text(), r#"{"a":1,"b":[true]}"#);
    }

    #[test]
    fn serializes_untagged() {
        let mut bag = VariableBag::default();
        bag.insert("t".to_string(), VariableValue::from("x"));
        bag.insert("j".to_string(), VariableValue::from(json!({"k": "v"})));
        let out = serde_json::to_value(&bag).unwrap();
        assert_eq!(out["t"], "x");
        assert_eq!(out["j"]["k"], "v");
    }
}
