//! Normalized representation for values whose wire shape varies.
//!
//! Tool results, custom event values and deferred tool arguments arrive as a
//! plain string on some servers and as structured JSON on others. They are
//! normalized once at decode time so callers never branch on shape.

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

/// A decoded value that may be text, structured JSON, or both.
///
/// `raw` always holds the value exactly as received. `text` is set when the
/// value is a string or an array of `{ "text": ... }` parts.
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    raw: Value,
    text: Option<String>,
}

impl Payload {
    /// Normalize a raw JSON value.
    pub fn from_value(raw: Value) -> Self {
        let text = match &raw {
            Value::String(s) => Some(s.clone()),
            Value::Array(items) if !items.is_empty() => text_parts(items),
            _ => None,
        };
        Self { raw, text }
    }

    /// A payload holding plain text.
    pub fn text(text: impl Into<String>) -> Self {
        Self::from_value(Value::String(text.into()))
    }

    /// The value as received.
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// Consume the payload and return the value as received.
    pub fn into_raw(self) -> Value {
        self.raw
    }

    /// Text content, if the value was textual.
    pub fn as_text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    /// The value as a JSON object, if it is one.
    pub fn as_object(&self) -> Option<&Map<String, Value>> {
        self.raw.as_object()
    }

    /// Whether the value carries nothing (null, `""`, `{}` or `[]`).
    pub fn is_empty(&self) -> bool {
        match &self.raw {
            Value::Null => true,
            Value::String(s) => s.is_empty(),
            Value::Array(a) => a.is_empty(),
            Value::Object(o) => o.is_empty(),
            _ => false,
        }
    }

    /// Human-readable rendering: text as-is, anything else as pretty JSON.
    pub fn display(&self) -> String {
        match &self.text {
            Some(text) => text.clone(),
            None => serde_json::to_string_pretty(&self.raw).unwrap_or_else(|_| self.raw.to_string()),
        }
    }

    /// Compact rendering: text as-is, anything else as single-line JSON.
    pub fn compact(&self) -> String {
        match &self.text {
            Some(text) => text.clone(),
            None => self.raw.to_string(),
        }
    }
}

impl Default for Payload {
    fn default() -> Self {
        Self::from_value(Value::Null)
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Self::from_value(value)
    }
}

impl<'de> Deserialize<'de> for Payload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Self::from_value)
    }
}

/// Join an array of `{ "text": ... }` parts, or `None` if any item is not one.
fn text_parts(items: &[Value]) -> Option<String> {
    let parts: Option<Vec<&str>> = items
        .iter()
        .map(|item| item.get("text").and_then(Value::as_str))
        .collect();
    parts.map(|parts| parts.join("\n"))
}
