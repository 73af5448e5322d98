//! Operator directive parsing.
//!
//! A directive is one line received over the control FIFO: either a bare
//! control word (`resume`, `shutdown`, ...) or a JSON object with a `type`
//! field and arbitrary extra keys. Parsing must never fail - malformed input
//! degrades to an opaque command name the dispatch loop can ignore.

use serde_json::{Map, Value};

/// A parsed operator command.
///
/// The payload is an open string-keyed map because its shape is inherently
/// directive-specific and unbounded; nested values pass through unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct Directive {
    pub r#type: String,
    pub payload: Map<String, Value>,
}

impl Directive {
    pub fn new(r#type: impl Into<String>) -> Self {
        Self {
            r#type: r#type.into(),
            payload: Map::new(),
        }
    }

    /// Serialize back to the one-line wire form.
    pub fn to_wire(&self) -> String {
        if self.payload.is_empty() {
            return self.r#type.clone();
        }
        let mut obj = Map::new();
        obj.insert("type".to_string(), Value::String(self.r#type.clone()));
        for (k, v) in &self.payload {
            obj.insert(k.clone(), v.clone());
        }
        Value::Object(obj).to_string()
    }
}

/// Parse a raw FIFO message into a directive.
///
/// - bare word → that word as type, empty payload
/// - JSON object with a `type` key → that type; every other key becomes payload
/// - JSON without a `type` key, or JSON that fails to parse → the whole
///   trimmed string as type, empty payload
pub fn parse_directive(raw: &str) -> Directive {
    let trimmed = raw.trim();

    if let Ok(Value::Object(mut obj)) = serde_json::from_str::<Value>(trimmed) {
        if let Some(Value::String(dtype)) = obj.remove("type") {
            return Directive {
                r#type: dtype,
                payload: obj,
            };
        }
    }

    Directive::new(trimmed)
}
