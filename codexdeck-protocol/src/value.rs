//! Dynamic JSON payloads
//!
//! Protocol payloads are arbitrary JSON. `JsonValue` wraps `serde_json::Value`
//! so the rest of the codebase works against explicit variant accessors
//! instead of reaching into serde_json directly.

use serde::{Deserialize, Serialize};

/// An arbitrary JSON document carried in a protocol frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JsonValue(serde_json::Value);

impl JsonValue {
    /// Wrap a raw serde_json value
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// The JSON null value
    pub fn null() -> Self {
        Self(serde_json::Value::Null)
    }

    /// An empty JSON object
    pub fn empty_object() -> Self {
        Self(serde_json::Value::Object(serde_json::Map::new()))
    }

    /// Parse a JSON document from text
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text).map(Self)
    }

    /// Render as a single-line JSON document
    pub fn to_line(&self) -> String {
        // serde_json::to_string never emits raw newlines
        serde_json::to_string(&self.0).unwrap_or_else(|_| "null".to_string())
    }

    /// Get a reference to the inner value
    pub fn inner(&self) -> &serde_json::Value {
        &self.0
    }

    /// Consume the wrapper and return the inner value
    pub fn into_inner(self) -> serde_json::Value {
        self.0
    }

    /// Look up a field if this value is an object
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    /// String variant accessor
    pub fn as_str(&self) -> Option<&str> {
        self.0.as_str()
    }

    /// Unsigned integer variant accessor
    pub fn as_u64(&self) -> Option<u64> {
        self.0.as_u64()
    }

    /// Boolean variant accessor
    pub fn as_bool(&self) -> Option<bool> {
        self.0.as_bool()
    }

    /// Object variant accessor
    pub fn as_object(&self) -> Option<&serde_json::Map<String, serde_json::Value>> {
        self.0.as_object()
    }

    /// Array variant accessor
    pub fn as_array(&self) -> Option<&Vec<serde_json::Value>> {
        self.0.as_array()
    }

    /// Whether this value is JSON null
    pub fn is_null(&self) -> bool {
        self.0.is_null()
    }
}

impl From<serde_json::Value> for JsonValue {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

impl From<JsonValue> for serde_json::Value {
    fn from(value: JsonValue) -> Self {
        value.0
    }
}

impl std::fmt::Display for JsonValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_line())
    }
}
