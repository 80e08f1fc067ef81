//! Typed resolved values.

use chrono::{DateTime, FixedOffset};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};

use crate::parse::FileData;

/// A value coerced to the type declared by its field definition.
///
/// Serializes untagged, so a resolved `Integer(8080)` becomes `8080` in YAML or
/// JSON output and dates become RFC 3339 strings.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Date(DateTime<FixedOffset>),
    StringList(Vec<String>),
    IntegerList(Vec<i64>),
    FloatList(Vec<f64>),
    File(FileData),
    FileList(Vec<FileData>),
    Object(Map<String, JsonValue>),
    ObjectList(Vec<Map<String, JsonValue>>),
    KeyValue(IndexMap<String, String>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_string_list(&self) -> Option<&[String]> {
        match self {
            Value::StringList(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_key_value(&self) -> Option<&IndexMap<String, String>> {
        match self {
            Value::KeyValue(map) => Some(map),
            _ => None,
        }
    }

    /// Convert into the raw JSON model used by maps, config files and decoding.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::String(s) => JsonValue::String(s.clone()),
            Value::Integer(i) => JsonValue::from(*i),
            Value::Float(f) => JsonValue::from(*f),
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Date(d) => JsonValue::String(d.to_rfc3339()),
            Value::StringList(items) => JsonValue::from(items.clone()),
            Value::IntegerList(items) => JsonValue::from(items.clone()),
            Value::FloatList(items) => JsonValue::from(items.clone()),
            Value::File(file) => file.to_json(),
            Value::FileList(files) => JsonValue::Array(files.iter().map(FileData::to_json).collect()),
            Value::Object(map) => JsonValue::Object(map.clone()),
            Value::ObjectList(items) => {
                JsonValue::Array(items.iter().cloned().map(JsonValue::Object).collect())
            }
            Value::KeyValue(map) => JsonValue::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), JsonValue::String(v.clone())))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Vec<String>> for Value {
    fn from(items: Vec<String>) -> Self {
        Value::StringList(items)
    }
}
