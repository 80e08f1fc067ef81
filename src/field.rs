//! Field definitions: the typed descriptor of a single parameter.
//!
//! A [`FieldDefinition`] carries the name, [`FieldType`], optional default and
//! choices, and the flags that drive the CLI adapter (`required`,
//! `is_argument`, `short_flag`). Raw parsing of string inputs lives in
//! [`parse`](crate::parse); this module covers coercion of structured values
//! (defaults, map entries, config-file values) and the definition invariants.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::LayerfigError;
use crate::parse::parse_date;
use crate::types::FieldType;
use crate::value::Value;

/// Typed descriptor for one parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub help: String,
    #[serde(default, rename = "shortFlag", skip_serializing_if = "Option::is_none")]
    pub short_flag: Option<char>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub required: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_argument: bool,
}

impl FieldDefinition {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            help: String::new(),
            short_flag: None,
            default: None,
            choices: Vec::new(),
            required: false,
            is_argument: false,
        }
    }

    pub fn with_default(mut self, default: impl Into<JsonValue>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn with_choices<I, S>(mut self, choices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.choices = choices.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = help.into();
        self
    }

    pub fn with_short_flag(mut self, short: char) -> Self {
        self.short_flag = Some(short);
        self
    }

    /// Mark the field as mandatory once the full chain has run.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Mark the field as a positional argument rather than a flag.
    pub fn argument(mut self) -> Self {
        self.is_argument = true;
        self
    }

    /// Check the definition invariants: a non-empty name, choices for choice
    /// types, and a default that coerces to the declared type.
    pub fn validate(&self) -> Result<(), LayerfigError> {
        if self.name.trim().is_empty() {
            return Err(LayerfigError::Schema("field name must not be empty".into()));
        }
        if self.field_type.is_choice() && self.choices.is_empty() {
            return Err(LayerfigError::Schema(format!(
                "field '{}' has type {} but declares no choices",
                self.name, self.field_type
            )));
        }
        self.check_default_validity()?;
        Ok(())
    }

    /// Return the default coerced to the declared type, `None` when no default
    /// is declared.
    pub fn check_default_validity(&self) -> Result<Option<Value>, LayerfigError> {
        let Some(default) = &self.default else {
            return Ok(None);
        };
        if self.field_type.is_choice() && self.choices.is_empty() {
            return Err(LayerfigError::InvalidDefault {
                field: self.name.clone(),
                reason: "choice type without choices".into(),
            });
        }
        self.check_value(default)
            .map(Some)
            .map_err(|e| LayerfigError::InvalidDefault {
                field: self.name.clone(),
                reason: match e {
                    LayerfigError::Parse { reason, .. } => reason,
                    other => other.to_string(),
                },
            })
    }

    /// Coerce a raw value coming from a map, a profile or a config file.
    ///
    /// Strings are parsed like command-line input (so `"8080"` is a valid
    /// integer and `"a,b"` a valid list); structured values are checked
    /// against the declared type.
    pub fn coerce(&self, raw: &JsonValue) -> Result<Value, LayerfigError> {
        match raw {
            JsonValue::String(s)
                if !matches!(self.field_type, FieldType::String | FieldType::Secret) =>
            {
                self.parse(std::slice::from_ref(s))
            }
            _ => self.check_value(raw),
        }
    }

    /// Coerce an already-structured value to the declared type.
    pub fn check_value(&self, raw: &JsonValue) -> Result<Value, LayerfigError> {
        match self.field_type {
            FieldType::String | FieldType::Secret => Ok(Value::String(self.json_str(raw)?.into())),
            FieldType::Integer => self.json_i64(raw).map(Value::Integer),
            FieldType::Float => self.json_f64(raw).map(Value::Float),
            FieldType::Bool => raw
                .as_bool()
                .map(Value::Bool)
                .ok_or_else(|| self.type_error("a bool", raw)),
            FieldType::Date => {
                let s = self.json_str(raw)?;
                parse_date(s)
                    .map(Value::Date)
                    .ok_or_else(|| LayerfigError::parse(&self.name, format!("invalid date '{s}'")))
            }
            FieldType::Choice => {
                let s = self.json_str(raw)?;
                self.check_choice(s)?;
                Ok(Value::String(s.to_string()))
            }
            FieldType::StringList => self
                .json_array(raw)?
                .iter()
                .map(|item| self.json_str(item).map(str::to_string))
                .collect::<Result<_, _>>()
                .map(Value::StringList),
            FieldType::ChoiceList => {
                let items = self
                    .json_array(raw)?
                    .iter()
                    .map(|item| self.json_str(item).map(str::to_string))
                    .collect::<Result<Vec<_>, _>>()?;
                for item in &items {
                    self.check_choice(item)?;
                }
                Ok(Value::StringList(items))
            }
            FieldType::IntegerList => self
                .json_array(raw)?
                .iter()
                .map(|item| self.json_i64(item))
                .collect::<Result<_, _>>()
                .map(Value::IntegerList),
            FieldType::FloatList => self
                .json_array(raw)?
                .iter()
                .map(|item| self.json_f64(item))
                .collect::<Result<_, _>>()
                .map(Value::FloatList),
            FieldType::KeyValue => match raw {
                JsonValue::Object(map) => {
                    let mut out = IndexMap::new();
                    for (k, v) in map {
                        out.insert(k.clone(), self.scalar_to_string(v)?);
                    }
                    Ok(Value::KeyValue(out))
                }
                JsonValue::Array(_) => {
                    let inputs = self.string_items(raw)?;
                    self.parse(&inputs)
                }
                other => Err(self.type_error("a map of strings", other)),
            },
            FieldType::ObjectFromFile => match raw {
                JsonValue::Object(map) => Ok(Value::Object(map.clone())),
                _ => self.parse(&self.string_items(raw)?),
            },
            FieldType::ObjectListFromFile | FieldType::ObjectListFromFiles => match raw {
                JsonValue::Array(items) if items.iter().all(JsonValue::is_object) => {
                    Ok(Value::ObjectList(
                        items
                            .iter()
                            .filter_map(|item| item.as_object().cloned())
                            .collect(),
                    ))
                }
                JsonValue::Object(map) => Ok(Value::ObjectList(vec![map.clone()])),
                _ => self.parse(&self.string_items(raw)?),
            },
            FieldType::File
            | FieldType::FileList
            | FieldType::StringFromFile
            | FieldType::StringFromFiles
            | FieldType::StringListFromFile
            | FieldType::StringListFromFiles => self.parse(&self.string_items(raw)?),
        }
    }

    pub(crate) fn check_choice(&self, candidate: &str) -> Result<(), LayerfigError> {
        if self.choices.iter().any(|c| c == candidate) {
            return Ok(());
        }
        Err(LayerfigError::parse(
            &self.name,
            format!(
                "'{candidate}' is not a valid choice (expected one of: {})",
                self.choices.join(", ")
            ),
        ))
    }

    fn type_error(&self, expected: &str, got: &JsonValue) -> LayerfigError {
        LayerfigError::parse(&self.name, format!("expected {expected}, got {got}"))
    }

    fn json_str<'a>(&self, raw: &'a JsonValue) -> Result<&'a str, LayerfigError> {
        raw.as_str().ok_or_else(|| self.type_error("a string", raw))
    }

    fn json_array<'a>(&self, raw: &'a JsonValue) -> Result<&'a Vec<JsonValue>, LayerfigError> {
        raw.as_array().ok_or_else(|| self.type_error("a list", raw))
    }

    fn json_i64(&self, raw: &JsonValue) -> Result<i64, LayerfigError> {
        if let Some(i) = raw.as_i64() {
            return Ok(i);
        }
        match raw.as_f64() {
            Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 => {
                Ok(f as i64)
            }
            _ => Err(self.type_error("an integer", raw)),
        }
    }

    fn json_f64(&self, raw: &JsonValue) -> Result<f64, LayerfigError> {
        raw.as_f64().ok_or_else(|| self.type_error("a number", raw))
    }

    fn scalar_to_string(&self, raw: &JsonValue) -> Result<String, LayerfigError> {
        match raw {
            JsonValue::String(s) => Ok(s.clone()),
            JsonValue::Number(n) => Ok(n.to_string()),
            JsonValue::Bool(b) => Ok(b.to_string()),
            other => Err(self.type_error("a scalar", other)),
        }
    }

    /// Accept a single string or a list of strings, as file paths or `k:v` pairs.
    fn string_items(&self, raw: &JsonValue) -> Result<Vec<String>, LayerfigError> {
        match raw {
            JsonValue::String(s) => Ok(vec![s.clone()]),
            JsonValue::Array(items) => items
                .iter()
                .map(|item| self.json_str(item).map(str::to_string))
                .collect(),
            other => Err(self.type_error("a string or a list of strings", other)),
        }
    }
}

/// Insertion-ordered `name → FieldDefinition` map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Definitions(IndexMap<String, FieldDefinition>);

impl Definitions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a definition keyed by its name. An existing entry with the same
    /// name is replaced in place.
    pub fn insert(&mut self, definition: FieldDefinition) {
        self.0.insert(definition.name.clone(), definition);
    }

    pub fn get(&self, name: &str) -> Option<&FieldDefinition> {
        self.0.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut FieldDefinition> {
        self.0.get_mut(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<FieldDefinition> {
        self.0.shift_remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.0.values()
    }

    /// Definitions registered as flags.
    pub fn flags(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.iter().filter(|d| !d.is_argument)
    }

    /// Definitions registered as positional arguments, in declaration order.
    pub fn arguments(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.iter().filter(|d| d.is_argument)
    }

    /// A fresh map holding only the definitions accepted by `keep`.
    pub fn filtered(&self, mut keep: impl FnMut(&FieldDefinition) -> bool) -> Definitions {
        self.iter().filter(|d| keep(d)).cloned().collect()
    }
}

impl FromIterator<FieldDefinition> for Definitions {
    fn from_iter<I: IntoIterator<Item = FieldDefinition>>(iter: I) -> Self {
        let mut defs = Definitions::new();
        for def in iter {
            defs.insert(def);
        }
        defs
    }
}

impl IntoIterator for Definitions {
    type Item = FieldDefinition;
    type IntoIter = indexmap::map::IntoValues<String, FieldDefinition>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_values()
    }
}
