//! Parsing raw string inputs into typed values.
//!
//! Raw inputs are what the command line, environment variables and string
//! entries of config maps provide. Scalar types consume exactly one input.
//! List types take several inputs as-is, or split a single input on commas
//! after stripping an optional surrounding `[...]`. File-backed types treat
//! their inputs as paths and read them fully before returning.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Days, FixedOffset, NaiveDate, NaiveDateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::error::LayerfigError;
use crate::field::FieldDefinition;
use crate::file::{ConfigFormat, read_structured};
use crate::types::FieldType;
use crate::value::Value;

/// Metadata and content of a file loaded by a `file` or `fileList` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileData {
    pub path: PathBuf,
    pub absolute_path: PathBuf,
    pub base_name: String,
    pub extension: String,
    pub file_type: FileType,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parsed_content: Option<JsonValue>,
    pub is_list: bool,
    pub is_object: bool,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Json,
    Yaml,
    Toml,
    Text,
}

impl FileData {
    /// Read `path` and collect its metadata. Structured formats are parsed
    /// eagerly so malformed files fail here rather than at use.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LayerfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| LayerfigError::io(path, e))?;
        let metadata = std::fs::metadata(path).map_err(|e| LayerfigError::io(path, e))?;

        let file_type = match ConfigFormat::from_path(path) {
            Some(ConfigFormat::Json) => FileType::Json,
            Some(ConfigFormat::Yaml) => FileType::Yaml,
            Some(ConfigFormat::Toml) => FileType::Toml,
            None => FileType::Text,
        };
        let parsed_content = match ConfigFormat::from_path(path) {
            Some(format) => Some(format.parse(&content, path)?),
            None => None,
        };

        Ok(FileData {
            path: path.to_path_buf(),
            absolute_path: std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf()),
            base_name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            extension: path
                .extension()
                .map(|e| e.to_string_lossy().into_owned())
                .unwrap_or_default(),
            file_type,
            is_list: parsed_content.as_ref().is_some_and(JsonValue::is_array),
            is_object: parsed_content.as_ref().is_some_and(JsonValue::is_object),
            parsed_content,
            content,
            size: metadata.len(),
            last_modified: metadata.modified().ok().map(DateTime::<Utc>::from),
        })
    }

    pub fn to_json(&self) -> JsonValue {
        serde_json::to_value(self).unwrap_or(JsonValue::Null)
    }
}

impl FieldDefinition {
    /// Parse raw string inputs into a value of the declared type.
    pub fn parse(&self, inputs: &[String]) -> Result<Value, LayerfigError> {
        let split;
        let inputs = if self.field_type.splits_single_input() && inputs.len() == 1 {
            split = split_list(&inputs[0]);
            split.as_slice()
        } else {
            inputs
        };

        match self.field_type {
            FieldType::String | FieldType::Secret => Ok(Value::String(self.single(inputs)?.into())),
            FieldType::Integer => self.parse_i64(self.single(inputs)?).map(Value::Integer),
            FieldType::Float => self.parse_f64(self.single(inputs)?).map(Value::Float),
            FieldType::Bool => {
                let raw = self.single(inputs)?;
                parse_bool(raw).map(Value::Bool).ok_or_else(|| {
                    LayerfigError::parse(&self.name, format!("expected a bool, got '{raw}'"))
                })
            }
            FieldType::Date => {
                let raw = self.single(inputs)?;
                parse_date(raw)
                    .map(Value::Date)
                    .ok_or_else(|| LayerfigError::parse(&self.name, format!("invalid date '{raw}'")))
            }
            FieldType::Choice => {
                let raw = self.single(inputs)?;
                self.check_choice(raw)?;
                Ok(Value::String(raw.to_string()))
            }
            FieldType::StringList => Ok(Value::StringList(inputs.to_vec())),
            FieldType::ChoiceList => {
                for item in inputs {
                    self.check_choice(item)?;
                }
                Ok(Value::StringList(inputs.to_vec()))
            }
            FieldType::IntegerList => inputs
                .iter()
                .map(|s| self.parse_i64(s))
                .collect::<Result<_, _>>()
                .map(Value::IntegerList),
            FieldType::FloatList => inputs
                .iter()
                .map(|s| self.parse_f64(s))
                .collect::<Result<_, _>>()
                .map(Value::FloatList),
            FieldType::KeyValue => self.parse_key_values(inputs).map(Value::KeyValue),
            FieldType::File => FileData::load(self.single(inputs)?).map(Value::File),
            FieldType::FileList => inputs
                .iter()
                .map(|path| FileData::load(path))
                .collect::<Result<_, _>>()
                .map(Value::FileList),
            FieldType::StringFromFile => read_text(self.single(inputs)?).map(Value::String),
            FieldType::StringFromFiles => {
                let mut out = String::new();
                for path in inputs {
                    out.push_str(&read_text(path)?);
                }
                Ok(Value::String(out))
            }
            FieldType::StringListFromFile | FieldType::StringListFromFiles => {
                let mut out = Vec::new();
                for path in inputs {
                    out.extend(self.read_string_list(Path::new(path))?);
                }
                Ok(Value::StringList(out))
            }
            FieldType::ObjectFromFile => {
                let path = self.single(inputs)?;
                match read_structured(Path::new(path))? {
                    JsonValue::Object(map) => Ok(Value::Object(map)),
                    other => Err(LayerfigError::parse(
                        &self.name,
                        format!("{path} does not contain an object (found {})", json_kind(&other)),
                    )),
                }
            }
            FieldType::ObjectListFromFile | FieldType::ObjectListFromFiles => {
                let mut out = Vec::new();
                for path in inputs {
                    out.extend(self.read_object_list(Path::new(path))?);
                }
                Ok(Value::ObjectList(out))
            }
        }
    }

    fn single<'a>(&self, inputs: &'a [String]) -> Result<&'a str, LayerfigError> {
        match inputs {
            [one] => Ok(one),
            [] => Err(LayerfigError::parse(&self.name, "no value provided")),
            many => Err(LayerfigError::parse(
                &self.name,
                format!("expected a single value, got {}", many.len()),
            )),
        }
    }

    fn parse_i64(&self, raw: &str) -> Result<i64, LayerfigError> {
        raw.trim().parse::<i64>().map_err(|_| {
            LayerfigError::parse(&self.name, format!("expected an integer, got '{raw}'"))
        })
    }

    fn parse_f64(&self, raw: &str) -> Result<f64, LayerfigError> {
        raw.trim().parse::<f64>().map_err(|_| {
            LayerfigError::parse(&self.name, format!("expected a number, got '{raw}'"))
        })
    }

    fn parse_key_values(&self, inputs: &[String]) -> Result<IndexMap<String, String>, LayerfigError> {
        let mut out = IndexMap::new();
        for input in inputs {
            if let Some(path) = input.strip_prefix('@') {
                let JsonValue::Object(map) = read_structured(Path::new(path))? else {
                    return Err(LayerfigError::parse(
                        &self.name,
                        format!("{path} does not contain a map"),
                    ));
                };
                for (k, v) in map {
                    let v = match v {
                        JsonValue::String(s) => s,
                        JsonValue::Number(n) => n.to_string(),
                        JsonValue::Bool(b) => b.to_string(),
                        other => {
                            return Err(LayerfigError::parse(
                                &self.name,
                                format!("value for key '{k}' in {path} is not a scalar: {other}"),
                            ));
                        }
                    };
                    out.insert(k, v);
                }
                continue;
            }
            let Some((key, value)) = input.split_once(':') else {
                return Err(LayerfigError::parse(
                    &self.name,
                    format!("expected key:value, got '{input}'"),
                ));
            };
            out.insert(key.trim().to_string(), value.trim().to_string());
        }
        Ok(out)
    }

    fn read_string_list(&self, path: &Path) -> Result<Vec<String>, LayerfigError> {
        if ConfigFormat::from_path(path).is_some() {
            return match read_structured(path)? {
                JsonValue::Array(items) => items
                    .into_iter()
                    .map(|item| match item {
                        JsonValue::String(s) => Ok(s),
                        JsonValue::Number(n) => Ok(n.to_string()),
                        JsonValue::Bool(b) => Ok(b.to_string()),
                        other => Err(LayerfigError::parse(
                            &self.name,
                            format!("list item in {} is not a scalar: {other}", path.display()),
                        )),
                    })
                    .collect(),
                other => Err(LayerfigError::parse(
                    &self.name,
                    format!("{} does not contain a list (found {})", path.display(), json_kind(&other)),
                )),
            };
        }
        let content = read_text(path)?;
        Ok(content.lines().map(str::to_string).collect())
    }

    fn read_object_list(&self, path: &Path) -> Result<Vec<Map<String, JsonValue>>, LayerfigError> {
        match read_structured(path)? {
            JsonValue::Object(map) => Ok(vec![map]),
            JsonValue::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    JsonValue::Object(map) => Ok(map),
                    other => Err(LayerfigError::parse(
                        &self.name,
                        format!("list item in {} is not an object: {other}", path.display()),
                    )),
                })
                .collect(),
            other => Err(LayerfigError::parse(
                &self.name,
                format!("{} holds {}, expected objects", path.display(), json_kind(&other)),
            )),
        }
    }
}

/// Split a single list input: trim, drop an optional surrounding `[...]`, split
/// on commas and trim each item. An empty input yields an empty list.
pub fn split_list(raw: &str) -> Vec<String> {
    let trimmed = raw.trim();
    let inner = trimmed
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .unwrap_or(trimmed)
        .trim();
    if inner.is_empty() {
        return Vec::new();
    }
    inner.split(',').map(|s| s.trim().to_string()).collect()
}

pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "1" | "yes" | "y" | "on" => Some(true),
        "false" | "f" | "0" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

/// Parse the date forms accepted by `date` fields. Forms without an offset are
/// taken as UTC.
pub fn parse_date(raw: &str) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    let now = Utc::now();
    let today = now.date_naive();
    match raw.to_ascii_lowercase().as_str() {
        "now" => return Some(now.fixed_offset()),
        "today" => return midnight(today),
        "yesterday" => return today.checked_sub_days(Days::new(1)).and_then(midnight),
        "tomorrow" => return today.checked_add_days(Days::new(1)).and_then(midnight),
        _ => {}
    }

    if let Ok(date) = DateTime::parse_from_rfc3339(raw) {
        return Some(date);
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc().fixed_offset());
        }
    }
    for format in ["%Y-%m-%d", "%Y/%m/%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return midnight(date);
        }
    }
    None
}

fn midnight(date: NaiveDate) -> Option<DateTime<FixedOffset>> {
    date.and_hms_opt(0, 0, 0)
        .map(|naive| naive.and_utc().fixed_offset())
}

fn read_text(path: impl AsRef<Path>) -> Result<String, LayerfigError> {
    let path = path.as_ref();
    std::fs::read_to_string(path).map_err(|e| LayerfigError::io(path, e))
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a bool",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "a list",
        JsonValue::Object(_) => "an object",
    }
}
