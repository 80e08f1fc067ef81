//! Rendering resolved values back to strings for display.

use crate::error::LayerfigError;
use crate::field::FieldDefinition;
use crate::types::FieldType;
use crate::value::Value;

/// Render a value the way it would be typed on the command line.
pub fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Integer(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Date(d) => d.to_rfc3339(),
        Value::StringList(items) => items.join(","),
        Value::IntegerList(items) => join(items),
        Value::FloatList(items) => join(items),
        Value::File(file) => file.path.display().to_string(),
        Value::FileList(files) => files
            .iter()
            .map(|f| f.path.display().to_string())
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(map) => serde_json::Value::Object(map.clone()).to_string(),
        Value::ObjectList(items) => serde_json::Value::Array(
            items
                .iter()
                .cloned()
                .map(serde_json::Value::Object)
                .collect(),
        )
        .to_string(),
        Value::KeyValue(map) => map
            .iter()
            .map(|(k, v)| format!("{k}:{v}"))
            .collect::<Vec<_>>()
            .join(","),
    }
}

fn join<T: ToString>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Mask a secret for display: short values are hidden entirely, longer ones
/// keep their first and last two characters.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 6 {
        return "***".to_string();
    }
    let head: String = chars[..2].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{head}***{tail}")
}

impl FieldDefinition {
    /// Render `value`, failing when it does not match the declared type.
    pub fn render(&self, value: &Value) -> Result<String, LayerfigError> {
        let matches = match self.field_type {
            FieldType::String | FieldType::Secret | FieldType::Choice => {
                matches!(value, Value::String(_))
            }
            FieldType::StringFromFile | FieldType::StringFromFiles => {
                matches!(value, Value::String(_))
            }
            FieldType::Integer => matches!(value, Value::Integer(_)),
            FieldType::Float => matches!(value, Value::Float(_) | Value::Integer(_)),
            FieldType::Bool => matches!(value, Value::Bool(_)),
            FieldType::Date => matches!(value, Value::Date(_)),
            FieldType::StringList
            | FieldType::ChoiceList
            | FieldType::StringListFromFile
            | FieldType::StringListFromFiles => matches!(value, Value::StringList(_)),
            FieldType::IntegerList => matches!(value, Value::IntegerList(_)),
            FieldType::FloatList => matches!(value, Value::FloatList(_)),
            FieldType::File => matches!(value, Value::File(_)),
            FieldType::FileList => matches!(value, Value::FileList(_)),
            FieldType::ObjectFromFile => matches!(value, Value::Object(_)),
            FieldType::ObjectListFromFile | FieldType::ObjectListFromFiles => {
                matches!(value, Value::ObjectList(_))
            }
            FieldType::KeyValue => matches!(value, Value::KeyValue(_)),
        };
        if !matches {
            return Err(LayerfigError::parse(
                &self.name,
                format!("cannot render {value:?} as {}", self.field_type),
            ));
        }
        Ok(render_value(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use indexmap::IndexMap;

    #[test]
    fn lists_join_with_commas() {
        assert_eq!(render_value(&Value::IntegerList(vec![1, 2, 3])), "1,2,3");
        assert_eq!(
            render_value(&Value::StringList(vec!["a".into(), "b".into()])),
            "a,b"
        );
    }

    #[test]
    fn key_values_render_as_pairs() {
        let mut map = IndexMap::new();
        map.insert("env".to_string(), "prod".to_string());
        map.insert("tier".to_string(), "1".to_string());
        assert_eq!(render_value(&Value::KeyValue(map)), "env:prod,tier:1");
    }

    #[test]
    fn dates_render_rfc3339() {
        let d = DateTime::parse_from_rfc3339("2024-01-02T03:04:05+00:00").unwrap();
        assert_eq!(render_value(&Value::Date(d)), "2024-01-02T03:04:05+00:00");
    }

    #[test]
    fn render_parse_round_trip() {
        let def = FieldDefinition::new("port", FieldType::Integer);
        let rendered = def.render(&Value::Integer(9090)).unwrap();
        assert_eq!(def.parse(&[rendered]).unwrap(), Value::Integer(9090));

        let def = FieldDefinition::new("tags", FieldType::StringList);
        let v = Value::StringList(vec!["x".into(), "y".into()]);
        assert_eq!(def.parse(&[def.render(&v).unwrap()]).unwrap(), v);
    }

    #[test]
    fn render_rejects_mismatched_type() {
        let def = FieldDefinition::new("port", FieldType::Integer);
        assert!(def.render(&Value::from("x")).is_err());
    }

    #[test]
    fn masks_secrets() {
        assert_eq!(mask_secret("abc"), "***");
        assert_eq!(mask_secret("abcdef"), "***");
        assert_eq!(mask_secret("supersecret"), "su***et");
    }
}
