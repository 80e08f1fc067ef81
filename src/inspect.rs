//! Display of resolved values and their provenance.
//!
//! Backs `--print-parsed-fields` style output: [`list_values`] gives one line
//! per field, [`get_value`] the full history of a single field. Secret fields
//! are masked in both.

use std::fmt;

use crate::error::LayerfigError;
use crate::render::{mask_secret, render_value};
use crate::types::FieldType;
use crate::value::Value;
use crate::values::{FieldValue, Values};

/// One line of a listing.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingEntry {
    pub key: String,
    pub value: String,
    pub source: String,
}

/// One step of a field's history, rendered.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub source: String,
    pub value: String,
    pub detail: Option<String>,
}

/// Result of an inspection, returned to the caller for display.
#[derive(Debug, Clone, PartialEq)]
pub enum InspectResult {
    /// Every resolved field as `section.field = value (source)`.
    Listing { entries: Vec<ListingEntry> },
    /// A single field with its help text and provenance, oldest first.
    Field {
        key: String,
        value: String,
        help: String,
        history: Vec<HistoryEntry>,
    },
}

impl fmt::Display for InspectResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InspectResult::Listing { entries } => {
                for (i, entry) in entries.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{} = {} ({})", entry.key, entry.value, entry.source)?;
                }
                Ok(())
            }
            InspectResult::Field {
                key,
                value,
                help,
                history,
            } => {
                if !help.is_empty() {
                    writeln!(f, "# {help}")?;
                }
                write!(f, "{key} = {value}")?;
                for step in history {
                    write!(f, "\n  {}: {}", step.source, step.value)?;
                    if let Some(detail) = &step.detail {
                        write!(f, " [{detail}]")?;
                    }
                }
                Ok(())
            }
        }
    }
}

fn display_value(field: &FieldValue, value: &Value) -> String {
    let rendered = render_value(value);
    if field.definition.field_type == FieldType::Secret {
        mask_secret(&rendered)
    } else {
        rendered
    }
}

/// List every resolved field in section and field order.
pub fn list_values(values: &Values) -> InspectResult {
    let entries = values
        .iter()
        .flat_map(|(slug, sv)| {
            sv.fields.iter().map(move |(name, field)| ListingEntry {
                key: format!("{slug}.{name}"),
                value: display_value(field, &field.value),
                source: field.last_source().unwrap_or_default().to_string(),
            })
        })
        .collect();
    InspectResult::Listing { entries }
}

/// Look up one field by `section.field`.
pub fn get_value(values: &Values, key: &str) -> Result<InspectResult, LayerfigError> {
    let not_found = || LayerfigError::FieldNotFound(key.to_string());
    let (slug, name) = key.split_once('.').ok_or_else(not_found)?;
    let field = values.field(slug, name).ok_or_else(not_found)?;

    let history = field
        .log
        .iter()
        .map(|step| HistoryEntry {
            source: step.source.clone(),
            value: display_value(field, &step.value),
            detail: (!step.metadata.is_empty()).then(|| {
                step.metadata
                    .iter()
                    .map(|(k, v)| match v {
                        serde_json::Value::String(s) => format!("{k}={s}"),
                        other => format!("{k}={other}"),
                    })
                    .collect::<Vec<_>>()
                    .join(", ")
            }),
        })
        .collect();

    Ok(InspectResult::Field {
        key: key.to_string(),
        value: display_value(field, &field.value),
        help: field.definition.help.clone(),
        history,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::field::FieldDefinition;
    use crate::fixtures::test::{app_schema, config_map};
    use crate::middleware::execute;
    use crate::schema::Schema;
    use crate::section::SchemaSection;
    use crate::sources::{from_defaults, from_env_vars, from_map};
    use serde_json::json;

    fn resolved() -> Values {
        let mut values = Values::new();
        let vars = vec![("DEMO_APP_PORT".to_string(), "9090".to_string())];
        execute(&app_schema(), &mut values, vec![from_env_vars("DEMO", vars), from_defaults()])
            .unwrap();
        values
    }

    #[test]
    fn listing_shows_value_and_source() {
        let out = list_values(&resolved()).to_string();
        assert!(out.contains("app.port = 9090 (env)"));
        assert!(out.contains("app.host = localhost (defaults)"));
        assert_eq!(out.lines().count(), 3);
    }

    #[test]
    fn field_shows_history() {
        let result = get_value(&resolved(), "app.port").unwrap();
        match &result {
            InspectResult::Field { value, history, .. } => {
                assert_eq!(value, "9090");
                assert_eq!(history.len(), 2);
                assert_eq!(history[0].source, "defaults");
                assert_eq!(history[0].value, "8080");
                assert_eq!(history[1].detail.as_deref(), Some("env_key=DEMO_APP_PORT"));
            }
            other => panic!("Expected Field, got: {other:?}"),
        }
        let text = result.to_string();
        assert!(text.starts_with("# "));
        assert!(text.contains("app.port = 9090"));
        assert!(text.contains("env: 9090 [env_key=DEMO_APP_PORT]"));
    }

    #[test]
    fn unknown_key() {
        let err = get_value(&resolved(), "app.nope").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Schema);
        assert!(get_value(&resolved(), "port").is_err());
    }

    #[test]
    fn secrets_are_masked() {
        let schema = Schema::new().with_section(
            SchemaSection::new("auth", "Auth")
                .with_field(FieldDefinition::new("token", FieldType::Secret).with_default("abc")),
        );
        let mut values = Values::new();
        execute(
            &schema,
            &mut values,
            vec![
                from_map(config_map(&[("auth", "token", json!("supersecret"))])),
                from_defaults(),
            ],
        )
        .unwrap();
        assert_eq!(list_values(&values).to_string(), "auth.token = su***et (map)");
        let text = get_value(&values, "auth.token").unwrap().to_string();
        assert!(!text.contains("supersecret"));
        assert!(text.contains("defaults: ***"));
    }
}
