//! YAML and JSON projections of schemas and resolved values.
//!
//! Resolved values serialize as:
//!
//! ```yaml
//! sections:
//!   app:
//!     section: { name: App, slug: app, description: "", prefix: app-, fields: {...} }
//!     fields:
//!       port:
//!         value: 9090
//!         log:
//!           - source: defaults
//!             value: 8080
//!           - source: flags
//!             value: 9090
//!             raw_inputs: ["9090"]
//!             metadata: { flag: app-port }
//! ```
//!
//! A schema serializes as a map of named section documents, the form
//! [`Schema::from_yaml_str`] loads back.

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::error::LayerfigError;
use crate::field::Definitions;
use crate::schema::Schema;
use crate::section::{Section, SectionDoc};
use crate::values::{FieldValues, Values};

#[derive(Serialize)]
struct ValuesDoc<'a> {
    sections: IndexMap<&'a str, SectionValuesDoc<'a>>,
}

#[derive(Serialize)]
struct SectionValuesDoc<'a> {
    section: SectionInfo<'a>,
    fields: &'a FieldValues,
}

#[derive(Serialize)]
struct SectionInfo<'a> {
    name: &'a str,
    slug: &'a str,
    description: &'a str,
    prefix: &'a str,
    fields: Definitions,
}

impl<'a> SectionInfo<'a> {
    fn new(section: &'a dyn Section) -> Self {
        Self {
            name: section.name(),
            slug: section.slug(),
            description: section.description(),
            prefix: section.prefix(),
            fields: section.definitions(),
        }
    }
}

fn values_doc(values: &Values) -> ValuesDoc<'_> {
    ValuesDoc {
        sections: values
            .iter()
            .map(|(slug, sv)| {
                (
                    slug.as_str(),
                    SectionValuesDoc {
                        section: SectionInfo::new(sv.section.as_ref()),
                        fields: &sv.fields,
                    },
                )
            })
            .collect(),
    }
}

fn serialize_error(what: &str, reason: impl ToString) -> LayerfigError {
    LayerfigError::Serialize {
        what: what.to_string(),
        reason: reason.to_string(),
    }
}

pub fn values_to_yaml(values: &Values) -> Result<String, LayerfigError> {
    serde_yaml::to_string(&values_doc(values)).map_err(|e| serialize_error("values", e))
}

/// Pretty-printed JSON.
pub fn values_to_json(values: &Values) -> Result<String, LayerfigError> {
    serde_json::to_string_pretty(&values_doc(values)).map_err(|e| serialize_error("values", e))
}

pub fn values_to_json_value(values: &Values) -> Result<JsonValue, LayerfigError> {
    serde_json::to_value(values_doc(values)).map_err(|e| serialize_error("values", e))
}

/// The declarative form of `schema`.
pub fn schema_to_yaml(schema: &Schema) -> Result<String, LayerfigError> {
    let docs: IndexMap<&str, SectionDoc> = schema
        .iter()
        .map(|section| (section.slug(), SectionDoc::from_section(section.as_ref())))
        .collect();
    serde_yaml::to_string(&docs).map_err(|e| serialize_error("schema", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldDefinition;
    use crate::fixtures::test::{app_schema, config_map};
    use crate::middleware::execute;
    use crate::section::{DEFAULT_SLUG, SchemaSection};
    use crate::sources::{from_defaults, from_map};
    use crate::types::FieldType;
    use serde_json::json;

    fn resolved() -> Values {
        let mut values = Values::new();
        execute(
            &app_schema(),
            &mut values,
            vec![
                from_map(config_map(&[("app", "port", json!("9090"))])),
                from_defaults(),
            ],
        )
        .unwrap();
        values
    }

    #[test]
    fn values_json_shape() {
        let doc = values_to_json_value(&resolved()).unwrap();
        let app = &doc["sections"]["app"];
        assert_eq!(app["section"]["slug"], json!("app"));
        assert_eq!(app["section"]["prefix"], json!("app-"));
        assert_eq!(app["section"]["fields"]["port"]["type"], json!("int"));

        let port = &app["fields"]["port"];
        assert_eq!(port["value"], json!(9090));
        assert_eq!(port["log"][0]["source"], json!("defaults"));
        assert_eq!(port["log"][1]["source"], json!("map"));
        assert_eq!(port["log"][1]["raw_inputs"], json!(["9090"]));
        assert!(port["log"][0].get("metadata").is_none());
    }

    #[test]
    fn values_yaml_mentions_sources() {
        let yaml = values_to_yaml(&resolved()).unwrap();
        assert!(yaml.starts_with("sections:"));
        assert!(yaml.contains("source: defaults"));
        assert!(yaml.contains("source: map"));
        let text = values_to_json(&resolved()).unwrap();
        assert!(text.contains("\"sections\""));
    }

    #[test]
    fn schema_round_trips() {
        let schema = Schema::new()
            .with_section(
                SchemaSection::new("db", "Database")
                    .with_description("Connection settings")
                    .with_prefix("db-")
                    .with_field(FieldDefinition::new("host", FieldType::String).with_default("h"))
                    .with_field(
                        FieldDefinition::new("mode", FieldType::Choice)
                            .with_choices(["ro", "rw"])
                            .required(),
                    ),
            )
            .with_section(SchemaSection::new(DEFAULT_SLUG, "Arguments").with_arguments([
                FieldDefinition::new("target", FieldType::String),
                FieldDefinition::new("rest", FieldType::StringList),
            ]));
        let yaml = schema_to_yaml(&schema).unwrap();
        let loaded = Schema::from_yaml_str(&yaml).unwrap();

        assert_eq!(loaded.slugs().collect::<Vec<_>>(), vec!["db", DEFAULT_SLUG]);
        for slug in ["db", DEFAULT_SLUG] {
            let (a, b) = (schema.get(slug).unwrap(), loaded.get(slug).unwrap());
            assert_eq!(a.name(), b.name());
            assert_eq!(a.description(), b.description());
            assert_eq!(a.prefix(), b.prefix());
            assert_eq!(a.definitions(), b.definitions());
        }
    }
}
