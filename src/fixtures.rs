#[cfg(test)]
pub mod test {
    use serde::{Deserialize, Serialize};
    use serde_json::Value as JsonValue;

    use crate::field::FieldDefinition;
    use crate::schema::Schema;
    use crate::section::SchemaSection;
    use crate::types::{ConfigMap, FieldType};

    /// Section `app` (prefix `app-`) with `verbose`, `port` and `host`.
    pub fn app_section() -> SchemaSection {
        SchemaSection::new("app", "Application")
            .with_prefix("app-")
            .with_field(
                FieldDefinition::new("verbose", FieldType::Bool)
                    .with_help("Enable verbose output")
                    .with_short_flag('v')
                    .with_default(false),
            )
            .with_field(
                FieldDefinition::new("port", FieldType::Integer)
                    .with_help("Port to listen on")
                    .with_default(8080),
            )
            .with_field(
                FieldDefinition::new("host", FieldType::String)
                    .with_help("Host to bind")
                    .with_default("localhost"),
            )
    }

    pub fn app_schema() -> Schema {
        Schema::new().with_section(app_section())
    }

    /// Build a canonical map from `(section, field, value)` triples.
    pub fn config_map(entries: &[(&str, &str, JsonValue)]) -> ConfigMap {
        let mut map = ConfigMap::new();
        for (section, field, value) in entries {
            map.entry(section.to_string())
                .or_default()
                .insert(field.to_string(), value.clone());
        }
        map
    }

    #[derive(Serialize, Deserialize, Debug, Default, PartialEq)]
    pub struct AppSettings {
        pub verbose: bool,
        pub port: i64,
        pub host: String,
    }

    #[test]
    fn app_schema_is_valid() {
        app_schema().validate().unwrap();
    }

    #[test]
    fn config_map_groups_sections() {
        let map = config_map(&[
            ("a", "x", JsonValue::from(1)),
            ("b", "y", JsonValue::from(2)),
            ("a", "z", JsonValue::from(3)),
        ]);
        assert_eq!(map.len(), 2);
        assert_eq!(map["a"].len(), 2);
    }
}
