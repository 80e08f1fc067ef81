//! Resolved values with provenance.
//!
//! Every write to a field appends a [`ParseStep`] to its log, so the final
//! value can always be traced back through the sources that touched it.
//!
//! Two update semantics exist:
//!
//! - [`FieldValues::update`] overrides the value and appends the step.
//! - [`FieldValues::update_as_default`] only writes while the field has been
//!   set by defaults alone. Re-applying the same value from the same source is
//!   a no-op, so running the defaults twice resolves the same as running them
//!   once.

use std::borrow::Cow;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value as JsonValue};

use crate::error::LayerfigError;
use crate::field::FieldDefinition;
use crate::section::{DEFAULT_SLUG, SchemaSection, Section};
use crate::value::Value;

/// Source labels recorded in parse steps by the built-in middlewares.
pub mod source {
    pub const DEFAULTS: &str = "defaults";
    pub const CONFIG: &str = "config";
    pub const ENV: &str = "env";
    pub const FLAGS: &str = "flags";
    pub const ARGUMENTS: &str = "arguments";
    pub const MAP: &str = "map";
    pub const PROFILES: &str = "profiles";
    pub const PROVIDED_VALUES: &str = "provided-values";
}

/// One entry of a field's provenance log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParseStep {
    pub source: String,
    pub value: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_inputs: Option<Vec<String>>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub metadata: IndexMap<String, JsonValue>,
}

impl ParseStep {
    pub fn new(source: impl Into<String>, value: Value) -> Self {
        Self {
            source: source.into(),
            value,
            raw_inputs: None,
            metadata: IndexMap::new(),
        }
    }

    pub fn with_raw_inputs(mut self, inputs: Vec<String>) -> Self {
        self.raw_inputs = Some(inputs);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_metadata_map(mut self, metadata: &IndexMap<String, JsonValue>) -> Self {
        for (k, v) in metadata {
            self.metadata.insert(k.clone(), v.clone());
        }
        self
    }
}

/// A resolved value together with its definition and provenance log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldValue {
    #[serde(skip)]
    pub definition: FieldDefinition,
    pub value: Value,
    pub log: Vec<ParseStep>,
}

impl FieldValue {
    pub fn last_source(&self) -> Option<&str> {
        self.log.last().map(|step| step.source.as_str())
    }

    /// True when only the defaults have written this field.
    pub fn is_default_only(&self) -> bool {
        self.log.iter().all(|step| step.source == source::DEFAULTS)
    }
}

/// Insertion-ordered `field name → FieldValue` map.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FieldValues(IndexMap<String, FieldValue>);

impl FieldValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the value of `definition`'s field and append `step`.
    pub fn update(&mut self, definition: &FieldDefinition, step: ParseStep) {
        match self.0.get_mut(&definition.name) {
            Some(existing) => {
                existing.value = step.value.clone();
                existing.log.push(step);
            }
            None => {
                self.0.insert(
                    definition.name.clone(),
                    FieldValue {
                        definition: definition.clone(),
                        value: step.value.clone(),
                        log: vec![step],
                    },
                );
            }
        }
    }

    /// Write only if no source other than the defaults has set the field.
    pub fn update_as_default(&mut self, definition: &FieldDefinition, step: ParseStep) {
        if let Some(existing) = self.0.get(&definition.name) {
            if !existing.is_default_only() {
                return;
            }
            if existing.value == step.value && existing.last_source() == Some(step.source.as_str()) {
                return;
            }
        }
        self.update(definition, step);
    }

    /// Copy every entry of `other` in, overriding values and appending logs.
    pub fn merge(&mut self, other: &FieldValues) {
        for (name, incoming) in &other.0 {
            match self.0.get_mut(name) {
                Some(existing) => {
                    existing.value = incoming.value.clone();
                    existing.log.extend(incoming.log.iter().cloned());
                }
                None => {
                    self.0.insert(name.clone(), incoming.clone());
                }
            }
        }
    }

    /// Like [`merge`](Self::merge), skipping fields already set by a
    /// non-default source.
    pub fn merge_as_default(&mut self, other: &FieldValues) {
        for (name, incoming) in &other.0 {
            if self.0.get(name).is_some_and(|existing| !existing.is_default_only()) {
                continue;
            }
            let mut single = FieldValues::new();
            single.0.insert(name.clone(), incoming.clone());
            self.merge(&single);
        }
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.0.get(name)
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.0.get(name).map(|fv| &fv.value)
    }

    pub fn remove(&mut self, name: &str) -> Option<FieldValue> {
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

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.0.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

/// Resolved values of one section.
///
/// Cloning shares the section handle and copies the fields.
#[derive(Debug, Clone)]
pub struct SectionValues {
    pub section: Arc<dyn Section>,
    pub fields: FieldValues,
}

impl PartialEq for SectionValues {
    fn eq(&self, other: &Self) -> bool {
        self.section.slug() == other.section.slug() && self.fields == other.fields
    }
}

impl SectionValues {
    pub fn new(section: Arc<dyn Section>) -> Self {
        Self {
            section,
            fields: FieldValues::new(),
        }
    }

    pub fn slug(&self) -> &str {
        self.section.slug()
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.fields.value(name)
    }

    /// Overlay the resolved fields onto `dst`.
    ///
    /// Record fields are bound by their serde name. Fields without a resolved
    /// value keep their current content, and `#[serde(skip)]` fields are
    /// never touched. On error `dst` may be partially updated.
    pub fn decode_into<T>(&self, dst: &mut T) -> Result<(), LayerfigError>
    where
        T: Serialize + DeserializeOwned,
    {
        let current = serde_json::to_value(&*dst).map_err(|e| self.decode_error(e.to_string()))?;
        let mut record = match current {
            JsonValue::Object(record) => record,
            other => {
                return Err(self.decode_error(format!(
                    "destination must be a record, got {other}"
                )));
            }
        };
        for (name, field) in self.fields.iter() {
            record.insert(name.clone(), field.value.to_json());
        }
        T::deserialize_in_place(JsonValue::Object(record), dst)
            .map_err(|e| self.decode_error(e.to_string()))
    }

    /// Build a fresh record from the resolved fields.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, LayerfigError> {
        let record: Map<String, JsonValue> = self
            .fields
            .iter()
            .map(|(name, field)| (name.clone(), field.value.to_json()))
            .collect();
        serde_json::from_value(JsonValue::Object(record)).map_err(|e| self.decode_error(e.to_string()))
    }

    fn decode_error(&self, reason: String) -> LayerfigError {
        LayerfigError::Decode {
            section: self.slug().to_string(),
            reason,
        }
    }
}

/// Resolved values of every section, keyed by slug in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Values {
    sections: IndexMap<String, SectionValues>,
}

impl Values {
    pub fn new() -> Self {
        Self::default()
    }

    /// The values of `section`, created empty on first use.
    pub fn get_or_create(&mut self, section: &Arc<dyn Section>) -> &mut SectionValues {
        self.sections
            .entry(section.slug().to_string())
            .or_insert_with(|| SectionValues::new(Arc::clone(section)))
    }

    /// The values of the `default` section, bound to an empty synthetic
    /// section when none exists yet.
    pub fn default_section_values(&mut self) -> &mut SectionValues {
        self.sections
            .entry(DEFAULT_SLUG.to_string())
            .or_insert_with(|| {
                SectionValues::new(Arc::new(SchemaSection::new(DEFAULT_SLUG, "Default")))
            })
    }

    pub fn get(&self, slug: &str) -> Option<&SectionValues> {
        self.sections.get(slug)
    }

    pub fn get_mut(&mut self, slug: &str) -> Option<&mut SectionValues> {
        self.sections.get_mut(slug)
    }

    pub fn insert(&mut self, values: SectionValues) {
        self.sections.insert(values.slug().to_string(), values);
    }

    pub fn remove(&mut self, slug: &str) -> Option<SectionValues> {
        self.sections.shift_remove(slug)
    }

    pub fn contains(&self, slug: &str) -> bool {
        self.sections.contains_key(slug)
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SectionValues)> {
        self.sections.iter()
    }

    pub fn slugs(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(String::as_str)
    }

    pub fn field(&self, slug: &str, name: &str) -> Option<&FieldValue> {
        self.sections.get(slug)?.fields.get(name)
    }

    pub fn value(&self, slug: &str, name: &str) -> Option<&Value> {
        self.field(slug, name).map(|fv| &fv.value)
    }

    /// Merge every section of `other` in with override semantics.
    pub fn merge(&mut self, other: &Values) {
        for incoming in other.sections.values() {
            self.get_or_create(&incoming.section)
                .fields
                .merge(&incoming.fields);
        }
    }

    /// Merge every section of `other` in, keeping fields already set by a
    /// non-default source.
    pub fn merge_as_default(&mut self, other: &Values) {
        for incoming in other.sections.values() {
            self.get_or_create(&incoming.section)
                .fields
                .merge_as_default(&incoming.fields);
        }
    }

    pub fn decode_section_into<T>(&self, slug: &str, dst: &mut T) -> Result<(), LayerfigError>
    where
        T: Serialize + DeserializeOwned,
    {
        self.section_for_decode(slug)?.decode_into(dst)
    }

    pub fn decode_section<T: DeserializeOwned>(&self, slug: &str) -> Result<T, LayerfigError> {
        self.section_for_decode(slug)?.decode()
    }

    /// The `default` section decodes as empty when nothing wrote to it.
    fn section_for_decode(&self, slug: &str) -> Result<Cow<'_, SectionValues>, LayerfigError> {
        match self.sections.get(slug) {
            Some(section_values) => Ok(Cow::Borrowed(section_values)),
            None if slug == DEFAULT_SLUG => Ok(Cow::Owned(SectionValues::new(Arc::new(
                SchemaSection::new(DEFAULT_SLUG, "Default"),
            )))),
            None => Err(LayerfigError::Decode {
                section: slug.to_string(),
                reason: "section has no resolved values".into(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::types::FieldType;
    use serde::Deserialize;

    fn port() -> FieldDefinition {
        FieldDefinition::new("port", FieldType::Integer).with_default(8080)
    }

    fn section() -> Arc<dyn Section> {
        Arc::new(
            SchemaSection::new("app", "App")
                .with_field(port())
                .with_field(FieldDefinition::new("host", FieldType::String))
                .with_field(FieldDefinition::new("tags", FieldType::StringList)),
        )
    }

    #[test]
    fn update_appends_log() {
        let mut fields = FieldValues::new();
        fields.update(&port(), ParseStep::new(source::DEFAULTS, Value::Integer(8080)));
        fields.update(&port(), ParseStep::new(source::ENV, Value::Integer(1)));
        let fv = fields.get("port").unwrap();
        assert_eq!(fv.value, Value::Integer(1));
        assert_eq!(fv.log.len(), 2);
        assert_eq!(fv.log[0].source, "defaults");
        assert_eq!(fv.last_source(), Some("env"));
    }

    #[test]
    fn update_as_default_keeps_overrides() {
        let mut fields = FieldValues::new();
        fields.update(&port(), ParseStep::new(source::FLAGS, Value::Integer(9090)));
        fields.update_as_default(&port(), ParseStep::new(source::DEFAULTS, Value::Integer(8080)));
        let fv = fields.get("port").unwrap();
        assert_eq!(fv.value, Value::Integer(9090));
        assert_eq!(fv.log.len(), 1);
    }

    #[test]
    fn update_as_default_is_idempotent() {
        let mut once = FieldValues::new();
        once.update_as_default(&port(), ParseStep::new(source::DEFAULTS, Value::Integer(8080)));
        let mut twice = once.clone();
        twice.update_as_default(&port(), ParseStep::new(source::DEFAULTS, Value::Integer(8080)));
        assert_eq!(once, twice);
    }

    #[test]
    fn update_as_default_over_defaults() {
        let mut fields = FieldValues::new();
        fields.update_as_default(&port(), ParseStep::new(source::DEFAULTS, Value::Integer(8080)));
        fields.update_as_default(&port(), ParseStep::new(source::MAP, Value::Integer(1)));
        assert_eq!(fields.value("port"), Some(&Value::Integer(1)));
        fields.update_as_default(&port(), ParseStep::new(source::MAP, Value::Integer(2)));
        assert_eq!(fields.value("port"), Some(&Value::Integer(1)));
    }

    #[test]
    fn merge_as_default_skips_set_fields() {
        let mut dst = FieldValues::new();
        dst.update(&port(), ParseStep::new(source::ENV, Value::Integer(1)));
        let mut src = FieldValues::new();
        src.update(&port(), ParseStep::new(source::MAP, Value::Integer(2)));
        dst.merge_as_default(&src);
        assert_eq!(dst.value("port"), Some(&Value::Integer(1)));
        dst.merge(&src);
        assert_eq!(dst.value("port"), Some(&Value::Integer(2)));
        assert_eq!(dst.get("port").unwrap().log.len(), 2);
    }

    #[test]
    fn default_section_is_synthesized() {
        let mut values = Values::new();
        assert_eq!(values.default_section_values().slug(), DEFAULT_SLUG);
        assert!(values.contains(DEFAULT_SLUG));
    }

    #[test]
    fn get_or_create_reuses_existing() {
        let mut values = Values::new();
        let s = section();
        values
            .get_or_create(&s)
            .fields
            .update(&port(), ParseStep::new(source::MAP, Value::Integer(3)));
        assert_eq!(values.get_or_create(&s).fields.len(), 1);
        assert_eq!(values.value("app", "port"), Some(&Value::Integer(3)));
    }

    #[derive(Debug, Default, Serialize, Deserialize, PartialEq)]
    struct AppSettings {
        port: i64,
        host: String,
        #[serde(default)]
        tags: Option<Vec<String>>,
        #[serde(rename = "untouched")]
        keep: String,
    }

    fn resolved() -> Values {
        let mut values = Values::new();
        let s = section();
        let sv = values.get_or_create(&s);
        sv.fields.update(&port(), ParseStep::new(source::FLAGS, Value::Integer(9090)));
        sv.fields.update(
            &FieldDefinition::new("tags", FieldType::StringList),
            ParseStep::new(source::ENV, Value::StringList(vec!["a".into()])),
        );
        values
    }

    #[test]
    fn decode_into_overlays_bound_fields() {
        let values = resolved();
        let mut settings = AppSettings {
            host: "keep-me".into(),
            keep: "also".into(),
            ..Default::default()
        };
        values.decode_section_into("app", &mut settings).unwrap();
        assert_eq!(settings.port, 9090);
        assert_eq!(settings.host, "keep-me");
        assert_eq!(settings.tags, Some(vec!["a".to_string()]));
        assert_eq!(settings.keep, "also");
    }

    #[test]
    fn decode_into_leaves_skipped_fields_alone() {
        #[derive(Debug, Default, Serialize, Deserialize)]
        struct WithHandle {
            port: i64,
            #[serde(skip)]
            handle: String,
        }
        let mut settings = WithHandle {
            port: 1,
            handle: "keep-me".into(),
        };
        resolved().decode_section_into("app", &mut settings).unwrap();
        assert_eq!(settings.port, 9090);
        assert_eq!(settings.handle, "keep-me");
    }

    #[test]
    fn default_section_decodes_when_absent() {
        #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
        struct Args {
            target: Option<String>,
            #[serde(default)]
            paths: Vec<String>,
        }
        let mut args = Args {
            target: Some("out".into()),
            paths: vec![],
        };
        Values::new().decode_section_into(DEFAULT_SLUG, &mut args).unwrap();
        assert_eq!(args.target.as_deref(), Some("out"));
        let fresh: Args = Values::new().decode_section(DEFAULT_SLUG).unwrap();
        assert_eq!(fresh, Args::default());
    }

    #[test]
    fn decode_type_mismatch_fails() {
        #[derive(Debug, Default, Serialize, Deserialize)]
        struct Wrong {
            port: String,
        }
        let err = resolved().decode_section_into("app", &mut Wrong::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decode);
    }

    #[test]
    fn decode_into_non_record_fails() {
        let mut dst: i64 = 0;
        let err = resolved().decode_section_into("app", &mut dst).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decode);
    }

    #[test]
    fn decode_missing_section_fails() {
        let err = Values::new()
            .decode_section::<AppSettings>("app")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decode);
    }

    #[test]
    fn decode_fresh_record() {
        #[derive(Debug, Deserialize)]
        struct Partial {
            port: i64,
            #[serde(default)]
            host: Option<String>,
        }
        let p: Partial = resolved().decode_section("app").unwrap();
        assert_eq!(p.port, 9090);
        assert_eq!(p.host, None);
    }
}
