//! The schema: an insertion-ordered map of sections keyed by slug.
//!
//! Sections are shared handles, but cloning a [`Schema`] is deep: each section
//! is copied through [`Section::clone_section`], so scope wrappers can restrict
//! their private copy without the caller noticing.
//!
//! # Declarative schema files
//!
//! A schema can be loaded from YAML with one section per document:
//!
//! ```yaml
//! slug: app
//! name: Application
//! prefix: app-
//! flags:
//!   - name: port
//!     type: int
//!     default: 8080
//! ---
//! slug: default
//! name: Arguments
//! arguments:
//!   - name: input
//!     type: string
//! ```
//!
//! or as a single map of named sections, where the key stands in for a
//! missing `slug`. Unknown keys are errors in strict mode.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::Deserialize;

use crate::error::LayerfigError;
use crate::field::FieldDefinition;
use crate::section::{SchemaSection, Section, SectionDoc, make_section_mut, validate_section};
use crate::validate::deserialize_checked;
use crate::values::{ParseStep, Values, source};

#[derive(Default)]
pub struct Schema {
    sections: IndexMap<String, Arc<dyn Section>>,
}

impl Clone for Schema {
    fn clone(&self) -> Self {
        Self {
            sections: self
                .sections
                .iter()
                .map(|(slug, section)| (slug.clone(), section.clone_section()))
                .collect(),
        }
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.sections.values()).finish()
    }
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`append_section`](Self::append_section).
    pub fn with_section(mut self, section: impl Section + 'static) -> Self {
        self.append_section(section);
        self
    }

    pub fn append_section(&mut self, section: impl Section + 'static) {
        self.append([Arc::new(section) as Arc<dyn Section>]);
    }

    /// Add sections in order. An existing slug is overwritten in place.
    pub fn append(&mut self, sections: impl IntoIterator<Item = Arc<dyn Section>>) {
        for section in sections {
            self.sections.insert(section.slug().to_string(), section);
        }
    }

    /// Add sections at the front, keeping their relative order. An existing
    /// slug is moved and overwritten.
    pub fn prepend(&mut self, sections: impl IntoIterator<Item = Arc<dyn Section>>) {
        let sections: Vec<Arc<dyn Section>> = sections.into_iter().collect();
        for section in sections.into_iter().rev() {
            let slug = section.slug().to_string();
            self.sections.shift_remove(&slug);
            self.sections.shift_insert(0, slug, section);
        }
    }

    /// A new schema holding only the named sections, in the given order.
    /// Unknown slugs are skipped.
    pub fn subset(&self, slugs: &[&str]) -> Schema {
        let mut out = Schema::new();
        for slug in slugs {
            if let Some(section) = self.sections.get(*slug) {
                out.sections.insert(slug.to_string(), Arc::clone(section));
            }
        }
        out
    }

    /// Set a copy of every section of `other` here (right wins).
    pub fn merge(&mut self, other: &Schema) -> &mut Self {
        for (slug, section) in &other.sections {
            self.sections.insert(slug.clone(), section.clone_section());
        }
        self
    }

    pub fn get(&self, slug: &str) -> Option<&Arc<dyn Section>> {
        self.sections.get(slug)
    }

    /// Mutable access; a section shared with values or other schemas is
    /// copied first.
    pub fn get_mut(&mut self, slug: &str) -> Option<&mut (dyn Section + 'static)> {
        make_section_mut(self.sections.get_mut(slug)?)
    }

    pub fn remove(&mut self, slug: &str) -> Option<Arc<dyn Section>> {
        self.sections.shift_remove(slug)
    }

    /// Replace the handle stored under `slug`, keeping its position.
    pub(crate) fn replace(&mut self, slug: &str, section: Arc<dyn Section>) {
        if let Some(slot) = self.sections.get_mut(slug) {
            *slot = section;
        }
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

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Section>> {
        self.sections.values()
    }

    pub fn slugs(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(String::as_str)
    }

    /// Every definition keyed by its prefix-qualified name, walking sections
    /// in order. A later section shadows an earlier one on a name clash.
    pub fn get_all_definitions(&self) -> IndexMap<String, FieldDefinition> {
        let mut out = IndexMap::new();
        for section in self.sections.values() {
            let prefix = section.prefix().to_string();
            for def in section.definitions() {
                out.insert(format!("{prefix}{}", def.name), def);
            }
        }
        out
    }

    /// Write every valid default into `values` without overriding fields set
    /// by other sources.
    pub fn update_with_defaults(&self, values: &mut Values) -> Result<(), LayerfigError> {
        for section in self.sections.values() {
            let section_values = values.get_or_create(section);
            for def in section.definitions().iter() {
                if let Some(value) = def.check_default_validity()? {
                    let step = ParseStep::new(source::DEFAULTS, value);
                    section_values.fields.update_as_default(def, step);
                }
            }
        }
        Ok(())
    }

    pub fn initialize_from_defaults(&self) -> Result<Values, LayerfigError> {
        let mut values = Values::new();
        self.update_with_defaults(&mut values)?;
        Ok(values)
    }

    pub fn validate(&self) -> Result<(), LayerfigError> {
        for section in self.sections.values() {
            validate_section(section.as_ref())?;
        }
        Ok(())
    }

    /// Load a declarative schema, rejecting unknown keys.
    pub fn from_yaml_str(content: &str) -> Result<Schema, LayerfigError> {
        Self::load_yaml(content, Path::new("<inline>"), true)
    }

    pub fn from_file(path: &Path) -> Result<Schema, LayerfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| LayerfigError::io(path, e))?;
        Self::load_yaml(&content, path, true)
    }

    /// Load a declarative schema; `strict` turns unknown keys into errors
    /// instead of warnings.
    pub fn load_yaml(content: &str, path: &Path, strict: bool) -> Result<Schema, LayerfigError> {
        let mut schema = Schema::new();
        for document in serde_yaml::Deserializer::from_str(content) {
            let doc = serde_yaml::Value::deserialize(document).map_err(|e| {
                LayerfigError::FileParse {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                }
            })?;
            for section in sections_from_document(doc, content, path, strict)? {
                schema.append([Arc::new(section) as Arc<dyn Section>]);
            }
        }
        Ok(schema)
    }
}

fn sections_from_document(
    doc: serde_yaml::Value,
    content: &str,
    path: &Path,
    strict: bool,
) -> Result<Vec<SchemaSection>, LayerfigError> {
    let mapping = match doc {
        serde_yaml::Value::Null => return Ok(Vec::new()),
        serde_yaml::Value::Mapping(mapping) => mapping,
        other => {
            return Err(LayerfigError::UnsupportedFormat {
                path: path.to_path_buf(),
                reason: format!("schema document must be a map, found {other:?}"),
            });
        }
    };

    let single = mapping
        .keys()
        .any(|k| k.as_str().is_some_and(|k| SectionDoc::KEYS.contains(&k)));
    if single {
        let doc: SectionDoc =
            deserialize_checked(serde_yaml::Value::Mapping(mapping), content, path, strict)?;
        return Ok(vec![SchemaSection::from_doc(doc, None)?]);
    }

    let mut out = Vec::new();
    for (key, value) in mapping {
        let Some(slug) = key.as_str().map(str::to_string) else {
            return Err(LayerfigError::Schema(format!(
                "section keys must be strings, found {key:?}"
            )));
        };
        let doc: SectionDoc = deserialize_checked(value, content, path, strict)?;
        out.push(SchemaSection::from_doc(doc, Some(&slug))?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::section::DEFAULT_SLUG;
    use crate::types::FieldType;
    use crate::value::Value;

    fn section(slug: &str, field: &str) -> Arc<dyn Section> {
        Arc::new(
            SchemaSection::new(slug, slug.to_uppercase())
                .with_field(FieldDefinition::new(field, FieldType::Integer).with_default(0)),
        )
    }

    fn abc() -> Schema {
        let mut schema = Schema::new();
        schema.append([section("a", "x"), section("b", "y"), section("c", "z")]);
        schema
    }

    fn slugs(schema: &Schema) -> Vec<String> {
        schema.slugs().map(String::from).collect()
    }

    #[test]
    fn append_overwrites_in_place() {
        let mut schema = abc();
        schema.append([section("a", "other")]);
        assert_eq!(slugs(&schema), vec!["a", "b", "c"]);
        assert!(schema.get("a").unwrap().definition("other").is_some());
    }

    #[test]
    fn prepend_moves_to_front_in_order() {
        let mut schema = abc();
        schema.prepend([section("d", "w"), section("c", "z")]);
        assert_eq!(slugs(&schema), vec!["d", "c", "a", "b"]);
    }

    #[test]
    fn subset_keeps_given_order() {
        let subset = abc().subset(&["c", "missing", "a"]);
        assert_eq!(slugs(&subset), vec!["c", "a"]);
    }

    #[test]
    fn merge_is_union_right_wins() {
        let mut left = abc();
        let mut right = Schema::new();
        right.append([section("b", "other"), section("d", "w")]);
        left.merge(&right);
        assert_eq!(slugs(&left), vec!["a", "b", "c", "d"]);
        assert!(left.get("b").unwrap().definition("other").is_some());
    }

    #[test]
    fn clone_is_deep() {
        let original = abc();
        let mut cloned = original.clone();
        cloned.get_mut("a").unwrap().remove_definition("x");
        assert!(original.get("a").unwrap().definition("x").is_some());
        assert!(cloned.get("a").unwrap().definition("x").is_none());
    }

    #[test]
    fn all_definitions_are_prefixed() {
        let mut schema = Schema::new();
        schema.append_section(
            SchemaSection::new("app", "App")
                .with_prefix("app-")
                .with_field(FieldDefinition::new("port", FieldType::Integer)),
        );
        schema.append([section("b", "y")]);
        let names: Vec<String> = schema.get_all_definitions().keys().cloned().collect();
        assert_eq!(names, vec!["app-port", "y"]);
    }

    #[test]
    fn initialize_from_defaults_records_source() {
        let values = abc().initialize_from_defaults().unwrap();
        let fv = values.field("b", "y").unwrap();
        assert_eq!(fv.value, Value::Integer(0));
        assert_eq!(fv.log.len(), 1);
        assert_eq!(fv.log[0].source, "defaults");
    }

    #[test]
    fn fields_without_default_stay_unset() {
        let schema = Schema::new().with_section(
            SchemaSection::new("s", "S").with_field(FieldDefinition::new("n", FieldType::String)),
        );
        let values = schema.initialize_from_defaults().unwrap();
        assert!(values.field("s", "n").is_none());
        assert!(values.contains("s"));
    }

    const MULTI_DOC: &str = "\
slug: app
name: Application
prefix: app-
flags:
  - name: port
    type: int
    default: 8080
  - name: mode
    type: choice
    choices: [fast, slow]
    default: fast
---
slug: default
name: Arguments
arguments:
  - name: input
    type: string
    required: true
";

    #[test]
    fn loads_one_section_per_document() {
        let schema = Schema::from_yaml_str(MULTI_DOC).unwrap();
        assert_eq!(slugs(&schema), vec!["app", DEFAULT_SLUG]);
        let app = schema.get("app").unwrap();
        assert_eq!(app.prefix(), "app-");
        assert_eq!(app.definition("mode").unwrap().choices, vec!["fast", "slow"]);
        let input = schema.get(DEFAULT_SLUG).unwrap().definition("input").unwrap();
        assert!(input.is_argument);
        assert!(input.required);
    }

    #[test]
    fn loads_map_of_named_sections() {
        let content = "\
db:
  name: Database
  flags:
    - name: url
      type: string
cache:
  slug: kv
  flags:
    - name: ttl
      type: int
";
        let schema = Schema::from_yaml_str(content).unwrap();
        assert_eq!(slugs(&schema), vec!["db", "kv"]);
        assert_eq!(schema.get("kv").unwrap().name(), "kv");
    }

    #[test]
    fn unknown_keys_rejected_in_strict_mode() {
        let content = "slug: app\nflags:\n  - name: port\n    tpye: int\n    type: int\n";
        let err = Schema::from_yaml_str(content).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Schema);
        assert!(Schema::load_yaml(content, Path::new("s.yaml"), false).is_ok());
    }

    #[test]
    fn invalid_default_rejected_on_load() {
        let content = "slug: app\nflags:\n  - name: port\n    type: int\n    default: abc\n";
        let err = Schema::from_yaml_str(content).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Schema);
    }

    #[test]
    fn choice_default_outside_choices_rejected() {
        let content =
            "slug: app\nflags:\n  - name: mode\n    type: choice\n    choices: [a]\n    default: b\n";
        assert!(Schema::from_yaml_str(content).is_err());
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("schema.yaml");
        std::fs::write(&path, MULTI_DOC).unwrap();
        assert_eq!(Schema::from_file(&path).unwrap().len(), 2);
    }
}
