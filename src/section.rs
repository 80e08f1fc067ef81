//! Sections: named groups of field definitions.
//!
//! [`Section`] is the capability every section exposes. [`SchemaSection`] is
//! the plain implementation; [`CompositeSection`] bundles child sections under
//! one slug. Scope wrappers add a third, the restricted view in
//! [`scope`](crate::scope).
//!
//! Sections are shared as `Arc<dyn Section>`: a [`Schema`](crate::Schema) and
//! every [`SectionValues`](crate::SectionValues) resolved against it hold the
//! same handle. Mutation goes through [`make_section_mut`], which clones the
//! section first when the handle is shared.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::LayerfigError;
use crate::field::{Definitions, FieldDefinition};

/// Slug of the section holding positional arguments and unsectioned flags.
pub const DEFAULT_SLUG: &str = "default";

pub trait Section: fmt::Debug + Send + Sync {
    fn slug(&self) -> &str;
    fn name(&self) -> &str;
    fn description(&self) -> &str;

    /// Prepended to field names when projected into a flat namespace (CLI
    /// flags, environment keys).
    fn prefix(&self) -> &str;

    /// A fresh copy of the definitions; mutating it does not alter the section.
    fn definitions(&self) -> Definitions;

    fn definition(&self, name: &str) -> Option<FieldDefinition> {
        self.definitions().get(name).cloned()
    }

    /// Insert or replace a definition (last write wins).
    fn set_definition(&mut self, definition: FieldDefinition);

    fn remove_definition(&mut self, name: &str) -> Option<FieldDefinition>;

    /// Deep copy behind a fresh handle.
    fn clone_section(&self) -> Arc<dyn Section>;

    fn children(&self) -> Vec<Arc<dyn Section>> {
        Vec::new()
    }

    /// Look up a field by the key a config map uses: the definition name, or
    /// the canonical name with the section prefix in front.
    fn resolve_field(&self, key: &str) -> Option<FieldDefinition> {
        if let Some(def) = self.definition(key) {
            return Some(def);
        }
        let prefix = self.prefix();
        if prefix.is_empty() {
            return None;
        }
        key.strip_prefix(prefix)
            .and_then(|bare| self.definition(bare))
    }
}

/// The long flag name of a field: section prefix plus field name, with `_`
/// replaced by `-`.
pub fn flag_name(section: &dyn Section, definition: &FieldDefinition) -> String {
    format!("{}{}", section.prefix(), definition.name).replace('_', "-")
}

/// Whether a field is read from positional arguments rather than a flag.
/// Only argument definitions of the `default` section are.
pub fn is_positional(section: &dyn Section, definition: &FieldDefinition) -> bool {
    definition.is_argument && section.slug() == DEFAULT_SLUG
}

/// Get a mutable reference to a shared section, cloning it first if another
/// handle points at it.
pub fn make_section_mut(section: &mut Arc<dyn Section>) -> Option<&mut (dyn Section + 'static)> {
    if Arc::get_mut(section).is_none() {
        *section = section.clone_section();
    }
    Arc::get_mut(section)
}

/// Check the invariants shared by every section kind.
pub fn validate_section(section: &dyn Section) -> Result<(), LayerfigError> {
    if section.slug().trim().is_empty() {
        return Err(LayerfigError::Schema(format!(
            "section '{}' has an empty slug",
            section.name()
        )));
    }
    let definitions = section.definitions();
    for def in definitions.iter() {
        def.validate().map_err(|e| match e {
            LayerfigError::Schema(reason) => {
                LayerfigError::Schema(format!("section '{}': {reason}", section.slug()))
            }
            other => other,
        })?;
    }
    let arguments: Vec<&FieldDefinition> = definitions.arguments().collect();
    if let Some((_, leading)) = arguments.split_last()
        && let Some(list) = leading.iter().find(|d| d.field_type.is_list())
    {
        return Err(LayerfigError::Schema(format!(
            "section '{}': list argument '{}' must be the last argument",
            section.slug(),
            list.name
        )));
    }
    Ok(())
}

/// The plain section implementation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaSection {
    slug: String,
    name: String,
    description: String,
    prefix: String,
    definitions: Definitions,
}

impl SchemaSection {
    pub fn new(slug: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_field(mut self, definition: FieldDefinition) -> Self {
        self.definitions.insert(definition);
        self
    }

    pub fn with_fields(mut self, definitions: impl IntoIterator<Item = FieldDefinition>) -> Self {
        for def in definitions {
            self.definitions.insert(def);
        }
        self
    }

    /// Add positional argument definitions (marked `is_argument`).
    pub fn with_arguments(mut self, definitions: impl IntoIterator<Item = FieldDefinition>) -> Self {
        for def in definitions {
            self.definitions.insert(def.argument());
        }
        self
    }

    /// Validate and share.
    pub fn build(self) -> Result<Arc<dyn Section>, LayerfigError> {
        validate_section(&self)?;
        Ok(Arc::new(self))
    }

    pub(crate) fn from_doc(doc: SectionDoc, fallback_slug: Option<&str>) -> Result<Self, LayerfigError> {
        let slug = match (doc.slug, fallback_slug) {
            (Some(slug), _) => slug,
            (None, Some(fallback)) => fallback.to_string(),
            (None, None) => {
                return Err(LayerfigError::Schema(format!(
                    "section '{}' declares no slug",
                    doc.name
                )));
            }
        };
        let name = if doc.name.is_empty() { slug.clone() } else { doc.name };
        let section = SchemaSection::new(slug, name)
            .with_description(doc.description)
            .with_prefix(doc.prefix)
            .with_fields(doc.flags)
            .with_arguments(doc.arguments);
        validate_section(&section)?;
        Ok(section)
    }
}

impl Section for SchemaSection {
    fn slug(&self) -> &str {
        &self.slug
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn prefix(&self) -> &str {
        &self.prefix
    }

    fn definitions(&self) -> Definitions {
        self.definitions.clone()
    }

    fn definition(&self, name: &str) -> Option<FieldDefinition> {
        self.definitions.get(name).cloned()
    }

    fn set_definition(&mut self, definition: FieldDefinition) {
        self.definitions.insert(definition);
    }

    fn remove_definition(&mut self, name: &str) -> Option<FieldDefinition> {
        self.definitions.remove(name)
    }

    fn clone_section(&self) -> Arc<dyn Section> {
        Arc::new(self.clone())
    }
}

/// A section that bundles child sections under one slug.
///
/// Definitions declared on the composite itself come first, then those of
/// each child in order; the first definition of a name wins.
#[derive(Debug, Clone, Default)]
pub struct CompositeSection {
    slug: String,
    name: String,
    description: String,
    prefix: String,
    own: Definitions,
    children: Vec<Arc<dyn Section>>,
}

impl CompositeSection {
    pub fn new(slug: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_child(mut self, child: Arc<dyn Section>) -> Self {
        self.children.push(child);
        self
    }
}

impl Section for CompositeSection {
    fn slug(&self) -> &str {
        &self.slug
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn prefix(&self) -> &str {
        &self.prefix
    }

    fn definitions(&self) -> Definitions {
        let mut out = self.own.clone();
        for child in &self.children {
            for def in child.definitions() {
                if !out.contains(&def.name) {
                    out.insert(def);
                }
            }
        }
        out
    }

    fn definition(&self, name: &str) -> Option<FieldDefinition> {
        self.own
            .get(name)
            .cloned()
            .or_else(|| self.children.iter().find_map(|c| c.definition(name)))
    }

    fn set_definition(&mut self, definition: FieldDefinition) {
        if !self.own.contains(&definition.name)
            && let Some(child) = self
                .children
                .iter_mut()
                .find(|c| c.definition(&definition.name).is_some())
            && let Some(child) = make_section_mut(child)
        {
            child.set_definition(definition);
            return;
        }
        self.own.insert(definition);
    }

    fn remove_definition(&mut self, name: &str) -> Option<FieldDefinition> {
        let mut removed = self.own.remove(name);
        for child in &mut self.children {
            if child.definition(name).is_none() {
                continue;
            }
            if let Some(child) = make_section_mut(child) {
                let from_child = child.remove_definition(name);
                removed = removed.or(from_child);
            }
        }
        removed
    }

    fn clone_section(&self) -> Arc<dyn Section> {
        Arc::new(CompositeSection {
            slug: self.slug.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            prefix: self.prefix.clone(),
            own: self.own.clone(),
            children: self.children.iter().map(|c| c.clone_section()).collect(),
        })
    }

    fn children(&self) -> Vec<Arc<dyn Section>> {
        self.children.clone()
    }
}

/// Declarative form of a section, as found in schema files.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct SectionDoc {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub prefix: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<FieldDefinition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<FieldDefinition>,
}

impl SectionDoc {
    pub const KEYS: [&'static str; 6] = ["name", "slug", "description", "prefix", "flags", "arguments"];

    pub fn from_section(section: &dyn Section) -> Self {
        let definitions = section.definitions();
        let (arguments, flags): (Vec<_>, Vec<_>) =
            definitions.into_iter().partition(|d| d.is_argument);
        SectionDoc {
            name: section.name().to_string(),
            slug: Some(section.slug().to_string()),
            description: section.description().to_string(),
            prefix: section.prefix().to_string(),
            flags,
            arguments: arguments
                .into_iter()
                .map(|mut d| {
                    d.is_argument = false;
                    d
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::types::FieldType;
    use serde_json::json;

    fn app() -> SchemaSection {
        SchemaSection::new("app", "Application")
            .with_prefix("app-")
            .with_field(FieldDefinition::new("port", FieldType::Integer).with_default(8080))
            .with_field(FieldDefinition::new("host", FieldType::String).with_default("localhost"))
    }

    #[test]
    fn definitions_keep_insertion_order() {
        let names: Vec<String> = app().definitions().names().map(String::from).collect();
        assert_eq!(names, vec!["port", "host"]);
    }

    #[test]
    fn definitions_returns_fresh_copy() {
        let section = app();
        let mut defs = section.definitions();
        defs.remove("port");
        assert!(section.definition("port").is_some());
    }

    #[test]
    fn set_definition_last_write_wins() {
        let mut section = app();
        section.set_definition(FieldDefinition::new("port", FieldType::Integer).with_default(1));
        assert_eq!(section.definition("port").unwrap().default, Some(json!(1)));
        assert_eq!(section.definitions().len(), 2);
    }

    #[test]
    fn resolve_field_accepts_canonical_name() {
        let section = app();
        assert_eq!(section.resolve_field("app-port").unwrap().name, "port");
        assert_eq!(section.resolve_field("port").unwrap().name, "port");
        assert!(section.resolve_field("app-nope").is_none());
    }

    #[test]
    fn make_mut_clones_shared_handle() {
        let mut shared: Arc<dyn Section> = Arc::new(app());
        let other = Arc::clone(&shared);
        make_section_mut(&mut shared)
            .unwrap()
            .remove_definition("port");
        assert!(shared.definition("port").is_none());
        assert!(other.definition("port").is_some());
    }

    #[test]
    fn build_rejects_invalid_default() {
        let err = SchemaSection::new("s", "S")
            .with_field(FieldDefinition::new("n", FieldType::Integer).with_default("abc"))
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Schema);
    }

    #[test]
    fn only_last_argument_may_be_list() {
        let err = SchemaSection::new(DEFAULT_SLUG, "Args")
            .with_arguments([
                FieldDefinition::new("files", FieldType::StringList),
                FieldDefinition::new("out", FieldType::String),
            ])
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("files"));

        let ok = SchemaSection::new(DEFAULT_SLUG, "Args")
            .with_arguments([
                FieldDefinition::new("out", FieldType::String),
                FieldDefinition::new("files", FieldType::StringList),
            ])
            .build();
        assert!(ok.is_ok());
    }

    #[test]
    fn composite_aggregates_children() {
        let db = SchemaSection::new("db", "DB")
            .with_field(FieldDefinition::new("url", FieldType::String))
            .with_field(FieldDefinition::new("port", FieldType::Integer));
        let composite = CompositeSection::new("all", "All")
            .with_child(Arc::new(app()))
            .with_child(Arc::new(db));
        let names: Vec<String> = composite.definitions().names().map(String::from).collect();
        assert_eq!(names, vec!["port", "host", "url"]);
        assert_eq!(composite.children().len(), 2);
    }

    #[test]
    fn composite_set_definition_updates_owning_child() {
        let child: Arc<dyn Section> = Arc::new(app());
        let mut composite = CompositeSection::new("all", "All").with_child(Arc::clone(&child));
        composite.set_definition(FieldDefinition::new("host", FieldType::String).with_default("x"));
        assert_eq!(composite.definition("host").unwrap().default, Some(json!("x")));
        assert_eq!(child.definition("host").unwrap().default, Some(json!("localhost")));

        composite.set_definition(FieldDefinition::new("extra", FieldType::Bool));
        assert!(composite.definition("extra").is_some());
        assert!(composite.remove_definition("port").is_some());
        assert!(composite.definition("port").is_none());
    }

    #[test]
    fn composite_clone_is_deep() {
        let composite = CompositeSection::new("all", "All").with_child(Arc::new(app()));
        let mut cloned = composite.clone_section();
        make_section_mut(&mut cloned).unwrap().remove_definition("port");
        assert!(composite.definition("port").is_some());
    }

    #[test]
    fn doc_round_trip_keeps_arguments() {
        let section = SchemaSection::new(DEFAULT_SLUG, "Default")
            .with_field(FieldDefinition::new("verbose", FieldType::Bool))
            .with_arguments([FieldDefinition::new("input", FieldType::String)]);
        let doc = SectionDoc::from_section(&section);
        assert_eq!(doc.flags.len(), 1);
        assert_eq!(doc.arguments.len(), 1);
        let back = SchemaSection::from_doc(doc, None).unwrap();
        assert_eq!(back, section);
    }
}
