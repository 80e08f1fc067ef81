//! Whitelist and blacklist scoping.
//!
//! The handlers here restrict a schema in place: dropping sections, or
//! replacing a section with a [`RestrictedSection`] view that hides some of
//! its fields. The middlewares apply a handler to a copy of the schema and
//! run a sub-chain against it, so only that sub-chain sees the restriction:
//!
//! ```ignore
//! execute(&schema, &mut values, vec![
//!     // this map only reaches section "a"
//!     whitelist_sections(&["a"], vec![from_map(map)]),
//!     from_defaults(),
//! ])?;
//! ```
//!
//! The `*_first` variants restrict the schema itself before calling `next`,
//! so every source further down the chain sees the restriction.

use std::collections::HashSet;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::field::{Definitions, FieldDefinition};
use crate::middleware::{HandlerFunc, Middleware, identity, wrap};
use crate::schema::Schema;
use crate::section::{Section, make_section_mut};

/// `section slug → field names`.
pub type SectionFields = IndexMap<String, Vec<String>>;

/// Build a [`SectionFields`] from literals.
pub fn section_fields(entries: &[(&str, &[&str])]) -> SectionFields {
    entries
        .iter()
        .map(|(slug, names)| {
            (
                slug.to_string(),
                names.iter().map(|n| n.to_string()).collect(),
            )
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Only,
    Except,
}

/// A view of a section that exposes only some of its fields.
#[derive(Debug, Clone)]
pub struct RestrictedSection {
    inner: Arc<dyn Section>,
    mode: Mode,
    names: HashSet<String>,
}

impl RestrictedSection {
    /// Expose only `names`.
    pub fn whitelist(inner: Arc<dyn Section>, names: impl IntoIterator<Item = String>) -> Self {
        Self {
            inner,
            mode: Mode::Only,
            names: names.into_iter().collect(),
        }
    }

    /// Expose everything but `names`.
    pub fn blacklist(inner: Arc<dyn Section>, names: impl IntoIterator<Item = String>) -> Self {
        Self {
            inner,
            mode: Mode::Except,
            names: names.into_iter().collect(),
        }
    }

    pub fn inner(&self) -> &Arc<dyn Section> {
        &self.inner
    }

    fn visible(&self, name: &str) -> bool {
        match self.mode {
            Mode::Only => self.names.contains(name),
            Mode::Except => !self.names.contains(name),
        }
    }
}

impl Section for RestrictedSection {
    fn slug(&self) -> &str {
        self.inner.slug()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn description(&self) -> &str {
        self.inner.description()
    }

    fn prefix(&self) -> &str {
        self.inner.prefix()
    }

    fn definitions(&self) -> Definitions {
        self.inner.definitions().filtered(|d| self.visible(&d.name))
    }

    fn definition(&self, name: &str) -> Option<FieldDefinition> {
        if self.visible(name) {
            self.inner.definition(name)
        } else {
            None
        }
    }

    /// Writes through to the wrapped section and makes the field visible.
    fn set_definition(&mut self, definition: FieldDefinition) {
        match self.mode {
            Mode::Only => self.names.insert(definition.name.clone()),
            Mode::Except => self.names.remove(&definition.name),
        };
        if let Some(inner) = make_section_mut(&mut self.inner) {
            inner.set_definition(definition);
        }
    }

    fn remove_definition(&mut self, name: &str) -> Option<FieldDefinition> {
        if !self.visible(name) {
            return None;
        }
        make_section_mut(&mut self.inner)?.remove_definition(name)
    }

    fn clone_section(&self) -> Arc<dyn Section> {
        Arc::new(RestrictedSection {
            inner: self.inner.clone_section(),
            mode: self.mode,
            names: self.names.clone(),
        })
    }

    fn children(&self) -> Vec<Arc<dyn Section>> {
        self.inner.children()
    }
}

fn to_set(slugs: &[&str]) -> HashSet<String> {
    slugs.iter().map(|s| s.to_string()).collect()
}

fn retain_sections(schema: &mut Schema, keep: impl Fn(&str) -> bool) {
    let doomed: Vec<String> = schema
        .slugs()
        .filter(|slug| !keep(*slug))
        .map(str::to_string)
        .collect();
    for slug in doomed {
        schema.remove(&slug);
    }
}

/// Drop every section not named in `slugs`.
pub fn whitelist_sections_handler(slugs: &[&str]) -> HandlerFunc {
    let keep = to_set(slugs);
    Box::new(move |schema, _| {
        retain_sections(schema, |slug| keep.contains(slug));
        Ok(())
    })
}

/// Drop every section named in `slugs`.
pub fn blacklist_sections_handler(slugs: &[&str]) -> HandlerFunc {
    let drop = to_set(slugs);
    Box::new(move |schema, _| {
        retain_sections(schema, |slug| !drop.contains(slug));
        Ok(())
    })
}

/// Keep only the listed sections, each restricted to the listed fields.
pub fn whitelist_section_fields_handler(fields: SectionFields) -> HandlerFunc {
    Box::new(move |schema, _| {
        retain_sections(schema, |slug| fields.contains_key(slug));
        for (slug, names) in &fields {
            if let Some(section) = schema.get(slug).cloned() {
                let view = RestrictedSection::whitelist(section, names.iter().cloned());
                schema.replace(slug, Arc::new(view));
            }
        }
        Ok(())
    })
}

/// Hide the listed fields of the listed sections.
pub fn blacklist_section_fields_handler(fields: SectionFields) -> HandlerFunc {
    Box::new(move |schema, _| {
        for (slug, names) in &fields {
            if let Some(section) = schema.get(slug).cloned() {
                let view = RestrictedSection::blacklist(section, names.iter().cloned());
                schema.replace(slug, Arc::new(view));
            }
        }
        Ok(())
    })
}

/// Run `next` on the full schema, then run `inner` against a copy restricted
/// by `restrict`. Both write into the same values.
pub fn wrap_with_section_modifying_handler(
    restrict: HandlerFunc,
    inner: Vec<Middleware>,
) -> Middleware {
    Box::new(move |next: HandlerFunc| -> HandlerFunc {
        let inner = wrap(identity(), inner);
        Box::new(move |schema, values| {
            next(schema, values)?;
            let mut restricted = schema.clone();
            restrict(&mut restricted, values)?;
            inner(&mut restricted, values)
        })
    })
}

pub fn whitelist_sections(slugs: &[&str], inner: Vec<Middleware>) -> Middleware {
    wrap_with_section_modifying_handler(whitelist_sections_handler(slugs), inner)
}

pub fn whitelist_section_fields(fields: SectionFields, inner: Vec<Middleware>) -> Middleware {
    wrap_with_section_modifying_handler(whitelist_section_fields_handler(fields), inner)
}

pub fn blacklist_sections(slugs: &[&str], inner: Vec<Middleware>) -> Middleware {
    wrap_with_section_modifying_handler(blacklist_sections_handler(slugs), inner)
}

pub fn blacklist_section_fields(fields: SectionFields, inner: Vec<Middleware>) -> Middleware {
    wrap_with_section_modifying_handler(blacklist_section_fields_handler(fields), inner)
}

fn restrict_first(restrict: HandlerFunc) -> Middleware {
    Box::new(move |next: HandlerFunc| -> HandlerFunc {
        Box::new(move |schema, values| {
            restrict(schema, values)?;
            next(schema, values)
        })
    })
}

pub fn whitelist_sections_first(slugs: &[&str]) -> Middleware {
    restrict_first(whitelist_sections_handler(slugs))
}

pub fn whitelist_section_fields_first(fields: SectionFields) -> Middleware {
    restrict_first(whitelist_section_fields_handler(fields))
}

pub fn blacklist_sections_first(slugs: &[&str]) -> Middleware {
    restrict_first(blacklist_sections_handler(slugs))
}

pub fn blacklist_section_fields_first(fields: SectionFields) -> Middleware {
    restrict_first(blacklist_section_fields_handler(fields))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::test::config_map;
    use crate::middleware::execute;
    use crate::section::SchemaSection;
    use crate::sources::{from_defaults, from_map};
    use crate::types::{ConfigMap, FieldType};
    use crate::value::Value;
    use crate::values::Values;
    use serde_json::json;

    fn schema() -> Schema {
        Schema::new()
            .with_section(
                SchemaSection::new("a", "A")
                    .with_field(FieldDefinition::new("x", FieldType::Integer).with_default(0))
                    .with_field(FieldDefinition::new("z", FieldType::Integer).with_default(0)),
            )
            .with_section(
                SchemaSection::new("b", "B")
                    .with_field(FieldDefinition::new("y", FieldType::Integer).with_default(0)),
            )
    }

    fn full_map() -> ConfigMap {
        config_map(&[("a", "x", json!(1)), ("a", "z", json!(3)), ("b", "y", json!(2))])
    }

    fn run(middlewares: Vec<Middleware>) -> Values {
        let mut values = Values::new();
        execute(&schema(), &mut values, middlewares).unwrap();
        values
    }

    #[test]
    fn whitelisted_sections_hide_others_from_inner() {
        let values = run(vec![
            whitelist_sections(&["a"], vec![from_map(full_map())]),
            from_defaults(),
        ]);
        assert_eq!(values.value("a", "x"), Some(&Value::Integer(1)));
        assert_eq!(values.value("b", "y"), Some(&Value::Integer(0)));
        assert_eq!(values.field("b", "y").unwrap().log.len(), 1);
    }

    #[test]
    fn blacklisted_sections() {
        let values = run(vec![
            blacklist_sections(&["a"], vec![from_map(full_map())]),
            from_defaults(),
        ]);
        assert_eq!(values.value("a", "x"), Some(&Value::Integer(0)));
        assert_eq!(values.value("b", "y"), Some(&Value::Integer(2)));
    }

    #[test]
    fn whitelisted_fields() {
        let values = run(vec![
            whitelist_section_fields(section_fields(&[("a", &["x"])]), vec![from_map(full_map())]),
            from_defaults(),
        ]);
        assert_eq!(values.value("a", "x"), Some(&Value::Integer(1)));
        assert_eq!(values.value("a", "z"), Some(&Value::Integer(0)));
        assert_eq!(values.value("b", "y"), Some(&Value::Integer(0)));
    }

    #[test]
    fn blacklisted_fields() {
        let values = run(vec![
            blacklist_section_fields(section_fields(&[("a", &["x"])]), vec![from_map(full_map())]),
            from_defaults(),
        ]);
        assert_eq!(values.value("a", "x"), Some(&Value::Integer(0)));
        assert_eq!(values.value("a", "z"), Some(&Value::Integer(3)));
        assert_eq!(values.value("b", "y"), Some(&Value::Integer(2)));
    }

    #[test]
    fn first_variant_restricts_later_sources() {
        let values = run(vec![
            from_map(full_map()),
            whitelist_sections_first(&["b"]),
            from_defaults(),
        ]);
        assert!(!values.contains("a"));
        assert_eq!(values.value("b", "y"), Some(&Value::Integer(2)));
    }

    #[test]
    fn blacklist_fields_first_hides_from_defaults() {
        let values = run(vec![
            blacklist_section_fields_first(section_fields(&[("a", &["z"])])),
            from_defaults(),
        ]);
        assert!(values.field("a", "z").is_none());
        assert_eq!(values.value("a", "x"), Some(&Value::Integer(0)));
    }

    #[test]
    fn outer_schema_is_untouched() {
        let original = schema();
        let mut values = Values::new();
        execute(
            &original,
            &mut values,
            vec![whitelist_sections(&["a"], vec![from_defaults()])],
        )
        .unwrap();
        assert_eq!(original.len(), 2);
        assert!(values.contains("a"));
        assert!(!values.contains("b"));
    }

    #[test]
    fn restricted_view_filters_definitions() {
        let section = Arc::clone(schema().get("a").unwrap());
        let mut view = RestrictedSection::whitelist(section, ["x".to_string()]);
        assert_eq!(view.definitions().names().collect::<Vec<_>>(), vec!["x"]);
        assert!(view.definition("z").is_none());
        assert_eq!(view.slug(), "a");
        assert!(view.remove_definition("z").is_none());

        view.set_definition(FieldDefinition::new("w", FieldType::String));
        assert!(view.definition("w").is_some());
        assert!(view.inner().definition("w").is_some());
    }

    #[test]
    fn restricted_clone_is_deep() {
        let section = Arc::clone(schema().get("a").unwrap());
        let view = RestrictedSection::blacklist(section, ["z".to_string()]);
        let mut copy = view.clone_section();
        if let Some(copy) = make_section_mut(&mut copy) {
            copy.remove_definition("x");
        }
        assert!(view.definition("x").is_some());
        assert!(copy.definition("x").is_none());
    }
}
