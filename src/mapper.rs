//! Config mappers: turn arbitrarily shaped config trees into the canonical
//! `{section: {field: value}}` map.
//!
//! Any `Fn(&JsonValue) -> Result<ConfigMap, LayerfigError>` is a
//! [`ConfigMapper`]. [`PatternMapper`] is the rule-driven implementation.
//!
//! # Pattern rules
//!
//! A [`MappingRule`] source is a dotted path whose segments are:
//!
//! - a literal key (`settings`),
//! - a wildcard `*` matching any key without capturing it,
//! - a named capture `{env}` matching any key and recording it.
//!
//! The target field may reference captures (`{env}-api-key`). Child rules
//! extend their parent's path, inherit its target section and see its
//! captures.
//!
//! ```yaml
//! mappings:
//!   - source: "app.{env}.api_key"
//!     target_section: demo
//!     target_field: "{env}-api-key"
//!   - source: "app.db"
//!     target_section: db
//!     rules:
//!       - source: host
//!         target_field: host
//! ```
//!
//! Keys are visited in lexicographic order at every level, so the result
//! does not depend on map ordering. A rule matching several distinct values
//! for one field, or two rules writing the same field, is an error.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::error::LayerfigError;
use crate::schema::Schema;
use crate::section::Section;
use crate::types::ConfigMap;
use crate::validate::deserialize_checked;

static CAPTURE_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([^{}]*)\}").expect("static regex must compile"));

static CAPTURE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static regex must compile"));

/// Transforms a parsed config tree into the canonical section map.
pub trait ConfigMapper: Send + Sync {
    fn map(&self, tree: &JsonValue) -> Result<ConfigMap, LayerfigError>;
}

impl<F> ConfigMapper for F
where
    F: Fn(&JsonValue) -> Result<ConfigMap, LayerfigError> + Send + Sync,
{
    fn map(&self, tree: &JsonValue) -> Result<ConfigMap, LayerfigError> {
        self(tree)
    }
}

/// One mapping from a source path pattern to a section field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MappingRule {
    pub source: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub target_section: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub target_field: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub required: bool,
    #[serde(default, alias = "children", skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<MappingRule>,
}

impl MappingRule {
    /// A leaf rule.
    pub fn new(
        source: impl Into<String>,
        target_section: impl Into<String>,
        target_field: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            target_section: target_section.into(),
            target_field: target_field.into(),
            ..Self::default()
        }
    }

    /// A parent rule mapping the children of the object at `source`.
    pub fn object(
        source: impl Into<String>,
        target_section: impl Into<String>,
        children: Vec<MappingRule>,
    ) -> Self {
        Self {
            source: source.into(),
            target_section: target_section.into(),
            rules: children,
            ..Self::default()
        }
    }

    /// A child rule inheriting its parent's target section.
    pub fn child(source: impl Into<String>, target_field: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target_field: target_field.into(),
            ..Self::default()
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Wildcard,
    Capture(String),
}

#[derive(Debug, Clone)]
struct CompiledRule {
    source: String,
    segments: Vec<Segment>,
    target_section: String,
    target_field: String,
    required: bool,
}

struct Match {
    value: JsonValue,
    captures: HashMap<String, String>,
}

/// A [`ConfigMapper`] driven by [`MappingRule`]s, validated against a schema
/// when built.
#[derive(Debug, Clone)]
pub struct PatternMapper {
    schema: Schema,
    compiled: Vec<CompiledRule>,
}

impl PatternMapper {
    pub fn new(schema: &Schema, rules: Vec<MappingRule>) -> Result<Self, LayerfigError> {
        let mut compiled = Vec::new();
        for rule in &rules {
            compile_rule(schema, rule, "", &[], &mut compiled)?;
        }
        debug!(rules = rules.len(), patterns = compiled.len(), "compiled pattern mapper");
        Ok(Self {
            schema: schema.clone(),
            compiled,
        })
    }

    pub fn builder(schema: &Schema) -> PatternMapperBuilder<'_> {
        PatternMapperBuilder {
            schema,
            rules: Vec::new(),
        }
    }

    /// Load rules from a YAML or JSON file and compile them.
    pub fn from_rules_file(schema: &Schema, path: &Path) -> Result<Self, LayerfigError> {
        Self::new(schema, load_rules_from_file(path)?)
    }

    fn collect_matches(&self, rule: &CompiledRule, tree: &JsonValue) -> Vec<Match> {
        let mut matches = Vec::new();
        match_segments(&rule.segments, tree, HashMap::new(), &mut matches);
        matches
    }

    fn section(&self, slug: &str) -> Result<&dyn Section, LayerfigError> {
        self.schema
            .get(slug)
            .map(|s| s.as_ref())
            .ok_or_else(|| LayerfigError::Schema(format!("target section '{slug}' does not exist")))
    }
}

impl ConfigMapper for PatternMapper {
    fn map(&self, tree: &JsonValue) -> Result<ConfigMap, LayerfigError> {
        if !tree.is_object() {
            return Err(LayerfigError::UnsupportedFormat {
                path: PathBuf::from("<config>"),
                reason: "config root must be a map".into(),
            });
        }

        let mut result = ConfigMap::new();
        let mut written: HashMap<(String, String), String> = HashMap::new();

        for rule in &self.compiled {
            let matches = self.collect_matches(rule, tree);
            if matches.is_empty() && rule.required {
                return Err(LayerfigError::RequiredPatternUnmatched {
                    pattern: rule.source.clone(),
                    detail: nearest_path_detail(&rule.segments, tree),
                });
            }

            let section = self.section(&rule.target_section)?;
            let mut resolved: IndexMap<String, Vec<JsonValue>> = IndexMap::new();
            for m in &matches {
                let field = resolve_target_field(&rule.target_field, &m.captures)?;
                let canonical = canonical_field_name(section, &field);
                if section.resolve_field(&canonical).is_none() {
                    return Err(LayerfigError::Pattern {
                        pattern: rule.source.clone(),
                        reason: missing_field_reason(&field, &canonical, &rule.target_section),
                    });
                }
                resolved.entry(canonical).or_default().push(m.value.clone());
            }

            for (field, values) in resolved {
                let mut distinct: Vec<&JsonValue> = Vec::new();
                for v in &values {
                    if !distinct.contains(&v) {
                        distinct.push(v);
                    }
                }
                if distinct.len() > 1 {
                    return Err(LayerfigError::MappingAmbiguous(format!(
                        "pattern '{}' matched {} distinct values for field '{field}'",
                        rule.source,
                        distinct.len()
                    )));
                }

                let key = (rule.target_section.clone(), field.clone());
                if let Some(previous) = written.get(&key) {
                    return Err(LayerfigError::MappingAmbiguous(format!(
                        "field '{field}' in section '{}' is written by both '{previous}' and '{}'",
                        rule.target_section, rule.source
                    )));
                }
                written.insert(key, rule.source.clone());

                let value = distinct[0].clone();
                result
                    .entry(rule.target_section.clone())
                    .or_default()
                    .insert(field, value);
            }
        }

        Ok(result)
    }
}

/// Fluent assembly of mapping rules.
pub struct PatternMapperBuilder<'a> {
    schema: &'a Schema,
    rules: Vec<MappingRule>,
}

impl PatternMapperBuilder<'_> {
    pub fn map(
        mut self,
        source: impl Into<String>,
        target_section: impl Into<String>,
        target_field: impl Into<String>,
    ) -> Self {
        self.rules
            .push(MappingRule::new(source, target_section, target_field));
        self
    }

    pub fn map_required(
        mut self,
        source: impl Into<String>,
        target_section: impl Into<String>,
        target_field: impl Into<String>,
    ) -> Self {
        self.rules
            .push(MappingRule::new(source, target_section, target_field).required());
        self
    }

    pub fn map_object(
        mut self,
        source: impl Into<String>,
        target_section: impl Into<String>,
        children: Vec<MappingRule>,
    ) -> Self {
        self.rules
            .push(MappingRule::object(source, target_section, children));
        self
    }

    pub fn build(self) -> Result<PatternMapper, LayerfigError> {
        PatternMapper::new(self.schema, self.rules)
    }
}

fn compile_rule(
    schema: &Schema,
    rule: &MappingRule,
    parent_path: &str,
    parent_captures: &[String],
    out: &mut Vec<CompiledRule>,
) -> Result<(), LayerfigError> {
    let own_segments = parse_pattern(&rule.source)?;
    let full_path = if parent_path.is_empty() {
        rule.source.clone()
    } else {
        format!("{parent_path}.{}", rule.source)
    };

    let own_captures: Vec<String> = own_segments
        .iter()
        .filter_map(|s| match s {
            Segment::Capture(name) => Some(name.clone()),
            _ => None,
        })
        .collect();
    let shadowed: Vec<&String> = own_captures
        .iter()
        .filter(|c| parent_captures.contains(*c))
        .collect();
    if !shadowed.is_empty() {
        warn!(
            captures = ?shadowed,
            rule = %rule.source,
            parent = %parent_path,
            "nested rule shadows parent captures"
        );
    }
    let mut captures = parent_captures.to_vec();
    captures.extend(own_captures);

    if !rule.rules.is_empty() {
        for child in &rule.rules {
            let mut child = child.clone();
            if child.target_section.is_empty() {
                child.target_section = rule.target_section.clone();
            }
            compile_rule(schema, &child, &full_path, &captures, out)?;
        }
        return Ok(());
    }

    if rule.target_section.is_empty() {
        return Err(LayerfigError::Schema(format!(
            "rule '{full_path}' has no target section"
        )));
    }
    let section = schema.get(&rule.target_section).ok_or_else(|| {
        LayerfigError::Schema(format!(
            "rule '{full_path}' targets section '{}' which does not exist",
            rule.target_section
        ))
    })?;

    let refs = capture_refs(&rule.target_field);
    for r in &refs {
        if !CAPTURE_NAME.is_match(r) || !captures.contains(r) {
            return Err(LayerfigError::Pattern {
                pattern: full_path.clone(),
                reason: format!(
                    "capture reference {{{r}}} in target field '{}' not found in source pattern",
                    rule.target_field
                ),
            });
        }
    }
    if refs.is_empty() {
        let canonical = canonical_field_name(section.as_ref(), &rule.target_field);
        if section.resolve_field(&canonical).is_none() {
            return Err(LayerfigError::Pattern {
                pattern: full_path,
                reason: missing_field_reason(&rule.target_field, &canonical, &rule.target_section),
            });
        }
    }

    out.push(CompiledRule {
        segments: parse_pattern(&full_path)?,
        source: full_path,
        target_section: rule.target_section.clone(),
        target_field: rule.target_field.clone(),
        required: rule.required,
    });
    Ok(())
}

fn parse_pattern(pattern: &str) -> Result<Vec<Segment>, LayerfigError> {
    let invalid = |reason: String| LayerfigError::Pattern {
        pattern: pattern.to_string(),
        reason,
    };
    if pattern.is_empty() {
        return Err(invalid("pattern cannot be empty".into()));
    }
    pattern
        .split('.')
        .map(|segment| {
            if segment.is_empty() {
                return Err(invalid("pattern cannot contain empty segments".into()));
            }
            if segment == "*" {
                return Ok(Segment::Wildcard);
            }
            if let Some(inner) = segment.strip_prefix('{') {
                let Some(name) = inner.strip_suffix('}') else {
                    return Err(invalid(format!("unclosed capture group in segment '{segment}'")));
                };
                if name.is_empty() {
                    return Err(invalid(format!("empty capture name in segment '{segment}'")));
                }
                if !CAPTURE_NAME.is_match(name) {
                    return Err(invalid(format!(
                        "invalid capture name '{name}' (letters, digits and underscores, not starting with a digit)"
                    )));
                }
                return Ok(Segment::Capture(name.to_string()));
            }
            if segment.contains(['{', '}']) {
                return Err(invalid(format!("unbalanced brace in segment '{segment}'")));
            }
            Ok(Segment::Literal(segment.to_string()))
        })
        .collect()
}

fn capture_refs(template: &str) -> Vec<String> {
    CAPTURE_REF
        .captures_iter(template)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

fn resolve_target_field(
    template: &str,
    captures: &HashMap<String, String>,
) -> Result<String, LayerfigError> {
    let mut missing = None;
    let resolved = CAPTURE_REF.replace_all(template, |c: &regex::Captures<'_>| {
        let name = c.get(1).map_or("", |m| m.as_str());
        match captures.get(name) {
            Some(value) => value.clone(),
            None => {
                missing = Some(name.to_string());
                String::new()
            }
        }
    });
    match missing {
        Some(name) => Err(LayerfigError::Pattern {
            pattern: template.to_string(),
            reason: format!("capture '{name}' not found"),
        }),
        None => Ok(resolved.into_owned()),
    }
}

/// Prepend the section prefix unless the field already carries it.
fn canonical_field_name(section: &dyn Section, field: &str) -> String {
    let prefix = section.prefix();
    if prefix.is_empty() || field.starts_with(prefix) {
        field.to_string()
    } else {
        format!("{prefix}{field}")
    }
}

fn missing_field_reason(field: &str, canonical: &str, section: &str) -> String {
    if field == canonical {
        format!("target field '{field}' does not exist in section '{section}'")
    } else {
        format!("target field '{field}' (checked as '{canonical}') does not exist in section '{section}'")
    }
}

fn sorted_keys(map: &serde_json::Map<String, JsonValue>) -> Vec<&String> {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();
    keys
}

fn match_segments(
    segments: &[Segment],
    node: &JsonValue,
    captures: HashMap<String, String>,
    out: &mut Vec<Match>,
) {
    let Some((segment, rest)) = segments.split_first() else {
        out.push(Match {
            value: node.clone(),
            captures,
        });
        return;
    };
    let JsonValue::Object(map) = node else {
        return;
    };
    match segment {
        Segment::Literal(key) => {
            if let Some(child) = map.get(key) {
                match_segments(rest, child, captures, out);
            }
        }
        Segment::Wildcard => {
            for key in sorted_keys(map) {
                match_segments(rest, &map[key], captures.clone(), out);
            }
        }
        Segment::Capture(name) => {
            for key in sorted_keys(map) {
                let mut captures = captures.clone();
                captures.insert(name.clone(), key.clone());
                match_segments(rest, &map[key], captures, out);
            }
        }
    }
}

/// Describe where a pattern stopped matching: the deepest existing path, the
/// segment that failed and the keys available there.
fn nearest_path_detail(segments: &[Segment], tree: &JsonValue) -> String {
    let mut parts: Vec<&str> = Vec::new();
    let mut current = tree;
    let mut missing = String::new();
    let mut keys: Vec<String> = Vec::new();

    for segment in segments {
        let JsonValue::Object(map) = current else {
            missing = segment_text(segment);
            break;
        };
        match segment {
            Segment::Literal(key) if map.contains_key(key) => {
                parts.push(key);
                current = &map[key];
            }
            _ => {
                missing = segment_text(segment);
                keys = sorted_keys(map).into_iter().cloned().collect();
                break;
            }
        }
    }

    let nearest = parts.join(".");
    if nearest.is_empty() && missing.is_empty() {
        return String::new();
    }
    let mut detail = format!("; nearest existing path: '{nearest}'; missing segment: '{missing}'");
    if !keys.is_empty() {
        detail.push_str(&format!("; available keys: [{}]", keys.join(", ")));
    }
    detail
}

fn segment_text(segment: &Segment) -> String {
    match segment {
        Segment::Literal(key) => key.clone(),
        Segment::Wildcard => "*".to_string(),
        Segment::Capture(name) => format!("{{{name}}}"),
    }
}

#[derive(Deserialize)]
struct RulesFile {
    mappings: Vec<MappingRule>,
}

/// Parse mapping rules from YAML or JSON text: either `{mappings: [...]}` or
/// a bare list of rules. Unknown keys are rejected.
pub fn load_rules_from_str(content: &str) -> Result<Vec<MappingRule>, LayerfigError> {
    load_rules(content, Path::new("<inline>"))
}

pub fn load_rules_from_file(path: &Path) -> Result<Vec<MappingRule>, LayerfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| LayerfigError::io(path, e))?;
    load_rules(&content, path)
}

fn load_rules(content: &str, path: &Path) -> Result<Vec<MappingRule>, LayerfigError> {
    let doc: serde_yaml::Value =
        serde_yaml::from_str(content).map_err(|e| LayerfigError::FileParse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    match doc {
        serde_yaml::Value::Mapping(_) => {
            let file: RulesFile = deserialize_checked(doc, content, path, true)?;
            Ok(file.mappings)
        }
        serde_yaml::Value::Sequence(_) => deserialize_checked(doc, content, path, true),
        _ => Err(LayerfigError::FileParse {
            path: path.to_path_buf(),
            reason: "mapping file must contain a 'mappings' list or be a list of rules".into(),
        }),
    }
}
