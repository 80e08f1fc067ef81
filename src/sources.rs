//! Source middlewares: defaults, maps, environment, config files, command
//! line words and precomputed values.
//!
//! Unless named `*_first`, every source calls `next` before applying its own
//! values, so it wins over the sources listed after it in the chain:
//!
//! ```ignore
//! execute(&schema, &mut values, vec![
//!     from_env("MYAPP"),                                   // highest
//!     from_files(vec!["base.yaml".into(), "prod.yaml".into()], FileOptions::default()),
//!     from_defaults(),                                     // lowest
//! ])?;
//! ```
//!
//! Each write appends a [`ParseStep`] recording its source label and
//! metadata (`env_key`, `config_file`/`index`, `flag`, `position`).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::env::update_from_env;
use crate::error::LayerfigError;
use crate::field::FieldDefinition;
use crate::file::read_config_map;
use crate::mapper::ConfigMapper;
use crate::middleware::{Middleware, after_next, before_next};
use crate::parse::split_list;
use crate::schema::Schema;
use crate::section::{DEFAULT_SLUG, Section, flag_name, is_positional};
use crate::types::ConfigMap;
use crate::values::{ParseStep, SectionValues, Values, source};

/// Write every valid default, keeping values set by other sources.
pub fn from_defaults() -> Middleware {
    after_next(|schema, values| schema.update_with_defaults(values))
}

/// Override fields with the entries of `map` (source `map`).
pub fn from_map(map: ConfigMap) -> Middleware {
    from_map_with_source(map, source::MAP)
}

/// [`from_map`] recording a custom source label.
pub fn from_map_with_source(map: ConfigMap, label: &str) -> Middleware {
    let label = label.to_string();
    after_next(move |schema, values| {
        update_from_map(schema, values, &map, &label, &IndexMap::new(), false)
    })
}

/// Apply `map` before delegating, so later sources in the chain win.
pub fn from_map_first(map: ConfigMap) -> Middleware {
    before_next(move |schema, values| {
        update_from_map(schema, values, &map, source::MAP, &IndexMap::new(), false)
    })
}

/// Write the entries of `map` only where no source other than the defaults
/// has set the field.
pub fn from_map_as_default(map: ConfigMap) -> Middleware {
    after_next(move |schema, values| {
        update_from_map(schema, values, &map, source::MAP, &IndexMap::new(), true)
    })
}

pub fn from_map_as_default_first(map: ConfigMap) -> Middleware {
    before_next(move |schema, values| {
        update_from_map(schema, values, &map, source::MAP, &IndexMap::new(), true)
    })
}

/// Coerce every entry of `map` that names a field of `schema` and write it.
///
/// Sections missing from the schema, and fields missing from a section, are
/// skipped. `null` entries are skipped too.
pub fn update_from_map(
    schema: &Schema,
    values: &mut Values,
    map: &ConfigMap,
    label: &str,
    metadata: &IndexMap<String, JsonValue>,
    as_default: bool,
) -> Result<(), LayerfigError> {
    for (slug, fields) in map {
        let Some(section) = schema.get(slug) else {
            continue;
        };
        let section_values = values.get_or_create(section);
        for (key, raw) in fields {
            if raw.is_null() {
                continue;
            }
            let Some(def) = section.resolve_field(key) else {
                continue;
            };
            let value = def.coerce(raw)?;
            let mut step = ParseStep::new(label, value).with_metadata_map(metadata);
            if let Some(inputs) = raw_inputs(raw) {
                step = step.with_raw_inputs(inputs);
            }
            if as_default {
                section_values.fields.update_as_default(&def, step);
            } else {
                section_values.fields.update(&def, step);
            }
        }
    }
    Ok(())
}

fn raw_inputs(raw: &JsonValue) -> Option<Vec<String>> {
    match raw {
        JsonValue::String(s) => Some(vec![s.clone()]),
        JsonValue::Array(items) => items
            .iter()
            .map(|item| item.as_str().map(str::to_string))
            .collect(),
        _ => None,
    }
}

/// Read `{PREFIX}_{SECTION_PREFIX}{FIELD}` variables from the process
/// environment.
pub fn from_env(prefix: &str) -> Middleware {
    let prefix = prefix.to_string();
    after_next(move |schema, values| {
        update_from_env(schema, values, &prefix, &|key| std::env::var(key).ok())
    })
}

/// [`from_env`] over an explicit variable snapshot.
pub fn from_env_vars(prefix: &str, vars: impl IntoIterator<Item = (String, String)>) -> Middleware {
    let prefix = prefix.to_string();
    let vars: HashMap<String, String> = vars.into_iter().collect();
    after_next(move |schema, values| {
        update_from_env(schema, values, &prefix, &|key| vars.get(key).cloned())
    })
}

/// Options for config-file sources.
#[derive(Clone, Default)]
pub struct FileOptions {
    pub mapper: Option<Arc<dyn ConfigMapper>>,
}

impl FileOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reshape each file through `mapper` before applying it.
    pub fn with_mapper(mut self, mapper: impl ConfigMapper + 'static) -> Self {
        self.mapper = Some(Arc::new(mapper));
        self
    }
}

/// Apply one config file (source `config`).
pub fn from_file(path: impl Into<PathBuf>, options: FileOptions) -> Middleware {
    from_files(vec![path.into()], options)
}

/// Apply config files in order: the first file has the lowest precedence.
pub fn from_files(paths: Vec<PathBuf>, options: FileOptions) -> Middleware {
    after_next(move |schema, values| {
        for (index, path) in paths.iter().enumerate() {
            let map = read_config_map(path, options.mapper.as_deref())?;
            let mut metadata = IndexMap::new();
            metadata.insert(
                "config_file".to_string(),
                JsonValue::String(path.display().to_string()),
            );
            metadata.insert("index".to_string(), JsonValue::from(index));
            update_from_map(schema, values, &map, source::CONFIG, &metadata, false)?;
            debug!(path = %path.display(), index, "applied config file");
        }
        Ok(())
    })
}

/// Parse positional arguments into the argument fields of the `default`
/// section, in definition order. A list argument takes the rest.
pub fn from_args(args: Vec<String>) -> Middleware {
    after_next(move |schema, values| update_from_args(schema, values, &args))
}

pub(crate) fn update_from_args(
    schema: &Schema,
    values: &mut Values,
    args: &[String],
) -> Result<(), LayerfigError> {
    let Some(section) = schema.get(DEFAULT_SLUG) else {
        return Ok(());
    };
    let section_values = values.get_or_create(section);
    let mut position = 0;
    for def in section.definitions().arguments() {
        if position >= args.len() {
            if def.required && !section_values.fields.contains(&def.name) {
                return Err(LayerfigError::RequiredMissing {
                    section: DEFAULT_SLUG.to_string(),
                    field: def.name.clone(),
                });
            }
            continue;
        }
        let inputs = if def.field_type.is_list() {
            args[position..].to_vec()
        } else {
            vec![args[position].clone()]
        };
        let value = def.parse(&inputs)?;
        let step = ParseStep::new(source::ARGUMENTS, value)
            .with_metadata("position", position)
            .with_raw_inputs(inputs.clone());
        section_values.fields.update(def, step);
        position += inputs.len();
    }
    if position < args.len() {
        return Err(LayerfigError::parse(
            "arguments",
            format!("too many arguments: {}", args[position..].join(" ")),
        ));
    }
    Ok(())
}

/// Parse a command line without a CLI framework (source `flags`, metadata
/// `flag`).
///
/// Accepts `--name value`, `--name=value` and `-s value` for the flags of
/// every section; bool flags need no value. `--` ends flag parsing. The
/// remaining words go to the positional arguments of the `default` section,
/// as with [`from_args`].
pub fn from_string_list(args: Vec<String>) -> Middleware {
    after_next(move |schema, values| update_from_string_list(schema, values, &args))
}

pub(crate) fn update_from_string_list(
    schema: &Schema,
    values: &mut Values,
    args: &[String],
) -> Result<(), LayerfigError> {
    let mut flags: IndexMap<String, (Arc<dyn Section>, FieldDefinition)> = IndexMap::new();
    let mut shorts: HashMap<String, String> = HashMap::new();
    for section in schema.iter() {
        for def in section.definitions().iter() {
            if is_positional(section.as_ref(), def) {
                continue;
            }
            let name = flag_name(section.as_ref(), def);
            if flags.contains_key(&name) {
                return Err(LayerfigError::Schema(format!(
                    "flag '{name}' of section '{}' is already registered",
                    section.slug()
                )));
            }
            if let Some(short) = def.short_flag {
                shorts.insert(short.to_string(), name.clone());
            }
            flags.insert(name, (Arc::clone(section), def.clone()));
        }
    }

    let mut inputs: IndexMap<String, Vec<String>> = IndexMap::new();
    let mut positionals = Vec::new();
    let mut words = args.iter();
    while let Some(word) = words.next() {
        if word == "--" {
            positionals.extend(words.by_ref().cloned());
            break;
        }
        let (name, inline) = if let Some(long) = word.strip_prefix("--") {
            match long.split_once('=') {
                Some((name, value)) => (name.to_string(), Some(value.to_string())),
                None => (long.to_string(), None),
            }
        } else if let Some(short) = word.strip_prefix('-').filter(|s| !s.is_empty()) {
            let long = shorts
                .get(short)
                .ok_or_else(|| LayerfigError::parse(word, "unknown flag"))?;
            (long.clone(), None)
        } else {
            positionals.push(word.clone());
            continue;
        };
        let (_, def) = flags
            .get(&name)
            .ok_or_else(|| LayerfigError::parse(word, "unknown flag"))?;
        let raw = match inline {
            Some(value) => value,
            None if def.field_type.is_bool() => "true".to_string(),
            None => words
                .next()
                .cloned()
                .ok_or_else(|| LayerfigError::parse(&name, "missing value for flag"))?,
        };
        let entry = inputs.entry(name).or_default();
        if def.field_type.splits_single_input() {
            entry.extend(split_list(&raw));
        } else if def.field_type.is_list() {
            entry.push(raw);
        } else {
            *entry = vec![raw];
        }
    }

    for (name, raw) in inputs {
        let Some((section, def)) = flags.get(&name) else {
            continue;
        };
        let value = def.parse(&raw)?;
        debug!(section = section.slug(), field = %def.name, flag = %name, "applied flag");
        let step = ParseStep::new(source::FLAGS, value)
            .with_metadata("flag", name.clone())
            .with_raw_inputs(raw);
        values.get_or_create(section).fields.update(def, step);
    }

    if schema.contains(DEFAULT_SLUG) {
        update_from_args(schema, values, &positionals)
    } else if positionals.is_empty() {
        Ok(())
    } else {
        Err(LayerfigError::parse(
            "arguments",
            format!("too many arguments: {}", positionals.join(" ")),
        ))
    }
}

/// Replace the values of one section after `next` runs.
pub fn replace_section_values(section_values: SectionValues) -> Middleware {
    after_next(move |_, values| {
        values.insert(section_values.clone());
        Ok(())
    })
}

/// Replace every section present in `replacement` after `next` runs.
pub fn replace_values(replacement: Values) -> Middleware {
    after_next(move |_, values| {
        for (_, section_values) in replacement.iter() {
            values.insert(section_values.clone());
        }
        Ok(())
    })
}

/// [`replace_values`] limited to the sections named in `slugs`. Slugs
/// missing from `replacement` are skipped.
pub fn replace_values_selective(replacement: Values, slugs: &[&str]) -> Middleware {
    let slugs: Vec<String> = slugs.iter().map(|s| s.to_string()).collect();
    after_next(move |_, values| {
        for slug in &slugs {
            if let Some(section_values) = replacement.get(slug) {
                values.insert(section_values.clone());
            }
        }
        Ok(())
    })
}

/// Merge one section's values in after `next` runs.
pub fn merge_section_values(section_values: SectionValues) -> Middleware {
    after_next(move |_, values| {
        values
            .get_or_create(&section_values.section)
            .fields
            .merge(&section_values.fields);
        Ok(())
    })
}

pub fn merge_values(incoming: Values) -> Middleware {
    after_next(move |_, values| {
        values.merge(&incoming);
        Ok(())
    })
}

/// [`merge_values`] limited to the sections named in `slugs`. Slugs missing
/// from `incoming` are skipped.
pub fn merge_values_selective(incoming: Values, slugs: &[&str]) -> Middleware {
    let slugs: Vec<String> = slugs.iter().map(|s| s.to_string()).collect();
    after_next(move |_, values| {
        for slug in &slugs {
            if let Some(section_values) = incoming.get(slug) {
                values
                    .get_or_create(&section_values.section)
                    .fields
                    .merge(&section_values.fields);
            }
        }
        Ok(())
    })
}

/// Fail with the first required field left without a value once the rest of
/// the chain has run.
pub fn require_fields() -> Middleware {
    after_next(|schema, values| check_required(schema, values))
}

pub fn check_required(schema: &Schema, values: &Values) -> Result<(), LayerfigError> {
    for section in schema.iter() {
        for def in section.definitions().iter().filter(|d| d.required) {
            if values.field(section.slug(), &def.name).is_none() {
                return Err(LayerfigError::RequiredMissing {
                    section: section.slug().to_string(),
                    field: def.name.clone(),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::field::FieldDefinition;
    use crate::fixtures::test::{app_schema, config_map};
    use crate::middleware::execute;
    use crate::section::SchemaSection;
    use crate::types::FieldType;
    use crate::value::Value;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn run(schema: &Schema, middlewares: Vec<Middleware>) -> Result<Values, LayerfigError> {
        let mut values = Values::new();
        execute(schema, &mut values, middlewares)?;
        Ok(values)
    }

    fn api_key_schema() -> Schema {
        Schema::new().with_section(
            SchemaSection::new("config", "Config")
                .with_field(FieldDefinition::new("api-key", FieldType::String).with_default("d")),
        )
    }

    #[test]
    fn defaults_fill_every_field_once() {
        let values = run(&app_schema(), vec![from_defaults()]).unwrap();
        for name in ["verbose", "port", "host"] {
            let fv = values.field("app", name).unwrap();
            assert_eq!(fv.log.len(), 1);
            assert_eq!(fv.log[0].source, "defaults");
        }
        assert_eq!(values.value("app", "port"), Some(&Value::Integer(8080)));
    }

    #[test]
    fn defaults_twice_equal_defaults_once() {
        let once = run(&app_schema(), vec![from_defaults()]).unwrap();
        let twice = run(&app_schema(), vec![from_defaults(), from_defaults()]).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn map_overrides_defaults() {
        let values = run(
            &api_key_schema(),
            vec![
                from_map(config_map(&[("config", "api-key", json!("m"))])),
                from_defaults(),
            ],
        )
        .unwrap();
        assert_eq!(values.value("config", "api-key"), Some(&Value::from("m")));
    }

    #[test]
    fn map_as_default_yields_to_map() {
        let values = run(
            &api_key_schema(),
            vec![
                from_map_as_default(config_map(&[("config", "api-key", json!("m"))])),
                from_map(config_map(&[("config", "api-key", json!("x"))])),
                from_defaults(),
            ],
        )
        .unwrap();
        assert_eq!(values.value("config", "api-key"), Some(&Value::from("x")));
    }

    #[test]
    fn map_as_default_replaces_plain_defaults() {
        let values = run(
            &api_key_schema(),
            vec![
                from_map_as_default(config_map(&[("config", "api-key", json!("m"))])),
                from_defaults(),
            ],
        )
        .unwrap();
        assert_eq!(values.value("config", "api-key"), Some(&Value::from("m")));
    }

    #[test]
    fn map_first_loses_to_later_sources() {
        let values = run(
            &api_key_schema(),
            vec![
                from_map_first(config_map(&[("config", "api-key", json!("first"))])),
                from_map(config_map(&[("config", "api-key", json!("later"))])),
            ],
        )
        .unwrap();
        assert_eq!(values.value("config", "api-key"), Some(&Value::from("later")));
    }

    #[test]
    fn map_skips_unknown_sections_and_fields() {
        let mut map = config_map(&[("nope", "x", json!(1)), ("app", "missing", json!(1))]);
        map.entry("app".to_string())
            .or_default()
            .insert("port".to_string(), json!("9090"));
        let values = run(&app_schema(), vec![from_map(map)]).unwrap();
        assert!(!values.contains("nope"));
        assert_eq!(values.value("app", "port"), Some(&Value::Integer(9090)));
        let step = &values.field("app", "port").unwrap().log[0];
        assert_eq!(step.source, "map");
        assert_eq!(step.raw_inputs, Some(vec!["9090".to_string()]));
    }

    #[test]
    fn map_accepts_prefixed_names() {
        let values = run(
            &app_schema(),
            vec![from_map(config_map(&[("app", "app-port", json!(1))]))],
        )
        .unwrap();
        assert_eq!(values.value("app", "port"), Some(&Value::Integer(1)));
    }

    #[test]
    fn map_type_errors_abort() {
        let err = run(
            &app_schema(),
            vec![from_map(config_map(&[("app", "port", json!("abc"))]))],
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
    }

    #[test]
    fn env_source_uses_snapshot() {
        let vars = vec![("DEMO_APP_VERBOSE".to_string(), "true".to_string())];
        let values = run(&app_schema(), vec![from_env_vars("DEMO", vars), from_defaults()]).unwrap();
        let fv = values.field("app", "verbose").unwrap();
        assert_eq!(fv.value, Value::Bool(true));
        assert_eq!(fv.last_source(), Some("env"));
        assert_eq!(fv.log[0].source, "defaults");
    }

    #[test]
    fn config_files_apply_in_order() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("base.yaml");
        let prod = dir.path().join("prod.yaml");
        fs::write(&base, "app:\n  port: 1\n").unwrap();
        fs::write(&prod, "app:\n  port: 2\n").unwrap();

        let values = run(
            &app_schema(),
            vec![from_files(vec![base.clone(), prod.clone()], FileOptions::default())],
        )
        .unwrap();
        let fv = values.field("app", "port").unwrap();
        assert_eq!(fv.value, Value::Integer(2));
        assert_eq!(fv.log.len(), 2);
        assert_eq!(fv.log[0].metadata["config_file"], json!(base.display().to_string()));
        assert_eq!(fv.log[0].metadata["index"], json!(0));
        assert_eq!(fv.log[1].metadata["config_file"], json!(prod.display().to_string()));
        assert_eq!(fv.log[1].metadata["index"], json!(1));
        assert!(fv.log.iter().all(|s| s.source == "config"));
    }

    #[test]
    fn config_file_with_mapper() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("flat.json");
        fs::write(&path, r#"{"listen": 7000}"#).unwrap();
        let mapper = |tree: &JsonValue| -> Result<ConfigMap, LayerfigError> {
            Ok(config_map(&[("app", "port", tree["listen"].clone())]))
        };
        let values = run(
            &app_schema(),
            vec![from_file(&path, FileOptions::new().with_mapper(mapper))],
        )
        .unwrap();
        assert_eq!(values.value("app", "port"), Some(&Value::Integer(7000)));
    }

    #[test]
    fn unsupported_config_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("c.ini");
        fs::write(&path, "").unwrap();
        let err = run(&app_schema(), vec![from_file(&path, FileOptions::default())]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
    }

    fn args_schema() -> Schema {
        Schema::new().with_section(SchemaSection::new(DEFAULT_SLUG, "Default").with_arguments([
            FieldDefinition::new("output", FieldType::String).required(),
            FieldDefinition::new("inputs", FieldType::StringList),
        ]))
    }

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn list_argument_takes_the_rest() {
        let values = run(&args_schema(), vec![from_args(args(&["out", "a", "b"]))]).unwrap();
        assert_eq!(values.value(DEFAULT_SLUG, "output"), Some(&Value::from("out")));
        let inputs = values.field(DEFAULT_SLUG, "inputs").unwrap();
        assert_eq!(inputs.value, Value::StringList(vec!["a".into(), "b".into()]));
        assert_eq!(inputs.log[0].source, "arguments");
        assert_eq!(inputs.log[0].metadata["position"], json!(1));
    }

    #[test]
    fn missing_required_argument() {
        let err = run(&args_schema(), vec![from_args(vec![])]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RequiredMissing);
    }

    #[test]
    fn optional_arguments_may_be_absent() {
        let values = run(&args_schema(), vec![from_args(args(&["out"]))]).unwrap();
        assert!(values.field(DEFAULT_SLUG, "inputs").is_none());
    }

    #[test]
    fn surplus_arguments_fail() {
        let schema = Schema::new().with_section(
            SchemaSection::new(DEFAULT_SLUG, "Default")
                .with_arguments([FieldDefinition::new("one", FieldType::String)]),
        );
        let err = run(&schema, vec![from_args(args(&["a", "b"]))]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
        assert!(err.to_string().contains("too many arguments"));
    }

    #[test]
    fn required_argument_with_default_may_be_absent() {
        let schema = Schema::new().with_section(
            SchemaSection::new(DEFAULT_SLUG, "Default").with_arguments([FieldDefinition::new(
                "output",
                FieldType::String,
            )
            .required()
            .with_default("out")]),
        );
        let values = run(&schema, vec![from_args(vec![]), from_defaults()]).unwrap();
        assert_eq!(values.value(DEFAULT_SLUG, "output"), Some(&Value::from("out")));
    }

    fn words_schema() -> Schema {
        let mut schema = app_schema();
        schema.append_section(
            SchemaSection::new("filter", "Filter")
                .with_prefix("filter-")
                .with_field(FieldDefinition::new("tags", FieldType::StringList)),
        );
        schema.append_section(
            SchemaSection::new(DEFAULT_SLUG, "Default")
                .with_arguments([FieldDefinition::new("inputs", FieldType::StringList)]),
        );
        schema
    }

    #[test]
    fn string_list_sets_flags_and_arguments() {
        let words = args(&[
            "--app-port",
            "9090",
            "-v",
            "--filter-tags=a,b",
            "--filter-tags",
            "c",
            "x.txt",
            "y.txt",
        ]);
        let values = run(&words_schema(), vec![from_string_list(words), from_defaults()]).unwrap();

        let port = values.field("app", "port").unwrap();
        assert_eq!(port.value, Value::Integer(9090));
        assert_eq!(port.last_source(), Some("flags"));
        assert_eq!(port.log.last().unwrap().metadata["flag"], json!("app-port"));
        assert_eq!(values.value("app", "verbose"), Some(&Value::Bool(true)));
        assert_eq!(values.value("app", "host"), Some(&Value::from("localhost")));
        assert_eq!(
            values.value("filter", "tags"),
            Some(&Value::StringList(vec!["a".into(), "b".into(), "c".into()]))
        );
        let inputs = values.field(DEFAULT_SLUG, "inputs").unwrap();
        assert_eq!(inputs.value, Value::StringList(vec!["x.txt".into(), "y.txt".into()]));
        assert_eq!(inputs.last_source(), Some("arguments"));
    }

    #[test]
    fn string_list_bool_forms_and_separator() {
        let words = args(&["--app-verbose=false", "--", "--app-port"]);
        let values = run(&words_schema(), vec![from_string_list(words)]).unwrap();
        assert_eq!(values.value("app", "verbose"), Some(&Value::Bool(false)));
        assert!(values.field("app", "port").is_none());
        assert_eq!(
            values.value(DEFAULT_SLUG, "inputs"),
            Some(&Value::StringList(vec!["--app-port".into()]))
        );
    }

    #[test]
    fn string_list_errors() {
        let unknown = run(&words_schema(), vec![from_string_list(args(&["--nope"]))]).unwrap_err();
        assert_eq!(unknown.kind(), ErrorKind::Parse);
        assert!(unknown.to_string().contains("--nope"));

        let missing = run(&words_schema(), vec![from_string_list(args(&["--app-port"]))]).unwrap_err();
        assert_eq!(missing.kind(), ErrorKind::Parse);

        let surplus = run(&app_schema(), vec![from_string_list(args(&["stray"]))]).unwrap_err();
        assert!(surplus.to_string().contains("too many arguments"));

        let bad = run(&words_schema(), vec![from_string_list(args(&["--app-port", "x"]))]).unwrap_err();
        assert_eq!(bad.kind(), ErrorKind::Parse);
    }

    #[test]
    fn selective_replace_and_merge() {
        let schema = words_schema();
        let mut precomputed = Values::new();
        for slug in ["app", "filter"] {
            let section = Arc::clone(schema.get(slug).unwrap());
            let def = section.definitions().iter().next().cloned().unwrap();
            let value = if slug == "app" {
                Value::Bool(true)
            } else {
                Value::StringList(vec!["z".into()])
            };
            precomputed
                .get_or_create(&section)
                .fields
                .update(&def, ParseStep::new("custom", value));
        }

        let replaced = run(
            &schema,
            vec![
                replace_values_selective(precomputed.clone(), &["app", "missing"]),
                from_defaults(),
            ],
        )
        .unwrap();
        assert_eq!(replaced.get("app").unwrap().fields.len(), 1);
        assert!(replaced.value("filter", "tags").is_none());

        let merged = run(
            &schema,
            vec![merge_values_selective(precomputed, &["filter"]), from_defaults()],
        )
        .unwrap();
        assert_eq!(
            merged.value("filter", "tags"),
            Some(&Value::StringList(vec!["z".into()]))
        );
        assert_eq!(merged.value("app", "verbose"), Some(&Value::Bool(false)));
        assert_eq!(merged.get("app").unwrap().fields.len(), 3);
    }

    #[test]
    fn replace_and_merge_values() {
        let schema = app_schema();
        let mut precomputed = Values::new();
        let section = Arc::clone(schema.get("app").unwrap());
        let port = section.definition("port").unwrap();
        precomputed
            .get_or_create(&section)
            .fields
            .update(&port, ParseStep::new("custom", Value::Integer(1)));

        let replaced = run(
            &schema,
            vec![replace_values(precomputed.clone()), from_defaults()],
        )
        .unwrap();
        assert_eq!(replaced.get("app").unwrap().fields.len(), 1);

        let merged = run(&schema, vec![merge_values(precomputed.clone()), from_defaults()]).unwrap();
        assert_eq!(merged.value("app", "port"), Some(&Value::Integer(1)));
        assert_eq!(merged.get("app").unwrap().fields.len(), 3);
        assert_eq!(merged.field("app", "port").unwrap().log.len(), 2);

        let sv = precomputed.get("app").unwrap().clone();
        let merged = run(&schema, vec![merge_section_values(sv.clone()), from_defaults()]).unwrap();
        assert_eq!(merged.value("app", "port"), Some(&Value::Integer(1)));
        let replaced = run(&schema, vec![replace_section_values(sv), from_defaults()]).unwrap();
        assert_eq!(replaced.get("app").unwrap().fields.len(), 1);
    }

    #[test]
    fn require_fields_reports_missing() {
        let schema = Schema::new().with_section(
            SchemaSection::new("db", "DB")
                .with_field(FieldDefinition::new("url", FieldType::String).required()),
        );
        let err = run(&schema, vec![require_fields(), from_defaults()]).unwrap_err();
        match err {
            LayerfigError::RequiredMissing { section, field } => {
                assert_eq!(section, "db");
                assert_eq!(field, "url");
            }
            other => panic!("Expected RequiredMissing, got: {other:?}"),
        }
        let ok = run(
            &schema,
            vec![
                require_fields(),
                from_map(config_map(&[("db", "url", json!("pg://"))])),
            ],
        );
        assert!(ok.is_ok());
    }
}
