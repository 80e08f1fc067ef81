//! Environment variable source.
//!
//! Each field maps to one variable named
//! `UPPER(prefix + "_" + section_prefix + field_name)` with `-` replaced by
//! `_`. With an empty prefix the leading `PREFIX_` part is dropped.
//!
//! Plain list fields split the variable on commas (an optional surrounding
//! `[...]` is stripped first). File-backed lists take the variable as a
//! single path; every other type receives the raw string.
//!
//! Takes a lookup function so tests can pass synthetic data instead of the
//! process environment.

use tracing::debug;

use crate::error::LayerfigError;
use crate::field::FieldDefinition;
use crate::parse::split_list;
use crate::schema::Schema;
use crate::values::{ParseStep, Values, source};

/// The variable name for a field.
pub fn env_key(prefix: &str, section_prefix: &str, field_name: &str) -> String {
    let base = format!("{section_prefix}{field_name}").replace('-', "_").to_uppercase();
    if prefix.is_empty() {
        base
    } else {
        format!("{}_{base}", prefix.replace('-', "_").to_uppercase())
    }
}

/// Raw inputs for a field from one variable value.
pub fn env_inputs(definition: &FieldDefinition, raw: &str) -> Vec<String> {
    if definition.field_type.splits_single_input() {
        split_list(raw)
    } else {
        vec![raw.to_string()]
    }
}

/// Parse every variable that matches a field of `schema` into `values`.
pub fn update_from_env(
    schema: &Schema,
    values: &mut Values,
    prefix: &str,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> Result<(), LayerfigError> {
    for section in schema.iter() {
        let section_values = values.get_or_create(section);
        for def in section.definitions().iter() {
            let key = env_key(prefix, section.prefix(), &def.name);
            let Some(raw) = lookup(&key) else {
                continue;
            };
            let inputs = env_inputs(def, &raw);
            let value = def.parse(&inputs)?;
            debug!(section = section.slug(), field = %def.name, env_key = %key, "applied env var");
            let step = ParseStep::new(source::ENV, value)
                .with_raw_inputs(vec![raw])
                .with_metadata("env_key", key);
            section_values.fields.update(def, step);
        }
    }
    Ok(())
}
