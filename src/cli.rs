//! Clap adapter.
//!
//! Compiled only with the `clap` Cargo feature (on by default). Sections are
//! projected onto a [`clap::Command`] as long options named
//! `{section prefix}{field name}`; the argument definitions of the `default`
//! section become positional arguments. After clap has parsed the command
//! line, [`from_clap`] feeds the matches into the middleware chain.
//!
//! ```ignore
//! let command = register_schema(Command::new("demo"), &schema)?;
//! let matches = command.get_matches();
//! execute(&schema, &mut values, vec![
//!     from_clap(matches),
//!     from_env("DEMO"),
//!     from_defaults(),
//! ])?;
//! ```
//!
//! Only values typed on the command line are applied, so clap never shadows
//! lower layers with its own defaults.

use clap::builder::PossibleValuesParser;
use clap::parser::ValueSource;
use clap::{Arg, ArgAction, ArgMatches, Command};
use tracing::debug;

use crate::error::LayerfigError;
use crate::field::FieldDefinition;
use crate::middleware::{Middleware, after_next};
use crate::schema::Schema;
pub use crate::section::flag_name;
use crate::section::{Section, is_positional};
use crate::values::{ParseStep, Values, source};

fn flag_arg(id: String, def: &FieldDefinition) -> Arg {
    let mut arg = Arg::new(id.clone()).long(id);
    if let Some(short) = def.short_flag {
        arg = arg.short(short);
    }
    if def.field_type.is_bool() {
        return arg
            .num_args(0..=1)
            .require_equals(true)
            .default_missing_value("true")
            .action(ArgAction::Set);
    }
    if def.field_type.is_list() {
        arg = arg.action(ArgAction::Append);
        if def.field_type.splits_single_input() {
            arg = arg.value_delimiter(',');
        }
    } else {
        arg = arg.action(ArgAction::Set);
    }
    arg
}

fn positional_arg(id: String, def: &FieldDefinition) -> Arg {
    let arg = Arg::new(id).required(def.required && def.default.is_none());
    if def.field_type.is_list() {
        arg.num_args(1..).action(ArgAction::Append)
    } else {
        arg.action(ArgAction::Set)
    }
}

/// Add every field of `section` to `command`.
///
/// Fails with a Schema error when a flag name is already taken.
pub fn register_section(command: Command, section: &dyn Section) -> Result<Command, LayerfigError> {
    let mut command = command;
    for def in section.definitions().iter() {
        let id = flag_name(section, def);
        if command.get_arguments().any(|a| a.get_id().as_str() == id) {
            return Err(LayerfigError::Schema(format!(
                "flag '{id}' of section '{}' is already registered",
                section.slug()
            )));
        }
        let mut arg = if is_positional(section, def) {
            positional_arg(id, def)
        } else {
            flag_arg(id, def)
        };
        if !def.help.is_empty() {
            arg = arg.help(def.help.clone());
        }
        if def.field_type.is_choice() {
            arg = arg.value_parser(PossibleValuesParser::new(def.choices.clone()));
        }
        command = command.arg(arg);
    }
    Ok(command)
}

pub fn register_schema(command: Command, schema: &Schema) -> Result<Command, LayerfigError> {
    schema
        .iter()
        .try_fold(command, |command, section| register_section(command, section.as_ref()))
}

/// Apply the values given on the command line (source `flags`, positional
/// arguments of the `default` section with source `arguments`).
pub fn from_clap(matches: ArgMatches) -> Middleware {
    after_next(move |schema, values| update_from_matches(schema, values, &matches))
}

fn update_from_matches(
    schema: &Schema,
    values: &mut Values,
    matches: &ArgMatches,
) -> Result<(), LayerfigError> {
    for section in schema.iter() {
        let mut position = 0;
        for def in section.definitions().iter() {
            let positional = is_positional(section.as_ref(), def);
            let id = flag_name(section.as_ref(), def);
            let Some(inputs) = command_line_inputs(matches, &id)? else {
                continue;
            };
            let value = def.parse(&inputs)?;
            let step = if positional {
                let step = ParseStep::new(source::ARGUMENTS, value).with_metadata("position", position);
                position += inputs.len();
                step
            } else {
                ParseStep::new(source::FLAGS, value).with_metadata("flag", id.clone())
            };
            debug!(section = section.slug(), field = %def.name, flag = %id, "applied command line value");
            values
                .get_or_create(section)
                .fields
                .update(def, step.with_raw_inputs(inputs));
        }
    }
    Ok(())
}

/// The raw strings given for `id`, or `None` when the argument is unknown to
/// the command or was not typed by the user.
fn command_line_inputs(matches: &ArgMatches, id: &str) -> Result<Option<Vec<String>>, LayerfigError> {
    if !matches.try_contains_id(id).unwrap_or(false) {
        return Ok(None);
    }
    if matches.value_source(id) != Some(ValueSource::CommandLine) {
        return Ok(None);
    }
    let raw = matches
        .try_get_many::<String>(id)
        .map_err(|e| LayerfigError::parse(id, e.to_string()))?;
    Ok(raw.map(|items| items.cloned().collect()))
}
