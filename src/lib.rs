//! Layered, provenance-tracking parameter resolution for command line
//! applications.
//!
//! Layerfig resolves every parameter an application declares from defaults,
//! profiles, config files, environment variables and the command line, and
//! remembers for each value every source that touched it.
//!
//! ```ignore
//! let settings: Settings = Layerfig::builder()
//!     .app_name("myapp")
//!     .register(server_section(), |s: &mut Settings, sv| sv.decode_into(s))?
//!     .profiles(true)
//!     .parse()?;
//! ```
//!
//! # Vocabulary
//!
//! - A [`FieldDefinition`] declares one parameter: name, [`FieldType`], help,
//!   default, choices, whether it is required or a positional argument.
//! - A [`Section`] groups definitions under a slug and an optional flag
//!   prefix. [`SchemaSection`] is the plain implementation.
//! - A [`Schema`] is the ordered set of sections an application accepts.
//!   It can also be loaded from YAML with [`Schema::from_yaml_str`].
//! - [`Values`] hold the resolved [`SectionValues`] per section. Every
//!   [`FieldValue`] carries its current value plus a log of [`ParseStep`]s,
//!   oldest first.
//!
//! # Middlewares
//!
//! Sources are [`Middleware`]s: functions that wrap the next handler and
//! decide whether to write before or after it. [`execute`] chains them with
//! the first element outermost. A source that writes after calling `next`
//! overrides everything further down the list, so the usual order reads as
//! highest precedence first:
//!
//! ```ignore
//! execute(&schema, &mut values, vec![
//!     from_clap(matches),     // --app-port=9090
//!     from_env("MYAPP"),      // MYAPP_APP_PORT=9090
//!     from_files(paths, FileOptions::default()),
//!     from_defaults(),
//! ])?;
//! ```
//!
//! The `*_first` variants and [`from_map_as_default`] write before `next`
//! runs, or only where nothing has been set yet.
//!
//! # Layer precedence
//!
//! ```text
//! Defaults              FieldDefinition::with_default
//!        ↑ overridden by
//! Provided values       .values()
//!        ↑ overridden by
//! Profiles              profiles.yaml, selected by --profile / MYAPP_PROFILE
//!        ↑ overridden by
//! Config files          search paths in order, later paths win
//!        ↑ overridden by
//! Environment vars      MYAPP_{SECTION_PREFIX}{FIELD}
//!        ↑ overridden by
//! Command line          --{section-prefix}{field}
//! ```
//!
//! Every layer is sparse. Unset keys fall through to the layer below.
//!
//! # Config files and mappers
//!
//! Without a mapper, a file holds `{section: {field: value}}` in YAML, JSON or
//! TOML. A [`ConfigMapper`], such as the rule-based [`PatternMapper`],
//! translates any other layout into that shape first.
//!
//! # Scoping
//!
//! The [`scope`] module restricts which sections and fields a group of
//! middlewares can see, e.g. to keep a config file from setting credentials.
//!
//! # Clap adapter
//!
//! The `cli` module (behind the `clap` Cargo feature, on by default) turns a
//! schema into clap arguments and feeds the matches back as a middleware.
//! Without clap, [`from_string_list`] parses flags and positional arguments
//! from plain words. To use layerfig without clap:
//!
//! ```toml
//! layerfig = { version = "...", default-features = false }
//! ```
//!
//! # Error handling
//!
//! All fallible operations return [`LayerfigError`]. Use
//! [`LayerfigError::kind`] to branch on the broad [`ErrorKind`]. See the
//! [`error`] module for the full set.

pub mod error;
pub mod types;

mod builder;
#[cfg(feature = "clap")]
pub mod cli;
pub mod env;
pub mod field;
pub mod file;
pub mod inspect;
pub mod mapper;
pub mod middleware;
pub mod parse;
pub mod profiles;
pub mod render;
pub mod schema;
pub mod scope;
pub mod section;
pub mod serialize;
pub mod sources;
mod validate;
pub mod value;
pub mod values;

#[cfg(test)]
mod fixtures;

pub use builder::{Layerfig, LayerfigBuilder};
#[cfg(feature = "clap")]
pub use cli::{from_clap, register_schema, register_section};
pub use error::{ErrorKind, LayerfigError};
pub use field::{Definitions, FieldDefinition};
pub use inspect::{InspectResult, get_value, list_values};
pub use mapper::{ConfigMapper, MappingRule, PatternMapper};
pub use middleware::{HandlerFunc, Middleware, chain, execute};
pub use profiles::{CustomProfileOptions, ProfileSettings, from_custom_profiles, from_profiles};
pub use schema::Schema;
pub use section::{CompositeSection, DEFAULT_SLUG, SchemaSection, Section};
pub use serialize::{schema_to_yaml, values_to_json, values_to_yaml};
pub use sources::{
    FileOptions, from_args, from_defaults, from_env, from_file, from_files, from_map,
    from_map_as_default, from_string_list, require_fields,
};
pub use types::{ConfigMap, FieldType, SearchMode, SearchPath};
pub use value::Value;
pub use values::{FieldValue, ParseStep, SectionValues, Values};
