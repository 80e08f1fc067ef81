//! Shared vocabulary types: field type tags and config-file discovery.
//!
//! # Field types
//!
//! [`FieldType`] is the closed set of parameter types a
//! [`FieldDefinition`](crate::FieldDefinition) can declare. The serialized tag
//! (`"int"`, `"stringList"`, `"objectFromFile"`, ...) is what declarative schema
//! files use.
//!
//! # Discovery
//!
//! [`SearchPath`] and [`SearchMode`] describe where the application parser looks
//! for config files. Search paths are listed in **priority-ascending** order:
//! the last entry wins.
//!
//! ```ignore
//! // System-wide defaults, then the user's platform config dir.
//! .search_paths(vec![
//!     SearchPath::Path("/etc/myapp".into()),
//!     SearchPath::Platform,
//! ])
//! ```

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// The canonical raw-value shape: `{section-slug: {field-name: raw value}}`.
///
/// This is what config files hold without a mapper, what profiles select, and
/// what [`ConfigMapper`](crate::ConfigMapper)s produce.
pub type ConfigMap = IndexMap<String, IndexMap<String, JsonValue>>;

/// Type tag of a field definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldType {
    String,
    Secret,
    #[serde(rename = "int")]
    Integer,
    Float,
    Bool,
    Date,
    Choice,
    StringList,
    #[serde(rename = "intList")]
    IntegerList,
    FloatList,
    ChoiceList,
    File,
    FileList,
    StringFromFile,
    StringFromFiles,
    StringListFromFile,
    StringListFromFiles,
    ObjectFromFile,
    ObjectListFromFile,
    ObjectListFromFiles,
    KeyValue,
}

impl FieldType {
    pub const ALL: [FieldType; 21] = [
        FieldType::String,
        FieldType::Secret,
        FieldType::Integer,
        FieldType::Float,
        FieldType::Bool,
        FieldType::Date,
        FieldType::Choice,
        FieldType::StringList,
        FieldType::IntegerList,
        FieldType::FloatList,
        FieldType::ChoiceList,
        FieldType::File,
        FieldType::FileList,
        FieldType::StringFromFile,
        FieldType::StringFromFiles,
        FieldType::StringListFromFile,
        FieldType::StringListFromFiles,
        FieldType::ObjectFromFile,
        FieldType::ObjectListFromFile,
        FieldType::ObjectListFromFiles,
        FieldType::KeyValue,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Secret => "secret",
            FieldType::Integer => "int",
            FieldType::Float => "float",
            FieldType::Bool => "bool",
            FieldType::Date => "date",
            FieldType::Choice => "choice",
            FieldType::StringList => "stringList",
            FieldType::IntegerList => "intList",
            FieldType::FloatList => "floatList",
            FieldType::ChoiceList => "choiceList",
            FieldType::File => "file",
            FieldType::FileList => "fileList",
            FieldType::StringFromFile => "stringFromFile",
            FieldType::StringFromFiles => "stringFromFiles",
            FieldType::StringListFromFile => "stringListFromFile",
            FieldType::StringListFromFiles => "stringListFromFiles",
            FieldType::ObjectFromFile => "objectFromFile",
            FieldType::ObjectListFromFile => "objectListFromFile",
            FieldType::ObjectListFromFiles => "objectListFromFiles",
            FieldType::KeyValue => "keyValue",
        }
    }

    /// List types accept several raw inputs and split single-string sources
    /// (environment variables) on commas.
    pub fn is_list(self) -> bool {
        matches!(
            self,
            FieldType::StringList
                | FieldType::IntegerList
                | FieldType::FloatList
                | FieldType::ChoiceList
                | FieldType::FileList
                | FieldType::StringListFromFile
                | FieldType::StringListFromFiles
                | FieldType::ObjectListFromFile
                | FieldType::ObjectListFromFiles
                | FieldType::KeyValue
        )
    }

    pub fn is_choice(self) -> bool {
        matches!(self, FieldType::Choice | FieldType::ChoiceList)
    }

    /// Types whose raw inputs are paths that get read while parsing.
    pub fn is_file_backed(self) -> bool {
        matches!(
            self,
            FieldType::File
                | FieldType::FileList
                | FieldType::StringFromFile
                | FieldType::StringFromFiles
                | FieldType::StringListFromFile
                | FieldType::StringListFromFiles
                | FieldType::ObjectFromFile
                | FieldType::ObjectListFromFile
                | FieldType::ObjectListFromFiles
        )
    }

    /// List types for which a single raw input is comma-split while parsing.
    pub fn splits_single_input(self) -> bool {
        self.is_list() && !self.is_file_backed()
    }

    /// Whether the CLI adapter treats the flag as a switch.
    pub fn is_bool(self) -> bool {
        self == FieldType::Bool
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FieldType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown field type '{s}'"))
    }
}

/// Where to search for config files.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchPath {
    /// Platform config directory (XDG on Linux, ~/Library/Application Support on macOS).
    Platform,
    /// A subdirectory under the user's home directory, e.g. `Home(".myapp".into())`.
    Home(String),
    /// Current working directory.
    Cwd,
    /// An explicit directory.
    Path(PathBuf),
}

/// How to treat multiple config files found across search paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchMode {
    /// Apply every file found, later (higher-priority) files overriding earlier ones.
    #[default]
    Merge,
    /// Use only the highest-priority file found.
    FirstMatch,
}
