use std::path::PathBuf;

use thiserror::Error;

/// Semantic category of a [`LayerfigError`].
///
/// Several error variants share a kind; match on the kind when you only care
/// about what went wrong, not about the details carried by the variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Schema,
    Pattern,
    Parse,
    UnsupportedFormat,
    ProfileMissing,
    MappingAmbiguous,
    RequiredMissing,
    Decode,
    Io,
}

#[derive(Debug, Error)]
pub enum LayerfigError {
    #[error("Invalid schema: {0}")]
    Schema(String),

    #[error("Invalid default for field '{field}': {reason}")]
    InvalidDefault { field: String, reason: String },

    #[error("Unknown key '{key}' in {path} (line {line})")]
    UnknownKey {
        key: String,
        path: PathBuf,
        line: usize,
    },

    #[error("Unknown keys in {}", path.display())]
    UnknownKeys {
        path: PathBuf,
        errors: Vec<LayerfigError>,
    },

    #[error("Invalid pattern '{pattern}': {reason}")]
    Pattern { pattern: String, reason: String },

    #[error("Invalid value for field '{field}': {reason}")]
    Parse { field: String, reason: String },

    #[error("Failed to parse {path}: {reason}")]
    FileParse { path: PathBuf, reason: String },

    #[error("Unsupported format for {path}: {reason}")]
    UnsupportedFormat { path: PathBuf, reason: String },

    #[error("Profile file {path} does not exist (requested profile '{profile}')")]
    ProfileFileMissing { path: PathBuf, profile: String },

    #[error("Profile '{profile}' not found in {path}")]
    ProfileNotFound { path: PathBuf, profile: String },

    #[error("Ambiguous mapping: {0}")]
    MappingAmbiguous(String),

    #[error("Required field '{field}' in section '{section}' has no value")]
    RequiredMissing { section: String, field: String },

    #[error("Required pattern '{pattern}' did not match any paths in config{detail}")]
    RequiredPatternUnmatched { pattern: String, detail: String },

    #[error("Failed to decode section '{section}': {reason}")]
    Decode { section: String, reason: String },

    #[error("No resolved value for '{0}'")]
    FieldNotFound(String),

    #[error("Failed to serialize {what}: {reason}")]
    Serialize { what: String, reason: String },

    #[error("Failed to read {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("App name is required; call .app_name() on the builder")]
    AppNameRequired,
}

impl LayerfigError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LayerfigError::Schema(_)
            | LayerfigError::InvalidDefault { .. }
            | LayerfigError::UnknownKey { .. }
            | LayerfigError::UnknownKeys { .. }
            | LayerfigError::FieldNotFound(_)
            | LayerfigError::AppNameRequired => ErrorKind::Schema,
            LayerfigError::Pattern { .. } => ErrorKind::Pattern,
            LayerfigError::Parse { .. }
            | LayerfigError::FileParse { .. }
            | LayerfigError::Serialize { .. } => ErrorKind::Parse,
            LayerfigError::UnsupportedFormat { .. } => ErrorKind::UnsupportedFormat,
            LayerfigError::ProfileFileMissing { .. } | LayerfigError::ProfileNotFound { .. } => {
                ErrorKind::ProfileMissing
            }
            LayerfigError::MappingAmbiguous(_) => ErrorKind::MappingAmbiguous,
            LayerfigError::RequiredMissing { .. }
            | LayerfigError::RequiredPatternUnmatched { .. } => ErrorKind::RequiredMissing,
            LayerfigError::Decode { .. } => ErrorKind::Decode,
            LayerfigError::IoError { .. } => ErrorKind::Io,
        }
    }

    pub(crate) fn parse(field: &str, reason: impl Into<String>) -> Self {
        LayerfigError::Parse {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LayerfigError::IoError {
            path: path.into(),
            source,
        }
    }
}
