//! Profile files.
//!
//! A profile file holds named bundles of field values:
//!
//! ```yaml
//! staging:
//!   db:
//!     host: staging.internal
//!   app:
//!     verbose: true
//! ```
//!
//! [`from_profiles`] selects one profile and applies it like a map source
//! (source `profiles`). Missing files and profiles are tolerated only when
//! nothing beyond the defaults was asked for:
//!
//! | file exists | file is the default | profile is the default | outcome |
//! |---|---|---|---|
//! | no | no | - | error |
//! | no | yes | no | error |
//! | no | yes | yes | skipped |
//! | yes, profile absent | - | no | error |
//! | yes, profile absent | - | yes | skipped |

use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::error::LayerfigError;
use crate::field::FieldDefinition;
use crate::file::expand_home;
use crate::middleware::{Middleware, after_next};
use crate::schema::Schema;
use crate::section::SchemaSection;
use crate::sources::update_from_map;
use crate::types::{ConfigMap, FieldType};
use crate::values::{Values, source};

pub const PROFILE_SETTINGS_SLUG: &str = "profile-settings";
pub const DEFAULT_PROFILE: &str = "default";

/// Which profile to load and from where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileSettings {
    pub default_profile_file: PathBuf,
    pub profile_file: PathBuf,
    pub profile: String,
    pub default_profile: String,
}

impl ProfileSettings {
    /// Load `profile` from the default file.
    pub fn new(default_profile_file: impl Into<PathBuf>, profile: impl Into<String>) -> Self {
        let default_profile_file = default_profile_file.into();
        Self {
            profile_file: default_profile_file.clone(),
            default_profile_file,
            profile: profile.into(),
            default_profile: DEFAULT_PROFILE.to_string(),
        }
    }

    pub fn with_profile_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.profile_file = path.into();
        self
    }

    pub fn with_default_profile(mut self, name: impl Into<String>) -> Self {
        self.default_profile = name.into();
        self
    }

    fn default_profile_name(&self) -> &str {
        if self.default_profile.is_empty() {
            DEFAULT_PROFILE
        } else {
            &self.default_profile
        }
    }
}

/// The resolved `profile-settings` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileSelection {
    #[serde(default)]
    pub profile: Option<String>,
    #[serde(default, rename = "profile-file")]
    pub profile_file: Option<String>,
}

/// Where [`from_custom_profiles`] reads a profile from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomProfileOptions {
    /// An explicit profile file. Takes precedence over `app_name`.
    pub profile_file: Option<PathBuf>,
    /// Read the default profile file of another application.
    pub app_name: Option<String>,
    /// Fail when the file or the profile is missing.
    pub required: bool,
    /// Source label of the parse steps, `profiles` when unset.
    pub source: Option<String>,
}

impl CustomProfileOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profile_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.profile_file = Some(path.into());
        self
    }

    pub fn with_app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = Some(app_name.into());
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn with_source(mut self, label: impl Into<String>) -> Self {
        self.source = Some(label.into());
        self
    }

    fn resolve_path(&self) -> Result<PathBuf, LayerfigError> {
        if let Some(file) = &self.profile_file {
            return Ok(expand_home(file));
        }
        let Some(app) = &self.app_name else {
            return Err(LayerfigError::Schema(
                "a custom profile needs a profile file or an app name".into(),
            ));
        };
        default_profile_file(app).ok_or_else(|| {
            LayerfigError::Schema(format!("no config directory for the profiles of '{app}'"))
        })
    }
}

/// `<platform config dir>/<app>/profiles.yaml`, if a config dir exists.
pub fn default_profile_file(app_name: &str) -> Option<PathBuf> {
    let proj = directories::ProjectDirs::from("", "", app_name)?;
    Some(proj.config_dir().join("profiles.yaml"))
}

/// The section that selects the active profile (`--profile`,
/// `--profile-file`, `<APP>_PROFILE`, ...).
pub fn profile_settings_section(app_name: &str) -> SchemaSection {
    let mut profile_file = FieldDefinition::new("profile-file", FieldType::String)
        .with_help("Load the profile from a file");
    if let Some(path) = default_profile_file(app_name) {
        profile_file = profile_file.with_default(path.display().to_string());
    }
    SchemaSection::new(PROFILE_SETTINGS_SLUG, "Profile settings")
        .with_description(format!("Profile selection for {app_name}"))
        .with_field(
            FieldDefinition::new("profile", FieldType::String)
                .with_help("Load the profile")
                .with_default(DEFAULT_PROFILE),
        )
        .with_field(profile_file)
}

/// Apply the selected profile after `next` runs.
pub fn from_profiles(settings: ProfileSettings) -> Middleware {
    after_next(move |schema, values| apply_profile(schema, values, &settings))
}

fn apply_profile(
    schema: &Schema,
    values: &mut Values,
    settings: &ProfileSettings,
) -> Result<(), LayerfigError> {
    let default_profile = settings.default_profile_name();
    let profile_file = expand_home(&settings.profile_file);
    let default_file = expand_home(&settings.default_profile_file);

    let Some(mut profiles) = read_profiles(&profile_file)? else {
        if profile_file != default_file || settings.profile != default_profile {
            return Err(LayerfigError::ProfileFileMissing {
                path: profile_file,
                profile: settings.profile.clone(),
            });
        }
        debug!(path = %profile_file.display(), "no profile file, skipping");
        return Ok(());
    };

    let Some(profile) = profiles.shift_remove(&settings.profile) else {
        if settings.profile != default_profile {
            return Err(LayerfigError::ProfileNotFound {
                path: profile_file,
                profile: settings.profile.clone(),
            });
        }
        return Ok(());
    };

    debug!(profile = %settings.profile, path = %profile_file.display(), "applying profile");
    let metadata = profile_metadata(&settings.profile, &profile_file);
    update_from_map(schema, values, &profile, source::PROFILES, &metadata, false)
}

/// Apply `profile` from an explicit file or another application's profile
/// file after `next` runs.
///
/// Unless `required` is set, a missing file or profile is skipped. The
/// `default` profile may always be absent from an existing file.
pub fn from_custom_profiles(profile: &str, options: CustomProfileOptions) -> Middleware {
    let profile = profile.to_string();
    after_next(move |schema, values| apply_custom_profile(schema, values, &profile, &options))
}

fn apply_custom_profile(
    schema: &Schema,
    values: &mut Values,
    profile: &str,
    options: &CustomProfileOptions,
) -> Result<(), LayerfigError> {
    let path = options.resolve_path()?;
    let Some(mut profiles) = read_profiles(&path)? else {
        if options.required {
            return Err(LayerfigError::ProfileFileMissing {
                path,
                profile: profile.to_string(),
            });
        }
        debug!(path = %path.display(), "no custom profile file, skipping");
        return Ok(());
    };
    let Some(sections) = profiles.shift_remove(profile) else {
        if options.required && profile != DEFAULT_PROFILE {
            return Err(LayerfigError::ProfileNotFound {
                path,
                profile: profile.to_string(),
            });
        }
        return Ok(());
    };
    debug!(profile, path = %path.display(), "applying custom profile");
    let label = options.source.as_deref().unwrap_or(source::PROFILES);
    update_from_map(schema, values, &sections, label, &profile_metadata(profile, &path), false)
}

fn profile_metadata(profile: &str, path: &Path) -> IndexMap<String, JsonValue> {
    let mut metadata = IndexMap::new();
    metadata.insert("profile".to_string(), JsonValue::String(profile.to_string()));
    metadata.insert(
        "profile_file".to_string(),
        JsonValue::String(path.display().to_string()),
    );
    metadata
}

/// Parse a profile file; `None` when it does not exist.
fn read_profiles(path: &Path) -> Result<Option<IndexMap<String, ConfigMap>>, LayerfigError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(LayerfigError::io(path, e)),
    };
    let parsed: Option<IndexMap<String, Option<ConfigMap>>> =
        serde_yaml::from_str(&content).map_err(|e| LayerfigError::FileParse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    Ok(Some(
        parsed
            .unwrap_or_default()
            .into_iter()
            .map(|(name, sections)| (name, sections.unwrap_or_default()))
            .collect(),
    ))
}
