//! Config file reading and discovery.
//!
//! # Formats
//!
//! Files are dispatched on their extension: `.json`, `.yaml`/`.yml` and `.toml`
//! are parsed into the raw JSON value model; anything else fails with
//! [`UnsupportedFormat`](crate::ErrorKind::UnsupportedFormat). Without a
//! [`ConfigMapper`] the root must be shaped `{section-slug: {field: value}}`.
//!
//! # Discovery
//!
//! Each [`SearchPath`] variant resolves to a single directory, checked for
//! `{dir}/{file_name}`:
//!
//! - [`SearchMode::Merge`]: every file found is returned in priority order, so
//!   the caller can apply them lowest first.
//! - [`SearchMode::FirstMatch`]: the list is searched from the **highest-priority
//!   end** and the first file found is returned as the sole result.
//!
//! Missing files are silently skipped in both modes. Only actual I/O errors
//! (permissions, etc.) are propagated.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::error::LayerfigError;
use crate::mapper::ConfigMapper;
use crate::types::{ConfigMap, SearchMode, SearchPath};

/// Structured file formats understood by config sources and file-backed fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Yaml,
    Toml,
}

impl ConfigFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "json" => Some(ConfigFormat::Json),
            "yaml" | "yml" => Some(ConfigFormat::Yaml),
            "toml" => Some(ConfigFormat::Toml),
            _ => None,
        }
    }

    /// Parse `content` read from `path`. An empty YAML document is `null`.
    pub fn parse(self, content: &str, path: &Path) -> Result<JsonValue, LayerfigError> {
        let parse_error = |reason: String| LayerfigError::FileParse {
            path: path.to_path_buf(),
            reason,
        };
        match self {
            ConfigFormat::Json => serde_json::from_str(content).map_err(|e| parse_error(e.to_string())),
            ConfigFormat::Yaml => {
                if content.trim().is_empty() {
                    return Ok(JsonValue::Null);
                }
                serde_yaml::from_str(content).map_err(|e| parse_error(e.to_string()))
            }
            ConfigFormat::Toml => toml::from_str(content).map_err(|e| parse_error(e.to_string())),
        }
    }
}

/// Read and parse a JSON, YAML or TOML file.
pub fn read_structured(path: &Path) -> Result<JsonValue, LayerfigError> {
    let format = ConfigFormat::from_path(path).ok_or_else(|| LayerfigError::UnsupportedFormat {
        path: path.to_path_buf(),
        reason: "expected a .json, .yaml, .yml or .toml extension".into(),
    })?;
    let content = std::fs::read_to_string(path).map_err(|e| LayerfigError::io(path, e))?;
    format.parse(&content, path)
}

/// Read a config file and turn it into the canonical section map, running it
/// through `mapper` when one is given.
pub fn read_config_map(
    path: &Path,
    mapper: Option<&dyn ConfigMapper>,
) -> Result<ConfigMap, LayerfigError> {
    let tree = match read_structured(path)? {
        JsonValue::Null => JsonValue::Object(serde_json::Map::new()),
        tree @ JsonValue::Object(_) => tree,
        other => {
            return Err(LayerfigError::UnsupportedFormat {
                path: path.to_path_buf(),
                reason: format!("root must be a map, found {other}"),
            });
        }
    };
    debug!(path = %path.display(), mapped = mapper.is_some(), "read config file");
    match mapper {
        Some(mapper) => mapper.map(&tree),
        None => canonical_config_map(tree, path),
    }
}

/// Check that a parsed tree is shaped `{section: {field: value}}`.
pub fn canonical_config_map(tree: JsonValue, path: &Path) -> Result<ConfigMap, LayerfigError> {
    let JsonValue::Object(root) = tree else {
        return Err(LayerfigError::UnsupportedFormat {
            path: path.to_path_buf(),
            reason: "root must be a map".into(),
        });
    };
    let mut out = ConfigMap::new();
    for (slug, section) in root {
        match section {
            JsonValue::Object(fields) => {
                out.insert(slug, fields.into_iter().collect::<IndexMap<_, _>>());
            }
            JsonValue::Null => {
                out.insert(slug, IndexMap::new());
            }
            other => {
                return Err(LayerfigError::UnsupportedFormat {
                    path: path.to_path_buf(),
                    reason: format!("section '{slug}' must be a map of fields, found {other}"),
                });
            }
        }
    }
    Ok(out)
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~")
        && let Some(user) = directories::UserDirs::new()
    {
        return user.home_dir().join(rest);
    }
    path.to_path_buf()
}

/// Resolve a [`SearchPath`] to a concrete directory.
///
/// `app_name` is used by `SearchPath::Platform` to construct the platform-specific
/// config directory (e.g. `~/.config/{app_name}/` on Linux).
///
/// Returns `None` if the path cannot be resolved (e.g. no home directory found).
pub fn resolve_search_path(sp: &SearchPath, app_name: &str) -> Option<PathBuf> {
    match sp {
        SearchPath::Platform => {
            let proj = directories::ProjectDirs::from("", "", app_name)?;
            Some(proj.config_dir().to_path_buf())
        }
        SearchPath::Home(subdir) => {
            let user = directories::UserDirs::new()?;
            Some(user.home_dir().join(subdir))
        }
        SearchPath::Cwd => std::env::current_dir().ok(),
        SearchPath::Path(p) => Some(expand_home(p)),
    }
}

/// Find config files across search paths, respecting [`SearchMode`].
///
/// Returned paths are in priority-ascending order (apply first to last).
pub fn find_config_files(
    search_paths: &[SearchPath],
    file_name: &str,
    app_name: &str,
    mode: SearchMode,
) -> Result<Vec<PathBuf>, LayerfigError> {
    let dirs: Vec<PathBuf> = search_paths
        .iter()
        .filter_map(|sp| resolve_search_path(sp, app_name))
        .collect();

    match mode {
        SearchMode::Merge => {
            let mut found = Vec::new();
            for dir in &dirs {
                if let Some(path) = existing_file(&dir.join(file_name))? {
                    found.push(path);
                }
            }
            Ok(found)
        }
        SearchMode::FirstMatch => {
            for dir in dirs.iter().rev() {
                if let Some(path) = existing_file(&dir.join(file_name))? {
                    return Ok(vec![path]);
                }
            }
            Ok(vec![])
        }
    }
}

fn existing_file(path: &Path) -> Result<Option<PathBuf>, LayerfigError> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() => Ok(Some(path.to_path_buf())),
        Ok(_) => Ok(None),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(LayerfigError::io(path, e)),
    }
}

/// Locate an application's `config.yaml`.
///
/// An explicit path must exist. Otherwise the first existing file among
/// `<platform config dir>/config.yaml`, `~/.<app>/config.yaml` and
/// `/etc/<app>/config.yaml` is returned.
pub fn resolve_app_config_path(
    app_name: &str,
    explicit: Option<&Path>,
) -> Result<Option<PathBuf>, LayerfigError> {
    if let Some(explicit) = explicit {
        let path = expand_home(explicit);
        return match existing_file(&path)? {
            Some(path) => Ok(Some(path)),
            None => Err(LayerfigError::io(
                path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "config file does not exist"),
            )),
        };
    }
    let search = [
        SearchPath::Path(PathBuf::from("/etc").join(app_name)),
        SearchPath::Home(format!(".{app_name}")),
        SearchPath::Platform,
    ];
    let found = find_config_files(&search, "config.yaml", app_name, SearchMode::FirstMatch)?;
    Ok(found.into_iter().next())
}
