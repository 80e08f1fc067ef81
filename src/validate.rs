//! Unknown-key detection for declarative YAML documents.
//!
//! Uses `serde_ignored` while deserializing schema and mapping-rule documents to
//! capture any keys the target type doesn't consume. Each unknown key is
//! reported with its file path and best-effort line number; in lenient mode
//! they are logged instead.

use std::path::Path;

use serde::de::DeserializeOwned;
use tracing::warn;

use crate::error::LayerfigError;

/// Deserialize `doc` into `T`, rejecting (strict) or logging (lenient) keys
/// that `T` does not consume.
///
/// `content` is the source text the document came from and is only used to
/// locate line numbers.
pub fn deserialize_checked<T: DeserializeOwned>(
    doc: serde_yaml::Value,
    content: &str,
    path: &Path,
    strict: bool,
) -> Result<T, LayerfigError> {
    let mut unknown_keys: Vec<String> = Vec::new();
    let parsed: T = serde_ignored::deserialize(doc, |ignored_path| {
        unknown_keys.push(ignored_path.to_string());
    })
    .map_err(|e| LayerfigError::FileParse {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    if unknown_keys.is_empty() {
        return Ok(parsed);
    }

    if !strict {
        for key in &unknown_keys {
            warn!(path = %path.display(), key = %key, "ignoring unknown key");
        }
        return Ok(parsed);
    }

    let errors: Vec<LayerfigError> = unknown_keys
        .into_iter()
        .map(|key| {
            let line = find_key_line(content, &key);
            LayerfigError::UnknownKey {
                key,
                path: path.to_path_buf(),
                line,
            }
        })
        .collect();

    Err(LayerfigError::UnknownKeys {
        path: path.to_path_buf(),
        errors,
    })
}

/// Find the 1-indexed line number for a key in YAML content.
///
/// For a dotted key like `"flags.0.tpye"` the parent segments are located in
/// order first, then the leaf after them, so a key that also appears in an
/// earlier section is not reported at the wrong place. Sequence indices are
/// skipped. Returns 0 if the key cannot be located.
fn find_key_line(content: &str, dotted_key: &str) -> usize {
    let segments: Vec<&str> = dotted_key
        .split('.')
        .filter(|s| s.parse::<usize>().is_err())
        .collect();

    let mut start = 0;
    let lines: Vec<&str> = content.lines().collect();
    for (idx, segment) in segments.iter().enumerate() {
        let found = lines
            .iter()
            .enumerate()
            .skip(start)
            .find(|(_, line)| declares_key(line, segment));
        match found {
            Some((i, _)) if idx + 1 == segments.len() => return i + 1,
            Some((i, _)) => start = i + 1,
            None => return 0,
        }
    }
    0
}

fn declares_key(line: &str, key: &str) -> bool {
    let trimmed = line.trim_start().trim_start_matches("- ").trim_start();
    let unquoted = trimmed
        .strip_prefix('"')
        .and_then(|rest| rest.strip_prefix(key))
        .and_then(|rest| rest.strip_prefix('"'))
        .or_else(|| trimmed.strip_prefix(key));
    unquoted.is_some_and(|rest| rest.trim_start().starts_with(':'))
}
