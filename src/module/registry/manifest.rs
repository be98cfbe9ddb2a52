//! Module descriptor marker parsing
//!
//! Module files declare their metadata as plain `KEY="value"` lines. The file
//! is never executed to read them; this parser only looks at text.
//!
//! Recognized keys (optionally prefixed, e.g. `SENTINEL_MODULE_VERSION`, and
//! optionally preceded by `export`/`readonly`):
//!
//! - `MODULE_DEPENDENCIES` - space or comma separated module names
//! - `MODULE_DESCRIPTION`
//! - `MODULE_VERSION`

use crate::module::traits::ModuleMetadata;

const DEPENDENCIES_KEY: &str = "MODULE_DEPENDENCIES";
const DESCRIPTION_KEY: &str = "MODULE_DESCRIPTION";
const VERSION_KEY: &str = "MODULE_VERSION";

/// Which metadata field a key maps to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MarkerKey {
    Dependencies,
    Description,
    Version,
}

/// Extract metadata markers from module text
///
/// The first occurrence of each key wins. Missing keys leave the field empty;
/// that is not an error.
pub fn parse_markers(text: &str) -> ModuleMetadata {
    let mut metadata = ModuleMetadata::default();
    let mut seen_dependencies = false;

    for line in text.lines() {
        let Some((key, value)) = split_marker(line) else {
            continue;
        };

        match key {
            MarkerKey::Dependencies if !seen_dependencies => {
                seen_dependencies = true;
                for dep in value.split(|c: char| c.is_whitespace() || c == ',') {
                    if !dep.is_empty() && !metadata.dependencies.iter().any(|d| d == dep) {
                        metadata.dependencies.push(dep.to_string());
                    }
                }
            }
            MarkerKey::Description if metadata.description.is_none() => {
                if !value.is_empty() {
                    metadata.description = Some(value.to_string());
                }
            }
            MarkerKey::Version if metadata.version.is_none() => {
                if !value.is_empty() {
                    metadata.version = Some(value.to_string());
                }
            }
            _ => {}
        }
    }

    metadata
}

/// Split a `KEY="value"` line into a recognized key and its unquoted value
fn split_marker(line: &str) -> Option<(MarkerKey, &str)> {
    let mut line = line.trim();
    if line.starts_with('#') {
        return None;
    }
    for prefix in ["export ", "readonly ", "declare -r ", "declare -x "] {
        if let Some(rest) = line.strip_prefix(prefix) {
            line = rest.trim_start();
        }
    }

    let (key, value) = line.split_once('=')?;
    let key = classify_key(key)?;
    Some((key, unquote(value.trim())))
}

fn classify_key(key: &str) -> Option<MarkerKey> {
    if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    let matches = |name: &str| key == name || key.ends_with(&format!("_{}", name));

    if matches(DEPENDENCIES_KEY) {
        Some(MarkerKey::Dependencies)
    } else if matches(DESCRIPTION_KEY) {
        Some(MarkerKey::Description)
    } else if matches(VERSION_KEY) {
        Some(MarkerKey::Version)
    } else {
        None
    }
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(rest) = value.strip_prefix(quote) {
            // Unterminated quotes keep everything after the opening quote
            return match rest.find(quote) {
                Some(end) => &rest[..end],
                None => rest,
            };
        }
    }
    // Bare values end at the first whitespace or trailing comment
    value.split_whitespace().next().unwrap_or("")
}
