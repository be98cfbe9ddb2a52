//! Module name validation and near-match suggestions

use crate::module::traits::ModuleError;

/// Longest accepted module name
pub const MAX_NAME_LEN: usize = 64;

/// Largest edit distance still offered as a suggestion
const SUGGESTION_DISTANCE: usize = 2;

/// Most suggestions returned for a single lookup
const MAX_SUGGESTIONS: usize = 3;

/// Check a module name against `[A-Za-z0-9_-]+`
#[inline]
pub fn is_valid_name(name: &str) -> bool {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return false;
    }

    name.chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Validate a module name, returning `InvalidName` on failure
pub fn validate_name(name: &str) -> Result<(), ModuleError> {
    if is_valid_name(name) {
        Ok(())
    } else {
        Err(ModuleError::InvalidName(name.to_string()))
    }
}

/// Suggest catalog names close to `wanted`
///
/// A candidate qualifies when it is within a small edit distance of `wanted`
/// or when one name contains the other. Results are ordered by distance,
/// then alphabetically.
pub fn suggest_names<'a, I>(wanted: &str, candidates: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let wanted_lower = wanted.to_ascii_lowercase();
    let mut scored: Vec<(usize, &str)> = candidates
        .into_iter()
        .filter(|c| *c != wanted)
        .filter_map(|candidate| {
            let lower = candidate.to_ascii_lowercase();
            let distance = edit_distance(&wanted_lower, &lower);
            let contains = !wanted_lower.is_empty()
                && (lower.contains(&wanted_lower) || wanted_lower.contains(&lower));
            (distance <= SUGGESTION_DISTANCE || contains).then_some((distance, candidate))
        })
        .collect();

    scored.sort();
    scored.dedup();
    scored
        .into_iter()
        .take(MAX_SUGGESTIONS)
        .map(|(_, name)| name.to_string())
        .collect()
}

/// Levenshtein distance over bytes (names are ASCII)
fn edit_distance(a: &str, b: &str) -> usize {
    let a = a.as_bytes();
    let b = b.as_bytes();
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        assert!(is_valid_name("logging"));
        assert!(is_valid_name("fzf-integration"));
        assert!(is_valid_name("_private2"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("../etc/passwd"));
        assert!(!is_valid_name("with space"));
        assert!(!is_valid_name("dotted.name"));
        assert!(!is_valid_name(&"a".repeat(MAX_NAME_LEN + 1)));
    }

    #[test]
    fn test_validate_name_error() {
        assert_eq!(
            validate_name("bad/name"),
            Err(ModuleError::InvalidName("bad/name".to_string()))
        );
    }

    #[test]
    fn test_edit_distance() {
        assert_eq!(edit_distance("logging", "logging"), 0);
        assert_eq!(edit_distance("loging", "logging"), 1);
        assert_eq!(edit_distance("cache", "cahce"), 2);
        assert_eq!(edit_distance("", "abc"), 3);
    }

    #[test]
    fn test_suggestions() {
        let catalog = ["logging", "cache", "report", "cache-extra"];
        let suggestions = suggest_names("loging", catalog);
        assert_eq!(suggestions, vec!["logging".to_string()]);

        let suggestions = suggest_names("cache", catalog);
        assert_eq!(suggestions, vec!["cache-extra".to_string()]);

        assert!(suggest_names("zzz", catalog).is_empty());
    }
}
