//! Environment variable utilities
//!
//! Configuration toggles are read as `0`/`1` flags; the usual spellings of
//! true/false are accepted as well.

/// Get environment variable as Option
///
/// Returns `Some(value)` if set and non-empty, `None` otherwise.
pub fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Get environment variable as a boolean toggle
///
/// Returns `Some(true)` for "1", "true", "yes", "on", `Some(false)` for
/// "0", "false", "no", "off" (case-insensitive), and `None` when unset or
/// unrecognized so the caller keeps its current value.
pub fn env_flag(key: &str) -> Option<bool> {
    let value = env_opt(key)?;
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Get environment variable as integer
///
/// Returns `Some(value)` if set and parseable, `None` otherwise.
pub fn env_int<T>(key: &str) -> Option<T>
where
    T: std::str::FromStr,
{
    env_opt(key)?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_env_flag_values() {
        std::env::set_var("MODGATE_TEST_FLAG", "1");
        assert_eq!(env_flag("MODGATE_TEST_FLAG"), Some(true));
        std::env::set_var("MODGATE_TEST_FLAG", "0");
        assert_eq!(env_flag("MODGATE_TEST_FLAG"), Some(false));
        std::env::set_var("MODGATE_TEST_FLAG", "Yes");
        assert_eq!(env_flag("MODGATE_TEST_FLAG"), Some(true));
        std::env::set_var("MODGATE_TEST_FLAG", "maybe");
        assert_eq!(env_flag("MODGATE_TEST_FLAG"), None);
        std::env::remove_var("MODGATE_TEST_FLAG");
        assert_eq!(env_flag("MODGATE_TEST_FLAG"), None);
    }

    #[test]
    #[serial]
    fn test_env_int() {
        std::env::set_var("MODGATE_TEST_INT", " 6 ");
        assert_eq!(env_int::<usize>("MODGATE_TEST_INT"), Some(6));
        std::env::set_var("MODGATE_TEST_INT", "six");
        assert_eq!(env_int::<usize>("MODGATE_TEST_INT"), None);
        std::env::remove_var("MODGATE_TEST_INT");
    }
}
