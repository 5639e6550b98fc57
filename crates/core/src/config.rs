//! Environment variable helpers used by every binary's `from_env()`.

use std::str::FromStr;

use crate::error::CoreError;

/// Read `key` and parse it, falling back to `default` when unset.
///
/// A set-but-unparseable value is an error rather than a silent fallback.
pub fn env_or<T: FromStr>(key: &str, default: T) -> Result<T, CoreError> {
    match std::env::var(key) {
        Ok(raw) => parse_value(key, &raw),
        Err(_) => Ok(default),
    }
}

/// Read and parse an optional variable. Empty strings count as unset.
pub fn env_opt<T: FromStr>(key: &str) -> Result<Option<T>, CoreError> {
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => parse_value(key, &raw).map(Some),
        _ => Ok(None),
    }
}

/// Read a variable that must be present.
pub fn env_required(key: &str) -> Result<String, CoreError> {
    std::env::var(key).map_err(|_| CoreError::Config(format!("{key} must be set")))
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T, CoreError> {
    raw.trim()
        .parse()
        .map_err(|_| CoreError::Config(format!("{key} has an invalid value: {raw:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_value_trims_whitespace() {
        let v: u64 = parse_value("X", " 42 ").unwrap();
        assert_eq!(v, 42);
    }

    #[test]
    fn parse_value_reports_key_on_error() {
        let err = parse_value::<u16>("PORT", "abc").unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }

    #[test]
    fn unset_variable_uses_default() {
        let v: f64 = env_or("FLEETPULSE_TEST_SURELY_UNSET_VAR", 1.5).unwrap();
        assert_eq!(v, 1.5);
    }

    #[test]
    fn unset_optional_is_none() {
        let v: Option<u64> = env_opt("FLEETPULSE_TEST_SURELY_UNSET_OPT").unwrap();
        assert!(v.is_none());
    }
}
