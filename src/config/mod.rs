//! # Rotator Configuration
//!
//! Sidecar configuration loaded from environment variables.
//!
//! All tunables have defaults and can be overridden via environment variables.
//! Only the watched key file and the pod identity are required.

mod rotator;
mod server;

pub use rotator::{ConsulConfig, LogConfig, RetryConfig, RotatorConfig};
pub use server::ServerConfig;

use thiserror::Error;

/// Configuration loading and validation errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("required environment variable {0} is not set")]
    Missing(&'static str),
    #[error("environment variable {name} has invalid value {value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
    #[error("failed to read {name} from {path}: {source}")]
    File {
        name: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Load configuration from environment variables with defaults
pub fn load_config() -> Result<(RotatorConfig, ServerConfig), ConfigError> {
    let rotator = RotatorConfig::from_env()?;
    rotator.validate()?;
    Ok((rotator, ServerConfig::from_env()?))
}

/// Parse `name` through `get`, falling back to `default` when it is unset
///
/// A value that is set but does not parse is an error, never the default.
pub(crate) fn parse_or<T, G>(get: &G, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(name) {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            value: raw.clone(),
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

/// Read a boolean flag, accepting `1`/`0`, `true`/`false`, `yes`/`no`
pub(crate) fn env_flag_or_default(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(value) => parse_flag(&value).unwrap_or(default),
        Err(_) => default,
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Read a non-empty environment variable
pub(crate) fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("true"), Some(true));
        assert_eq!(parse_flag(" YES "), Some(true));
        assert_eq!(parse_flag("1"), Some(true));
        assert_eq!(parse_flag("off"), Some(false));
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn test_parse_or() {
        let get = |key: &str| match key {
            "PORT" => Some("8080".to_string()),
            "BROKEN" => Some("eighty".to_string()),
            _ => None,
        };
        assert_eq!(parse_or(&get, "PORT", 1u16).unwrap(), 8080);
        assert_eq!(parse_or(&get, "UNSET", 1u16).unwrap(), 1);
        assert!(matches!(
            parse_or(&get, "BROKEN", 1u16),
            Err(ConfigError::Invalid { name: "BROKEN", .. })
        ));
    }
}
