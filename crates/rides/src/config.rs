//! Server configuration loaded from environment variables.

use std::env;

const DEFAULT_DATABASE_URL: &str = "postgres://docker:pg@0.0.0.0";
const DEFAULT_PORT: u16 = 3001;
const DEFAULT_MAX_CONCURRENT_UPLOADS: usize = 4;
/// 64 MiB across all parts of one upload request.
const DEFAULT_MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    /// Files of one batch that may be decoded and persisted at the same time.
    pub max_concurrent_uploads: usize,
    /// Request body limit for uploads.
    pub max_upload_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            port: DEFAULT_PORT,
            max_concurrent_uploads: DEFAULT_MAX_CONCURRENT_UPLOADS,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl Config {
    /// Load configuration from the process environment, reading `.env` first
    /// if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let max_concurrent_uploads = parse_or(
            &lookup,
            "RIDES_MAX_CONCURRENT_UPLOADS",
            defaults.max_concurrent_uploads,
        )?;
        if max_concurrent_uploads == 0 {
            return Err(ConfigError::Invalid {
                key: "RIDES_MAX_CONCURRENT_UPLOADS",
                value: "0".to_string(),
            });
        }

        Ok(Self {
            database_url: lookup("DATABASE_URL").unwrap_or(defaults.database_url),
            port: parse_or(&lookup, "PORT", defaults.port)?,
            max_concurrent_uploads,
            max_upload_bytes: parse_or(&lookup, "RIDES_MAX_UPLOAD_BYTES", defaults.max_upload_bytes)?,
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        Some(value) => match value.trim().parse() {
            Ok(parsed) => Ok(parsed),
            Err(_) => Err(ConfigError::Invalid { key, value }),
        },
        None => Ok(default),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.max_concurrent_uploads, 4);
        assert_eq!(config.port, 3001);
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://rides@localhost/rides"),
            ("PORT", "8080"),
            ("RIDES_MAX_CONCURRENT_UPLOADS", " 16 "),
            ("RIDES_MAX_UPLOAD_BYTES", "1048576"),
        ]))
        .unwrap();

        assert_eq!(config.database_url, "postgres://rides@localhost/rides");
        assert_eq!(config.port, 8080);
        assert_eq!(config.max_concurrent_uploads, 16);
        assert_eq!(config.max_upload_bytes, 1_048_576);
    }

    #[test]
    fn test_invalid_values() {
        let err = Config::from_lookup(lookup(&[("PORT", "http")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "PORT", .. }));

        let err = Config::from_lookup(lookup(&[("RIDES_MAX_CONCURRENT_UPLOADS", "0")])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                key: "RIDES_MAX_CONCURRENT_UPLOADS",
                ..
            }
        ));
    }
}
