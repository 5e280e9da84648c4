use std::{env, fmt::Display, fs::read_to_string, str::FromStr};

use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
#[error("Invalid {key} value {value:?}: {reason}")]
pub struct ConfigError {
    key: &'static str,
    value: String,
    reason: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// `None` runs against the in-memory store.
    pub redis_url: Option<String>,
    pub cors_max_age_secs: u64,
    pub event_buffer: usize,
    pub seed_policies: Vec<String>,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Ok(Self {
            port: try_load("RUST_PORT", "1111")?,
            redis_url: var("REDIS_URL").ok().or_else(|| read_secret("REDIS_URL")),
            cors_max_age_secs: try_load("CORS_MAX_AGE_SECS", "3600")?,
            event_buffer: try_load::<usize>("EVENT_BUFFER", "64")?.max(1),
            seed_policies: parse_list(&var("SEED_POLICIES").unwrap_or_default()),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 1111,
            redis_url: None,
            cors_max_age_secs: 3600,
            event_buffer: 64,
            seed_policies: Vec::new(),
        }
    }
}

fn var(key: &str) -> Result<String, ()> {
    env::var(key).map_err(|_| {
        warn!("Environment variable {key} not found, using default");
    })
}

fn try_load<T: FromStr>(key: &'static str, default: &str) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    let value = var(key).unwrap_or_else(|_| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    parse_value(key, value)
}

fn parse_value<T: FromStr>(key: &'static str, value: String) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    value.trim().parse().map_err(|e: T::Err| {
        warn!("Invalid {key} value: {e}");

        ConfigError {
            key,
            reason: e.to_string(),
            value,
        }
    })
}

fn read_secret(secret_name: &str) -> Option<String> {
    let path = format!("/run/secrets/{secret_name}");

    read_to_string(&path)
        .map(|s| s.trim().to_string())
        .map_err(|e| {
            info!("No {secret_name} secret: {e}");
        })
        .ok()
        .filter(|s| !s.is_empty())
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value::<u16>("RUST_PORT", "8080".to_string()).unwrap(), 8080);
        assert_eq!(parse_value::<u16>("RUST_PORT", " 80 ".to_string()).unwrap(), 80);

        let err = parse_value::<u16>("RUST_PORT", "99999".to_string()).unwrap_err();
        assert!(err.to_string().starts_with("Invalid RUST_PORT value \"99999\""));
    }

    #[test]
    fn test_parse_list() {
        assert_eq!(parse_list("acceptable-use, passwords,,byod "), ["acceptable-use", "passwords", "byod"]);
        assert!(parse_list("").is_empty());
        assert!(parse_list(" , ").is_empty());
    }
}
