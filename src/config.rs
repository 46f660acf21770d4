// Runtime configuration read from the environment

use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::fx::{DEFAULT_FX_BASE, FX_TTL};
use crate::leave_hacks::DEFAULT_WINDOW_COUNT;
use crate::normalize::MAX_RESULTS;
use crate::provider::DEFAULT_FLIGHT_API_BASE;
use crate::search_cache::SEARCH_TTL;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value:?} ({reason})")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub flight_api_base: String,
    pub flight_api_key: String,
    pub fx_base: String,
    pub fx_ttl: Duration,
    pub search_ttl: Duration,
    pub weekend_window_count: usize,
    pub http_timeout: Duration,
    pub max_results: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            flight_api_base: DEFAULT_FLIGHT_API_BASE.to_string(),
            flight_api_key: String::new(),
            fx_base: DEFAULT_FX_BASE.to_string(),
            fx_ttl: FX_TTL,
            search_ttl: SEARCH_TTL,
            weekend_window_count: DEFAULT_WINDOW_COUNT,
            http_timeout: Duration::from_millis(10_000),
            max_results: MAX_RESULTS,
        }
    }
}

fn parse_number<T>(name: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|e| ConfigError::InvalidValue {
        name,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

fn positive(name: &'static str, raw: &str) -> Result<u64, ConfigError> {
    match parse_number::<u64>(name, raw)? {
        0 => Err(ConfigError::InvalidValue {
            name,
            value: raw.to_string(),
            reason: "must be greater than zero".to_string(),
        }),
        n => Ok(n),
    }
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    // Builds a config from any variable lookup; unset variables keep their
    // defaults, set-but-invalid ones are errors.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = lookup("FLIGHT_API_BASE") {
            config.flight_api_base = v;
        }
        if let Some(v) = lookup("FLIGHT_API_KEY") {
            config.flight_api_key = v;
        }
        if let Some(v) = lookup("EXR_BASE") {
            config.fx_base = v;
        }
        if let Some(v) = lookup("FX_TTL_SECONDS") {
            config.fx_ttl = Duration::from_secs(positive("FX_TTL_SECONDS", &v)?);
        }
        if let Some(v) = lookup("SEARCH_TTL_SECONDS") {
            config.search_ttl = Duration::from_secs(positive("SEARCH_TTL_SECONDS", &v)?);
        }
        if let Some(v) = lookup("WEEKEND_WINDOW_COUNT") {
            config.weekend_window_count = parse_number("WEEKEND_WINDOW_COUNT", &v)?;
        }
        if let Some(v) = lookup("HTTP_TIMEOUT_MS") {
            config.http_timeout = Duration::from_millis(positive("HTTP_TIMEOUT_MS", &v)?);
        }
        if let Some(v) = lookup("MAX_RESULTS") {
            config.max_results = parse_number("MAX_RESULTS", &v)?;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use test_case::test_case;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config, ServiceConfig::default());
        assert_eq!(config.fx_ttl, Duration::from_secs(86_400));
        assert_eq!(config.search_ttl, Duration::from_secs(1_800));
        assert_eq!(config.weekend_window_count, 12);
        assert_eq!(config.max_results, 20);
        assert_eq!(config.fx_base, "https://api.frankfurter.app");
    }

    #[test]
    fn test_overrides() {
        let config = ServiceConfig::from_lookup(lookup_from(&[
            ("FLIGHT_API_KEY", "secret"),
            ("EXR_BASE", "http://localhost:8080"),
            ("SEARCH_TTL_SECONDS", "60"),
            ("HTTP_TIMEOUT_MS", "2500"),
            ("WEEKEND_WINDOW_COUNT", "0"),
        ]))
        .unwrap();

        assert_eq!(config.flight_api_key, "secret");
        assert_eq!(config.fx_base, "http://localhost:8080");
        assert_eq!(config.search_ttl, Duration::from_secs(60));
        assert_eq!(config.http_timeout, Duration::from_millis(2500));
        assert_eq!(config.weekend_window_count, 0);
    }

    #[test_case("FX_TTL_SECONDS", "a day" ; "non numeric ttl")]
    #[test_case("SEARCH_TTL_SECONDS", "0" ; "zero ttl")]
    #[test_case("HTTP_TIMEOUT_MS", "-5" ; "negative timeout")]
    #[test_case("MAX_RESULTS", "20.5" ; "fractional max results")]
    fn test_invalid_values_are_errors(name: &str, value: &str) {
        let err = ServiceConfig::from_lookup(lookup_from(&[(name, value)])).unwrap_err();
        let ConfigError::InvalidValue { name: reported, .. } = err;
        assert_eq!(reported, name);
    }
}
