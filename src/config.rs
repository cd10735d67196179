use std::time::Duration;

use chrono_tz::Tz;

use crate::domain::order::TransitionPolicy;
use crate::sync::RelayConfig;

// ============================================================================
// Application Configuration
// ============================================================================
//
// Read from the process environment (after loading `.env` if present).
// Unset variables fall back to local-development defaults; set-but-invalid
// values are errors.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    Scylla,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} has invalid value '{value}': {reason}")]
    Invalid { name: &'static str, value: String, reason: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub storage_backend: StorageBackend,
    pub scylla_nodes: Vec<String>,
    pub scylla_keyspace: String,
    /// In-memory index mirror when unset
    pub redis_url: Option<String>,
    pub metrics_port: u16,
    /// Timezone dashboard buckets are computed in
    pub business_timezone: Tz,
    pub transition_policy: TransitionPolicy,
    pub relay: RelayConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            storage_backend: StorageBackend::Memory,
            scylla_nodes: vec!["127.0.0.1:9042".to_string()],
            scylla_keyspace: "fulfillment_ks".to_string(),
            redis_url: None,
            metrics_port: 9090,
            business_timezone: chrono_tz::Asia::Kolkata,
            transition_policy: TransitionPolicy::Strict,
            relay: RelayConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source; `lookup` returns `None` for unset names
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let storage_backend = match get("STORAGE_BACKEND") {
            None => defaults.storage_backend,
            Some(value) => match value.to_ascii_lowercase().as_str() {
                "memory" => StorageBackend::Memory,
                "scylla" => StorageBackend::Scylla,
                _ => return Err(invalid("STORAGE_BACKEND", value, "expected 'memory' or 'scylla'")),
            },
        };

        let scylla_nodes = match get("SCYLLA_NODES") {
            None => defaults.scylla_nodes,
            Some(value) => value
                .split(',')
                .map(str::trim)
                .filter(|node| !node.is_empty())
                .map(str::to_string)
                .collect(),
        };

        let business_timezone = match get("BUSINESS_TIMEZONE") {
            None => defaults.business_timezone,
            Some(value) => value
                .parse::<Tz>()
                .map_err(|e| invalid("BUSINESS_TIMEZONE", value.clone(), e.to_string()))?,
        };

        let transition_policy = match get("TRANSITION_POLICY") {
            None => defaults.transition_policy,
            Some(value) => value
                .parse::<TransitionPolicy>()
                .map_err(|e| invalid("TRANSITION_POLICY", value.clone(), e))?,
        };

        let relay = RelayConfig {
            poll_interval: match get("RELAY_POLL_INTERVAL_MS") {
                None => defaults.relay.poll_interval,
                Some(value) => Duration::from_millis(parse_number("RELAY_POLL_INTERVAL_MS", value)?),
            },
            batch_size: match get("RELAY_BATCH_SIZE") {
                None => defaults.relay.batch_size,
                Some(value) => parse_number("RELAY_BATCH_SIZE", value)?,
            },
            max_attempts: match get("RELAY_MAX_ATTEMPTS") {
                None => defaults.relay.max_attempts,
                Some(value) => parse_number("RELAY_MAX_ATTEMPTS", value)?,
            },
        };
        if relay.max_attempts == 0 || relay.batch_size == 0 || relay.poll_interval.is_zero() {
            return Err(invalid(
                "RELAY_*",
                format!("{:?}", relay),
                "relay interval, batch size and attempts must be positive",
            ));
        }

        Ok(Self {
            storage_backend,
            scylla_nodes,
            scylla_keyspace: get("SCYLLA_KEYSPACE").unwrap_or(defaults.scylla_keyspace),
            redis_url: get("REDIS_URL"),
            metrics_port: match get("METRICS_PORT") {
                None => defaults.metrics_port,
                Some(value) => parse_number("METRICS_PORT", value)?,
            },
            business_timezone,
            transition_policy,
            relay,
        })
    }
}

fn invalid(name: &'static str, value: String, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid { name, value, reason: reason.into() }
}

fn parse_number<T>(name: &'static str, value: String) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.parse::<T>().map_err(|e| invalid(name, value.clone(), e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        AppConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.storage_backend, StorageBackend::Memory);
        assert_eq!(config.business_timezone, chrono_tz::Asia::Kolkata);
        assert_eq!(config.transition_policy, TransitionPolicy::Strict);
        assert!(config.redis_url.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("STORAGE_BACKEND", "Scylla"),
            ("SCYLLA_NODES", "10.0.0.1:9042, 10.0.0.2:9042"),
            ("BUSINESS_TIMEZONE", "Europe/Berlin"),
            ("TRANSITION_POLICY", "permissive"),
            ("RELAY_POLL_INTERVAL_MS", "250"),
            ("REDIS_URL", "redis://127.0.0.1:6379"),
        ])
        .unwrap();

        assert_eq!(config.storage_backend, StorageBackend::Scylla);
        assert_eq!(config.scylla_nodes, ["10.0.0.1:9042", "10.0.0.2:9042"]);
        assert_eq!(config.business_timezone, chrono_tz::Europe::Berlin);
        assert_eq!(config.transition_policy, TransitionPolicy::Permissive);
        assert_eq!(config.relay.poll_interval, Duration::from_millis(250));
        assert_eq!(config.redis_url.as_deref(), Some("redis://127.0.0.1:6379"));
    }

    #[test]
    fn test_invalid_values_are_errors() {
        assert!(config_from(&[("BUSINESS_TIMEZONE", "Mars/Olympus")]).is_err());
        assert!(config_from(&[("METRICS_PORT", "ninety")]).is_err());
        assert!(config_from(&[("STORAGE_BACKEND", "postgres")]).is_err());
        assert!(config_from(&[("RELAY_MAX_ATTEMPTS", "0")]).is_err());
    }
}
