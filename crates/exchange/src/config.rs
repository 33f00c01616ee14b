//! Venue registry: per-venue endpoints, limits and session tunables.
//!
//! A registry ships embedded in the binary; deployments can override it
//! with a JSON file of the same shape.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use hermes_connect::{BackoffConfig, RateLimitConfig, RetryPolicy, SessionConfig, SignatureScheme};
use hermes_core::VenueId;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read venue config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse venue config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("unknown venue: {0}")]
    UnknownVenue(String),
}

fn default_enabled() -> bool {
    true
}

fn default_heartbeat_ms() -> u64 {
    5_000
}

fn default_liveness_timeout_ms() -> u64 {
    30_000
}

fn default_auth_timeout_ms() -> u64 {
    10_000
}

fn default_reconnect_base_ms() -> u64 {
    250
}

fn default_reconnect_max_ms() -> u64 {
    30_000
}

fn default_max_retry_attempts() -> u32 {
    3
}

fn default_trade_ring_capacity() -> usize {
    500
}

/// Everything the core needs to know about one venue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueConfig {
    pub id: VenueId,
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub rest_url: String,
    pub ws_url: String,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub signature: SignatureScheme,
    #[serde(default = "default_heartbeat_ms")]
    pub heartbeat_ms: u64,
    #[serde(default = "default_liveness_timeout_ms")]
    pub liveness_timeout_ms: u64,
    #[serde(default = "default_auth_timeout_ms")]
    pub auth_timeout_ms: u64,
    #[serde(default = "default_reconnect_base_ms")]
    pub reconnect_base_ms: u64,
    #[serde(default = "default_reconnect_max_ms")]
    pub reconnect_max_ms: u64,
    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,
    #[serde(default = "default_trade_ring_capacity")]
    pub trade_ring_capacity: usize,
}

impl VenueConfig {
    pub fn backoff(&self) -> BackoffConfig {
        BackoffConfig::new(
            Duration::from_millis(self.reconnect_base_ms),
            Duration::from_millis(self.reconnect_max_ms),
        )
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            ws_url: self.ws_url.clone(),
            heartbeat_interval: Duration::from_millis(self.heartbeat_ms),
            liveness_timeout: Duration::from_millis(self.liveness_timeout_ms),
            auth_timeout: Duration::from_millis(self.auth_timeout_ms),
            backoff: self.backoff(),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retry_attempts,
            backoff: self.backoff(),
        }
    }
}

#[derive(Deserialize)]
struct RegistryFile {
    venues: Vec<VenueConfig>,
}

/// All known venues, keyed by id
pub struct VenueRegistry {
    venues: HashMap<VenueId, VenueConfig>,
}

impl VenueRegistry {
    /// The registry compiled into the binary
    pub fn builtin() -> Result<Self, ConfigError> {
        Self::from_json(include_str!("../venues.json"))
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let file: RegistryFile = serde_json::from_str(raw)?;
        Ok(VenueRegistry {
            venues: file
                .venues
                .into_iter()
                .map(|venue| (venue.id.clone(), venue))
                .collect(),
        })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn get(&self, id: &VenueId) -> Result<&VenueConfig, ConfigError> {
        self.venues
            .get(id)
            .ok_or_else(|| ConfigError::UnknownVenue(id.to_string()))
    }

    /// Venues not switched off in configuration
    pub fn enabled(&self) -> impl Iterator<Item = &VenueConfig> {
        self.venues.values().filter(|venue| venue.enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registry_parses() {
        let registry = VenueRegistry::builtin().unwrap();
        let binance = registry.get(&VenueId::new("binance")).unwrap();
        assert_eq!(binance.rest_url, "https://api.binance.com");
        assert!(binance.enabled);
        assert!(registry.enabled().count() >= 3);
    }

    #[test]
    fn test_unknown_venue_errors() {
        let registry = VenueRegistry::builtin().unwrap();
        let err = registry.get(&VenueId::new("nosuch")).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownVenue(_)));
    }

    #[test]
    fn test_defaults_fill_omitted_fields() {
        let registry = VenueRegistry::from_json(
            r#"{"venues": [{
                "id": "minimal",
                "name": "Minimal",
                "rest_url": "https://api.minimal.test",
                "ws_url": "wss://ws.minimal.test"
            }]}"#,
        )
        .unwrap();

        let venue = registry.get(&VenueId::new("minimal")).unwrap();
        assert_eq!(venue.rate_limit, RateLimitConfig::default());
        assert_eq!(venue.max_retry_attempts, 3);
        assert_eq!(venue.trade_ring_capacity, 500);

        let session = venue.session_config();
        assert_eq!(session.heartbeat_interval, Duration::from_secs(5));
        assert_eq!(session.liveness_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_disabled_venue_excluded_from_enabled() {
        let registry = VenueRegistry::from_json(
            r#"{"venues": [{
                "id": "off",
                "name": "Off",
                "enabled": false,
                "rest_url": "https://api.off.test",
                "ws_url": "wss://ws.off.test"
            }]}"#,
        )
        .unwrap();

        assert_eq!(registry.enabled().count(), 0);
        // Still addressable directly
        assert!(registry.get(&VenueId::new("off")).is_ok());
    }
}
