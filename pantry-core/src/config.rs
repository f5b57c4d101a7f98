//! Configuration types

use crate::error::{ConfigError, PantryError, PantryResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default base every recipe location hangs off.
pub const DEFAULT_LOCATION_BASE_URL: &str = "/recipes";

/// Master configuration struct.
/// Every field has a default; `from_env` overrides what the environment sets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PantryConfig {
    /// Prefix of generated recipe locations.
    pub location_base_url: String,
    /// When false the coordinators run straight against the store.
    pub cache_enabled: bool,
    /// Entries older than this are treated as misses.
    pub cache_entry_ttl: Duration,
    /// Capacity of the in-memory backend.
    pub cache_max_entries: usize,
    /// Upper bound on any single cache backend call.
    pub cache_operation_timeout: Duration,
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub log_filter: String,
    /// Emit JSON log lines instead of the human format.
    pub log_json: bool,
}

impl Default for PantryConfig {
    fn default() -> Self {
        Self {
            location_base_url: DEFAULT_LOCATION_BASE_URL.to_string(),
            cache_enabled: true,
            cache_entry_ttl: Duration::from_secs(3600),
            cache_max_entries: 10_000,
            cache_operation_timeout: Duration::from_millis(250),
            log_filter: "info".to_string(),
            log_json: false,
        }
    }
}

impl PantryConfig {
    pub fn with_location_base_url(mut self, base: impl Into<String>) -> Self {
        self.location_base_url = base.into();
        self
    }

    pub fn with_cache_enabled(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    pub fn with_cache_entry_ttl(mut self, ttl: Duration) -> Self {
        self.cache_entry_ttl = ttl;
        self
    }

    pub fn with_cache_max_entries(mut self, max_entries: usize) -> Self {
        self.cache_max_entries = max_entries;
        self
    }

    pub fn with_cache_operation_timeout(mut self, timeout: Duration) -> Self {
        self.cache_operation_timeout = timeout;
        self
    }

    pub fn with_log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = filter.into();
        self
    }

    pub fn with_log_json(mut self, json: bool) -> Self {
        self.log_json = json;
        self
    }

    /// Validate the configuration.
    /// Returns an error if any value is outside its valid range.
    pub fn validate(&self) -> PantryResult<()> {
        if self.location_base_url.trim().is_empty() {
            return Err(PantryError::Config(ConfigError::InvalidValue {
                field: "location_base_url".to_string(),
                value: self.location_base_url.clone(),
                reason: "location_base_url must not be empty".to_string(),
            }));
        }

        if self.cache_entry_ttl.is_zero() {
            return Err(PantryError::Config(ConfigError::InvalidValue {
                field: "cache_entry_ttl".to_string(),
                value: format!("{:?}", self.cache_entry_ttl),
                reason: "cache_entry_ttl must be positive".to_string(),
            }));
        }

        if self.cache_max_entries == 0 {
            return Err(PantryError::Config(ConfigError::InvalidValue {
                field: "cache_max_entries".to_string(),
                value: self.cache_max_entries.to_string(),
                reason: "cache_max_entries must be greater than 0".to_string(),
            }));
        }

        if self.cache_operation_timeout.is_zero() {
            return Err(PantryError::Config(ConfigError::InvalidValue {
                field: "cache_operation_timeout".to_string(),
                value: format!("{:?}", self.cache_operation_timeout),
                reason: "cache_operation_timeout must be positive".to_string(),
            }));
        }

        Ok(())
    }

    /// Load from environment variables, falling back to defaults.
    ///
    /// Unparseable values are ignored rather than rejected; call
    /// [`validate`](Self::validate) on the result.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            location_base_url: std::env::var("PANTRY_LOCATION_BASE_URL")
                .ok()
                .unwrap_or(defaults.location_base_url),
            cache_enabled: std::env::var("PANTRY_CACHE_ENABLED")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.cache_enabled),
            cache_entry_ttl: std::env::var("PANTRY_CACHE_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.cache_entry_ttl),
            cache_max_entries: std::env::var("PANTRY_CACHE_MAX_ENTRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.cache_max_entries),
            cache_operation_timeout: std::env::var("PANTRY_CACHE_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.cache_operation_timeout),
            log_filter: std::env::var("PANTRY_LOG")
                .ok()
                .unwrap_or(defaults.log_filter),
            log_json: std::env::var("PANTRY_LOG_JSON")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.log_json),
        }
    }
}
