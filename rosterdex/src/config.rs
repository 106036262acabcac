//! Runtime configuration for the store facade, sync engine and sessions.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, uniffi::Record)]
#[serde(default)]
pub struct RosterConfig {
    /// Backend-of-record root; bootstrap lives at `{base}/{sport}/bootstrap`
    pub backend_base_url: String,
    /// A sport is due for sync once its last sync is older than this
    pub max_age_secs: u64,
    pub debounce_ms: u64,
    pub request_timeout_secs: u64,
    pub pool_size: u32,
    pub default_limit: u32,
}

impl Default for RosterConfig {
    fn default() -> Self {
        Self {
            backend_base_url: "http://localhost:8080".to_string(),
            max_age_secs: 24 * 60 * 60,
            debounce_ms: 200,
            request_timeout_secs: 15,
            pool_size: 8,
            default_limit: 10,
        }
    }
}

impl RosterConfig {
    /// Parse a JSON document; absent fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
