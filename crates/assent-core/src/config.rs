//! Engine configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Tunables for the consent engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConsentConfig {
    /// Language used when a requested notice language is unavailable.
    pub default_language: String,
    /// Validity of a fresh grant, in days.
    pub default_validity_days: i64,
    /// How far before expiry renewal becomes due, in days.
    pub renewal_horizon_days: i64,
    /// Bounded staleness window for the validation gate cache, in seconds.
    pub gate_cache_staleness_secs: u64,
    /// Attempts for processor notifications before giving up.
    pub max_notify_attempts: u32,
}

impl Default for ConsentConfig {
    fn default() -> Self {
        Self {
            default_language: "en".into(),
            default_validity_days: 180,
            renewal_horizon_days: 30,
            gate_cache_staleness_secs: 30,
            max_notify_attempts: 3,
        }
    }
}

impl ConsentConfig {
    /// Parse a config from YAML; absent fields take defaults, unknown
    /// fields are rejected.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("failed to parse consent config")
    }
}
