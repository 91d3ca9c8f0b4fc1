//! Capability-level configuration shared across all workflows on one chain.
//!
//! Can be loaded from a TOML or JSON document via [`ServiceConfig::from_toml_str`]
//! / [`ServiceConfig::from_json_str`], or built programmatically (e.g. for tests).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ValidationError};

/// Capability id template: `log-event-trigger-{network}-{chainId}@1.0.0`.
pub const CAPABILITY_ID_PREFIX: &str = "log-event-trigger";

/// Capability version suffix.
pub const CAPABILITY_VERSION: &str = "1.0.0";

/// Default bound on undelivered responses per trigger.
pub const DEFAULT_RESPONSE_BUFFER_SIZE: usize = 1000;

/// Configuration for a log-event trigger service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    /// Chain selector, e.g. `"11155111"`.
    #[serde(default)]
    pub chain_id: String,

    /// Chain family, e.g. `"evm"`.
    #[serde(default = "default_network")]
    pub network: String,

    /// How many blocks behind head a new listener starts reading.
    #[serde(default = "default_lookback_blocks", alias = "lookbakBlocks")]
    pub lookback_blocks: u64,

    /// Poll interval in milliseconds.
    #[serde(default = "default_poll_period")]
    pub poll_period: u32,

    /// Maximum logs fetched per query.
    #[serde(default = "default_query_count")]
    pub query_count: u64,

    /// Per-trigger response channel capacity.
    #[serde(default = "default_response_buffer_size")]
    pub response_buffer_size: usize,
}

fn default_network() -> String {
    "evm".to_string()
}

const fn default_lookback_blocks() -> u64 {
    100
}

const fn default_poll_period() -> u32 {
    1000
}

const fn default_query_count() -> u64 {
    100
}

const fn default_response_buffer_size() -> usize {
    DEFAULT_RESPONSE_BUFFER_SIZE
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            chain_id: String::new(),
            network: default_network(),
            lookback_blocks: default_lookback_blocks(),
            poll_period: default_poll_period(),
            query_count: default_query_count(),
            response_buffer_size: default_response_buffer_size(),
        }
    }
}

impl ServiceConfig {
    /// Config for `chain_id` on `network` with default polling.
    #[must_use]
    pub fn new(network: impl Into<String>, chain_id: impl Into<String>) -> Self {
        Self {
            chain_id: chain_id.into(),
            network: network.into(),
            ..Self::default()
        }
    }

    /// Parse from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::ServiceConfigParse {
            message: e.to_string(),
        })
    }

    /// Parse from a JSON string.
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(s).map_err(|e| ConfigError::ServiceConfigParse {
            message: e.to_string(),
        })
    }

    /// Load from a file; `.json` files are parsed as JSON, everything else as TOML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ServiceConfigIo {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&contents),
            _ => Self::from_toml_str(&contents),
        }
    }

    /// The capability id this service registers under.
    #[must_use]
    pub fn capability_id(&self) -> String {
        format!(
            "{CAPABILITY_ID_PREFIX}-{}-{}@{CAPABILITY_VERSION}",
            self.network, self.chain_id
        )
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.chain_id.trim().is_empty() {
            return Err(ValidationError::InvalidServiceConfig {
                field: "chainId",
                reason: "cannot be empty".to_string(),
            });
        }
        if self.network.trim().is_empty() {
            return Err(ValidationError::InvalidServiceConfig {
                field: "network",
                reason: "cannot be empty".to_string(),
            });
        }
        if self.poll_period == 0 {
            return Err(ValidationError::InvalidServiceConfig {
                field: "pollPeriod",
                reason: "must be positive".to_string(),
            });
        }
        if self.query_count == 0 {
            return Err(ValidationError::InvalidServiceConfig {
                field: "queryCount",
                reason: "must be positive".to_string(),
            });
        }
        if self.response_buffer_size == 0 {
            return Err(ValidationError::InvalidServiceConfig {
                field: "responseBufferSize",
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}
