// SPDX-License-Identifier: MIT OR Apache-2.0
//! Engine configuration and resource sizing.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during configuration loading or validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The input could not be parsed as valid TOML.
    #[error("failed to parse config: {reason}")]
    ParseError {
        /// Human-readable parse error detail.
        reason: String,
    },

    /// Semantic validation failed (one or more problems).
    #[error("config validation failed: {reasons:?}")]
    ValidationError {
        /// Individual validation failure messages.
        reasons: Vec<String>,
    },
}

/// Host resources granted to each executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resources {
    /// Host CPU count override; detected when absent.
    #[serde(default)]
    pub num_cpus: Option<usize>,
    /// CPU fraction reserved per actor.
    #[serde(default = "default_cpus_per_actor")]
    pub cpus_per_actor: f64,
}

fn default_cpus_per_actor() -> f64 {
    2.0
}

impl Default for Resources {
    fn default() -> Self {
        Self {
            num_cpus: None,
            cpus_per_actor: default_cpus_per_actor(),
        }
    }
}

impl Resources {
    /// Number of actors the host can sustain: at least one, at most
    /// `host_cpus / cpus_per_actor`.
    #[must_use]
    pub fn actors_capacity(&self) -> usize {
        let host_cpus = self.num_cpus.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(std::num::NonZeroUsize::get)
                .unwrap_or(1)
        });
        ((host_cpus as f64 / self.cpus_per_actor).floor() as usize).max(1)
    }
}

/// Top-level engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Number of simulated client nodes to register.
    pub num_supernodes: usize,
    /// Load path of the client application in the registry.
    pub app_path: String,
    /// Executor resource grants.
    #[serde(default)]
    pub resources: Resources,
    /// Store poll interval for the pull loop, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Capacity of the internal instruction channel.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

fn default_queue_capacity() -> usize {
    64
}

impl EngineConfig {
    /// Create a config with defaults for everything but the node count and
    /// app path.
    #[must_use]
    pub fn new(num_supernodes: usize, app_path: impl Into<String>) -> Self {
        Self {
            num_supernodes,
            app_path: app_path.into(),
            resources: Resources::default(),
            poll_interval_ms: default_poll_interval_ms(),
            queue_capacity: default_queue_capacity(),
        }
    }

    /// Parse a config from TOML.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ParseError`] on malformed TOML.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        toml::from_str(input).map_err(|e| ConfigError::ParseError {
            reason: e.to_string(),
        })
    }

    /// Check the configuration for semantic problems.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] listing every problem
    /// found. Fatal at engine startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut reasons = Vec::new();
        if self.num_supernodes == 0 {
            reasons.push("num_supernodes must be positive".to_string());
        }
        if self.app_path.is_empty() {
            reasons.push("app_path must not be empty".to_string());
        }
        if self.queue_capacity == 0 {
            reasons.push("queue_capacity must be positive".to_string());
        }
        if !(self.resources.cpus_per_actor > 0.0) {
            reasons.push("resources.cpus_per_actor must be positive".to_string());
        }
        if reasons.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::ValidationError { reasons })
        }
    }

    /// The pull-loop poll interval as a [`Duration`].
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
