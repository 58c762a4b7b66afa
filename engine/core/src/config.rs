// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Engine configuration
//!
//! Loaded from a YAML file (`workforce-config.yaml` by convention) or built
//! from defaults. Durations are humantime strings in the file ("30s", "5m").

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of concurrent execution workers pulling from the queue.
    pub pool_size: usize,

    /// Total attempts allowed per task run (first attempt included).
    pub max_retries: u32,

    /// Base delay before the first retry; doubles per attempt.
    #[serde(with = "humantime_serde")]
    pub base_retry_delay: Duration,

    /// Ceiling for the exponential backoff.
    #[serde(with = "humantime_serde")]
    pub max_retry_delay: Duration,

    /// Wall-clock ceiling per attempt; exceeding it counts as a
    /// recoverable failure.
    #[serde(with = "humantime_serde")]
    pub attempt_timeout: Duration,

    /// Buffered capacity of the domain event bus.
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pool_size: 4,
            max_retries: 3,
            base_retry_delay: Duration::from_secs(2),
            max_retry_delay: Duration::from_secs(300),
            attempt_timeout: Duration::from_secs(60),
            event_capacity: 1000,
        }
    }
}

impl EngineConfig {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: EngineConfig = serde_yaml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pool_size == 0 {
            return Err(ConfigError::Invalid("pool_size must be at least 1".into()));
        }
        if self.max_retries == 0 {
            return Err(ConfigError::Invalid(
                "max_retries must allow at least one attempt".into(),
            ));
        }
        if self.base_retry_delay > self.max_retry_delay {
            return Err(ConfigError::Invalid(
                "base_retry_delay exceeds max_retry_delay".into(),
            ));
        }
        if self.attempt_timeout.is_zero() {
            return Err(ConfigError::Invalid("attempt_timeout must be non-zero".into()));
        }
        Ok(())
    }
}
