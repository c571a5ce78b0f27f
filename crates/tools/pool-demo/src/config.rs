//! Demo configuration
//!
//! Layered: built-in defaults, then an optional config file, then
//! `CHUNK_POOL_*` environment variables (nested keys split on `__`, e.g.
//! `CHUNK_POOL_POOL__CHUNK_COUNT=64`). CLI flags override the result.

use anyhow::{Context, Result};
use chunk_pool::PoolConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Demo driver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// Pool shape and policy
    pub pool: PoolConfig,
    /// Consumer threads for the drain scenario
    pub threads: usize,
    /// Log filter used when `RUST_LOG` is unset
    pub log_level: String,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            pool: PoolConfig::default(),
            threads: 2,
            log_level: "info".to_string(),
        }
    }
}

impl DemoConfig {
    /// Load configuration from an optional file plus the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let defaults = config::Config::try_from(&Self::default())
            .context("Failed to encode default configuration")?;

        let mut builder = config::Config::builder().add_source(defaults);
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix("CHUNK_POOL")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read configuration")?;

        let config: Self = settings
            .try_deserialize()
            .context("Invalid configuration values")?;
        config.pool.validate()?;
        Ok(config)
    }

    /// Apply pool flags on top of the loaded values; absent flags keep them
    pub fn override_pool(&mut self, chunk_count: Option<usize>, chunk_size: Option<usize>) {
        if let Some(chunk_count) = chunk_count {
            self.pool.chunk_count = chunk_count;
        }
        if let Some(chunk_size) = chunk_size {
            self.pool.chunk_size = chunk_size;
        }
    }
}
