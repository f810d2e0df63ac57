//! Pool configuration and `sandpool.toml` parsing.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default ceiling on live transports. Managed external databases
/// typically refuse more than about a dozen connections per instance.
pub const DEFAULT_MAX_OPEN_CONNS: usize = 10;

/// Capacity of the shared pool. Read once at registration; the pool built
/// from it never changes size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolConfig {
    /// Maximum live transports (idle + checked out).
    pub max_open_conns: usize,
}

impl PoolConfig {
    /// Validate a raw capacity. Zero and negative values are rejected.
    pub fn new(max_open_conns: i64) -> Result<Self> {
        if max_open_conns <= 0 {
            return Err(Error::InvalidCapacity(max_open_conns));
        }
        let max_open_conns =
            usize::try_from(max_open_conns).map_err(|_| Error::InvalidCapacity(max_open_conns))?;
        Ok(Self { max_open_conns })
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_open_conns: DEFAULT_MAX_OPEN_CONNS,
        }
    }
}

/// Top-level `sandpool.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandpoolConfig {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub pool: PoolSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Registered driver name.
    pub driver: String,
    /// Driver-specific data source string.
    pub data_source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolSection {
    #[serde(default = "default_max_open_conns")]
    pub max_open_conns: i64,
}

impl Default for PoolSection {
    fn default() -> Self {
        Self {
            max_open_conns: default_max_open_conns(),
        }
    }
}

fn default_max_open_conns() -> i64 {
    DEFAULT_MAX_OPEN_CONNS as i64
}

impl SandpoolConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::from_toml_str(&content)?)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: SandpoolConfig =
            toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.database.driver.trim().is_empty() {
            return Err(Error::Config("database.driver must not be empty".to_string()));
        }
        self.pool_config().map(|_| ())
    }

    pub fn pool_config(&self) -> Result<PoolConfig> {
        PoolConfig::new(self.pool.max_open_conns)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
