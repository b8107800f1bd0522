//! Memory manager configuration
//!
//! Values come from defaults, an optional TOML file, then `SECTORALLOC_*`
//! environment variables, in that order of precedence.

use crate::error::{Error, Result};
use crate::sector::address::MAX_SECTORS;
use crate::sector::allocator::DEFAULT_FREE_LIST_THRESHOLD;
use crate::sector::size_class::initial_reserve_bytes;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Environment variable prefix for overrides, e.g. `SECTORALLOC_MAX_SECTORS=8`
pub const ENV_PREFIX: &str = "SECTORALLOC";

/// Memory manager configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryManagerConfig {
    /// Byte capacity of every sector (and of every buffer pool region)
    pub sector_size: usize,
    /// Maximum number of sectors the manager may create
    pub max_sectors: usize,
    /// Free slots per tag-block every class needs to rejoin the free list
    pub free_list_threshold: u32,
    /// Whether `allocate_default` blocks when capacity is exhausted
    pub blocking: bool,
}

impl Default for MemoryManagerConfig {
    fn default() -> Self {
        Self {
            sector_size: 64 * 1024 * 1024, // 64MB
            max_sectors: MAX_SECTORS,
            free_list_threshold: DEFAULT_FREE_LIST_THRESHOLD,
            blocking: true,
        }
    }
}

impl MemoryManagerConfig {
    /// Configuration with the given sector size and count, other fields defaulted
    pub fn new(sector_size: usize, max_sectors: usize) -> Self {
        Self {
            sector_size,
            max_sectors,
            ..Self::default()
        }
    }

    /// Load from an optional TOML file plus environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            info!(path = ?path, "Loading memory manager configuration");
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(config::Environment::with_prefix(ENV_PREFIX));

        let cfg: Self = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| Error::Config(format!("Failed to load configuration: {}", e)))?;

        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject configurations the allocator cannot honour
    pub fn validate(&self) -> Result<()> {
        if self.sector_size < initial_reserve_bytes() {
            return Err(Error::Config(format!(
                "sector_size {} must be at least {} bytes",
                self.sector_size,
                initial_reserve_bytes()
            )));
        }
        if self.sector_size > u32::MAX as usize {
            return Err(Error::Config(format!(
                "sector_size {} exceeds {} bytes",
                self.sector_size,
                u32::MAX
            )));
        }
        if self.max_sectors == 0 || self.max_sectors > MAX_SECTORS {
            return Err(Error::Config(format!(
                "max_sectors {} must be between 1 and {}",
                self.max_sectors, MAX_SECTORS
            )));
        }
        if self.free_list_threshold as usize > crate::sector::size_class::SLOTS_PER_BLOCK {
            return Err(Error::Config(format!(
                "free_list_threshold {} exceeds the slots in a tag-block",
                self.free_list_threshold
            )));
        }
        Ok(())
    }

    /// Render the effective configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize configuration: {}", e)))
    }
}
