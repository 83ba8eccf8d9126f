//! Cache bounds

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default number of distinct cached queries
pub const DEFAULT_MAX_SIZE: usize = 1_000;

/// Default RAM budget, 32 MiB
pub const DEFAULT_MAX_RAM_BYTES: usize = 32 * 1024 * 1024;

/// Configuration for [`LruQueryCache`](crate::LruQueryCache)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of distinct queries with at least one cached entry
    pub max_size: usize,
    /// Maximum estimated RAM for all entries and their bookkeeping
    pub max_ram_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
            max_ram_bytes: DEFAULT_MAX_RAM_BYTES,
        }
    }
}

impl CacheConfig {
    /// Create a configuration with both bounds
    pub fn new(max_size: usize, max_ram_bytes: usize) -> Self {
        Self {
            max_size,
            max_ram_bytes,
        }
    }

    /// Set the maximum number of cached queries
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    /// Set the RAM budget in bytes
    pub fn with_max_ram_bytes(mut self, max_ram_bytes: usize) -> Self {
        self.max_ram_bytes = max_ram_bytes;
        self
    }

    /// Bound only by the number of queries
    pub fn unbounded_ram(mut self) -> Self {
        self.max_ram_bytes = usize::MAX;
        self
    }

    /// Both bounds must be positive
    pub fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            return Err(Error::InvalidConfig("max_size must be positive".into()));
        }
        if self.max_ram_bytes == 0 {
            return Err(Error::InvalidConfig(
                "max_ram_bytes must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert_eq!(config.max_size, 1_000);
        assert_eq!(config.max_ram_bytes, 32 * 1024 * 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_methods() {
        let config = CacheConfig::default()
            .with_max_size(10)
            .with_max_ram_bytes(4096);
        assert_eq!(config, CacheConfig::new(10, 4096));
        assert_eq!(config.unbounded_ram().max_ram_bytes, usize::MAX);
    }

    #[test]
    fn test_validate_rejects_zero_bounds() {
        assert!(matches!(
            CacheConfig::new(0, 100).validate(),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            CacheConfig::new(100, 0).validate(),
            Err(Error::InvalidConfig(_))
        ));
    }
}
