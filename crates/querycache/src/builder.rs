//! Cache construction

use std::sync::Arc;

use crate::cache::LruQueryCache;
use crate::config::CacheConfig;
use crate::error::Result;
use crate::key::CacheQuery;
use crate::listener::CacheListener;
use crate::policy::{AlwaysCache, CachingPolicy};

/// Builder for [`LruQueryCache`]
///
/// Defaults to [`CacheConfig::default`], the [`AlwaysCache`] policy and no
/// listeners.
pub struct CacheBuilder<Q> {
    config: CacheConfig,
    policy: Box<dyn CachingPolicy<Q>>,
    listeners: Vec<Arc<dyn CacheListener<Q>>>,
}

impl<Q: CacheQuery> CacheBuilder<Q> {
    /// Builder with default bounds and policy
    pub fn new() -> Self {
        Self {
            config: CacheConfig::default(),
            policy: Box::new(AlwaysCache),
            listeners: Vec::new(),
        }
    }

    /// Replace both bounds
    pub fn config(mut self, config: CacheConfig) -> Self {
        self.config = config;
        self
    }

    /// Maximum number of cached queries
    pub fn max_size(mut self, max_size: usize) -> Self {
        self.config.max_size = max_size;
        self
    }

    /// RAM budget in bytes
    pub fn max_ram_bytes(mut self, max_ram_bytes: usize) -> Self {
        self.config.max_ram_bytes = max_ram_bytes;
        self
    }

    /// Admission policy
    pub fn policy(mut self, policy: impl CachingPolicy<Q> + 'static) -> Self {
        self.policy = Box::new(policy);
        self
    }

    /// Add an event listener; listeners are called in registration order
    pub fn listener(mut self, listener: Arc<dyn CacheListener<Q>>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Validate the bounds and create the cache
    pub fn build(self) -> Result<LruQueryCache<Q>> {
        LruQueryCache::from_parts(self.config, self.policy, self.listeners)
    }
}

impl<Q: CacheQuery> Default for CacheBuilder<Q> {
    fn default() -> Self {
        Self::new()
    }
}
