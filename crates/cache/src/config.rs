//! Render cache configuration.

use std::time::Duration;

/// Settings for a [`RenderCache`](crate::RenderCache).
#[derive(Debug, Clone, PartialEq)]
pub struct RenderCacheConfig {
    /// Maximum bytes of raster data kept in memory
    pub memory_limit: usize,
    /// Age after which an entry is no longer served
    pub ttl: Duration,
}

impl Default for RenderCacheConfig {
    fn default() -> Self {
        Self {
            memory_limit: 256 * 1024 * 1024, // 256 MB
            ttl: Duration::from_secs(5 * 60),
        }
    }
}

impl RenderCacheConfig {
    pub fn new(memory_limit_mb: usize, ttl: Duration) -> Self {
        Self { memory_limit: memory_limit_mb.saturating_mul(1024 * 1024), ttl }
    }

    /// Sets the entry time-to-live.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}
