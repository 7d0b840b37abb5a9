//! PDF Signer Cache Library
//!
//! In-memory cache of rendered page rasters with scale validation, TTL
//! expiry and LRU eviction.

pub mod config;
pub mod ram;

pub use config::RenderCacheConfig;
pub use ram::{CacheStats, CachedRaster, RenderCache};
