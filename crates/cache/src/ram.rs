//! RAM render cache with scale validation, TTL and LRU eviction
//!
//! Holds the most recent raster of each page. An entry is only served for
//! the exact scale it was rendered at and only while it is younger than the
//! configured TTL. When the memory limit is reached, the least recently used
//! pages are evicted.

use crate::RenderCacheConfig;
use pdf_signer_engine::RgbaImage;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Scales closer than this are treated as the same scale.
const SCALE_EPSILON: f32 = 1e-4;

/// A cached page raster.
#[derive(Debug, Clone)]
pub struct CachedRaster {
    /// 1-based page number
    pub page: u32,

    /// Scale the raster was rendered at
    pub scale: f32,

    pub raster: Arc<RgbaImage>,

    pub rendered_at: Instant,
}

impl CachedRaster {
    pub fn new(page: u32, scale: f32, raster: Arc<RgbaImage>, rendered_at: Instant) -> Self {
        Self { page, scale, raster, rendered_at }
    }

    /// Memory size of the raster in bytes
    pub fn memory_size(&self) -> usize {
        self.raster.as_raw().len()
    }

    pub fn matches_scale(&self, scale: f32) -> bool {
        (self.scale - scale).abs() < SCALE_EPSILON
    }

    pub fn is_expired(&self, ttl: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.rendered_at) >= ttl
    }
}

/// Statistics about cache usage
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    /// Number of pages currently in cache
    pub entry_count: usize,

    /// Total memory used by cached rasters (bytes)
    pub memory_used: usize,

    /// Maximum memory allowed (bytes)
    pub memory_limit: usize,

    pub hits: u64,

    pub misses: u64,

    /// Entries dropped because of memory pressure
    pub evictions: u64,

    /// Entries dropped because they outlived the TTL
    pub expirations: u64,
}

struct CacheState {
    entries: HashMap<u32, CachedRaster>,

    /// LRU queue (most recently used at back, least recently used at front)
    lru_queue: VecDeque<u32>,

    memory_used: usize,

    memory_limit: usize,

    ttl: Duration,

    stats: CacheStats,
}

impl CacheState {
    fn new(config: &RenderCacheConfig) -> Self {
        Self {
            entries: HashMap::new(),
            lru_queue: VecDeque::new(),
            memory_used: 0,
            memory_limit: config.memory_limit,
            ttl: config.ttl,
            stats: CacheStats { memory_limit: config.memory_limit, ..Default::default() },
        }
    }

    fn touch(&mut self, page: u32) {
        self.lru_queue.retain(|&p| p != page);
        self.lru_queue.push_back(page);
    }

    fn remove_entry(&mut self, page: u32) -> Option<CachedRaster> {
        let entry = self.entries.remove(&page)?;
        self.memory_used = self.memory_used.saturating_sub(entry.memory_size());
        self.lru_queue.retain(|&p| p != page);
        self.sync_stats();
        Some(entry)
    }

    fn evict_lru(&mut self) -> Option<CachedRaster> {
        let page = self.lru_queue.pop_front()?;
        let entry = self.entries.remove(&page)?;
        self.memory_used = self.memory_used.saturating_sub(entry.memory_size());
        self.stats.evictions += 1;
        self.sync_stats();
        Some(entry)
    }

    fn evict_to_fit(&mut self, required_size: usize) {
        while self.memory_used + required_size > self.memory_limit && !self.entries.is_empty() {
            if self.evict_lru().is_none() {
                break;
            }
        }
    }

    fn sync_stats(&mut self) {
        self.stats.entry_count = self.entries.len();
        self.stats.memory_used = self.memory_used;
    }
}

/// Page raster cache
///
/// Thread-safe; clones share the same storage.
///
/// # Example
///
/// ```
/// use pdf_signer_cache::{RenderCache, RenderCacheConfig};
/// use pdf_signer_engine::RgbaImage;
/// use std::sync::Arc;
///
/// let cache = RenderCache::new(RenderCacheConfig::default());
/// cache.put(1, 1.5, Arc::new(RgbaImage::new(918, 1188)));
///
/// assert!(cache.get(1, 1.5).is_some());
/// // A different scale never reuses the raster
/// assert!(cache.get(1, 2.0).is_none());
/// ```
#[derive(Clone)]
pub struct RenderCache {
    state: Arc<Mutex<CacheState>>,
}

impl RenderCache {
    pub fn new(config: RenderCacheConfig) -> Self {
        Self { state: Arc::new(Mutex::new(CacheState::new(&config))) }
    }

    /// Store the raster of `page` rendered at `scale`, replacing any
    /// previous raster of that page.
    pub fn put(&self, page: u32, scale: f32, raster: Arc<RgbaImage>) {
        self.put_at(page, scale, raster, Instant::now());
    }

    pub fn put_at(&self, page: u32, scale: f32, raster: Arc<RgbaImage>, rendered_at: Instant) {
        let mut state = self.state.lock().unwrap();

        let entry = CachedRaster::new(page, scale, raster, rendered_at);
        let size = entry.memory_size();

        state.remove_entry(page);

        if size > state.memory_limit {
            log::debug!(
                "raster for page {page} ({size} bytes) exceeds cache limit, not cached"
            );
            return;
        }

        state.evict_to_fit(size);
        state.memory_used += size;
        state.entries.insert(page, entry);
        state.touch(page);
        state.sync_stats();
    }

    /// Raster of `page` if one was rendered at `scale` and has not expired.
    pub fn get(&self, page: u32, scale: f32) -> Option<CachedRaster> {
        self.get_at(page, scale, Instant::now())
    }

    pub fn get_at(&self, page: u32, scale: f32, now: Instant) -> Option<CachedRaster> {
        let mut state = self.state.lock().unwrap();
        let ttl = state.ttl;

        let lookup = state.entries.get(&page).map(|entry| {
            (entry.matches_scale(scale), entry.is_expired(ttl, now), entry.clone())
        });

        match lookup {
            Some((true, false, entry)) => {
                state.touch(page);
                state.stats.hits += 1;
                Some(entry)
            }
            Some((_, true, _)) => {
                state.remove_entry(page);
                state.stats.expirations += 1;
                state.stats.misses += 1;
                None
            }
            _ => {
                state.stats.misses += 1;
                None
            }
        }
    }

    /// Drop every entry older than the TTL. Returns how many were dropped.
    pub fn evict_expired(&self) -> usize {
        self.evict_expired_at(Instant::now())
    }

    pub fn evict_expired_at(&self, now: Instant) -> usize {
        let mut state = self.state.lock().unwrap();
        let ttl = state.ttl;

        let expired: Vec<u32> = state
            .entries
            .values()
            .filter(|entry| entry.is_expired(ttl, now))
            .map(|entry| entry.page)
            .collect();

        for page in &expired {
            state.remove_entry(*page);
        }
        state.stats.expirations += expired.len() as u64;

        if !expired.is_empty() {
            log::debug!("expired {} cached raster(s)", expired.len());
        }
        expired.len()
    }

    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap();
        state.entries.clear();
        state.lru_queue.clear();
        state.memory_used = 0;
        state.sync_stats();
    }

    pub fn stats(&self) -> CacheStats {
        self.state.lock().unwrap().stats
    }

    pub fn memory_used(&self) -> usize {
        self.state.lock().unwrap().memory_used
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RenderCache {
    fn default() -> Self {
        Self::new(RenderCacheConfig::default())
    }
}
