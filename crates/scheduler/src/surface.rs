//! Per-page drawing surface locks
//!
//! A surface is the destination of one page's raster writes. Holding its
//! guard is the only way to render into or publish onto that page.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// Exclusive-access lock for one drawing surface
#[derive(Default)]
pub struct SurfaceLock {
    busy: Mutex<bool>,
    released: Condvar,
}

impl SurfaceLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(self: &Arc<Self>) -> Option<SurfaceGuard> {
        let mut busy = self.busy.lock().unwrap();
        if *busy {
            return None;
        }
        *busy = true;
        Some(SurfaceGuard { lock: self.clone() })
    }

    /// Wait at most `wait` for the surface to be released.
    pub fn acquire_timeout(self: &Arc<Self>, wait: Duration) -> Option<SurfaceGuard> {
        let busy = self.busy.lock().unwrap();
        let (mut busy, _) = self.released.wait_timeout_while(busy, wait, |busy| *busy).unwrap();
        if *busy {
            return None;
        }
        *busy = true;
        Some(SurfaceGuard { lock: self.clone() })
    }

    pub fn is_held(&self) -> bool {
        *self.busy.lock().unwrap()
    }

    fn release(&self) {
        *self.busy.lock().unwrap() = false;
        self.released.notify_all();
    }
}

/// Releases the surface when dropped
pub struct SurfaceGuard {
    lock: Arc<SurfaceLock>,
}

impl Drop for SurfaceGuard {
    fn drop(&mut self) {
        self.lock.release();
    }
}

/// Lazily created surface locks keyed by page number
#[derive(Default)]
pub struct SurfaceLocks {
    locks: Mutex<HashMap<u32, Arc<SurfaceLock>>>,
}

impl SurfaceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_page(&self, page: u32) -> Arc<SurfaceLock> {
        self.locks.lock().unwrap().entry(page).or_default().clone()
    }
}
