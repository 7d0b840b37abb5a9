//! Cancellation tokens for render requests
//!
//! Each page has at most one live token. Registering a new token for a page
//! cancels the previous one, so an in-flight render observes cancellation as
//! soon as a newer request for the same page exists.

use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

/// Cancellation token for cooperative cancellation
///
/// Clones share the same flag.
///
/// # Example
///
/// ```
/// use pdf_signer_scheduler::CancellationToken;
///
/// let token = CancellationToken::new();
/// let worker_token = token.clone();
///
/// token.cancel();
/// assert!(worker_token.is_cancelled());
/// ```
#[derive(Clone, Debug)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a new token in the non-cancelled state
    pub fn new() -> Self {
        Self { cancelled: Arc::new(AtomicBool::new(false)) }
    }

    /// Cancel this token and every clone of it. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Whether `other` is a clone of this token
    pub fn same_as(&self, other: &CancellationToken) -> bool {
        Arc::ptr_eq(&self.cancelled, &other.cancelled)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Live cancellation tokens keyed by page number
#[derive(Clone, Default)]
pub struct CancellationRegistry {
    tokens: Arc<Mutex<HashMap<u32, CancellationToken>>>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fresh token for `page`, cancelling the one it replaces.
    pub fn register(&self, page: u32) -> CancellationToken {
        let token = CancellationToken::new();
        let mut tokens = self.tokens.lock().unwrap();
        if let Some(previous) = tokens.insert(page, token.clone()) {
            previous.cancel();
        }
        token
    }

    /// Cancel the live token of `page`. Returns `true` if one existed.
    pub fn cancel(&self, page: u32) -> bool {
        let tokens = self.tokens.lock().unwrap();
        match tokens.get(&page) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every live token. Returns how many were cancelled.
    pub fn cancel_all(&self) -> usize {
        let tokens = self.tokens.lock().unwrap();
        for token in tokens.values() {
            token.cancel();
        }
        tokens.len()
    }

    /// Remove the token of `page` if it is still `token`.
    ///
    /// A finished render must not drop the token of a newer request.
    pub fn unregister_if_current(&self, page: u32, token: &CancellationToken) -> bool {
        let mut tokens = self.tokens.lock().unwrap();
        match tokens.get(&page) {
            Some(current) if current.same_as(token) => {
                tokens.remove(&page);
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, page: u32) -> Option<CancellationToken> {
        self.tokens.lock().unwrap().get(&page).cloned()
    }

    pub fn len(&self) -> usize {
        self.tokens.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.lock().unwrap().is_empty()
    }

    /// Forget all tokens without cancelling them
    pub fn clear(&self) {
        self.tokens.lock().unwrap().clear();
    }
}
