//! PDF Signer Scheduler Library
//!
//! Page render scheduling with per-surface locks and cancellable requests,
//! background render workers, and the page geometry tracker that receives
//! completed renders.
//!
//! # Example
//!
//! ```
//! use pdf_signer_engine::{blank_document, decode, PageSize};
//! use pdf_signer_scheduler::{GeometryTracker, LayoutMetrics, RenderScheduler, SchedulerConfig};
//! use std::sync::Arc;
//!
//! let document = decode(&blank_document(&[PageSize::LETTER; 3]).unwrap()).unwrap();
//! let tracker = Arc::new(GeometryTracker::new(
//!     document.page_sizes().unwrap(),
//!     LayoutMetrics::default(),
//!     1.5,
//! ));
//! let scheduler = RenderScheduler::new(document, tracker.clone(), SchedulerConfig::default());
//!
//! // Only render what is on screen
//! for page in tracker.visible_pages(0.0, 800.0) {
//!     scheduler.request_render(page, 1.5).unwrap();
//! }
//! scheduler.run_pending();
//!
//! assert!(tracker.rect(1).is_some());
//! assert!(tracker.rect(3).is_none());
//! ```

mod cancel;
mod scheduler;
mod surface;
mod viewport;
mod worker;

pub use cancel::{CancellationRegistry, CancellationToken};
pub use scheduler::{
    DiscardReason, PageRenderState, RenderOutcome, RenderScheduler, RenderSink, RenderTicket,
    SchedulerConfig, SchedulerError, SchedulerStats,
};
pub use surface::{SurfaceGuard, SurfaceLock, SurfaceLocks};
pub use viewport::{GeometryTracker, LayoutMetrics, PageHit, PublishedPage, ViewportRect};
pub use worker::{OutcomeObserver, WorkerPool, WorkerPoolConfig};
