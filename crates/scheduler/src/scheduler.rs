//! Render scheduler implementation
//!
//! Every page has one drawing surface, one live cancellation token and a
//! generation counter. A request bumps the generation and cancels the token
//! of whatever was in flight for that page. Execution waits for the surface
//! in bounded slices, rechecking its own token between them, then renders
//! and publishes while still holding the surface. A result whose generation
//! is no longer current is dropped without touching the surface.

use crate::cancel::{CancellationRegistry, CancellationToken};
use crate::surface::SurfaceLocks;
use pdf_signer_cache::RenderCache;
use pdf_signer_engine::{LoadedDocument, PdfEngineError, RgbaImage};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Receiver of completed renders and page-scoped render errors
pub trait RenderSink: Send + Sync {
    fn publish(&self, page: u32, scale: f32, raster: Arc<RgbaImage>);

    fn record_error(&self, page: u32, error: &PdfEngineError);
}

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: u32, page_count: u32 },
    #[error("invalid render scale {0}")]
    InvalidScale(f32),
    #[error("failed to spawn render worker: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Render state of a single page
///
/// `Complete`, `Cancelled` and `Errored` are resting states and accept a new
/// request exactly like `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PageRenderState {
    #[default]
    Idle,
    Rendering,
    Complete,
    Cancelled,
    Errored,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerConfig {
    /// Longest single wait for a busy surface before rechecking cancellation
    pub surface_wait: Duration,
    /// Reuse cached rasters rendered at the requested scale
    pub use_cache: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { surface_wait: Duration::from_millis(50), use_cache: true }
    }
}

/// Scheduler statistics
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SchedulerStats {
    pub requested: u64,
    pub completed: u64,
    pub cancelled: u64,
    /// Results dropped because a newer request for the page existed
    pub stale: u64,
    pub failed: u64,
    pub cache_hits: u64,
}

/// One request to render a page at a scale
#[derive(Debug, Clone)]
pub struct RenderTicket {
    pub page: u32,
    pub scale: f32,
    pub generation: u64,
    token: CancellationToken,
}

impl RenderTicket {
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    Cancelled,
    Stale,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RenderOutcome {
    Published { page: u32, scale: f32, from_cache: bool },
    Discarded { page: u32, reason: DiscardReason },
    Failed { page: u32, error: String },
}

#[derive(Default)]
struct PageSlot {
    state: PageRenderState,
    generation: u64,
}

#[derive(Default)]
struct SchedulerState {
    slots: HashMap<u32, PageSlot>,
    queue: VecDeque<RenderTicket>,
    next_generation: u64,
    stats: SchedulerStats,
}

impl SchedulerState {
    fn is_current(&self, ticket: &RenderTicket) -> bool {
        self.slots.get(&ticket.page).map(|slot| slot.generation) == Some(ticket.generation)
    }

    fn set_state(&mut self, ticket: &RenderTicket, state: PageRenderState) {
        if let Some(slot) = self.slots.get_mut(&ticket.page) {
            if slot.generation == ticket.generation {
                slot.state = state;
            }
        }
    }
}

/// Render scheduler for one document
///
/// # Example
///
/// ```
/// use pdf_signer_engine::{blank_document, decode, PageSize};
/// use pdf_signer_scheduler::{GeometryTracker, LayoutMetrics, RenderScheduler, SchedulerConfig};
/// use std::sync::Arc;
///
/// let bytes = blank_document(&[PageSize::LETTER]).unwrap();
/// let document = decode(&bytes).unwrap();
/// let tracker = Arc::new(GeometryTracker::new(
///     document.page_sizes().unwrap(),
///     LayoutMetrics::default(),
///     1.0,
/// ));
///
/// let scheduler = RenderScheduler::new(document, tracker.clone(), SchedulerConfig::default());
/// scheduler.request_render(1, 1.0).unwrap();
/// scheduler.run_pending();
///
/// assert!(tracker.rect(1).is_some());
/// ```
pub struct RenderScheduler {
    document: LoadedDocument,
    sink: Arc<dyn RenderSink>,
    cache: Option<RenderCache>,
    surfaces: SurfaceLocks,
    cancellation: CancellationRegistry,
    state: Mutex<SchedulerState>,
    config: SchedulerConfig,
}

impl RenderScheduler {
    pub fn new(document: LoadedDocument, sink: Arc<dyn RenderSink>, config: SchedulerConfig) -> Self {
        Self {
            document,
            sink,
            cache: None,
            surfaces: SurfaceLocks::new(),
            cancellation: CancellationRegistry::new(),
            state: Mutex::new(SchedulerState::default()),
            config,
        }
    }

    pub fn with_cache(mut self, cache: RenderCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn document(&self) -> &LoadedDocument {
        &self.document
    }

    pub fn cache(&self) -> Option<&RenderCache> {
        self.cache.as_ref()
    }

    /// Queue a render of `page` at `scale`.
    ///
    /// Cancels the render in flight for the same page and supersedes any
    /// queued one.
    pub fn request_render(&self, page: u32, scale: f32) -> Result<RenderTicket, SchedulerError> {
        let page_count = self.document.page_count();
        if page == 0 || page > page_count {
            return Err(SchedulerError::PageOutOfRange { page, page_count });
        }
        if !scale.is_finite() || scale <= 0.0 {
            return Err(SchedulerError::InvalidScale(scale));
        }

        let token = self.cancellation.register(page);

        let mut state = self.state.lock().unwrap();
        state.next_generation += 1;
        let generation = state.next_generation;

        let slot = state.slots.entry(page).or_default();
        let superseded = slot.state == PageRenderState::Rendering;
        slot.generation = generation;
        slot.state = PageRenderState::Rendering;

        let queued_before = state.queue.len();
        state.queue.retain(|ticket| ticket.page != page);
        let dropped = (queued_before - state.queue.len()) as u64;
        state.stats.cancelled += dropped;

        let ticket = RenderTicket { page, scale, generation, token };
        state.queue.push_back(ticket.clone());
        state.stats.requested += 1;

        if superseded {
            log::debug!("page {page}: render superseded by generation {generation} (scale {scale})");
        } else {
            log::debug!("page {page}: render requested (generation {generation}, scale {scale})");
        }

        Ok(ticket)
    }

    /// Request renders for several pages at the same scale
    pub fn request_pages(&self, pages: &[u32], scale: f32) -> Result<Vec<RenderTicket>, SchedulerError> {
        pages.iter().map(|&page| self.request_render(page, scale)).collect()
    }

    /// Take the next queued ticket, for worker threads
    pub fn next_ticket(&self) -> Option<RenderTicket> {
        self.state.lock().unwrap().queue.pop_front()
    }

    /// Execute every queued ticket on the calling thread
    pub fn run_pending(&self) -> Vec<RenderOutcome> {
        let mut outcomes = Vec::new();
        while let Some(ticket) = self.next_ticket() {
            outcomes.push(self.execute(&ticket));
        }
        outcomes
    }

    /// Render `ticket` and publish the result if it is still current.
    pub fn execute(&self, ticket: &RenderTicket) -> RenderOutcome {
        let outcome = self.execute_inner(ticket);
        self.cancellation.unregister_if_current(ticket.page, &ticket.token);
        outcome
    }

    fn execute_inner(&self, ticket: &RenderTicket) -> RenderOutcome {
        if let Some(outcome) = self.discard_if_superseded(ticket) {
            return outcome;
        }

        let surface = self.surfaces.for_page(ticket.page);
        let _guard = loop {
            if ticket.is_cancelled() {
                return self.discard(ticket);
            }
            match surface.acquire_timeout(self.config.surface_wait) {
                Some(guard) => break guard,
                None => log::trace!("page {}: surface busy, waiting", ticket.page),
            }
        };

        if let Some(outcome) = self.discard_if_superseded(ticket) {
            return outcome;
        }

        if self.config.use_cache {
            if let Some(cache) = &self.cache {
                cache.evict_expired();
                if let Some(cached) = cache.get(ticket.page, ticket.scale) {
                    return self.finish_published(ticket, cached.raster, true);
                }
            }
        }

        let page = match self.document.page(ticket.page) {
            Ok(page) => page,
            Err(error) => return self.finish_failed(ticket, error),
        };

        let token = ticket.token.clone();
        match page.render(ticket.scale, &move || token.is_cancelled()) {
            Ok(raster) => {
                let raster = Arc::new(raster);
                if let Some(cache) = &self.cache {
                    cache.put(ticket.page, ticket.scale, raster.clone());
                }
                self.finish_published(ticket, raster, false)
            }
            Err(PdfEngineError::Aborted) => self.discard(ticket),
            Err(error) => self.finish_failed(ticket, error),
        }
    }

    fn discard_if_superseded(&self, ticket: &RenderTicket) -> Option<RenderOutcome> {
        let current = self.state.lock().unwrap().is_current(ticket);
        (!current || ticket.is_cancelled()).then(|| self.discard(ticket))
    }

    fn discard(&self, ticket: &RenderTicket) -> RenderOutcome {
        let mut state = self.state.lock().unwrap();

        let reason = if state.is_current(ticket) {
            state.set_state(ticket, PageRenderState::Cancelled);
            state.stats.cancelled += 1;
            DiscardReason::Cancelled
        } else {
            state.stats.stale += 1;
            DiscardReason::Stale
        };

        log::debug!(
            "page {}: discarded generation {} ({:?})",
            ticket.page,
            ticket.generation,
            reason
        );
        RenderOutcome::Discarded { page: ticket.page, reason }
    }

    fn finish_published(
        &self,
        ticket: &RenderTicket,
        raster: Arc<RgbaImage>,
        from_cache: bool,
    ) -> RenderOutcome {
        let mut state = self.state.lock().unwrap();
        if !state.is_current(ticket) || ticket.is_cancelled() {
            drop(state);
            return self.discard(ticket);
        }

        // Published under the scheduler lock so no newer request can slip
        // in between the generation check and the publish.
        self.sink.publish(ticket.page, ticket.scale, raster);
        state.set_state(ticket, PageRenderState::Complete);
        state.stats.completed += 1;
        if from_cache {
            state.stats.cache_hits += 1;
        }

        log::debug!(
            "page {}: published generation {} at scale {}{}",
            ticket.page,
            ticket.generation,
            ticket.scale,
            if from_cache { " (cached)" } else { "" }
        );
        RenderOutcome::Published { page: ticket.page, scale: ticket.scale, from_cache }
    }

    fn finish_failed(&self, ticket: &RenderTicket, error: PdfEngineError) -> RenderOutcome {
        let mut state = self.state.lock().unwrap();
        if !state.is_current(ticket) {
            drop(state);
            return self.discard(ticket);
        }

        log::error!("page {}: render failed: {}", ticket.page, error);
        self.sink.record_error(ticket.page, &error);
        state.set_state(ticket, PageRenderState::Errored);
        state.stats.failed += 1;

        RenderOutcome::Failed { page: ticket.page, error: error.to_string() }
    }

    /// Cancel the queued or in-flight render of `page`
    pub fn cancel_page(&self, page: u32) -> bool {
        let token_found = self.cancellation.cancel(page);

        let mut state = self.state.lock().unwrap();
        let queued_before = state.queue.len();
        state.queue.retain(|ticket| ticket.page != page);
        let dropped = queued_before - state.queue.len();
        state.stats.cancelled += dropped as u64;

        if let Some(slot) = state.slots.get_mut(&page) {
            if slot.state == PageRenderState::Rendering && dropped > 0 {
                slot.state = PageRenderState::Cancelled;
            }
        }

        token_found || dropped > 0
    }

    /// Cancel every queued and in-flight render
    pub fn cancel_all(&self) -> usize {
        let tokens = self.cancellation.cancel_all();

        let mut state = self.state.lock().unwrap();
        let dropped: Vec<u32> = state.queue.drain(..).map(|ticket| ticket.page).collect();
        state.stats.cancelled += dropped.len() as u64;
        for page in dropped {
            if let Some(slot) = state.slots.get_mut(&page) {
                if slot.state == PageRenderState::Rendering {
                    slot.state = PageRenderState::Cancelled;
                }
            }
        }

        if tokens > 0 {
            log::debug!("cancelled {tokens} render(s)");
        }
        tokens
    }

    pub fn page_state(&self, page: u32) -> PageRenderState {
        self.state.lock().unwrap().slots.get(&page).map(|slot| slot.state).unwrap_or_default()
    }

    /// Whether any page has a queued or running render
    pub fn is_rendering(&self) -> bool {
        self.state
            .lock()
            .unwrap()
            .slots
            .values()
            .any(|slot| slot.state == PageRenderState::Rendering)
    }

    pub fn pending(&self) -> usize {
        self.state.lock().unwrap().queue.len()
    }

    pub fn stats(&self) -> SchedulerStats {
        self.state.lock().unwrap().stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pdf_signer_cache::RenderCacheConfig;
    use pdf_signer_engine::{PageSize, PdfBackend, RenderRequest};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::thread;
    use std::time::Instant;

    /// Sink that records what was published, in order
    #[derive(Default)]
    struct RecordingSink {
        published: Mutex<Vec<(u32, f32, u32)>>,
        errors: Mutex<Vec<(u32, String)>>,
    }

    impl RenderSink for RecordingSink {
        fn publish(&self, page: u32, scale: f32, raster: Arc<RgbaImage>) {
            self.published.lock().unwrap().push((page, scale, raster.width()));
        }

        fn record_error(&self, page: u32, error: &PdfEngineError) {
            self.errors.lock().unwrap().push((page, error.to_string()));
        }
    }

    /// Backend whose renders can be held open and can fail on demand
    struct ScriptedBackend {
        pages: u32,
        failing_page: Option<u32>,
        renders: AtomicUsize,
        gate: Mutex<Option<mpsc::Receiver<()>>>,
        started: Mutex<Option<mpsc::Sender<()>>>,
    }

    impl ScriptedBackend {
        fn new(pages: u32) -> Self {
            Self {
                pages,
                failing_page: None,
                renders: AtomicUsize::new(0),
                gate: Mutex::new(None),
                started: Mutex::new(None),
            }
        }
    }

    impl PdfBackend for ScriptedBackend {
        fn page_count(&self) -> u32 {
            self.pages
        }

        fn page_size(&self, _page_index: u32) -> Result<PageSize, PdfEngineError> {
            Ok(PageSize::new(100.0, 100.0))
        }

        fn render_page(
            &self,
            request: RenderRequest,
            should_abort: &dyn Fn() -> bool,
        ) -> Result<RgbaImage, PdfEngineError> {
            self.renders.fetch_add(1, Ordering::SeqCst);

            if let Some(started) = self.started.lock().unwrap().take() {
                let _ = started.send(());
                if let Some(gate) = self.gate.lock().unwrap().take() {
                    let _ = gate.recv();
                }
            }

            if Some(request.page_index + 1) == self.failing_page {
                return Err(PdfEngineError::Backend("corrupt page".to_string()));
            }
            if should_abort() {
                return Err(PdfEngineError::Aborted);
            }

            let size = (100.0 * request.scale).round() as u32;
            Ok(RgbaImage::new(size, size))
        }
    }

    fn scheduler_with(backend: ScriptedBackend) -> (Arc<RenderScheduler>, Arc<RecordingSink>) {
        let document = LoadedDocument::from_backend(Arc::new(backend));
        let sink = Arc::new(RecordingSink::default());
        let scheduler = RenderScheduler::new(document, sink.clone(), SchedulerConfig::default());
        (Arc::new(scheduler), sink)
    }

    #[test]
    fn test_request_and_run() {
        let (scheduler, sink) = scheduler_with(ScriptedBackend::new(2));

        scheduler.request_render(1, 1.0).unwrap();
        assert_eq!(scheduler.page_state(1), PageRenderState::Rendering);
        assert!(scheduler.is_rendering());

        let outcomes = scheduler.run_pending();

        assert_eq!(
            outcomes,
            vec![RenderOutcome::Published { page: 1, scale: 1.0, from_cache: false }]
        );
        assert_eq!(scheduler.page_state(1), PageRenderState::Complete);
        assert!(!scheduler.is_rendering());
        assert_eq!(sink.published.lock().unwrap().as_slice(), &[(1, 1.0, 100)]);
    }

    #[test]
    fn test_rejects_out_of_range_page_and_bad_scale() {
        let (scheduler, _) = scheduler_with(ScriptedBackend::new(2));

        assert!(matches!(
            scheduler.request_render(0, 1.0),
            Err(SchedulerError::PageOutOfRange { page: 0, page_count: 2 })
        ));
        assert!(matches!(
            scheduler.request_render(3, 1.0),
            Err(SchedulerError::PageOutOfRange { page: 3, .. })
        ));
        assert!(matches!(scheduler.request_render(1, 0.0), Err(SchedulerError::InvalidScale(_))));
        assert_eq!(scheduler.stats().requested, 0);
    }

    #[test]
    fn test_rapid_requests_leave_only_final_scale() {
        let (scheduler, sink) = scheduler_with(ScriptedBackend::new(1));

        let first = scheduler.request_render(1, 1.0).unwrap();
        let second = scheduler.request_render(1, 2.0).unwrap();

        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
        assert_eq!(scheduler.pending(), 1);

        // The superseded ticket is stale even if a worker already took it
        assert_eq!(
            scheduler.execute(&first),
            RenderOutcome::Discarded { page: 1, reason: DiscardReason::Stale }
        );
        scheduler.run_pending();

        assert_eq!(sink.published.lock().unwrap().as_slice(), &[(1, 2.0, 200)]);
        assert_eq!(scheduler.page_state(1), PageRenderState::Complete);
    }

    #[test]
    fn test_in_flight_render_is_cancelled_by_newer_request() {
        let (started_tx, started_rx) = mpsc::channel();
        let (gate_tx, gate_rx) = mpsc::channel();
        let backend = ScriptedBackend::new(1);
        *backend.started.lock().unwrap() = Some(started_tx);
        *backend.gate.lock().unwrap() = Some(gate_rx);
        let (scheduler, sink) = scheduler_with(backend);

        let first = scheduler.request_render(1, 1.0).unwrap();
        let ticket = scheduler.next_ticket().unwrap();
        assert_eq!(ticket.generation, first.generation);

        let worker = {
            let scheduler = scheduler.clone();
            thread::spawn(move || scheduler.execute(&ticket))
        };
        started_rx.recv().unwrap();

        scheduler.request_render(1, 1.5).unwrap();
        let waiter = {
            let scheduler = scheduler.clone();
            thread::spawn(move || scheduler.run_pending())
        };

        // Let the new request spin on the busy surface for a while
        thread::sleep(Duration::from_millis(120));
        gate_tx.send(()).unwrap();

        let first_outcome = worker.join().unwrap();
        let second_outcomes = waiter.join().unwrap();

        assert!(matches!(first_outcome, RenderOutcome::Discarded { page: 1, .. }));
        assert_eq!(
            second_outcomes,
            vec![RenderOutcome::Published { page: 1, scale: 1.5, from_cache: false }]
        );
        assert_eq!(sink.published.lock().unwrap().as_slice(), &[(1, 1.5, 150)]);
    }

    #[test]
    fn test_render_error_is_page_scoped() {
        let mut backend = ScriptedBackend::new(2);
        backend.failing_page = Some(1);
        let (scheduler, sink) = scheduler_with(backend);

        scheduler.request_pages(&[1, 2], 1.0).unwrap();
        let outcomes = scheduler.run_pending();

        assert!(matches!(outcomes[0], RenderOutcome::Failed { page: 1, .. }));
        assert!(matches!(outcomes[1], RenderOutcome::Published { page: 2, .. }));
        assert_eq!(scheduler.page_state(1), PageRenderState::Errored);
        assert_eq!(scheduler.page_state(2), PageRenderState::Complete);
        assert_eq!(sink.errors.lock().unwrap().len(), 1);
        assert_eq!(scheduler.stats().failed, 1);

        // Errored is a resting state
        scheduler.request_render(1, 1.0).unwrap();
        assert_eq!(scheduler.page_state(1), PageRenderState::Rendering);
    }

    #[test]
    fn test_cancel_page_drops_queued_ticket() {
        let (scheduler, sink) = scheduler_with(ScriptedBackend::new(2));

        let ticket = scheduler.request_render(1, 1.0).unwrap();
        scheduler.request_render(2, 1.0).unwrap();

        assert!(scheduler.cancel_page(1));
        assert!(ticket.is_cancelled());
        assert_eq!(scheduler.page_state(1), PageRenderState::Cancelled);

        scheduler.run_pending();
        assert_eq!(sink.published.lock().unwrap().as_slice(), &[(2, 1.0, 100)]);
    }

    #[test]
    fn test_cancel_all_for_scale_change() {
        let (scheduler, sink) = scheduler_with(ScriptedBackend::new(3));

        let tickets = scheduler.request_pages(&[1, 2, 3], 1.0).unwrap();
        assert_eq!(scheduler.cancel_all(), 3);

        assert!(tickets.iter().all(RenderTicket::is_cancelled));
        assert_eq!(scheduler.pending(), 0);
        assert!(!scheduler.is_rendering());
        assert!(scheduler.run_pending().is_empty());
        assert!(sink.published.lock().unwrap().is_empty());
        assert_eq!(scheduler.stats().cancelled, 3);
    }

    #[test]
    fn test_cancelled_ticket_does_not_publish() {
        let (scheduler, sink) = scheduler_with(ScriptedBackend::new(1));

        let ticket = scheduler.request_render(1, 1.0).unwrap();
        let taken = scheduler.next_ticket().unwrap();
        ticket.token().cancel();

        assert_eq!(
            scheduler.execute(&taken),
            RenderOutcome::Discarded { page: 1, reason: DiscardReason::Cancelled }
        );
        assert_eq!(scheduler.page_state(1), PageRenderState::Cancelled);
        assert!(sink.published.lock().unwrap().is_empty());
    }

    #[test]
    fn test_cache_hit_skips_render() {
        let backend = Arc::new(ScriptedBackend::new(1));
        let document = LoadedDocument::from_backend(backend.clone());
        let sink = Arc::new(RecordingSink::default());
        let scheduler = RenderScheduler::new(document, sink.clone(), SchedulerConfig::default())
            .with_cache(RenderCache::new(RenderCacheConfig::default()));

        scheduler.request_render(1, 1.0).unwrap();
        scheduler.run_pending();
        scheduler.request_render(1, 1.0).unwrap();
        let outcomes = scheduler.run_pending();

        assert_eq!(
            outcomes,
            vec![RenderOutcome::Published { page: 1, scale: 1.0, from_cache: true }]
        );
        assert_eq!(backend.renders.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.stats().cache_hits, 1);
        assert_eq!(sink.published.lock().unwrap().len(), 2);

        // A different scale never reuses the cached raster
        scheduler.request_render(1, 2.0).unwrap();
        scheduler.run_pending();
        assert_eq!(backend.renders.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_expired_cache_entries_are_swept_on_execute() {
        let backend = Arc::new(ScriptedBackend::new(2));
        let document = LoadedDocument::from_backend(backend.clone());
        let cache = RenderCache::new(RenderCacheConfig::default().with_ttl(Duration::from_secs(60)));
        let scheduler = RenderScheduler::new(
            document,
            Arc::new(RecordingSink::default()),
            SchedulerConfig::default(),
        )
        .with_cache(cache.clone());

        let long_ago = Instant::now().checked_sub(Duration::from_secs(120)).unwrap();
        cache.put_at(2, 1.0, Arc::new(RgbaImage::new(10, 10)), long_ago);
        assert_eq!(cache.len(), 1);

        scheduler.request_render(1, 1.0).unwrap();
        scheduler.run_pending();

        // Page 2 was never requested, yet its stale raster is gone
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().expirations, 1);
        assert!(cache.get(1, 1.0).is_some());
    }
}
