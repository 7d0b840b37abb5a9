//! Background render workers.
//!
//! Workers pull tickets from a [`RenderScheduler`] and execute them on their
//! own threads. Cancellation stays cooperative: a worker never abandons a
//! ticket, the scheduler discards superseded results.

use crate::scheduler::{RenderOutcome, RenderScheduler, SchedulerError};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Called on the worker thread after every executed ticket.
pub type OutcomeObserver = Arc<dyn Fn(&RenderOutcome) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Render threads, one per logical core unless set
    pub num_workers: usize,
    /// Sleep between queue polls while idle
    pub poll_interval: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self { num_workers: num_cpus(), poll_interval: Duration::from_millis(10) }
    }
}

impl WorkerPoolConfig {
    pub fn new(num_workers: usize) -> Self {
        Self { num_workers, ..Self::default() }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Render worker pool
///
/// # Example
///
/// ```
/// use pdf_signer_engine::{blank_document, decode, PageSize};
/// use pdf_signer_scheduler::{
///     GeometryTracker, LayoutMetrics, RenderScheduler, SchedulerConfig, WorkerPool,
///     WorkerPoolConfig,
/// };
/// use std::sync::Arc;
///
/// let document = decode(&blank_document(&[PageSize::LETTER]).unwrap()).unwrap();
/// let tracker = Arc::new(GeometryTracker::new(
///     document.page_sizes().unwrap(),
///     LayoutMetrics::default(),
///     1.0,
/// ));
/// let scheduler = Arc::new(RenderScheduler::new(document, tracker, SchedulerConfig::default()));
///
/// let pool = WorkerPool::new(scheduler.clone(), WorkerPoolConfig::new(2), None).unwrap();
/// scheduler.request_render(1, 1.0).unwrap();
///
/// pool.shutdown();
/// ```
pub struct WorkerPool {
    workers: Vec<Worker>,
    shutdown: Arc<AtomicBool>,
}

impl WorkerPool {
    pub fn new(
        scheduler: Arc<RenderScheduler>,
        config: WorkerPoolConfig,
        observer: Option<OutcomeObserver>,
    ) -> Result<Self, SchedulerError> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let mut workers = Vec::with_capacity(config.num_workers);

        for id in 0..config.num_workers {
            let spawned = Worker::spawn(
                id,
                scheduler.clone(),
                observer.clone(),
                shutdown.clone(),
                config.poll_interval,
            );
            match spawned {
                Ok(worker) => workers.push(worker),
                Err(error) => {
                    shutdown.store(true, Ordering::Release);
                    for worker in workers {
                        worker.join();
                    }
                    return Err(error.into());
                }
            }
        }

        log::debug!("started {} render worker(s)", workers.len());
        Ok(Self { workers, shutdown })
    }

    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Stop all workers and wait for them to exit.
    ///
    /// Tickets still queued stay in the scheduler.
    pub fn shutdown(self) {
        self.shutdown.store(true, Ordering::Release);
        for worker in self.workers {
            worker.join();
        }
    }
}

struct Worker {
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    fn spawn(
        id: usize,
        scheduler: Arc<RenderScheduler>,
        observer: Option<OutcomeObserver>,
        shutdown: Arc<AtomicBool>,
        poll_interval: Duration,
    ) -> std::io::Result<Self> {
        let thread = thread::Builder::new()
            .name(format!("page-render-{id}"))
            .spawn(move || Self::run(scheduler, observer, shutdown, poll_interval))?;

        Ok(Self { thread: Some(thread) })
    }

    fn run(
        scheduler: Arc<RenderScheduler>,
        observer: Option<OutcomeObserver>,
        shutdown: Arc<AtomicBool>,
        poll_interval: Duration,
    ) {
        while !shutdown.load(Ordering::Acquire) {
            match scheduler.next_ticket() {
                Some(ticket) => {
                    let outcome = scheduler.execute(&ticket);
                    if let Some(observer) = &observer {
                        observer(&outcome);
                    }
                }
                None => thread::sleep(poll_interval),
            }
        }
    }

    fn join(mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("render worker panicked");
            }
        }
    }
}

fn num_cpus() -> usize {
    thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}
