//! Chunked, bounded-concurrency dispatch over a lazy input sequence.
//!
//! `Dispatch` pulls at most `chunk_size` items from its input, runs them on a
//! pool of `max_workers` threads, and yields `(item, result)` pairs in
//! completion order. The next chunk is pulled only after every result of the
//! current chunk has been handed to the caller, so peak in-flight work is
//! bounded by `chunk_size` and peak parallelism by `max_workers`.
//!
//! Dropping a `Dispatch` mid-chunk does not cancel submitted work: those tasks
//! run to completion on the pool and their results are discarded.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, mpsc};

use tracing::debug;

use crate::constants::dispatch::{UNKNOWN_PANIC_REASON, WORKER_THREAD_PREFIX};
use crate::errors::SamplerError;

type Worker<T, R> = Arc<dyn Fn(&T) -> R + Send + Sync>;
type Completion<T, R> = (T, Result<R, SamplerError>);

/// Lifecycle of a dispatch run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchState {
    /// Nothing submitted yet.
    Idle,
    /// A chunk is submitted and its results are being yielded.
    Draining,
    /// Every result of the last chunk was yielded.
    ChunkComplete,
    /// Input exhausted and all results yielded.
    Done,
}

/// Point-in-time dispatcher counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchCounters {
    /// Items handed to the pool.
    pub submitted: usize,
    /// Items whose worker returned or panicked.
    pub completed: usize,
    /// Items whose worker panicked.
    pub panicked: usize,
    /// Workers executing right now.
    pub active: usize,
    /// Highest number of simultaneously executing workers observed.
    pub peak_active: usize,
    /// Largest chunk submitted.
    pub peak_in_flight: usize,
    /// Chunks submitted.
    pub chunks: usize,
}

#[derive(Default)]
struct DispatchStats {
    submitted: AtomicUsize,
    completed: AtomicUsize,
    panicked: AtomicUsize,
    active: AtomicUsize,
    peak_active: AtomicUsize,
    peak_in_flight: AtomicUsize,
    chunks: AtomicUsize,
}

impl DispatchStats {
    fn snapshot(&self) -> DispatchCounters {
        DispatchCounters {
            submitted: self.submitted.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            panicked: self.panicked.load(Ordering::Relaxed),
            active: self.active.load(Ordering::Relaxed),
            peak_active: self.peak_active.load(Ordering::Relaxed),
            peak_in_flight: self.peak_in_flight.load(Ordering::Relaxed),
            chunks: self.chunks.load(Ordering::Relaxed),
        }
    }
}

/// Lazy iterator of `(item, result)` pairs produced by a bounded worker pool.
///
/// A worker panic is caught and yielded as `Err(SamplerError::WorkerPanicked)`
/// for that item only; sibling items are unaffected.
pub struct Dispatch<I: Iterator, R> {
    items: std::iter::Fuse<I>,
    chunk_size: Option<usize>,
    pool: rayon::ThreadPool,
    worker: Worker<I::Item, R>,
    sender: mpsc::Sender<Completion<I::Item, R>>,
    receiver: mpsc::Receiver<Completion<I::Item, R>>,
    pending: usize,
    state: DispatchState,
    stats: Arc<DispatchStats>,
}

/// Run `worker` over `items` with at most `max_workers` concurrent executions
/// and at most `chunk_size` submitted-but-unyielded items.
///
/// `chunk_size: None` submits the whole input as one chunk.
pub fn dispatch<I, F, R>(
    items: I,
    worker: F,
    max_workers: usize,
    chunk_size: Option<usize>,
) -> Result<Dispatch<I::IntoIter, R>, SamplerError>
where
    I: IntoIterator,
    I::Item: Send + 'static,
    F: Fn(&I::Item) -> R + Send + Sync + 'static,
    R: Send + 'static,
{
    if max_workers == 0 {
        return Err(SamplerError::Configuration(
            "max_workers must be at least 1".into(),
        ));
    }
    if chunk_size == Some(0) {
        return Err(SamplerError::Configuration(
            "chunk_size must be at least 1 when set".into(),
        ));
    }
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(max_workers)
        .thread_name(|idx| format!("{WORKER_THREAD_PREFIX}-{idx}"))
        .build()
        .map_err(|err| SamplerError::Configuration(format!("failed to build worker pool: {err}")))?;
    let (sender, receiver) = mpsc::channel();
    Ok(Dispatch {
        items: items.into_iter().fuse(),
        chunk_size,
        pool,
        worker: Arc::new(worker),
        sender,
        receiver,
        pending: 0,
        state: DispatchState::Idle,
        stats: Arc::new(DispatchStats::default()),
    })
}

impl<I, R> Dispatch<I, R>
where
    I: Iterator,
    I::Item: Send + 'static,
    R: Send + 'static,
{
    /// Current lifecycle state.
    pub fn state(&self) -> DispatchState {
        self.state
    }

    /// Snapshot of runtime counters.
    pub fn counters(&self) -> DispatchCounters {
        self.stats.snapshot()
    }

    /// Items submitted from the current chunk whose results were not yet yielded.
    pub fn pending(&self) -> usize {
        self.pending
    }

    fn submit_next_chunk(&mut self) -> usize {
        let limit = self.chunk_size.unwrap_or(usize::MAX);
        let mut submitted = 0usize;
        while submitted < limit {
            let Some(item) = self.items.next() else {
                break;
            };
            let worker = Arc::clone(&self.worker);
            let sender = self.sender.clone();
            let stats = Arc::clone(&self.stats);
            self.pool.spawn(move || {
                let active = stats.active.fetch_add(1, Ordering::SeqCst) + 1;
                stats.peak_active.fetch_max(active, Ordering::SeqCst);
                let result = panic::catch_unwind(AssertUnwindSafe(|| worker(&item)))
                    .map_err(|payload| SamplerError::WorkerPanicked(panic_reason(payload)));
                stats.active.fetch_sub(1, Ordering::SeqCst);
                if result.is_err() {
                    stats.panicked.fetch_add(1, Ordering::Relaxed);
                }
                stats.completed.fetch_add(1, Ordering::Relaxed);
                // Receiver is gone when the caller stopped consuming.
                let _ = sender.send((item, result));
            });
            submitted += 1;
        }
        if submitted > 0 {
            self.stats.submitted.fetch_add(submitted, Ordering::Relaxed);
            let chunk = self.stats.chunks.fetch_add(1, Ordering::Relaxed) + 1;
            self.stats
                .peak_in_flight
                .fetch_max(submitted, Ordering::Relaxed);
            debug!(chunk, submitted, "[panning:dispatch] chunk submitted");
        }
        submitted
    }
}

impl<I, R> Iterator for Dispatch<I, R>
where
    I: Iterator,
    I::Item: Send + 'static,
    R: Send + 'static,
{
    type Item = (I::Item, Result<R, SamplerError>);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.pending > 0 {
                let Ok(completion) = self.receiver.recv() else {
                    self.state = DispatchState::Done;
                    return None;
                };
                self.pending -= 1;
                self.state = if self.pending == 0 {
                    DispatchState::ChunkComplete
                } else {
                    DispatchState::Draining
                };
                return Some(completion);
            }
            if self.state == DispatchState::Done {
                return None;
            }
            let submitted = self.submit_next_chunk();
            if submitted == 0 {
                self.state = DispatchState::Done;
                debug!(
                    chunks = self.stats.chunks.load(Ordering::Relaxed),
                    "[panning:dispatch] input exhausted"
                );
                return None;
            }
            self.pending = submitted;
            self.state = DispatchState::Draining;
        }
    }
}

fn panic_reason(payload: Box<dyn Any + Send>) -> String {
    if let Some(reason) = payload.downcast_ref::<&str>() {
        return (*reason).to_string();
    }
    if let Some(reason) = payload.downcast_ref::<String>() {
        return reason.clone();
    }
    UNKNOWN_PANIC_REASON.to_string()
}
