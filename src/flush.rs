//! Periodic outlier flushing on a background thread
//!
//! The transport layer polls outliers on a fixed timer. [`FlushWorker`] is
//! that timer: every interval it closes the current window on the shared
//! [`TraceStore`] and delivers the kept traces, if any, as one batch.
//!
//! ```text
//! request threads                      flush thread
//!   process_tree() ──add_trace──▶ TraceStore ◀──get_outliers── every interval
//!                                                   │
//!                                                   ▼
//!                                           Sender<Vec<TraceRecord>>
//! ```
//!
//! Shutdown performs one last flush so traces of the open window are not lost.

use crate::trace::TraceRecord;
use crate::trace_store::TraceStore;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// Flush statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlushStats {
    /// Windows closed
    pub flushes: u64,
    /// Traces delivered
    pub delivered: u64,
    /// Batches dropped because the consumer fell behind or went away
    pub dropped_batches: u64,
}

#[derive(Debug, Default)]
struct Counters {
    flushes: AtomicU64,
    delivered: AtomicU64,
    dropped_batches: AtomicU64,
}

/// Background thread flushing a shared [`TraceStore`]
#[derive(Debug)]
pub struct FlushWorker {
    handle: Option<JoinHandle<()>>,
    shutdown_tx: Option<Sender<()>>,
    counters: Arc<Counters>,
}

impl FlushWorker {
    /// Spawn the flush thread
    pub fn spawn(
        store: Arc<Mutex<TraceStore>>,
        interval: Duration,
        outliers_tx: Sender<Vec<TraceRecord>>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = channel::bounded(1);
        let counters = Arc::new(Counters::default());
        let worker_counters = Arc::clone(&counters);

        let handle = thread::spawn(move || {
            Self::run(store, interval, outliers_tx, shutdown_rx, worker_counters);
        });

        Self {
            handle: Some(handle),
            shutdown_tx: Some(shutdown_tx),
            counters,
        }
    }

    /// Stop the thread after a final flush
    pub fn shutdown(mut self) -> FlushStats {
        self.stop();
        self.stats()
    }

    pub fn stats(&self) -> FlushStats {
        FlushStats {
            flushes: self.counters.flushes.load(Ordering::Relaxed),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            dropped_batches: self.counters.dropped_batches.load(Ordering::Relaxed),
        }
    }

    fn stop(&mut self) {
        // Dropping the sender wakes the worker with `Disconnected`.
        self.shutdown_tx.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("flush thread panicked");
            }
        }
    }

    fn run(
        store: Arc<Mutex<TraceStore>>,
        interval: Duration,
        outliers_tx: Sender<Vec<TraceRecord>>,
        shutdown_rx: Receiver<()>,
        counters: Arc<Counters>,
    ) {
        loop {
            match shutdown_rx.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => {
                    Self::flush_once(&store, &outliers_tx, &counters);
                }
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    Self::flush_once(&store, &outliers_tx, &counters);
                    debug!("flush thread stopped");
                    break;
                }
            }
        }
    }

    fn flush_once(
        store: &Mutex<TraceStore>,
        outliers_tx: &Sender<Vec<TraceRecord>>,
        counters: &Counters,
    ) {
        let outliers = store
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_outliers();
        counters.flushes.fetch_add(1, Ordering::Relaxed);

        if outliers.is_empty() {
            return;
        }

        let count = outliers.len() as u64;
        match outliers_tx.try_send(outliers) {
            Ok(()) => {
                counters.delivered.fetch_add(count, Ordering::Relaxed);
            }
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                counters.dropped_batches.fetch_add(1, Ordering::Relaxed);
                warn!(traces = count, "outlier batch dropped");
            }
        }
    }
}

impl Drop for FlushWorker {
    fn drop(&mut self) {
        self.stop();
    }
}
