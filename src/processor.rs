//! Fused metrics/trace walk and bounded event channels
//!
//! A finished tree is walked once. The walk yields one [`AggregatedMetrics`]
//! value and one [`TraceRecord`] per node (root excluded). Consumers receive
//! them on two bounded channels: `metrics` (one event per tree) and `traces`
//! (one event per node).
//!
//! # Backpressure
//!
//! The default [`EmitMode::Blocking`] waits for channel space, so every
//! event reaches a live subscriber and a slow consumer slows the producer.
//! [`EmitMode::Lossy`] never blocks: a full channel drops the event and
//! counts it. In both modes events sent after the subscriber is gone are
//! dropped and counted.

use crate::error::Result;
use crate::graph::ExecutionTree;
use crate::metrics::AggregatedMetrics;
use crate::trace::{build_trace, TraceRecord};
use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// Output of one full tree walk
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TreeReport {
    pub metrics: AggregatedMetrics,
    pub traces: Vec<TraceRecord>,
}

/// Aggregate metrics and build traces in a single depth-first walk
pub fn aggregate_and_trace(tree: &ExecutionTree) -> Result<TreeReport> {
    let root = tree.root();
    let mut report = TreeReport::default();
    let mut visited = Vec::with_capacity(tree.node_count());

    tree.walk(root, |node| {
        if node.id() == root {
            return;
        }
        if node.meta().is_some() {
            report.metrics.record(&node.identity(), node.metrics());
        }
        visited.push(node.id());
    })?;

    report.traces = visited
        .into_iter()
        .map(|id| build_trace(tree, id))
        .collect::<Result<_>>()?;

    debug!(
        nodes = report.traces.len(),
        identities = report.metrics.len(),
        "processed execution tree"
    );
    Ok(report)
}

/// What the emitter does when a channel is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmitMode {
    /// Wait for space; no event is lost while a subscriber is alive
    #[default]
    Blocking,
    /// Drop the event and count it
    Lossy,
}

/// Counters for one [`Emitter::emit`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EmitStats {
    pub sent: u64,
    pub dropped: u64,
}

/// Sending half of the `metrics` and `traces` channels
#[derive(Debug)]
pub struct Emitter {
    mode: EmitMode,
    metrics_tx: Sender<AggregatedMetrics>,
    traces_tx: Sender<TraceRecord>,
    total_sent: AtomicU64,
    total_dropped: AtomicU64,
}

/// Receiving half handed to consumers
#[derive(Debug, Clone)]
pub struct Subscription {
    pub metrics: Receiver<AggregatedMetrics>,
    pub traces: Receiver<TraceRecord>,
}

impl Emitter {
    /// Blocking emitter whose channels each hold up to `capacity` events
    ///
    /// # Panics
    ///
    /// Panics if capacity is 0.
    pub fn bounded(capacity: usize) -> (Self, Subscription) {
        Self::with_mode(capacity, EmitMode::Blocking)
    }

    /// Emitter that drops events instead of waiting on a full channel
    ///
    /// # Panics
    ///
    /// Panics if capacity is 0.
    pub fn lossy(capacity: usize) -> (Self, Subscription) {
        Self::with_mode(capacity, EmitMode::Lossy)
    }

    /// # Panics
    ///
    /// Panics if capacity is 0.
    pub fn with_mode(capacity: usize, mode: EmitMode) -> (Self, Subscription) {
        assert!(capacity > 0, "Channel capacity must be > 0");

        let (metrics_tx, metrics_rx) = channel::bounded(capacity);
        let (traces_tx, traces_rx) = channel::bounded(capacity);
        let emitter = Self {
            mode,
            metrics_tx,
            traces_tx,
            total_sent: AtomicU64::new(0),
            total_dropped: AtomicU64::new(0),
        };
        let subscription = Subscription {
            metrics: metrics_rx,
            traces: traces_rx,
        };
        (emitter, subscription)
    }

    pub fn mode(&self) -> EmitMode {
        self.mode
    }

    /// Send the metrics event first, then every trace in walk order
    pub fn emit(&self, report: TreeReport) -> EmitStats {
        let mut stats = EmitStats::default();
        self.offer(&self.metrics_tx, report.metrics, "metrics", &mut stats);
        for trace in report.traces {
            self.offer(&self.traces_tx, trace, "trace", &mut stats);
        }

        self.total_sent.fetch_add(stats.sent, Ordering::Relaxed);
        self.total_dropped
            .fetch_add(stats.dropped, Ordering::Relaxed);
        stats
    }

    /// Total events delivered since creation
    pub fn total_sent(&self) -> u64 {
        self.total_sent.load(Ordering::Relaxed)
    }

    /// Total events dropped since creation
    pub fn total_dropped(&self) -> u64 {
        self.total_dropped.load(Ordering::Relaxed)
    }

    fn offer<T>(&self, tx: &Sender<T>, event: T, channel: &'static str, stats: &mut EmitStats) {
        let result = match self.mode {
            EmitMode::Blocking => tx.send(event).map_err(|_| TrySendError::Disconnected(())),
            EmitMode::Lossy => tx.try_send(event).map_err(|err| match err {
                TrySendError::Full(_) => TrySendError::Full(()),
                TrySendError::Disconnected(_) => TrySendError::Disconnected(()),
            }),
        };

        match result {
            Ok(()) => stats.sent += 1,
            Err(TrySendError::Full(())) => {
                stats.dropped += 1;
                warn!(channel, "channel full - event dropped (backpressure)");
            }
            Err(TrySendError::Disconnected(())) => {
                stats.dropped += 1;
                debug!(channel, "no subscriber - event dropped");
            }
        }
    }
}
