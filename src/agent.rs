//! Aggregation agent: the consumer-facing entry point
//!
//! [`Agent`] owns the shared [`TraceStore`] and, optionally, an [`Emitter`].
//! Each finished tree is walked once; its metrics and traces are emitted and
//! every trace is offered to the outlier sampler.
//!
//! # Example
//!
//! ```
//! use graphtrace::agent::Agent;
//! use graphtrace::config::AgentConfig;
//! use graphtrace::graph::{ExecutionTree, NodeMeta};
//! use graphtrace::metrics::MetricMap;
//! use serde_json::Value;
//!
//! let agent = Agent::new(AgentConfig::default())?;
//! let mut tree = ExecutionTree::new(Value::Null);
//! let root = tree.root();
//! let meta = NodeMeta::new("s", "Query", "user");
//! tree.add_child(root, Some(meta), MetricMap::resolution(4.0))?;
//!
//! let metrics = agent.process_tree(&tree)?;
//! assert_eq!(metrics.len(), 1);
//! assert_eq!(agent.flush().len(), 1);
//! # Ok::<(), graphtrace::error::GraphError>(())
//! ```

use crate::config::AgentConfig;
use crate::error::{GraphError, Result};
use crate::flush::FlushWorker;
use crate::graph::ExecutionTree;
use crate::metrics::AggregatedMetrics;
use crate::processor::{aggregate_and_trace, Emitter, Subscription};
use crate::trace::TraceRecord;
use crate::trace_store::TraceStore;
use crossbeam::channel::{self, Receiver};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Aggregates finished trees and samples outlier traces
#[derive(Debug)]
pub struct Agent {
    config: AgentConfig,
    store: Arc<Mutex<TraceStore>>,
    emitter: Option<Emitter>,
    trees_processed: AtomicU64,
}

impl Agent {
    /// Agent without event channels
    ///
    /// # Errors
    /// Returns [`GraphError::InvalidConfig`] if `config` fails validation.
    pub fn new(config: AgentConfig) -> Result<Self> {
        config.validate().map_err(GraphError::InvalidConfig)?;

        let store = TraceStore::with_options(config.outliers.clone());
        Ok(Self {
            config,
            store: Arc::new(Mutex::new(store)),
            emitter: None,
            trees_processed: AtomicU64::new(0),
        })
    }

    /// Agent emitting on bounded `metrics`/`traces` channels
    ///
    /// With the default [`EmitMode::Blocking`](crate::processor::EmitMode),
    /// `process_tree` waits while a channel is full, so the subscription
    /// must be drained (or dropped) concurrently.
    pub fn with_channels(config: AgentConfig) -> Result<(Self, Subscription)> {
        let mut agent = Self::new(config)?;
        let (emitter, subscription) =
            Emitter::with_mode(agent.config.channel_capacity, agent.config.emit_mode);
        agent.emitter = Some(emitter);
        Ok((agent, subscription))
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Walk a finished tree, emit its events and feed its traces to sampling
    ///
    /// Returns the tree's aggregated metrics.
    pub fn process_tree(&self, tree: &ExecutionTree) -> Result<AggregatedMetrics> {
        let report = aggregate_and_trace(tree)?;
        let metrics = report.metrics.clone();

        {
            let mut store = self.lock_store();
            for trace in &report.traces {
                store.add_trace(trace.clone());
            }
        }

        if let Some(emitter) = &self.emitter {
            emitter.emit(report);
        }

        self.trees_processed.fetch_add(1, Ordering::Relaxed);
        Ok(metrics)
    }

    /// Close the current flush window and return the kept traces
    pub fn flush(&self) -> Vec<TraceRecord> {
        self.lock_store().get_outliers()
    }

    /// Start a background flush on the configured interval
    pub fn spawn_flusher(&self) -> (FlushWorker, Receiver<Vec<TraceRecord>>) {
        let (tx, rx) = channel::bounded(self.config.channel_capacity);
        let store = Arc::clone(&self.store);
        let worker = FlushWorker::spawn(store, self.config.flush_interval(), tx);
        (worker, rx)
    }

    pub fn trees_processed(&self) -> u64 {
        self.trees_processed.load(Ordering::Relaxed)
    }

    /// Events dropped by the emitter so far
    pub fn dropped_events(&self) -> u64 {
        self.emitter.as_ref().map_or(0, Emitter::total_dropped)
    }

    /// Distinct identities seen by the sampler
    pub fn identities(&self) -> Vec<String> {
        self.lock_store().identities().map(str::to_string).collect()
    }

    fn lock_store(&self) -> MutexGuard<'_, TraceStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
