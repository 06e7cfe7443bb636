//! Metric accumulators and per-identity aggregation
//!
//! Each resolved operation carries a small [`MetricMap`] of `{total, count}`
//! accumulators. Walking a finished [`ExecutionTree`] merges those maps by
//! operation identity into an [`AggregatedMetrics`] value.
//!
//! The metric set is closed: [`MetricKind::Time`] (reported as a mean) and
//! [`MetricKind::Count`] (reported as a sum). Merging is component-wise
//! addition, so the result does not depend on visit order.

use crate::error::Result;
use crate::graph::ExecutionTree;
use crate::node_id::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::btree_map::{self, BTreeMap};

/// How an accumulator is turned into a reported value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reducer {
    /// `total / count`
    Mean,
    /// `total`
    Sum,
}

/// Closed set of metrics recorded per resolved operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Resolve time in milliseconds
    Time,
    /// Number of resolutions
    Count,
}

impl MetricKind {
    pub const ALL: [MetricKind; 2] = [MetricKind::Time, MetricKind::Count];

    pub fn reducer(self) -> Reducer {
        match self {
            MetricKind::Time => Reducer::Mean,
            MetricKind::Count => Reducer::Sum,
        }
    }

    /// Name used when reporting to a collector
    pub fn wire_name(self) -> &'static str {
        match self {
            MetricKind::Time => "graphql-node-resolve-time",
            MetricKind::Count => "graphql-node-resolve-count",
        }
    }
}

/// Running sum and sample count for one metric
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Accumulator {
    pub total: f64,
    pub count: u64,
}

impl Accumulator {
    pub fn new(total: f64, count: u64) -> Self {
        Self { total, count }
    }

    /// A single observation
    pub fn sample(value: f64) -> Self {
        Self {
            total: value,
            count: 1,
        }
    }

    /// `total / count`, or 0 when nothing was counted
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.total / self.count as f64
    }

    pub fn merge(&mut self, other: &Accumulator) {
        self.total += other.total;
        self.count += other.count;
    }
}

/// Format an accumulator according to the metric's reducer
pub fn format(kind: MetricKind, acc: &Accumulator) -> f64 {
    match kind.reducer() {
        Reducer::Mean => acc.mean(),
        Reducer::Sum => acc.total,
    }
}

/// Metric accumulators of a single node (or of one identity after merging)
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricMap(BTreeMap<MetricKind, Accumulator>);

impl MetricMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Metrics of one resolution that took `millis`
    pub fn resolution(millis: f64) -> Self {
        Self::new()
            .with(MetricKind::Time, Accumulator::sample(millis))
            .with(MetricKind::Count, Accumulator::sample(1.0))
    }

    pub fn with(mut self, kind: MetricKind, acc: Accumulator) -> Self {
        self.0.insert(kind, acc);
        self
    }

    pub fn insert(&mut self, kind: MetricKind, acc: Accumulator) {
        self.0.insert(kind, acc);
    }

    pub fn get(&self, kind: MetricKind) -> Option<&Accumulator> {
        self.0.get(&kind)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, MetricKind, Accumulator> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Mean of the time metric, 0 if absent or never counted
    pub fn mean_time(&self) -> f64 {
        self.get(MetricKind::Time).map_or(0.0, Accumulator::mean)
    }

    /// Add `other` component-wise; metrics missing here are adopted as-is
    pub fn merge(&mut self, other: &MetricMap) {
        for (kind, acc) in other.iter() {
            match self.0.entry(*kind) {
                btree_map::Entry::Vacant(slot) => {
                    slot.insert(*acc);
                }
                btree_map::Entry::Occupied(mut slot) => slot.get_mut().merge(acc),
            }
        }
    }
}

/// Metrics grouped by operation identity for one tree walk
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregatedMetrics(BTreeMap<String, MetricMap>);

impl AggregatedMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one node's metrics under `identity`
    pub fn record(&mut self, identity: &str, metrics: &MetricMap) {
        match self.0.get_mut(identity) {
            Some(existing) => existing.merge(metrics),
            None => {
                self.0.insert(identity.to_string(), metrics.clone());
            }
        }
    }

    /// Merge another aggregation into this one
    pub fn merge(&mut self, other: &AggregatedMetrics) {
        for (identity, metrics) in other.iter() {
            self.record(identity, metrics);
        }
    }

    pub fn get(&self, identity: &str) -> Option<&MetricMap> {
        self.0.get(identity)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, MetricMap> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Aggregate metrics of `start` and every descendant
///
/// Placeholder nodes without metadata (the synthetic root) are skipped.
/// Nodes whose metadata lacks identity fields land in the `""` bucket.
pub fn aggregate(tree: &ExecutionTree, start: NodeId) -> Result<AggregatedMetrics> {
    let mut aggregated = AggregatedMetrics::new();
    tree.walk(start, |node| {
        if node.meta().is_some() {
            aggregated.record(&node.identity(), node.metrics());
        }
    })?;
    Ok(aggregated)
}
