//! Routing of traces to per-identity outlier stores

use crate::outlier::{OutlierOptions, OutlierStore};
use crate::trace::TraceRecord;
use std::collections::HashMap;
use tracing::debug;

/// Dispatches traces by name to one [`OutlierStore`] per identity
///
/// Stores are created lazily on first sight of an identity and never
/// removed. Flush output follows first-seen order.
#[derive(Debug, Default)]
pub struct TraceStore {
    options: OutlierOptions,
    /// Stores in first-seen order
    stores: Vec<(String, OutlierStore)>,
    /// Fast lookup: identity → position in `stores`
    by_name: HashMap<String, usize>,
}

impl TraceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: OutlierOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    pub fn add_trace(&mut self, trace: TraceRecord) {
        let position = match self.by_name.get(&trace.name) {
            Some(&position) => position,
            None => {
                debug!(name = %trace.name, "new trace identity");
                let store = OutlierStore::new(self.options.clone());
                self.stores.push((trace.name.clone(), store));
                let position = self.stores.len() - 1;
                self.by_name.insert(trace.name.clone(), position);
                position
            }
        };
        self.stores[position].1.add_trace(trace);
    }

    /// Close the window on every identity and collect kept traces
    pub fn get_outliers(&mut self) -> Vec<TraceRecord> {
        self.stores
            .iter_mut()
            .flat_map(|(_, store)| store.get_outliers())
            .collect()
    }

    pub fn store(&self, name: &str) -> Option<&OutlierStore> {
        self.by_name
            .get(name)
            .map(|&position| &self.stores[position].1)
    }

    /// Identities in first-seen order
    pub fn identities(&self) -> impl Iterator<Item = &str> {
        self.stores.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.stores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }
}
