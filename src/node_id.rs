//! Node id generation for execution trees
//!
//! Every [`ExecutionNode`](crate::graph::ExecutionNode) receives an id that is
//! unique for the lifetime of the generator that issued it. The only
//! correctness requirement is uniqueness, so a single atomic `fetch_add` is
//! enough even when several threads build trees at once.
//!
//! Trees normally draw from [`NodeIdGenerator::global`]. Tests (and embedders
//! that want deterministic ids) inject their own `Arc<NodeIdGenerator>` with
//! [`ExecutionTree::with_generator`](crate::graph::ExecutionTree::with_generator).
//!
//! # Example
//!
//! ```
//! use graphtrace::node_id::NodeIdGenerator;
//!
//! static IDS: NodeIdGenerator = NodeIdGenerator::new();
//!
//! let a = IDS.next_id();
//! let b = IDS.next_id();
//! assert_ne!(a, b);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

/// Process-unique identifier of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(u64);

impl NodeId {
    /// Wrap a raw id value
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw numeric value
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

static GLOBAL_IDS: OnceLock<Arc<NodeIdGenerator>> = OnceLock::new();

/// Monotonic id source
///
/// # Thread Safety
///
/// `NodeIdGenerator` uses a relaxed atomic counter. It can be shared via
/// `Arc` or used as a `static`.
#[derive(Debug)]
pub struct NodeIdGenerator {
    counter: AtomicU64,
}

impl NodeIdGenerator {
    /// Create a generator starting at 0
    pub const fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
        }
    }

    /// Create a generator starting at `initial_value`
    pub const fn with_value(initial_value: u64) -> Self {
        Self {
            counter: AtomicU64::new(initial_value),
        }
    }

    /// Process-wide default generator
    pub fn global() -> Arc<NodeIdGenerator> {
        Arc::clone(GLOBAL_IDS.get_or_init(|| Arc::new(NodeIdGenerator::new())))
    }

    /// Issue the next id
    pub fn next_id(&self) -> NodeId {
        NodeId(self.counter.fetch_add(1, Ordering::Relaxed))
    }

    /// Peek at the next id without issuing it
    pub fn peek(&self) -> u64 {
        self.counter.load(Ordering::Relaxed)
    }
}

impl Default for NodeIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_generator_starts_at_zero() {
        let ids = NodeIdGenerator::new();
        assert_eq!(ids.next_id(), NodeId::from_raw(0));
        assert_eq!(ids.next_id(), NodeId::from_raw(1));
        assert_eq!(ids.peek(), 2);
    }

    #[test]
    fn test_generator_with_value() {
        let ids = NodeIdGenerator::with_value(41);
        assert_eq!(ids.next_id().as_u64(), 41);
    }

    #[test]
    fn test_thousand_ids_are_unique() {
        let ids = NodeIdGenerator::new();
        let seen: HashSet<NodeId> = (0..1000).map(|_| ids.next_id()).collect();
        assert_eq!(seen.len(), 1000);
    }

    #[test]
    fn test_concurrent_ids_are_unique() {
        let ids = Arc::new(NodeIdGenerator::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let ids = Arc::clone(&ids);
                thread::spawn(move || (0..250).map(|_| ids.next_id()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id), "duplicate id {}", id);
            }
        }
        assert_eq!(seen.len(), 1000);
    }

    #[test]
    fn test_global_generator_is_shared() {
        let ids = NodeIdGenerator::global();
        let a = ids.next_id();
        let b = NodeIdGenerator::global().next_id();
        assert!(b > a);
    }
}
