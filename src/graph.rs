//! Execution tree of resolved operations
//!
//! One [`ExecutionTree`] is built per logical request. Producers attach a
//! child node whenever an operation completes, in whatever order the work
//! finishes. Once the request is done the tree is walked once to aggregate
//! metrics and build traces, then dropped.
//!
//! # Design
//!
//! ```text
//! ExecutionTree
//! ├── nodes: Vec<ExecutionNode>      (arena, append-only)
//! ├── index: NodeId → arena slot     (every node, any depth)
//! └── root:  NodeId                  (synthetic, no metadata)
//!
//! ExecutionNode
//! ├── parent:   Option<NodeId>       (lineage lookups only)
//! └── children: Vec<NodeId>          (attachment order)
//! ```
//!
//! Parents and children are plain ids resolved through the arena, so there
//! are no ownership cycles between a node, its parent and its tree.

use crate::error::{GraphError, Result};
use crate::metrics::MetricMap;
use crate::node_id::{NodeId, NodeIdGenerator};
use crate::trace::PathEntry;
use fnv::FnvHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Structural description of one resolved operation
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeMeta {
    pub schema_name: String,
    pub type_name: String,
    pub field_name: String,
    /// Invocation arguments
    pub args: Value,
    /// Value the operation resolved to
    pub result: Value,
    /// Value the operation was invoked against
    pub source: Value,
}

impl NodeMeta {
    pub fn new(
        schema_name: impl Into<String>,
        type_name: impl Into<String>,
        field_name: impl Into<String>,
    ) -> Self {
        Self {
            schema_name: schema_name.into(),
            type_name: type_name.into(),
            field_name: field_name.into(),
            ..Self::default()
        }
    }

    pub fn with_args(mut self, args: Value) -> Self {
        self.args = args;
        self
    }

    pub fn with_result(mut self, result: Value) -> Self {
        self.result = result;
        self
    }

    pub fn with_source(mut self, source: Value) -> Self {
        self.source = source;
        self
    }

    /// `schema.type.field`, or `""` when any part is missing
    pub fn identity(&self) -> String {
        let parts = [&self.schema_name, &self.type_name, &self.field_name];
        if parts.iter().any(|part| part.is_empty()) {
            return String::new();
        }
        format!("{}.{}.{}", parts[0], parts[1], parts[2])
    }
}

/// A single node in an [`ExecutionTree`]
#[derive(Debug, Clone)]
pub struct ExecutionNode {
    id: NodeId,
    meta: Option<NodeMeta>,
    metrics: MetricMap,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl ExecutionNode {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn meta(&self) -> Option<&NodeMeta> {
        self.meta.as_ref()
    }

    pub fn metrics(&self) -> &MetricMap {
        &self.metrics
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Child ids in attachment order
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Operation identity, `""` for placeholder nodes
    pub fn identity(&self) -> String {
        self.meta
            .as_ref()
            .map(NodeMeta::identity)
            .unwrap_or_default()
    }

    /// Mean of this node's own time metric (not cumulative over children)
    pub fn mean_time(&self) -> f64 {
        self.metrics.mean_time()
    }
}

/// Result of [`ExecutionTree::map_tree`]: `{result, children}` per node
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MappedNode<T> {
    pub result: T,
    pub children: BTreeMap<NodeId, MappedNode<T>>,
}

impl<T> Drop for MappedNode<T> {
    // Flatten before dropping so deep results don't recurse once per level
    fn drop(&mut self) {
        let mut pending: Vec<MappedNode<T>> = Vec::new();
        pending.extend(std::mem::take(&mut self.children).into_values());
        while let Some(mut node) = pending.pop() {
            pending.extend(std::mem::take(&mut node.children).into_values());
        }
    }
}

/// Arena of nodes for one logical request
#[derive(Debug)]
pub struct ExecutionTree {
    ids: Arc<NodeIdGenerator>,
    nodes: Vec<ExecutionNode>,
    index: FnvHashMap<NodeId, usize>,
    root: NodeId,
    request_data: Value,
}

impl ExecutionTree {
    /// New tree drawing ids from the process-wide generator
    pub fn new(request_data: Value) -> Self {
        Self::with_generator(NodeIdGenerator::global(), request_data)
    }

    /// New tree drawing ids from `ids`
    pub fn with_generator(ids: Arc<NodeIdGenerator>, request_data: Value) -> Self {
        let mut tree = Self {
            ids,
            nodes: Vec::new(),
            index: FnvHashMap::default(),
            root: NodeId::from_raw(0),
            request_data,
        };
        tree.root = tree.create_node(None, MetricMap::new());
        tree
    }

    /// Synthetic root representing the originating request
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Opaque payload supplied at construction
    pub fn request_data(&self) -> &Value {
        &self.request_data
    }

    /// Number of nodes in the arena, root included
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Create a detached node: fresh id, no parent, no children
    pub fn create_node(&mut self, meta: Option<NodeMeta>, metrics: MetricMap) -> NodeId {
        let id = self.ids.next_id();
        self.index.insert(id, self.nodes.len());
        self.nodes.push(ExecutionNode {
            id,
            meta,
            metrics,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    /// Attach a new child under `parent` and index it
    pub fn add_child(
        &mut self,
        parent: NodeId,
        meta: Option<NodeMeta>,
        metrics: MetricMap,
    ) -> Result<NodeId> {
        let parent_slot = self.slot(parent)?;
        let id = self.create_node(meta, metrics);
        let child_slot = self.nodes.len() - 1;
        self.nodes[child_slot].parent = Some(parent);
        self.nodes[parent_slot].children.push(id);
        Ok(id)
    }

    pub fn get(&self, id: NodeId) -> Option<&ExecutionNode> {
        self.index.get(&id).map(|&slot| &self.nodes[slot])
    }

    pub fn node(&self, id: NodeId) -> Result<&ExecutionNode> {
        self.get(id).ok_or(GraphError::UnknownNode(id))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.index.contains_key(&id)
    }

    /// Ancestors with metadata, oldest first, nearest parent last
    pub fn lineage(&self, id: NodeId) -> Result<Vec<PathEntry>> {
        let mut path = Vec::new();
        let mut next = self.node(id)?.parent;

        while let Some(ancestor) = next.and_then(|pid| self.get(pid)) {
            if let Some(meta) = ancestor.meta() {
                path.push(PathEntry {
                    name: meta.identity(),
                    time: ancestor.mean_time(),
                    args: meta.args.clone(),
                });
            }
            next = ancestor.parent;
        }

        path.reverse();
        Ok(path)
    }

    /// Depth-first visit of `start` and its descendants, parent before children
    pub fn walk<F>(&self, start: NodeId, mut visit: F) -> Result<()>
    where
        F: FnMut(&ExecutionNode),
    {
        let mut stack = vec![self.slot(start)?];
        while let Some(slot) = stack.pop() {
            let node = &self.nodes[slot];
            visit(node);
            stack.extend(
                node.children
                    .iter()
                    .rev()
                    .filter_map(|child| self.index.get(child).copied()),
            );
        }
        Ok(())
    }

    /// Map `start` and every descendant into a `{result, children}` tree
    ///
    /// `f` runs in the same order as [`walk`](Self::walk). The build uses an
    /// explicit stack, so arbitrarily deep chains are fine.
    pub fn map_tree<T, F>(&self, start: NodeId, mut f: F) -> Result<MappedNode<T>>
    where
        F: FnMut(&ExecutionNode) -> T,
    {
        // Preorder: (node id, position of its parent)
        let mut links: Vec<(NodeId, Option<usize>)> = Vec::new();
        let mut mapped: Vec<Option<MappedNode<T>>> = Vec::new();
        let mut stack = vec![(self.slot(start)?, None)];

        while let Some((slot, parent)) = stack.pop() {
            let node = &self.nodes[slot];
            let position = mapped.len();
            links.push((node.id, parent));
            mapped.push(Some(MappedNode {
                result: f(node),
                children: BTreeMap::new(),
            }));
            stack.extend(
                node.children
                    .iter()
                    .rev()
                    .filter_map(|child| self.index.get(child).map(|&s| (s, Some(position)))),
            );
        }

        // Every node sits after its parent, so folding from the back attaches
        // complete subtrees.
        for position in (1..mapped.len()).rev() {
            let (id, parent) = links[position];
            let (Some(node), Some(parent)) = (mapped[position].take(), parent) else {
                continue;
            };
            if let Some(parent_node) = mapped[parent].as_mut() {
                parent_node.children.insert(id, node);
            }
        }

        mapped
            .into_iter()
            .next()
            .flatten()
            .ok_or(GraphError::UnknownNode(start))
    }

    fn slot(&self, id: NodeId) -> Result<usize> {
        self.index
            .get(&id)
            .copied()
            .ok_or(GraphError::UnknownNode(id))
    }
}

/// Tree handle shared by concurrently completing producers
///
/// All mutation goes through one mutex, so `add_child` calls on the same
/// parent or on the shared index never race.
#[derive(Debug, Clone)]
pub struct SharedTree {
    inner: Arc<Mutex<ExecutionTree>>,
    root: NodeId,
}

impl SharedTree {
    pub fn new(tree: ExecutionTree) -> Self {
        let root = tree.root();
        Self {
            inner: Arc::new(Mutex::new(tree)),
            root,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn add_child(
        &self,
        parent: NodeId,
        meta: Option<NodeMeta>,
        metrics: MetricMap,
    ) -> Result<NodeId> {
        self.lock().add_child(parent, meta, metrics)
    }

    /// Run `f` against the tree while holding the lock
    pub fn with_tree<R>(&self, f: impl FnOnce(&ExecutionTree) -> R) -> R {
        f(&self.lock())
    }

    /// Take the tree back once every producer handle is gone
    pub fn try_unwrap(self) -> std::result::Result<ExecutionTree, SharedTree> {
        let root = self.root;
        Arc::try_unwrap(self.inner)
            .map(|mutex| mutex.into_inner().unwrap_or_else(PoisonError::into_inner))
            .map_err(|inner| SharedTree { inner, root })
    }

    fn lock(&self) -> MutexGuard<'_, ExecutionTree> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
