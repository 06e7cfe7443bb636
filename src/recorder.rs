//! Producer side: turning completed operations into tree nodes
//!
//! The interception layer that times resolvers lives outside this crate. It
//! reports each completed operation through an [`OperationSink`], and
//! [`ResolveRecorder`] does the bookkeeping the interception layer would
//! otherwise repeat:
//!
//! 1. Find the parent node from linkage stored on the source value (or
//!    fall back to the tree root).
//! 2. Create one child node per resolved item (one per list element).
//! 3. Store linkage on each item so operations resolved against it attach
//!    underneath.
//!
//! Linkage lives under [`LINK_KEY`] on JSON objects. Scalars cannot carry it,
//! which yields an [`AttachmentError`]; the node is still recorded and the
//! failure is counted.

use crate::error::{AttachmentError, Result};
use crate::graph::{NodeMeta, SharedTree};
use crate::metrics::MetricMap;
use crate::node_id::NodeId;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

/// Reserved object key holding the id of the node that produced a value
pub const LINK_KEY: &str = "__graphtrace_node";

/// Capability driven by the interception layer
pub trait OperationSink {
    fn on_operation_complete(
        &self,
        parent: NodeId,
        meta: NodeMeta,
        metrics: MetricMap,
    ) -> Result<NodeId>;
}

impl OperationSink for SharedTree {
    fn on_operation_complete(
        &self,
        parent: NodeId,
        meta: NodeMeta,
        metrics: MetricMap,
    ) -> Result<NodeId> {
        self.add_child(parent, Some(meta), metrics)
    }
}

/// Store linkage to `node` on `value`
pub fn attach_linkage(value: &mut Value, node: NodeId) -> std::result::Result<(), AttachmentError> {
    match value {
        Value::Object(map) => {
            map.insert(LINK_KEY.to_string(), Value::from(node.as_u64()));
            Ok(())
        }
        other => Err(AttachmentError::NotAnObject {
            node,
            kind: value_kind(other),
        }),
    }
}

/// Node linked to `value`, if any
pub fn linked_node(value: &Value) -> Option<NodeId> {
    value
        .as_object()
        .and_then(|map| map.get(LINK_KEY))
        .and_then(Value::as_u64)
        .map(NodeId::from_raw)
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Identity of the operation being recorded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRef {
    pub schema_name: String,
    pub type_name: String,
    pub field_name: String,
}

impl FieldRef {
    pub fn new(
        schema_name: impl Into<String>,
        type_name: impl Into<String>,
        field_name: impl Into<String>,
    ) -> Self {
        Self {
            schema_name: schema_name.into(),
            type_name: type_name.into(),
            field_name: field_name.into(),
        }
    }
}

/// Records completed resolutions into an [`OperationSink`]
#[derive(Debug)]
pub struct ResolveRecorder<S> {
    sink: S,
    root: NodeId,
    attachment_failures: AtomicU64,
}

impl ResolveRecorder<SharedTree> {
    /// Recorder attached to a shared tree, falling back to its root
    pub fn for_tree(tree: SharedTree) -> Self {
        let root = tree.root();
        Self::new(tree, root)
    }
}

impl<S: OperationSink> ResolveRecorder<S> {
    pub fn new(sink: S, root: NodeId) -> Self {
        Self {
            sink,
            root,
            attachment_failures: AtomicU64::new(0),
        }
    }

    /// Parent node for an operation invoked against `source`
    pub fn parent_for(&self, source: &Value) -> NodeId {
        linked_node(source).unwrap_or(self.root)
    }

    /// Record one completed resolution
    ///
    /// `result` is updated in place with linkage. Returns the ids of the
    /// recorded nodes, one per list element (or one for a non-list result).
    pub fn record(
        &self,
        field: &FieldRef,
        source: &Value,
        args: Value,
        elapsed: Duration,
        result: &mut Value,
    ) -> Result<Vec<NodeId>> {
        let parent = self.parent_for(source);
        let millis = elapsed.as_nanos() as f64 / 1_000_000.0;
        let meta = NodeMeta {
            schema_name: field.schema_name.clone(),
            type_name: field.type_name.clone(),
            field_name: field.field_name.clone(),
            args,
            result: result.clone(),
            source: source.clone(),
        };

        let items: Vec<&mut Value> = match result {
            Value::Array(items) => items.iter_mut().collect(),
            single => vec![single],
        };

        let mut recorded = Vec::with_capacity(items.len());
        for item in items {
            let node = self.sink.on_operation_complete(
                parent,
                meta.clone(),
                MetricMap::resolution(millis),
            )?;
            if let Err(err) = attach_linkage(item, node) {
                self.attachment_failures.fetch_add(1, Ordering::Relaxed);
                debug!(%err, "result linkage lost");
            }
            recorded.push(node);
        }
        Ok(recorded)
    }

    /// Results that could not carry linkage so far
    pub fn attachment_failures(&self) -> u64 {
        self.attachment_failures.load(Ordering::Relaxed)
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::ExecutionTree;
    use crate::metrics::MetricKind;
    use crate::node_id::NodeIdGenerator;
    use serde_json::json;
    use std::sync::Arc;

    fn recorder() -> ResolveRecorder<SharedTree> {
        let tree = ExecutionTree::with_generator(Arc::new(NodeIdGenerator::new()), Value::Null);
        ResolveRecorder::for_tree(SharedTree::new(tree))
    }

    #[test]
    fn test_attach_and_read_linkage() {
        let mut value = json!({"id": 1});
        attach_linkage(&mut value, NodeId::from_raw(7)).unwrap();
        assert_eq!(linked_node(&value), Some(NodeId::from_raw(7)));
    }

    #[test]
    fn test_attach_to_scalar_fails() {
        let mut value = json!(42);
        let err = attach_linkage(&mut value, NodeId::from_raw(3)).unwrap_err();
        assert_eq!(
            err,
            AttachmentError::NotAnObject {
                node: NodeId::from_raw(3),
                kind: "number",
            }
        );
        assert_eq!(value, json!(42));
    }

    #[test]
    fn test_unlinked_source_attaches_to_root() {
        let recorder = recorder();
        let mut result = json!({"name": "ada"});
        let ids = recorder
            .record(
                &FieldRef::new("s", "Query", "user"),
                &Value::Null,
                json!({"id": 1}),
                Duration::from_millis(12),
                &mut result,
            )
            .unwrap();

        assert_eq!(ids.len(), 1);
        let root = recorder.sink().root();
        recorder.sink().with_tree(|tree| {
            let node = tree.node(ids[0]).unwrap();
            assert_eq!(node.parent(), Some(root));
            assert_eq!(node.identity(), "s.Query.user");
            assert_eq!(node.mean_time(), 12.0);
            assert_eq!(
                node.metrics().get(MetricKind::Count).map(|a| a.total),
                Some(1.0)
            );
        });
        assert_eq!(linked_node(&result), Some(ids[0]));
    }

    #[test]
    fn test_list_result_records_node_per_item() {
        let recorder = recorder();
        let mut result = json!([{"id": 1}, {"id": 2}, {"id": 3}]);
        let ids = recorder
            .record(
                &FieldRef::new("s", "Query", "users"),
                &Value::Null,
                Value::Null,
                Duration::from_millis(5),
                &mut result,
            )
            .unwrap();

        assert_eq!(ids.len(), 3);
        for (item, id) in result.as_array().unwrap().iter().zip(&ids) {
            assert_eq!(linked_node(item), Some(*id));
        }
    }

    #[test]
    fn test_nested_resolution_attaches_under_item() {
        let recorder = recorder();
        let mut users = json!([{"id": 1}]);
        let parents = recorder
            .record(
                &FieldRef::new("s", "Query", "users"),
                &Value::Null,
                Value::Null,
                Duration::from_millis(5),
                &mut users,
            )
            .unwrap();

        let source = users[0].clone();
        let mut posts = json!({"title": "hello"});
        let children = recorder
            .record(
                &FieldRef::new("s", "User", "posts"),
                &source,
                Value::Null,
                Duration::from_millis(2),
                &mut posts,
            )
            .unwrap();

        recorder.sink().with_tree(|tree| {
            assert_eq!(tree.node(children[0]).unwrap().parent(), Some(parents[0]));
            let path = tree.lineage(children[0]).unwrap();
            assert_eq!(path.len(), 1);
            assert_eq!(path[0].name, "s.Query.users");
        });
    }

    #[test]
    fn test_scalar_result_counts_attachment_failure() {
        let recorder = recorder();
        let mut result = json!(["a", {"id": 1}, 3]);
        let ids = recorder
            .record(
                &FieldRef::new("s", "Query", "mixed"),
                &Value::Null,
                Value::Null,
                Duration::ZERO,
                &mut result,
            )
            .unwrap();

        assert_eq!(ids.len(), 3);
        assert_eq!(recorder.attachment_failures(), 2);
        recorder
            .sink()
            .with_tree(|tree| assert!(ids.iter().all(|id| tree.contains(*id))));
    }

    #[test]
    fn test_unknown_linked_parent_is_error() {
        let recorder = recorder();
        let mut source = json!({});
        source[LINK_KEY] = json!(9999);
        let mut result = json!({});
        assert!(recorder
            .record(
                &FieldRef::new("s", "User", "name"),
                &source,
                Value::Null,
                Duration::ZERO,
                &mut result,
            )
            .is_err());
    }
}
