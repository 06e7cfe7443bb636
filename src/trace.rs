//! Human-readable trace records derived from execution nodes

use crate::error::Result;
use crate::graph::ExecutionTree;
use crate::node_id::NodeId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One ancestor in a trace's lineage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathEntry {
    pub name: String,
    pub time: f64,
    pub args: Value,
}

/// Trace of a single resolved operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRecord {
    /// Operation identity
    pub name: String,
    /// Ancestors from the outermost operation down to the immediate parent
    pub path: Vec<PathEntry>,
    /// The node's own mean time, children excluded
    pub time: f64,
    pub args: Value,
    pub source: Value,
    pub result: Value,
}

/// Build the trace of `id` without touching the tree
pub fn build_trace(tree: &ExecutionTree, id: NodeId) -> Result<TraceRecord> {
    let node = tree.node(id)?;
    let path = tree.lineage(id)?;
    let (args, source, result) = match node.meta() {
        Some(meta) => (meta.args.clone(), meta.source.clone(), meta.result.clone()),
        None => (Value::Null, Value::Null, Value::Null),
    };

    Ok(TraceRecord {
        name: node.identity(),
        path,
        time: node.mean_time(),
        args,
        source,
        result,
    })
}

/// Build one trace per node under `start` (inclusive), depth-first
pub fn build_subtree_traces(tree: &ExecutionTree, start: NodeId) -> Result<Vec<TraceRecord>> {
    let mut ids = Vec::new();
    tree.walk(start, |node| ids.push(node.id()))?;
    ids.into_iter().map(|id| build_trace(tree, id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeMeta;
    use crate::metrics::{Accumulator, MetricKind, MetricMap};
    use crate::node_id::NodeIdGenerator;
    use serde_json::json;
    use std::sync::Arc;

    fn level_meta(n: usize) -> NodeMeta {
        NodeMeta::new(format!("s{}", n), format!("t{}", n), format!("f{}", n))
            .with_args(json!(format!("a{}", n)))
            .with_source(json!(format!("p{}", n)))
            .with_result(json!(format!("r{}", n)))
    }

    fn level_metrics(n: usize) -> MetricMap {
        MetricMap::new().with(MetricKind::Time, Accumulator::new(n as f64, 1))
    }

    fn chain() -> (ExecutionTree, [NodeId; 3]) {
        let mut tree = ExecutionTree::with_generator(Arc::new(NodeIdGenerator::new()), Value::Null);
        let n0 = tree
            .add_child(tree.root(), Some(level_meta(0)), level_metrics(0))
            .unwrap();
        let n1 = tree
            .add_child(n0, Some(level_meta(1)), level_metrics(1))
            .unwrap();
        let n2 = tree
            .add_child(n1, Some(level_meta(2)), level_metrics(2))
            .unwrap();
        (tree, [n0, n1, n2])
    }

    #[test]
    fn test_build_trace_fields() {
        let (tree, [_, _, n2]) = chain();
        let trace = build_trace(&tree, n2).unwrap();

        assert_eq!(trace.name, "s2.t2.f2");
        assert_eq!(trace.path, tree.lineage(n2).unwrap());
        assert_eq!(trace.time, 2.0);
        assert_eq!(trace.args, json!("a2"));
        assert_eq!(trace.source, json!("p2"));
        assert_eq!(trace.result, json!("r2"));
    }

    #[test]
    fn test_build_trace_placeholder_node() {
        let (tree, _) = chain();
        let trace = build_trace(&tree, tree.root()).unwrap();
        assert_eq!(trace.name, "");
        assert!(trace.path.is_empty());
        assert_eq!(trace.time, 0.0);
        assert_eq!(trace.args, Value::Null);
    }

    #[test]
    fn test_subtree_traces_without_aggregation() {
        let (tree, [_, n1, n2]) = chain();
        let traces = build_subtree_traces(&tree, n1).unwrap();
        assert_eq!(traces.len(), 2);
        assert_eq!(traces[0].name, "s1.t1.f1");
        assert_eq!(traces[1], build_trace(&tree, n2).unwrap());
    }

    #[test]
    fn test_trace_serializes_flat() {
        let (tree, [_, n1, _]) = chain();
        let json = serde_json::to_value(build_trace(&tree, n1).unwrap()).unwrap();
        assert_eq!(json["name"], "s1.t1.f1");
        assert_eq!(json["path"][0]["name"], "s0.t0.f0");
        assert_eq!(json["time"], 1.0);
    }
}
