//! Recorded requests: a JSON document replayed into execution trees
//!
//! # Format
//!
//! ```json
//! [
//!   {
//!     "data": {"viewer": 1},
//!     "operations": [
//!       {
//!         "schema": "main", "type": "Query", "field": "user",
//!         "time_ms": 12.5, "args": {"id": 1}, "result": {"name": "ada"},
//!         "children": [
//!           {"schema": "main", "type": "User", "field": "posts", "time_ms": 3.0}
//!         ]
//!       }
//!     ]
//!   }
//! ]
//! ```
//!
//! A child's source is its parent's result. Top-level operations use the
//! request `data` as their source.

use crate::graph::{ExecutionTree, NodeMeta};
use crate::metrics::MetricMap;
use crate::node_id::{NodeId, NodeIdGenerator};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// One recorded logical request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedRequest {
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub operations: Vec<RecordedOperation>,
}

/// One recorded resolution and the operations resolved against its result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedOperation {
    #[serde(default)]
    pub schema: String,
    #[serde(rename = "type", default)]
    pub type_name: String,
    #[serde(default)]
    pub field: String,
    pub time_ms: f64,
    #[serde(default)]
    pub args: Value,
    #[serde(default)]
    pub result: Value,
    #[serde(default)]
    pub children: Vec<RecordedOperation>,
}

/// Parse a recorded-request document
pub fn parse_requests(content: &str) -> Result<Vec<RecordedRequest>> {
    let requests: Vec<RecordedRequest> =
        serde_json::from_str(content).context("Failed to parse recorded requests")?;

    for (i, request) in requests.iter().enumerate() {
        validate_operations(&request.operations)
            .with_context(|| format!("Invalid operation in request {}", i))?;
    }
    Ok(requests)
}

/// Read and parse a recorded-request file
pub fn load_requests<P: AsRef<Path>>(path: P) -> Result<Vec<RecordedRequest>> {
    let content = fs::read_to_string(path.as_ref()).with_context(|| {
        format!("Failed to read input file: {}", path.as_ref().display())
    })?;
    parse_requests(&content)
}

fn validate_operations(operations: &[RecordedOperation]) -> Result<()> {
    let mut pending: Vec<&RecordedOperation> = operations.iter().collect();
    while let Some(op) = pending.pop() {
        if !op.time_ms.is_finite() || op.time_ms < 0.0 {
            anyhow::bail!(
                "time_ms must be a finite non-negative number, got {} for {}.{}.{}",
                op.time_ms,
                op.schema,
                op.type_name,
                op.field
            );
        }
        pending.extend(op.children.iter());
    }
    Ok(())
}

impl RecordedRequest {
    /// Build the execution tree of this request
    pub fn build_tree(&self, ids: Arc<NodeIdGenerator>) -> Result<ExecutionTree> {
        let mut tree = ExecutionTree::with_generator(ids, self.data.clone());
        let mut pending: Vec<(NodeId, &Value, &RecordedOperation)> = self
            .operations
            .iter()
            .rev()
            .map(|op| (tree.root(), &self.data, op))
            .collect();

        while let Some((parent, source, op)) = pending.pop() {
            let meta = NodeMeta::new(op.schema.as_str(), op.type_name.as_str(), op.field.as_str())
                .with_args(op.args.clone())
                .with_result(op.result.clone())
                .with_source(source.clone());
            let node = tree.add_child(parent, Some(meta), MetricMap::resolution(op.time_ms))?;
            pending.extend(
                op.children
                    .iter()
                    .rev()
                    .map(|child| (node, &op.result, child)),
            );
        }
        Ok(tree)
    }
}
