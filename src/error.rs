//! Error types for tree construction and result linkage

use crate::node_id::NodeId;
use thiserror::Error;

/// Failure to attach linkage data to a resolved result value
///
/// This is a degraded-data condition: the node is still created and
/// indexed, only the value's own descendants lose their parent link.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AttachmentError {
    #[error("result value of kind `{kind}` cannot carry linkage for node {node}")]
    NotAnObject { node: NodeId, kind: &'static str },
}

/// Errors raised by execution tree operations and agent setup
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("node {0} is not part of this tree")]
    UnknownNode(NodeId),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, GraphError>;
