use crate::graph::NodeId;
use thiserror::Error;

/// Errors raised while building, evaluating or differentiating a graph.
///
/// Every evaluation-time variant names the offending node by id and display
/// name so a failure deep inside a gradient graph can be traced back.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphError {
    #[error("{op} expects {expected} input(s), got {actual}")]
    Arity {
        op: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("node {0} does not belong to this graph")]
    UnknownNode(NodeId),

    #[error("invalid attribute for {op}: {reason}")]
    InvalidAttribute { op: &'static str, reason: String },

    #[error("domain error in {op} at node {node} `{name}`: {reason}")]
    Domain {
        node: NodeId,
        name: String,
        op: &'static str,
        reason: String,
    },

    #[error("shape mismatch in {op} at node {node} `{name}`: {lhs:?} vs {rhs:?}")]
    Shape {
        node: NodeId,
        name: String,
        op: &'static str,
        lhs: (usize, usize),
        rhs: (usize, usize),
    },

    #[error("placeholder {node} `{name}` has no value in the feed")]
    UnboundPlaceholder { node: NodeId, name: String },

    #[error("node {node} `{name}` is not a placeholder and cannot be fed")]
    NotAPlaceholder { node: NodeId, name: String },

    #[error("{op} at node {node} `{name}` has no gradient rule")]
    NonDifferentiable {
        node: NodeId,
        name: String,
        op: &'static str,
    },

    #[error("gradient of node {node} `{name}` is undefined: not reachable from the output node")]
    Disconnected { node: NodeId, name: String },
}

pub type Result<T> = std::result::Result<T, GraphError>;
