//! Error taxonomy for the routing workflow
//!
//! Nodes return these as typed values. Only the agent manager collapses them
//! into the fixed user-facing fallback text.

use std::time::Duration;

use thiserror::Error;

use crate::types::NodeId;

pub type Result<T, E = WorkflowError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Invalid construction input (unknown provider, bad URL, broken graph)
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The content source could not be fetched
    #[error("fetch failed: {0}")]
    Fetch(String),

    /// The model output did not match the expected JSON shape
    #[error("malformed model output: {0}")]
    MalformedOutput(String),

    /// The model returned an intent label outside the closed set
    #[error("unknown intent label '{0}'")]
    UnknownIntent(String),

    #[error("model call timed out after {0:?}")]
    Timeout(Duration),

    /// Transport or API failure reported by the model backend
    #[error("provider error: {0:#}")]
    Provider(#[from] anyhow::Error),

    /// Failure raised while executing a graph node
    #[error("node {node} failed: {source}")]
    Node {
        node: NodeId,
        #[source]
        source: Box<WorkflowError>,
    },

    #[error("workflow exceeded {0} steps")]
    StepLimit(usize),
}

impl WorkflowError {
    /// Attach the failing node to an error, leaving already-tagged errors alone
    pub fn in_node(self, node: NodeId) -> Self {
        match self {
            tagged @ WorkflowError::Node { .. } => tagged,
            other => WorkflowError::Node {
                node,
                source: Box::new(other),
            },
        }
    }

    /// The node an error was raised in, if known
    pub fn node(&self) -> Option<NodeId> {
        match self {
            WorkflowError::Node { node, .. } => Some(*node),
            _ => None,
        }
    }
}
