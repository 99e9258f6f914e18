use thiserror::Error;

use crate::types::NodeId;

#[derive(Error, Debug)]
pub enum MenuError {
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Invalid environment variable value: {0}")]
    InvalidEnvVar(String),

    #[error("Gateway error: {0}")]
    GatewayError(String),

    #[error("Reorder commit failed: {0}")]
    CommitFailed(String),

    #[error("Node {0} appears more than once in the tree")]
    DuplicateNode(NodeId),

    #[error("Node {0} not found")]
    UnknownNode(NodeId),

    #[error("Placing {child} under {parent} would make a node its own ancestor")]
    Cycle { child: NodeId, parent: NodeId },

    #[error("Engine busy: {0}")]
    Busy(&'static str),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MenuError>;
