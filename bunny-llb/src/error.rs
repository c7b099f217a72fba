use bunny_graph::GraphError;
use thiserror::Error;

/// Errors raised while assembling or marshalling an operation graph.
#[derive(Debug, Error)]
pub enum LlbError {
    #[error("Invalid image reference {0}: {1}")]
    InvalidReference(String, String),

    #[error("No mount at {0} in exec operation")]
    UnknownMount(String),

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Failed to serialize operation: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type LlbResult<T> = Result<T, LlbError>;
