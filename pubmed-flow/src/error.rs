use std::path::PathBuf;

use thiserror::Error;

use crate::intent::Feature;

/// Errors raised while turning a request intent into a response.
#[derive(Debug, Error)]
pub enum FlowError {
    /// Missing or malformed parameter. The message is shown to the client as is.
    #[error("{0}")]
    InvalidRequest(String),

    /// The external script could not be spawned, exited non-zero, or wrote
    /// non-informational output to stderr.
    #[error("{feature} invocation failed: {diagnostic}")]
    ExecutionFailed { feature: Feature, diagnostic: String },

    /// Scratch file or artifact directory access failed.
    #[error("storage failure at {}: {source}", path.display())]
    StorageFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Coarse classification used by the response normalizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidRequest,
    ExecutionFailed,
    StorageFailed,
}

impl FlowError {
    pub fn invalid(message: impl Into<String>) -> Self {
        FlowError::InvalidRequest(message.into())
    }

    pub fn execution(feature: Feature, diagnostic: impl Into<String>) -> Self {
        FlowError::ExecutionFailed {
            feature,
            diagnostic: diagnostic.into(),
        }
    }

    pub fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        FlowError::StorageFailed {
            path: path.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            FlowError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            FlowError::ExecutionFailed { .. } => ErrorKind::ExecutionFailed,
            FlowError::StorageFailed { .. } => ErrorKind::StorageFailed,
        }
    }

    /// HTTP-equivalent status for this error.
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::InvalidRequest => 400,
            ErrorKind::ExecutionFailed | ErrorKind::StorageFailed => 500,
        }
    }

    /// Message safe to return to the client. Raw diagnostics never leave the process.
    pub fn public_message(&self) -> String {
        match self {
            FlowError::InvalidRequest(message) => message.clone(),
            FlowError::ExecutionFailed { feature, .. } => feature.failure_message().to_string(),
            FlowError::StorageFailed { .. } => {
                "Failed to access request storage, please retry".to_string()
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, FlowError>;
