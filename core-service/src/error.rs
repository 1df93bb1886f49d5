use core_auth::{BindingError, ErrorKind};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Core initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Capability missing: {capability} - {message}")]
    CapabilityMissing { capability: String, message: String },

    #[error(transparent)]
    Binding(#[from] BindingError),

    #[error("Runtime error: {0}")]
    Runtime(core_runtime::Error),
}

impl CoreError {
    /// Classification for the request boundary. Anything that is not a
    /// binding failure is internal.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Binding(e) => e.kind(),
            _ => ErrorKind::Internal,
        }
    }
}

impl From<core_runtime::Error> for CoreError {
    fn from(err: core_runtime::Error) -> Self {
        match err {
            core_runtime::Error::CapabilityMissing {
                capability,
                message,
            } => CoreError::CapabilityMissing {
                capability,
                message,
            },
            other => CoreError::Runtime(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
