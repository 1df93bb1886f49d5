use bridge_traits::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BindingError {
    #[error("Missing required field: {field}")]
    Validation { field: &'static str },

    #[error("Invalid state")]
    InvalidState,

    #[error("Token exchange failed: {0}")]
    Exchange(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid provider URL: {0}")]
    InvalidProviderUrl(String),

    #[error("Token refresh failed: {0}")]
    TokenRefreshFailed(String),
}

/// Coarse classification for the boundary layer (HTTP status mapping and
/// the like).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller supplied incomplete input
    Validation,
    /// Unknown, expired or consumed binding state
    InvalidState,
    /// Identity provider rejected or failed the request
    Exchange,
    /// Anything on our side
    Internal,
}

impl BindingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BindingError::Validation { .. } => ErrorKind::Validation,
            BindingError::InvalidState => ErrorKind::InvalidState,
            BindingError::Exchange(_) | BindingError::TokenRefreshFailed(_) => {
                ErrorKind::Exchange
            }
            BindingError::Storage(_)
            | BindingError::Serialization(_)
            | BindingError::InvalidProviderUrl(_) => ErrorKind::Internal,
        }
    }

    /// Whether starting over with a fresh `bind` can succeed.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self.kind(), ErrorKind::Internal)
    }
}

impl From<BridgeError> for BindingError {
    fn from(err: BridgeError) -> Self {
        BindingError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for BindingError {
    fn from(err: serde_json::Error) -> Self {
        BindingError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BindingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_state_message_is_generic() {
        assert_eq!(BindingError::InvalidState.to_string(), "Invalid state");
    }

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            BindingError::Validation {
                field: "client_id"
            }
            .kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            BindingError::Exchange("400".into()).kind(),
            ErrorKind::Exchange
        );
        assert_eq!(
            BindingError::from(BridgeError::DatabaseError("locked".into())).kind(),
            ErrorKind::Internal
        );
        assert!(!BindingError::Storage("x".into()).is_recoverable());
        assert!(BindingError::InvalidState.is_recoverable());
    }
}
