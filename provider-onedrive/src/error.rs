use bridge_traits::error::BridgeError;
use core_auth::BindingError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OneDriveError {
    #[error("Graph API error (status {status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    #[error("Throttled, retry after {0} seconds")]
    Throttled(u64),

    #[error("Authentication required")]
    AuthRequired,

    #[error("No bound account")]
    NotBound,

    #[error("HTTP error: {0}")]
    Http(#[from] BridgeError),
}

impl From<OneDriveError> for BindingError {
    fn from(err: OneDriveError) -> Self {
        BindingError::TokenRefreshFailed(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, OneDriveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = OneDriveError::ApiError {
            status_code: 404,
            message: "itemNotFound".to_string(),
        };
        assert_eq!(err.to_string(), "Graph API error (status 404): itemNotFound");
        assert_eq!(
            OneDriveError::Throttled(30).to_string(),
            "Throttled, retry after 30 seconds"
        );
    }

    #[test]
    fn test_into_binding_error() {
        let err: BindingError = OneDriveError::AuthRequired.into();
        assert!(matches!(err, BindingError::TokenRefreshFailed(ref m) if m == "Authentication required"));
    }
}
