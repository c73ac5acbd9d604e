use bridge_traits::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OneDriveError {
    #[error("API request failed with status {status_code}: {message}")]
    ApiError { status_code: u16, message: String },

    #[error("Drive item not found: {0}")]
    NotFound(String),

    #[error("Authentication required")]
    AuthRequired,

    #[error("Unexpected API response: {0}")]
    InvalidResponse(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, OneDriveError>;

impl From<OneDriveError> for BridgeError {
    fn from(e: OneDriveError) -> Self {
        match e {
            OneDriveError::NotFound(path) => BridgeError::NotFound(path),
            OneDriveError::AuthRequired => {
                BridgeError::Unauthorized("Graph rejected the access token".to_string())
            }
            OneDriveError::Http(inner) => BridgeError::Network(inner.to_string()),
            other => BridgeError::OperationFailed(other.to_string()),
        }
    }
}
