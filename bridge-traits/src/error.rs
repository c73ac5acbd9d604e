use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Remote entry not found: {0}")]
    NotFound(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication required: {0}")]
    Unauthorized(String),

    #[error("Storage operation failed: {0}")]
    OperationFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// True when the error means the addressed entry does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, BridgeError::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
