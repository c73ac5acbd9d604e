use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    /// The remote directory is unreachable; the whole pass aborts.
    #[error("Cloud source not ready")]
    SourceNotReady,

    /// The local store failed on a read; the whole pass aborts.
    #[error("Local store access failed: {0}")]
    DbAccess(String),

    /// Another sync pass is already running.
    #[error("Sync already in progress")]
    SyncInProgress,

    /// A remote document failed the integrity checks (malformed JSON,
    /// unknown envelope version, id mismatch, empty content). The document
    /// is treated as absent.
    #[error("Invalid item document: {0}")]
    InvalidDocument(String),

    /// A remote operation failed.
    #[error("Cloud operation failed: {0}")]
    Cloud(String),

    /// The addressed item does not exist locally or remotely.
    #[error("Item not found: {0}")]
    NotFound(String),

    /// The settings store failed.
    #[error("Settings access failed: {0}")]
    Settings(String),
}

pub type Result<T> = std::result::Result<T, SyncError>;

impl SyncError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, SyncError::NotFound(_))
    }
}

impl From<core_store::StoreError> for SyncError {
    fn from(e: core_store::StoreError) -> Self {
        match e {
            core_store::StoreError::NotFound(s) => SyncError::NotFound(s),
            other => SyncError::DbAccess(other.to_string()),
        }
    }
}

impl From<bridge_traits::BridgeError> for SyncError {
    fn from(e: bridge_traits::BridgeError) -> Self {
        match e {
            bridge_traits::BridgeError::NotFound(s) => SyncError::NotFound(s),
            other => SyncError::Cloud(other.to_string()),
        }
    }
}
