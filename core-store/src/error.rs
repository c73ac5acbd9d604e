use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    /// The addressed item does not exist.
    #[error("Item not found: {0}")]
    NotFound(String),

    /// A uniqueness constraint on the item's natural key was violated.
    ///
    /// Callers retry with a duplicate-slot save.
    #[error("Constraint violation: {0}")]
    Conflict(String),

    #[error("Invalid stored data: {0}")]
    InvalidData(String),

    #[error("Database error: {0}")]
    Database(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::RowNotFound => StoreError::NotFound(e.to_string()),
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::Conflict(db.to_string())
            }
            _ => StoreError::Database(e.to_string()),
        }
    }
}
