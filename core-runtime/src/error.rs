use thiserror::Error;

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Logging initialization failed: {0}")]
    LoggingInit(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, RuntimeError>;
