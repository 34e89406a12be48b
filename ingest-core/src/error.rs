use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Format error: {0}")]
    Format(String),

    #[error("Object store error: {0}")]
    Store(String),

    #[error("Tracking store error: {0}")]
    Tracking(String),

    /// Destination write or verification failed; staging copies are untouched.
    #[error("Relocation failed for {key}: {reason}")]
    Relocation { key: String, reason: String },

    #[error("Config error: {0}")]
    Config(String),
}

// Convenient crate-wide result type
pub type Result<T> = std::result::Result<T, IngestError>;
