use thiserror::Error;

/// Main error type for Tracewright operations
#[derive(Error, Debug)]
pub enum TracewrightError {
    #[error("'{parent}' is not a valid parent language type for '{child}'")]
    InvalidParent { parent: String, child: String },

    #[error("Duplicated LanguageObject id: {0}")]
    DuplicateObjectId(u64),

    #[error("No LanguageObject with id {0}")]
    MissingObject(u64),

    #[error("Exit event with no matching enter (correlation id {0})")]
    Desync(u64),

    #[error("A capture session is already active in this process")]
    SessionActive,

    #[error("Capture worker terminated before draining the end-of-capture sentinel")]
    CaptureAborted,

    #[error("Call graph load error: {0}")]
    LoadFormat(String),

    #[error("Code generation error: {0}")]
    Generation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TracewrightError>;
