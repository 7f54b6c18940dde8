use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON Parsing Error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid duration: {0}s (must be a positive number of seconds)")]
    InvalidDuration(u32),

    #[error("Empty passage registered for language {0}")]
    EmptyPassage(String),

    #[error("No passages registered for language {0}")]
    EmptyPool(String),

    #[error("Default language {0} is not registered")]
    MissingDefault(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
