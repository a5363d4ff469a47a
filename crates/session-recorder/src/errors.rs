use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),
    #[error("recording serialization failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("action index {0} out of range")]
    IndexOutOfRange(usize),
    #[error("recording '{0}' not found")]
    NotFound(String),
}
