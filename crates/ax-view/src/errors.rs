use thiserror::Error;

#[derive(Debug, Error)]
pub enum AxViewError {
    /// Acquiring the accessibility trees or DOM documents failed; the
    /// snapshot cannot be built.
    #[error("accessibility extraction failed: {0}")]
    ExtractionFailed(String),
    #[error("internal accessibility-view error: {0}")]
    Internal(String),
}
