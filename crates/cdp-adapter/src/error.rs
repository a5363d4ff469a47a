use std::fmt;

use thiserror::Error;

/// Error categories surfaced by the driver adapter.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
pub enum DriverErrorKind {
    #[error("operation timed out")]
    Timeout,
    #[error("element not found")]
    ElementNotFound,
    #[error("invalid selector")]
    InvalidSelector,
    #[error("target detached")]
    Detached,
    #[error("browser connection lost")]
    DriverGone,
    #[error("internal driver error")]
    Internal,
}

/// Driver error with an optional human hint. Raw CDP and transport failures
/// are translated into one of the [`DriverErrorKind`]s at this boundary;
/// upper layers never see protocol-level error shapes.
#[derive(Clone, Debug)]
pub struct DriverError {
    pub kind: DriverErrorKind,
    pub hint: Option<String>,
}

impl DriverError {
    pub fn new(kind: DriverErrorKind) -> Self {
        Self { kind, hint: None }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn timeout(hint: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::Timeout).with_hint(hint)
    }

    pub fn element_not_found(hint: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::ElementNotFound).with_hint(hint)
    }

    pub fn internal(hint: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::Internal).with_hint(hint)
    }

    pub fn gone(hint: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::DriverGone).with_hint(hint)
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(hint) = &self.hint {
            write!(f, ": {}", hint)?;
        }
        Ok(())
    }
}

impl std::error::Error for DriverError {}
