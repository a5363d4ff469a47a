//! Service-level error taxonomy and its HTTP mapping.
//!
//! Subsystem errors are translated into [`ControlError`] kinds at the
//! manager boundary; the API surface turns each kind into a single status
//! code with an `{"error": "..."}` body.

use std::fmt;

use action_primitives::ActionError;
use ax_view::AxViewError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use cdp_adapter::{DriverError, DriverErrorKind};
use serde_json::json;
use session_recorder::RecorderError;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    BadRequest,
    PageNotFound,
    UnsupportedMethod,
    InvalidSelector,
    ElementNotFound,
    NoXPathForEncodedId,
    XPathMapNotCached,
    Timeout,
    DialogNotFired,
    DriverGone,
    AxExtractionFailed,
    RecordingNotFound,
    FilesystemError,
    Forbidden,
    Internal,
}

#[derive(Clone, Debug)]
pub struct ControlError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ControlError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, message)
    }

    pub fn page_not_found(id: &str) -> Self {
        Self::new(ErrorKind::PageNotFound, format!("page '{id}' not found"))
    }

    pub fn recording_not_found(id: &str) -> Self {
        Self::new(
            ErrorKind::RecordingNotFound,
            format!("recording '{id}' not found"),
        )
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Forbidden, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn status(&self) -> StatusCode {
        match self.kind {
            ErrorKind::BadRequest
            | ErrorKind::UnsupportedMethod
            | ErrorKind::InvalidSelector
            | ErrorKind::ElementNotFound
            | ErrorKind::NoXPathForEncodedId
            | ErrorKind::XPathMapNotCached
            | ErrorKind::DialogNotFired => StatusCode::BAD_REQUEST,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::PageNotFound | ErrorKind::RecordingNotFound => StatusCode::NOT_FOUND,
            ErrorKind::Timeout => StatusCode::REQUEST_TIMEOUT,
            ErrorKind::DriverGone
            | ErrorKind::AxExtractionFailed
            | ErrorKind::FilesystemError
            | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for ControlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ControlError {}

impl IntoResponse for ControlError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<DriverError> for ControlError {
    fn from(err: DriverError) -> Self {
        let kind = match err.kind {
            DriverErrorKind::Timeout => ErrorKind::Timeout,
            DriverErrorKind::ElementNotFound => ErrorKind::ElementNotFound,
            DriverErrorKind::InvalidSelector => ErrorKind::InvalidSelector,
            DriverErrorKind::Detached => ErrorKind::PageNotFound,
            DriverErrorKind::DriverGone => ErrorKind::DriverGone,
            DriverErrorKind::Internal => ErrorKind::Internal,
        };
        Self::new(kind, err.to_string())
    }
}

impl From<ActionError> for ControlError {
    fn from(err: ActionError) -> Self {
        let message = err.to_string();
        match err {
            ActionError::UnsupportedMethod(_) => Self::new(ErrorKind::UnsupportedMethod, message),
            ActionError::InvalidArgs(_) => Self::new(ErrorKind::BadRequest, message),
            ActionError::NoXPathForEncodedId(_) => {
                Self::new(ErrorKind::NoXPathForEncodedId, message)
            }
            ActionError::XPathMapNotCached => Self::new(ErrorKind::XPathMapNotCached, message),
            ActionError::DialogNotFired => Self::new(ErrorKind::DialogNotFired, message),
            ActionError::Driver(driver) => driver.into(),
        }
    }
}

impl From<AxViewError> for ControlError {
    fn from(err: AxViewError) -> Self {
        Self::new(ErrorKind::AxExtractionFailed, err.to_string())
    }
}

impl From<RecorderError> for ControlError {
    fn from(err: RecorderError) -> Self {
        let message = err.to_string();
        match err {
            RecorderError::Io(_) => Self::new(ErrorKind::FilesystemError, message),
            RecorderError::Json(_) => Self::new(ErrorKind::Internal, message),
            RecorderError::IndexOutOfRange(_) => Self::new(ErrorKind::BadRequest, message),
            RecorderError::NotFound(_) => Self::new(ErrorKind::RecordingNotFound, message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_contractual_statuses() {
        assert_eq!(
            ControlError::bad_request("x").status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ControlError::page_not_found("p").status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ControlError::recording_not_found("r").status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ControlError::forbidden("no").status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ControlError::new(ErrorKind::Timeout, "slow").status(),
            StatusCode::REQUEST_TIMEOUT
        );
        assert_eq!(
            ControlError::internal("boom").status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn driver_errors_translate() {
        let err: ControlError = DriverError::timeout("nav").into();
        assert_eq!(err.kind, ErrorKind::Timeout);
        let err: ControlError = DriverError::element_not_found("gone").into();
        assert_eq!(err.kind, ErrorKind::ElementNotFound);
    }

    #[test]
    fn action_errors_translate() {
        let err: ControlError = ActionError::UnsupportedMethod("swipe".into()).into();
        assert_eq!(err.kind, ErrorKind::UnsupportedMethod);
        let err: ControlError = ActionError::XPathMapNotCached.into();
        assert_eq!(err.kind, ErrorKind::XPathMapNotCached);
        let err: ControlError = ActionError::DialogNotFired.into();
        assert_eq!(err.kind, ErrorKind::DialogNotFired);
    }
}
