use std::any::Any;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use common::types::ApiMessage;
use service::LockError;
use tracing::error;

pub const NOT_FOUND_MESSAGE: &str = "Endpoint not found.";
pub const INTERNAL_MESSAGE: &str = "Internal server error.";

/// Failure response rendered as `{success: false, message}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: &'static str,
}

impl ApiError {
    pub fn new(status: StatusCode, message: &'static str) -> Self {
        Self { status, message }
    }

    pub fn bad_request(message: &'static str) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, NOT_FOUND_MESSAGE)
    }

    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_MESSAGE)
    }

    /// Map a store outcome to its HTTP form. `invalid_message` is the
    /// endpoint-specific text for malformed input.
    pub fn from_lock_error(err: LockError, invalid_message: &'static str) -> Self {
        match err {
            LockError::InvalidRequest(_) => Self::bad_request(invalid_message),
            LockError::AlreadyLocked => {
                Self::new(StatusCode::CONFLICT, "Table is currently locked by another user.")
            }
            LockError::NotLocked => {
                Self::bad_request("Unlock failed: Table not locked or lock expired.")
            }
            LockError::WrongOwner => {
                Self::bad_request("Unlock failed: Table not locked by this user.")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ApiMessage::fail(self.message))).into_response()
    }
}

/// Panic hook for `CatchPanicLayer`: log the payload, answer with a generic 500.
pub fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s
    } else {
        "unknown panic payload"
    };
    error!(event = "handler_panic", %detail, "request handler panicked");
    ApiError::internal().into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_errors_map_to_status_codes() {
        let invalid = "Invalid request.";
        assert_eq!(
            ApiError::from_lock_error(LockError::InvalidRequest("x"), invalid),
            ApiError::bad_request(invalid)
        );
        assert_eq!(
            ApiError::from_lock_error(LockError::AlreadyLocked, invalid).status,
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from_lock_error(LockError::NotLocked, invalid).status,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from_lock_error(LockError::WrongOwner, invalid).message,
            "Unlock failed: Table not locked by this user."
        );
    }

    #[test]
    fn panic_response_hides_detail() {
        let res = handle_panic(Box::new("db password is hunter2".to_string()));
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
