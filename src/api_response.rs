//! The JSON envelope shared by every route, and a JSON body extractor that
//! reports malformed bodies in the same envelope.
//!
//! Every response body has the shape
//! `{"status": "success" | "error", "data"?: ..., "message"?: ..., "errors"?: [...]}`.

use axum::{
    Json,
    extract::{FromRequest, rejection::JsonRejection},
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
enum ApiStatus {
    Success,
    Error,
}

/// The envelope for a successful response.
///
/// Serializes as `{"status": "success", "data": ...}` and responds with
/// HTTP 200.
#[derive(Debug, Serialize)]
pub struct ApiSuccess<T> {
    status: ApiStatus,
    data: T,
}

impl<T: Serialize> ApiSuccess<T> {
    pub fn new(data: T) -> Self {
        Self {
            status: ApiStatus::Success,
            data,
        }
    }

    /// Unwrap the envelope, e.g. to inspect the data in tests.
    pub fn into_data(self) -> T {
        self.data
    }
}

impl<T: Serialize> IntoResponse for ApiSuccess<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

/// The envelope for a failed response.
///
/// Serializes as `{"status": "error", "message": "..."}` plus an `errors`
/// array when field-level detail is available. The HTTP status code is chosen
/// by the error type that builds this envelope, not here.
#[derive(Debug, Serialize)]
pub struct ApiError {
    status: ApiStatus,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<Vec<String>>,
}

impl ApiError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: ApiStatus::Error,
            message: message.into(),
            errors: None,
        }
    }

    pub fn with_errors(message: impl Into<String>, errors: Vec<String>) -> Self {
        Self {
            status: ApiStatus::Error,
            message: message.into(),
            errors: Some(errors),
        }
    }
}

/// A drop-in replacement for [axum::Json] whose rejection maps malformed
/// request bodies (invalid JSON, wrong field types) onto [Error::InvalidBody],
/// so clients get the 400 envelope instead of axum's default 422 plain text.
#[derive(FromRequest)]
#[from_request(via(Json), rejection(Error))]
pub struct ApiJson<T>(pub T);

impl From<JsonRejection> for Error {
    fn from(rejection: JsonRejection) -> Self {
        Error::InvalidBody {
            errors: vec![rejection.body_text()],
        }
    }
}

#[cfg(test)]
mod envelope_tests {
    use serde_json::{json, to_value};

    use super::{ApiError, ApiSuccess};

    #[test]
    fn success_envelope_wraps_data() {
        let envelope = ApiSuccess::new(json!({ "answer": 42 }));

        let got = to_value(&envelope).expect("Could not serialize envelope");

        assert_eq!(got, json!({"status": "success", "data": {"answer": 42}}));
    }

    #[test]
    fn error_envelope_has_message_only() {
        let envelope = ApiError::new("Transaction not found.");

        let got = to_value(&envelope).expect("Could not serialize envelope");

        assert_eq!(
            got,
            json!({"status": "error", "message": "Transaction not found."})
        );
    }

    #[test]
    fn error_envelope_includes_field_errors() {
        let envelope = ApiError::with_errors(
            "Invalid body fields.",
            vec!["amount: must be a number".to_string()],
        );

        let got = to_value(&envelope).expect("Could not serialize envelope");

        assert_eq!(
            got,
            json!({
                "status": "error",
                "message": "Invalid body fields.",
                "errors": ["amount: must be a number"],
            })
        );
    }
}
