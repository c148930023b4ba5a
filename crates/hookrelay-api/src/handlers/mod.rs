//! HTTP request handlers for the hookrelay API.
//!
//! Handlers are grouped by functionality:
//! - `notifications` - event ingress, direct JSON and Pub/Sub push
//! - `health` - health and liveness checks
//!
//! # Error Handling
//!
//! Input problems are answered with `400` and a list of field errors before
//! anything is submitted. Errors surfaced by a dispatch task are answered
//! with the status of their kind and a `{error: {code, message}}` body.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use hookrelay_dispatch::RelayError;
use serde::Serialize;

pub mod health;
pub mod notifications;

pub use health::{health_check, liveness_check};
pub use notifications::{receive_notification, receive_pubsub_push};

/// Error response with code and message.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error details including code and message
    pub error: ErrorDetail,
}

/// Detailed error information.
#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    /// Machine-readable error code
    pub code: String,
    /// Human-readable error description
    pub message: String,
}

/// Validation failure listing every offending field.
#[derive(Debug, Serialize)]
pub struct ValidationErrorResponse {
    /// One entry per invalid field
    pub errors: Vec<FieldError>,
}

/// A single invalid input field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// Field name, e.g. `id`, or `body` for an undecodable document
    pub field: String,
    /// What is wrong with it
    pub message: String,
}

impl FieldError {
    /// Creates a field error.
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self { field: field.into(), message: message.into() }
    }
}

/// Answers with the status and body for a surfaced relay error.
pub(crate) fn error_response(error: &RelayError) -> Response {
    let body = ErrorResponse {
        error: ErrorDetail { code: error.code().to_string(), message: error.to_string() },
    };

    (error.status_code(), Json(body)).into_response()
}

/// Answers `400 Bad Request` with the collected field errors.
pub(crate) fn validation_response(errors: Vec<FieldError>) -> Response {
    (StatusCode::BAD_REQUEST, Json(ValidationErrorResponse { errors })).into_response()
}
