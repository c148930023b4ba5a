//! Classified error taxonomy for relay operations.
//!
//! Every failure the pipeline can surface is one of a closed set of kinds.
//! Provider responses are classified once, by [`classify`], at the provider
//! boundary; every layer above matches on the resulting [`RelayError`]
//! instead of re-deriving meaning from raw status codes.

use std::fmt;

use http::StatusCode;
use thiserror::Error;

/// Result type alias for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;

/// Classified failure of a relay operation.
///
/// Each variant carries a machine-readable `code` and a human readable
/// `detail`. The variant is chosen once at classification time and is never
/// reinterpreted downstream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    /// Request rejected as malformed or semantically invalid (400, 422).
    #[error("validation failed [{code}]: {detail}")]
    Validation {
        /// Machine-readable reason
        code: String,
        /// Human readable description
        detail: String,
    },

    /// Credential missing or rejected (401).
    #[error("authentication failed: {detail}")]
    Auth {
        /// Human readable description
        detail: String,
    },

    /// Credential valid but not permitted (403).
    #[error("forbidden: {detail}")]
    Forbidden {
        /// Human readable description
        detail: String,
    },

    /// Target resource does not exist (404).
    #[error("not found [{code}]: {detail}")]
    NotFound {
        /// Machine-readable reason
        code: String,
        /// Human readable description
        detail: String,
    },

    /// Resource already exists; for messages, an idempotent duplicate (409).
    #[error("conflict: {detail}")]
    Conflict {
        /// Human readable description
        detail: String,
    },

    /// Payload exceeds the provider's size limit (413).
    #[error("payload too large: {detail}")]
    PayloadTooLarge {
        /// Human readable description
        detail: String,
    },

    /// Provider throttled the request (429).
    #[error("rate limited: {detail}")]
    RateLimited {
        /// Human readable description
        detail: String,
    },

    /// Provider or transport failure expected to be transient (5xx).
    #[error("internal error [{code}]: {detail}")]
    Internal {
        /// Machine-readable reason
        code: String,
        /// Human readable description
        detail: String,
    },

    /// Response outside the classified table, passed through opaquely.
    #[error("unexpected provider response{}: {detail}", status_suffix(.status))]
    Unknown {
        /// HTTP status, when the provider answered at all
        status: Option<u16>,
        /// Machine-readable reason
        code: String,
        /// Human readable description
        detail: String,
    },
}

impl RelayError {
    /// Creates a validation error.
    pub fn validation(code: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Validation { code: code.into(), detail: detail.into() }
    }

    /// Creates an authentication error.
    pub fn auth(detail: impl Into<String>) -> Self {
        Self::Auth { detail: detail.into() }
    }

    /// Creates a forbidden error.
    pub fn forbidden(detail: impl Into<String>) -> Self {
        Self::Forbidden { detail: detail.into() }
    }

    /// Creates a not-found error.
    pub fn not_found(code: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::NotFound { code: code.into(), detail: detail.into() }
    }

    /// Creates a conflict (duplicate) error.
    pub fn conflict(detail: impl Into<String>) -> Self {
        Self::Conflict { detail: detail.into() }
    }

    /// Creates a payload-too-large error.
    pub fn payload_too_large(detail: impl Into<String>) -> Self {
        Self::PayloadTooLarge { detail: detail.into() }
    }

    /// Creates a rate-limited error.
    pub fn rate_limited(detail: impl Into<String>) -> Self {
        Self::RateLimited { detail: detail.into() }
    }

    /// Creates an internal error.
    pub fn internal(code: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Internal { code: code.into(), detail: detail.into() }
    }

    /// Creates an unknown error.
    pub fn unknown(status: Option<u16>, code: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Unknown { status, code: code.into(), detail: detail.into() }
    }

    /// Returns the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::from(self)
    }

    /// Returns the machine-readable error code.
    pub fn code(&self) -> &str {
        match self {
            Self::Validation { code, .. }
            | Self::NotFound { code, .. }
            | Self::Internal { code, .. }
            | Self::Unknown { code, .. } => code,
            Self::Auth { .. } => "unauthorized",
            Self::Forbidden { .. } => "forbidden",
            Self::Conflict { .. } => "duplicate",
            Self::PayloadTooLarge { .. } => "payload_too_large",
            Self::RateLimited { .. } => "rate_limited",
        }
    }

    /// Returns the human readable detail.
    pub fn detail(&self) -> &str {
        match self {
            Self::Validation { detail, .. }
            | Self::Auth { detail }
            | Self::Forbidden { detail }
            | Self::NotFound { detail, .. }
            | Self::Conflict { detail }
            | Self::PayloadTooLarge { detail }
            | Self::RateLimited { detail }
            | Self::Internal { detail, .. }
            | Self::Unknown { detail, .. } => detail,
        }
    }

    /// Determines if this error is transient and worth another attempt.
    ///
    /// Only rate limiting and internal provider failures are retried; every
    /// other kind fails immediately.
    pub fn is_retryable(&self) -> bool {
        match self.kind() {
            ErrorKind::RateLimited | ErrorKind::Internal => true,
            ErrorKind::Validation
            | ErrorKind::Auth
            | ErrorKind::Forbidden
            | ErrorKind::NotFound
            | ErrorKind::Conflict
            | ErrorKind::PayloadTooLarge
            | ErrorKind::Unknown => false,
        }
    }

    /// Returns `true` when the provider reported an idempotent duplicate.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// HTTP status an ingress layer should answer with for this error.
    pub fn status_code(&self) -> StatusCode {
        self.kind().status_code()
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|status| format!(" (HTTP {status})")).unwrap_or_default()
}

/// Fieldless kind of a [`RelayError`], for matching and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or invalid request.
    Validation,
    /// Authentication failure.
    Auth,
    /// Authorization failure.
    Forbidden,
    /// Missing resource.
    NotFound,
    /// Duplicate resource or message.
    Conflict,
    /// Oversized payload.
    PayloadTooLarge,
    /// Throttled request.
    RateLimited,
    /// Transient provider or transport failure.
    Internal,
    /// Unclassified response.
    Unknown,
}

impl ErrorKind {
    /// HTTP status associated with this kind.
    pub fn status_code(self) -> StatusCode {
        match self {
            Self::Validation => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Auth => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Conflict => StatusCode::CONFLICT,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal | Self::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<&RelayError> for ErrorKind {
    fn from(error: &RelayError) -> Self {
        match error {
            RelayError::Validation { .. } => Self::Validation,
            RelayError::Auth { .. } => Self::Auth,
            RelayError::Forbidden { .. } => Self::Forbidden,
            RelayError::NotFound { .. } => Self::NotFound,
            RelayError::Conflict { .. } => Self::Conflict,
            RelayError::PayloadTooLarge { .. } => Self::PayloadTooLarge,
            RelayError::RateLimited { .. } => Self::RateLimited,
            RelayError::Internal { .. } => Self::Internal,
            RelayError::Unknown { .. } => Self::Unknown,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::Auth => write!(f, "auth"),
            Self::Forbidden => write!(f, "forbidden"),
            Self::NotFound => write!(f, "not_found"),
            Self::Conflict => write!(f, "conflict"),
            Self::PayloadTooLarge => write!(f, "payload_too_large"),
            Self::RateLimited => write!(f, "rate_limited"),
            Self::Internal => write!(f, "internal"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Classifies a provider response status into the error taxonomy.
///
/// The mapping is fixed: 400/422 validation, 401 auth, 403 forbidden,
/// 404 not found, 409 conflict, 413 payload too large, 429 rate limited,
/// any 5xx internal, anything else unknown.
pub fn classify(status: u16, message: impl Into<String>) -> RelayError {
    let detail = message.into();
    match status {
        400 => RelayError::validation("invalid_request", detail),
        401 => RelayError::auth(detail),
        403 => RelayError::forbidden(detail),
        404 => RelayError::not_found("not_found", detail),
        409 => RelayError::conflict(detail),
        413 => RelayError::payload_too_large(detail),
        422 => RelayError::validation("validation_failed", detail),
        429 => RelayError::rate_limited(detail),
        500.. => RelayError::internal("internal_error", detail),
        _ => RelayError::unknown(Some(status), "unknown", detail),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_table_matches_provider_statuses() {
        let cases = [
            (400, ErrorKind::Validation),
            (401, ErrorKind::Auth),
            (403, ErrorKind::Forbidden),
            (404, ErrorKind::NotFound),
            (409, ErrorKind::Conflict),
            (413, ErrorKind::PayloadTooLarge),
            (422, ErrorKind::Validation),
            (429, ErrorKind::RateLimited),
            (500, ErrorKind::Internal),
            (502, ErrorKind::Internal),
            (503, ErrorKind::Internal),
            (599, ErrorKind::Internal),
        ];

        for (status, expected) in cases {
            assert_eq!(classify(status, "detail").kind(), expected, "status {status}");
        }
    }

    #[test]
    fn unmapped_statuses_pass_through_as_unknown() {
        for status in [200, 302, 405, 410, 418, 451] {
            let error = classify(status, "teapot");
            assert_eq!(error.kind(), ErrorKind::Unknown);
            assert!(matches!(error, RelayError::Unknown { status: Some(s), .. } if s == status));
        }
    }

    #[test]
    fn validation_codes_distinguish_400_from_422() {
        assert_eq!(classify(400, "bad").code(), "invalid_request");
        assert_eq!(classify(422, "bad").code(), "validation_failed");
    }

    #[test]
    fn only_rate_limited_and_internal_are_retryable() {
        assert!(classify(429, "slow down").is_retryable());
        assert!(classify(500, "boom").is_retryable());
        assert!(RelayError::internal("transport_error", "connection reset").is_retryable());

        for status in [400, 401, 403, 404, 409, 413, 422, 418] {
            assert!(!classify(status, "nope").is_retryable(), "status {status}");
        }
    }

    #[test]
    fn detail_is_preserved_verbatim() {
        let error = classify(409, "message already exists");
        assert!(error.is_duplicate());
        assert_eq!(error.detail(), "message already exists");
        assert_eq!(error.code(), "duplicate");
    }

    #[test]
    fn status_codes_follow_error_kind() {
        assert_eq!(classify(400, "").status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(classify(429, "").status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(classify(503, "").status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(classify(418, "").status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            RelayError::not_found("unknown_project", "no route").status_code(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn error_display_format() {
        assert_eq!(classify(429, "slow down").to_string(), "rate limited: slow down");
        assert_eq!(
            classify(418, "teapot").to_string(),
            "unexpected provider response (HTTP 418): teapot"
        );
        assert_eq!(
            RelayError::unknown(None, "decode_error", "bad json").to_string(),
            "unexpected provider response: bad json"
        );
        assert_eq!(ErrorKind::PayloadTooLarge.to_string(), "payload_too_large");
    }
}
