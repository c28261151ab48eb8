//! Error types for the residents API.
//!
//! Two layers live here:
//!
//! - [`Error`] is what every store, cache and handler operation returns.
//! - [`ApiError`] is the HTTP-facing shape. Handlers convert at the boundary
//!   with [`Error::into_api_error`], after the failure has been logged, so
//!   every response carries the same `{"error", "details"}` body.

use actix_web::{
    http::{header, StatusCode},
    HttpResponse, ResponseError,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;

/// Result type for API operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Detail shown for 500 responses when debug mode is off.
const HIDDEN_DETAIL: &str = "An unexpected error occurred";

/// Error kinds raised while serving a request.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Payload or cross-entity validation failed.
    ///
    /// The detail is either a list (one entry per submitted item, or a list of
    /// messages) or a field map, and is returned to the client verbatim.
    #[error("Validation error: {0}")]
    Validation(Value),

    /// The `type` value does not name a known record kind.
    #[error("Invalid type specified")]
    InvalidType,

    /// A write request is missing `type` or `data`.
    #[error("Both type and data are required fields")]
    MissingPayload,

    /// A bulk request carries more items than the configured ceiling.
    #[error("Bulk operation exceeds maximum size of {max}")]
    BulkOperation { max: usize },

    /// The addressed record (or page) does not exist.
    #[error("{0}")]
    NotFound(String),

    /// No valid credentials were presented.
    #[error("{0}")]
    Unauthorized(String),

    /// Credentials are valid but do not allow the operation.
    #[error("{0}")]
    PermissionDenied(String),

    /// The caller exceeded one of the throttle rates.
    #[error("Rate limit exceeded. Please try again later.")]
    RateLimited { retry_after: Duration },

    /// The relational store failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migration failed at startup.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Cache payload could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Cache entry header is not ours.
    #[error("Invalid cache entry: {0}")]
    InvalidCacheEntry(String),

    /// Cache entry was written by a different envelope version.
    #[error("Cache version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    /// Invalid configuration value.
    #[error("Config error: {0}")]
    Config(String),
}

impl Error {
    /// Validation failure carrying a single message.
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation(json!([message.into()]))
    }

    /// Short kind name used in error log events.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Validation(_) | Error::MissingPayload | Error::InvalidType => "Validation",
            Error::BulkOperation { .. } => "BulkOperation",
            Error::NotFound(_) => "NotFound",
            Error::Unauthorized(_) => "NotAuthenticated",
            Error::PermissionDenied(_) => "PermissionDenied",
            Error::RateLimited { .. } => "Throttled",
            _ => "Unexpected",
        }
    }

    /// HTTP status this error maps to.
    pub fn status(&self) -> StatusCode {
        match self {
            Error::Validation(_)
            | Error::InvalidType
            | Error::MissingPayload
            | Error::BulkOperation { .. } => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::PermissionDenied(_) => StatusCode::FORBIDDEN,
            Error::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Convert into the uniform HTTP error shape.
    ///
    /// Details of unexpected errors are only exposed when `debug` is set.
    pub fn into_api_error(self, debug: bool) -> ApiError {
        let status = self.status();
        match self {
            Error::Validation(detail) => ApiError::bad_request()
                .title("Validation error")
                .details(detail),
            Error::InvalidType | Error::MissingPayload => {
                ApiError::bad_request().title(self.to_string())
            }
            Error::BulkOperation { .. } => ApiError::bad_request()
                .title("Bulk operation error")
                .detail(self.to_string()),
            Error::NotFound(msg) => ApiError::not_found().detail(msg),
            Error::Unauthorized(msg) => ApiError::new(status)
                .title("Authentication failed")
                .detail(msg),
            Error::PermissionDenied(msg) => ApiError::new(status)
                .title("Permission denied")
                .detail(msg),
            Error::RateLimited { retry_after } => {
                let secs = retry_after.as_secs().max(1);
                let mut err = ApiError::new(status)
                    .title("Rate limit exceeded")
                    .detail(format!(
                        "Request was throttled. Expected available in {} seconds.",
                        secs
                    ));
                err.retry_after = Some(secs);
                err
            }
            other => {
                if debug {
                    ApiError::internal(other)
                } else {
                    ApiError::internal(HIDDEN_DETAIL)
                }
            }
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// ============================================================================
// HTTP boundary
// ============================================================================

/// API HTTP error struct
#[derive(thiserror::Error, Debug)]
pub struct ApiError {
    /// HTTP status code
    pub http_code: StatusCode,
    /// Error body
    pub body: ErrorBody,
    /// Seconds to advertise in `Retry-After`
    pub retry_after: Option<u64>,
}

/// Error body serialized in JSON responses
#[derive(Debug, Serialize, Deserialize, Default, PartialEq)]
pub struct ErrorBody {
    /// Short error title
    pub error: String,
    /// Detailed error description
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub details: Value,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.body.details.is_null() {
            write!(f, "{}", self.body.error)
        } else {
            write!(f, "{}: {}", self.body.error, self.body.details)
        }
    }
}

impl ApiError {
    /// Create new error with HTTP status code
    pub fn new(http_code: StatusCode) -> Self {
        Self {
            http_code,
            body: ErrorBody::default(),
            retry_after: None,
        }
    }

    /// Build Bad Request (400) error
    pub fn bad_request() -> Self {
        Self::new(StatusCode::BAD_REQUEST).title("Bad Request")
    }

    /// Build Not Found (404) error
    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND).title("Resource not found")
    }

    /// Build Internal Server Error (500)
    pub fn internal(cause: impl fmt::Display) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR)
            .title("Internal server error")
            .detail(cause.to_string())
    }

    /// Set error title
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.body.error = title.into();
        self
    }

    /// Set a plain-text detail
    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.body.details = Value::String(detail.into());
        self
    }

    /// Set a structured detail
    pub fn details(mut self, details: Value) -> Self {
        self.body.details = details;
        self
    }
}

impl ResponseError for ApiError {
    fn error_response(&self) -> HttpResponse {
        let mut builder = HttpResponse::build(self.http_code);
        if let Some(secs) = self.retry_after {
            builder.append_header((header::RETRY_AFTER, secs.to_string()));
        }
        builder.json(&self.body)
    }

    fn status_code(&self) -> StatusCode {
        self.http_code
    }
}
