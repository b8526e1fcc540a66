//! Error Types for the amlwatch API
//!
//! This module defines error handling for the HTTP layer:
//! - ApiError struct for structured error responses
//! - ErrorCode enum for categorizing errors
//! - IntoResponse implementation for Axum HTTP responses
//! - Mapping from the domain error taxonomy onto status codes
//!
//! All errors are serialized as JSON with appropriate HTTP status codes.

use amlwatch_core::{AmlError, CacheError, ConfigError, SourceError, ValidationError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Error codes for API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================================================
    // Validation Errors (400)
    // ========================================================================
    /// Request validation failed
    ValidationFailed,

    /// Required field is missing from request
    MissingField,

    // ========================================================================
    // Upstream Errors (502, 503, 504)
    // ========================================================================
    /// An upstream source could not be reached or authenticated
    SourceUnavailable,

    /// An upstream source rejected or failed a query
    SourceQueryFailed,

    /// An upstream operation exceeded its time bound
    Timeout,

    /// A source is not usable because its configuration is broken
    SourceMisconfigured,

    // ========================================================================
    // Server Errors (500)
    // ========================================================================
    /// Cache store write or delete failed
    CacheError,

    /// Internal server error
    InternalError,
}

impl ErrorCode {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::ValidationFailed | ErrorCode::MissingField => StatusCode::BAD_REQUEST,
            ErrorCode::SourceUnavailable | ErrorCode::SourceMisconfigured | ErrorCode::Timeout => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ErrorCode::SourceQueryFailed => StatusCode::BAD_GATEWAY,
            ErrorCode::CacheError | ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCode::ValidationFailed => "VALIDATION_FAILED",
            ErrorCode::MissingField => "MISSING_FIELD",
            ErrorCode::SourceUnavailable => "SOURCE_UNAVAILABLE",
            ErrorCode::SourceQueryFailed => "SOURCE_QUERY_FAILED",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::SourceMisconfigured => "SOURCE_MISCONFIGURED",
            ErrorCode::CacheError => "CACHE_ERROR",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        };
        write!(f, "{}", s)
    }
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

/// Structured API error. Serialized inside the standard failure envelope
/// `{"success": false, "error": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    pub fn validation_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationFailed, message)
    }

    pub fn missing_field(field: &str) -> Self {
        Self::new(
            ErrorCode::MissingField,
            format!("Required field '{}' is missing", field),
        )
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

#[derive(Serialize)]
struct ErrorEnvelope<'a> {
    success: bool,
    error: &'a ApiError,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorEnvelope {
            success: false,
            error: &self,
        };
        (status, Json(body)).into_response()
    }
}

// ============================================================================
// CONVERSIONS
// ============================================================================

impl From<SourceError> for ApiError {
    fn from(err: SourceError) -> Self {
        let code = match &err {
            SourceError::Connection { .. } | SourceError::NotConnected { .. } => {
                ErrorCode::SourceUnavailable
            }
            SourceError::Timeout { .. } => ErrorCode::Timeout,
            SourceError::Query { .. } | SourceError::UnsupportedQuery { .. } => {
                ErrorCode::SourceQueryFailed
            }
        };
        tracing::warn!(error = %err, code = %code, "Upstream source error");
        ApiError::new(code, err.to_string())
    }
}

impl From<CacheError> for ApiError {
    fn from(err: CacheError) -> Self {
        tracing::error!(error = %err, "Cache error");
        ApiError::new(ErrorCode::CacheError, err.to_string())
    }
}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        tracing::error!(error = %err, "Configuration error");
        ApiError::new(ErrorCode::SourceMisconfigured, err.to_string())
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::validation_failed(err.to_string())
    }
}

impl From<AmlError> for ApiError {
    fn from(err: AmlError) -> Self {
        let domain = match &err {
            AmlError::DomainLoad { domain, .. } => Some(*domain),
            _ => None,
        };
        let mapped = match err.root().clone() {
            AmlError::Source(e) => ApiError::from(e),
            AmlError::Cache(e) => ApiError::from(e),
            AmlError::Config(e) => ApiError::from(e),
            AmlError::Validation(e) => ApiError::from(e),
            AmlError::DomainLoad { .. } => ApiError::internal_error(err.to_string()),
        };
        match domain {
            Some(domain) => mapped.with_details(serde_json::json!({ "domain": domain })),
            None => mapped,
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        tracing::error!(error = %err, "JSON serialization error");
        ApiError::internal_error(format!("JSON error: {}", err))
    }
}

/// Result type alias for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use amlwatch_core::Domain;
    use std::time::Duration;

    #[test]
    fn test_error_code_status_mapping() {
        assert_eq!(ErrorCode::ValidationFailed.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::SourceUnavailable.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(ErrorCode::SourceQueryFailed.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(ErrorCode::CacheError.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_source_errors_map_by_kind() {
        let timeout: ApiError = SourceError::Timeout {
            source_name: "aml_db".into(),
            operation: "query".into(),
            timeout: Duration::from_secs(60),
        }
        .into();
        assert_eq!(timeout.code, ErrorCode::Timeout);
        assert_eq!(timeout.status_code(), StatusCode::SERVICE_UNAVAILABLE);

        let query: ApiError = SourceError::Query {
            source_name: "aml_db".into(),
            reason: "syntax".into(),
        }
        .into();
        assert_eq!(query.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_domain_context_is_kept_in_details() {
        let err = AmlError::from(SourceError::Connection {
            source_name: "sheets".into(),
            reason: "refused".into(),
        })
        .in_domain(Domain::Goaml);
        let api: ApiError = err.into();
        assert_eq!(api.code, ErrorCode::SourceUnavailable);
        assert_eq!(api.details, Some(serde_json::json!({"domain": "goaml"})));
    }

    #[test]
    fn test_validation_maps_to_bad_request() {
        let api: ApiError = AmlError::from(ValidationError::InvertedWindow {
            start: "2024-03-01".into(),
            end: "2024-01-01".into(),
        })
        .into();
        assert_eq!(api.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_error_serialization() -> Result<(), serde_json::Error> {
        let error = ApiError::missing_field("pattern");
        let json = serde_json::to_value(&error)?;
        assert_eq!(json["code"], "MISSING_FIELD");
        assert!(json.get("details").is_none());
        Ok(())
    }
}
