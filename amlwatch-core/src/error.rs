//! Error types for amlwatch operations

use crate::Domain;
use std::time::Duration;
use thiserror::Error;

/// Upstream source errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    #[error("Connection to {source_name} failed: {reason}")]
    Connection { source_name: String, reason: String },

    #[error("Query against {source_name} failed: {reason}")]
    Query { source_name: String, reason: String },

    #[error("{operation} on {source_name} timed out after {timeout:?}")]
    Timeout {
        source_name: String,
        operation: String,
        timeout: Duration,
    },

    #[error("{source_name} is not connected")]
    NotConnected { source_name: String },

    #[error("{source_name} does not support {query_kind} queries")]
    UnsupportedQuery {
        source_name: String,
        query_kind: String,
    },
}

impl SourceError {
    /// Whether retrying the same call later could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SourceError::Connection { .. } | SourceError::Timeout { .. } | SourceError::NotConnected { .. }
        )
    }
}

/// Cache store errors.
///
/// Read failures never surface as this type; they degrade to a miss.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache write failed for {key}: {reason}")]
    WriteFailed { key: String, reason: String },

    #[error("Cache delete failed for {pattern}: {reason}")]
    DeleteFailed { pattern: String, reason: String },

    #[error("Cache payload for {key} could not be serialized: {reason}")]
    Serialization { key: String, reason: String },

    #[error("Cache store unavailable: {reason}")]
    Unavailable { reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Credentials at {path} unavailable: {reason}")]
    CredentialsUnavailable { path: String, reason: String },
}

/// Input validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid date window: start {start} is after end {end}")]
    InvertedWindow { start: String, end: String },

    #[error("Invalid date for {field}: {value}")]
    InvalidDate { field: String, value: String },

    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },
}

/// Master error type for all amlwatch errors.
#[derive(Debug, Clone, Error)]
pub enum AmlError {
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Loading {domain} failed: {source}")]
    DomainLoad {
        domain: Domain,
        #[source]
        source: Box<AmlError>,
    },
}

impl AmlError {
    /// Wrap an error with the domain whose load produced it.
    pub fn in_domain(self, domain: Domain) -> Self {
        match self {
            // Already carries context, keep the innermost domain.
            AmlError::DomainLoad { .. } => self,
            other => AmlError::DomainLoad {
                domain,
                source: Box::new(other),
            },
        }
    }

    /// Strip any domain context and return the underlying error.
    pub fn root(&self) -> &AmlError {
        match self {
            AmlError::DomainLoad { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether a retry of the failed operation could succeed.
    pub fn is_transient(&self) -> bool {
        match self.root() {
            AmlError::Source(e) => e.is_transient(),
            AmlError::Cache(CacheError::Unavailable { .. }) => true,
            _ => false,
        }
    }
}

/// Result type alias for amlwatch operations.
pub type AmlResult<T> = Result<T, AmlError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_error_display() {
        let err = SourceError::Connection {
            source_name: "aml_db".to_string(),
            reason: "refused".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("aml_db"));
        assert!(msg.contains("refused"));
    }

    #[test]
    fn test_domain_context_wraps_once() {
        let err: AmlError = SourceError::NotConnected {
            source_name: "sheets".to_string(),
        }
        .into();
        let wrapped = err.in_domain(Domain::Goaml).in_domain(Domain::Screening);

        match &wrapped {
            AmlError::DomainLoad { domain, .. } => assert_eq!(*domain, Domain::Goaml),
            other => panic!("expected domain context, got {other:?}"),
        }
        assert!(matches!(wrapped.root(), AmlError::Source(_)));
    }

    #[test]
    fn test_transient_classification() {
        let timeout: AmlError = SourceError::Timeout {
            source_name: "aml_db".to_string(),
            operation: "query".to_string(),
            timeout: Duration::from_secs(30),
        }
        .into();
        assert!(timeout.is_transient());
        assert!(timeout.in_domain(Domain::Detections).is_transient());

        let query: AmlError = SourceError::Query {
            source_name: "aml_db".to_string(),
            reason: "syntax".to_string(),
        }
        .into();
        assert!(!query.is_transient());

        let config: AmlError = ConfigError::MissingRequired {
            field: "credentials".to_string(),
        }
        .into();
        assert!(!config.is_transient());
    }
}
