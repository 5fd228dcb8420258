//! Error handling for the Backend SDK
//!
//! Every backend call returns either a success payload or a `ServiceError`
//! whose `kind()` is one of the normalized `ErrorKind`s. Transport faults are
//! never handed upward raw; they are classified here or in `mapping`.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod mapping;

/// Result type for Backend SDK operations
pub type Result<T> = std::result::Result<T, ServiceError>;

/// Normalized error kinds shared by every adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    ValidationError,
    AuthError,
    NotFoundError,
    PermissionError,
    RateLimited,
    TransientNetwork,
    UnsupportedOperation,
    UnknownError,
}

impl ErrorKind {
    /// Whether a read-only operation failing with this kind may be retried
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::TransientNetwork | ErrorKind::RateLimited)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::ValidationError => "ValidationError",
            ErrorKind::AuthError => "AuthError",
            ErrorKind::NotFoundError => "NotFoundError",
            ErrorKind::PermissionError => "PermissionError",
            ErrorKind::RateLimited => "RateLimited",
            ErrorKind::TransientNetwork => "TransientNetwork",
            ErrorKind::UnsupportedOperation => "UnsupportedOperation",
            ErrorKind::UnknownError => "UnknownError",
        };
        f.write_str(name)
    }
}

/// Main error type for the Backend SDK
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Bad or missing parameters, detected before any backend call
    #[error("Validation error: {0}")]
    Validation(String),

    /// Credential failure
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Authenticated but not allowed
    #[error("Permission denied: {0}")]
    Permission(String),

    /// Entity missing
    #[error("Not found: {0}")]
    NotFound(String),

    /// Backend throttled the request
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    /// Timeouts, refused connections, 5xx responses
    #[error("Transient network error: {0}")]
    TransientNetwork(String),

    /// Capability not implemented by this backend
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Startup configuration problems
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Anything that could not be classified
    #[error("Unknown error: {0}")]
    Unknown(String),

    /// Errors with additional context
    #[error("{inner}")]
    WithContext {
        inner: Box<ServiceError>,
        context: ErrorContext,
    },
}

impl ServiceError {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        ServiceError::Validation(message.into())
    }

    /// Create an authentication error
    pub fn authentication(message: impl Into<String>) -> Self {
        ServiceError::Authentication(message.into())
    }

    /// Create a permission error
    pub fn permission(message: impl Into<String>) -> Self {
        ServiceError::Permission(message.into())
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        ServiceError::NotFound(message.into())
    }

    /// Create a rate limit error
    pub fn rate_limited(message: impl Into<String>) -> Self {
        ServiceError::RateLimited(message.into())
    }

    /// Create a transient network error
    pub fn transient_network(message: impl Into<String>) -> Self {
        ServiceError::TransientNetwork(message.into())
    }

    /// Create an unsupported operation error
    pub fn unsupported(message: impl Into<String>) -> Self {
        ServiceError::UnsupportedOperation(message.into())
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        ServiceError::Configuration(message.into())
    }

    /// Create an unknown error
    pub fn unknown(message: impl Into<String>) -> Self {
        ServiceError::Unknown(message.into())
    }

    /// Add context to an existing error
    pub fn with_context(self, context: ErrorContext) -> Self {
        ServiceError::WithContext {
            inner: Box::new(self),
            context,
        }
    }

    /// Add a single context key/value to an existing error
    pub fn with_context_value(self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        match self {
            ServiceError::WithContext { inner, mut context } => {
                context.add(key, value);
                ServiceError::WithContext { inner, context }
            }
            other => {
                let mut context = ErrorContext::new();
                context.add(key, value);
                other.with_context(context)
            }
        }
    }

    /// The normalized kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Validation(_) => ErrorKind::ValidationError,
            ServiceError::Authentication(_) => ErrorKind::AuthError,
            ServiceError::Permission(_) => ErrorKind::PermissionError,
            ServiceError::NotFound(_) => ErrorKind::NotFoundError,
            ServiceError::RateLimited(_) => ErrorKind::RateLimited,
            ServiceError::TransientNetwork(_) => ErrorKind::TransientNetwork,
            ServiceError::UnsupportedOperation(_) => ErrorKind::UnsupportedOperation,
            ServiceError::Configuration(_) | ServiceError::Unknown(_) => ErrorKind::UnknownError,
            ServiceError::WithContext { inner, .. } => inner.kind(),
        }
    }

    /// The innermost message, without the kind prefix or any context
    pub fn message(&self) -> &str {
        match self {
            ServiceError::Validation(msg)
            | ServiceError::Authentication(msg)
            | ServiceError::Permission(msg)
            | ServiceError::NotFound(msg)
            | ServiceError::RateLimited(msg)
            | ServiceError::TransientNetwork(msg)
            | ServiceError::UnsupportedOperation(msg)
            | ServiceError::Configuration(msg)
            | ServiceError::Unknown(msg) => msg,
            ServiceError::WithContext { inner, .. } => inner.message(),
        }
    }

    /// Attached context, if any
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            ServiceError::WithContext { context, .. } => Some(context),
            _ => None,
        }
    }

    /// Get the HTTP status code if available
    pub fn status_code(&self) -> Option<u16> {
        self.context().and_then(|context| context.status_code)
    }

    /// Check if this is a retryable error
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

/// Error context information
#[derive(Debug, Clone)]
pub struct ErrorContext {
    /// Service that generated the error
    pub service: String,

    /// Time the error was observed
    pub timestamp: Option<chrono::DateTime<chrono::Utc>>,

    /// HTTP status code if applicable
    pub status_code: Option<u16>,

    /// Service-specific error code
    pub error_code: Option<String>,

    /// Request ID for tracing
    pub request_id: Option<String>,

    /// Endpoint that was called
    pub endpoint: Option<String>,

    /// Additional context data
    pub data: HashMap<String, String>,
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self {
            service: "unknown".to_string(),
            timestamp: Some(chrono::Utc::now()),
            status_code: None,
            error_code: None,
            request_id: None,
            endpoint: None,
            data: HashMap::new(),
        }
    }
}

impl ErrorContext {
    /// Create a new error context
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new error context for a specific service
    pub fn for_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            ..Self::default()
        }
    }

    /// Add an HTTP status code
    pub fn status_code(mut self, code: u16) -> Self {
        self.status_code = Some(code);
        self
    }

    /// Add an error code
    pub fn error_code(mut self, code: impl Into<String>) -> Self {
        self.error_code = Some(code.into());
        self
    }

    /// Add a request ID
    pub fn request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    /// Add an endpoint
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Add a context value
    pub fn add<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: fmt::Display,
    {
        self.data.insert(key.into(), value.to_string());
    }

    /// Add a context value and return self (builder pattern)
    pub fn with<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: fmt::Display,
    {
        self.add(key, value);
        self
    }
}

/// Convert reqwest errors to ServiceError
impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        let context = ErrorContext::for_service("http_client");
        let detail = crate::util::sanitize_for_logging(&err.to_string());

        let service_error = if let Some(status) = err.status() {
            let mut status_context = context.clone();
            mapping::map_http_error(status, &reqwest::header::HeaderMap::new(), &detail, &mut status_context)
                .with_context(status_context.status_code(status.as_u16()))
        } else if err.is_timeout() {
            ServiceError::transient_network(format!("Request timed out: {}", detail))
        } else if err.is_connect() {
            ServiceError::transient_network(format!("Connection error: {}", detail))
        } else if err.is_request() || err.is_body() {
            ServiceError::transient_network(format!("Request failed in transit: {}", detail))
        } else if err.is_builder() {
            ServiceError::validation(format!("Invalid request: {}", detail))
        } else if err.is_decode() {
            ServiceError::unknown(format!("Response decode error: {}", detail))
        } else {
            ServiceError::unknown(format!("HTTP client error: {}", detail))
        };

        match service_error {
            already @ ServiceError::WithContext { .. } => already,
            bare => bare.with_context(context),
        }
    }
}

/// Convert serde_json errors to ServiceError
impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::unknown(format!("JSON error: {}", err))
            .with_context(ErrorContext::for_service("json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_sees_through_context() {
        let err = ServiceError::rate_limited("slow down")
            .with_context(ErrorContext::for_service("github").status_code(429));

        assert_eq!(err.kind(), ErrorKind::RateLimited);
        assert_eq!(err.message(), "slow down");
        assert_eq!(err.status_code(), Some(429));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_only_transient_and_rate_limited_are_retryable() {
        assert!(ServiceError::transient_network("reset").is_retryable());
        assert!(ServiceError::rate_limited("429").is_retryable());
        assert!(!ServiceError::validation("bad").is_retryable());
        assert!(!ServiceError::authentication("nope").is_retryable());
        assert!(!ServiceError::not_found("gone").is_retryable());
        assert!(!ServiceError::unknown("?").is_retryable());
    }

    #[test]
    fn test_configuration_is_classified_unknown() {
        assert_eq!(ServiceError::configuration("missing").kind(), ErrorKind::UnknownError);
    }

    #[test]
    fn test_with_context_value_merges_existing_context() {
        let err = ServiceError::not_found("INC1")
            .with_context(ErrorContext::for_service("servicenow"))
            .with_context_value("attempts", 2);

        let context = err.context().unwrap();
        assert_eq!(context.service, "servicenow");
        assert_eq!(context.data.get("attempts").map(String::as_str), Some("2"));
    }
}
