//! Client builder implementation
//!
//! Provides a unified builder for the HTTP clients the adapters own, and the
//! `Auth` modes they can be constructed with.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client as ReqwestClient, RequestBuilder};

use crate::error::{Result, ServiceError};

/// Authentication mode selected at adapter construction
#[derive(Clone, PartialEq, Eq)]
pub enum Auth {
    /// No credentials
    None,

    /// `Authorization: Bearer <token>`
    Bearer(String),

    /// HTTP basic credentials
    Basic { username: String, password: String },

    /// Arbitrary header carrying a key
    ApiKey { header: String, value: String },
}

impl Auth {
    /// Attach the credentials to an outgoing request
    pub fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        match self {
            Auth::None => request,
            Auth::Bearer(token) => request.bearer_auth(token),
            Auth::Basic { username, password } => request.basic_auth(username, Some(password)),
            Auth::ApiKey { header, value } => request.header(header.as_str(), value.as_str()),
        }
    }

    /// Short name for logs
    pub fn mode(&self) -> &'static str {
        match self {
            Auth::None => "none",
            Auth::Bearer(_) => "bearer",
            Auth::Basic { .. } => "basic",
            Auth::ApiKey { .. } => "api_key",
        }
    }
}

// Credentials never reach Debug output
impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Auth::None => write!(f, "Auth::None"),
            Auth::Bearer(_) => write!(f, "Auth::Bearer([REDACTED])"),
            Auth::Basic { username, .. } => write!(f, "Auth::Basic {{ username: {:?}, password: [REDACTED] }}", username),
            Auth::ApiKey { header, .. } => write!(f, "Auth::ApiKey {{ header: {:?}, value: [REDACTED] }}", header),
        }
    }
}

/// Unified client builder for all backend adapters
pub struct ClientBuilder {
    /// Custom headers to include with all requests
    custom_headers: HashMap<String, String>,

    /// Request timeout
    timeout: Option<Duration>,

    /// User agent
    user_agent: Option<String>,

    /// Enable response compression
    compression: bool,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self {
            custom_headers: HashMap::new(),
            timeout: Some(Duration::from_secs(30)),
            user_agent: Some(concat!("support-assistant-backend-sdk/", env!("CARGO_PKG_VERSION")).to_string()),
            compression: true,
        }
    }
}

impl ClientBuilder {
    /// Create a new client builder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a custom header
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_headers.insert(key.into(), value.into());
        self
    }

    /// Set request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set user agent
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Enable or disable compression
    pub fn compression(mut self, enabled: bool) -> Self {
        self.compression = enabled;
        self
    }

    /// Build an HTTP client with the configured settings
    pub fn build_http_client(&self) -> Result<ReqwestClient> {
        let mut builder = ReqwestClient::builder();

        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }

        if let Some(ref user_agent) = self.user_agent {
            builder = builder.user_agent(user_agent);
        }

        builder = builder.gzip(self.compression);

        let mut headers = HeaderMap::new();
        for (key, value) in &self.custom_headers {
            let header_name = HeaderName::from_str(key)
                .map_err(|e| ServiceError::configuration(format!("Invalid header name: {}", e)))?;

            let header_value = HeaderValue::from_str(value)
                .map_err(|e| ServiceError::configuration(format!("Invalid header value: {}", e)))?;

            headers.insert(header_name, header_value);
        }

        builder = builder.default_headers(headers);

        builder
            .build()
            .map_err(|e| ServiceError::configuration(format!("Failed to build HTTP client: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_credentials() {
        let auth = Auth::Basic {
            username: "admin".to_string(),
            password: "hunter2".to_string(),
        };
        let rendered = format!("{:?}", auth);
        assert!(rendered.contains("admin"));
        assert!(!rendered.contains("hunter2"));

        assert!(!format!("{:?}", Auth::Bearer("tok".to_string())).contains("tok"));
    }

    #[test]
    fn test_invalid_header_is_configuration_error() {
        let err = ClientBuilder::new().header("bad header", "x").build_http_client().unwrap_err();
        assert!(matches!(err, ServiceError::Configuration(_)));
    }

    #[test]
    fn test_build_with_headers() {
        let client = ClientBuilder::new()
            .header("Accept", "application/json")
            .timeout(Duration::from_secs(5))
            .build_http_client();
        assert!(client.is_ok());
    }
}
