//! Configuration management for backend adapters
//!
//! This module provides utilities for loading and validating configuration
//! for the backend adapters, with support for environment variables.

use std::collections::HashMap;
use std::env;
use std::fmt::{self, Debug};
use std::str::FromStr;
use std::sync::Arc;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::core::builder::Auth;
use crate::error::{Result, ServiceError};
use crate::pagination::DEFAULT_MAX_PAGE_SIZE;

/// Base trait for configuration providers
pub trait ConfigProvider: Send + Sync {
    /// Get a string configuration value
    fn get_string(&self, key: &str) -> Result<String>;
}

/// Extension methods for configuration providers
pub trait ConfigProviderExt: ConfigProvider {
    /// Get an integer configuration value
    fn get_int(&self, key: &str) -> Result<i64> {
        let value = self.get_string(key)?;
        value
            .trim()
            .parse::<i64>()
            .map_err(|e| ServiceError::configuration(format!("Invalid integer for key {}: {}", key, e)))
    }

    /// Get a boolean configuration value
    fn get_bool(&self, key: &str) -> Result<bool> {
        let value = self.get_string(key)?;
        match value.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" | "on" => Ok(true),
            "false" | "no" | "0" | "off" => Ok(false),
            _ => Err(ServiceError::configuration(format!(
                "Invalid boolean value for key {}: {}",
                key, value
            ))),
        }
    }

    /// Get a typed configuration value by parsing from string
    fn get<T>(&self, key: &str) -> Result<T>
    where
        T: FromStr,
        <T as FromStr>::Err: std::fmt::Display,
    {
        let value = self.get_string(key)?;
        value
            .trim()
            .parse::<T>()
            .map_err(|e| ServiceError::configuration(format!("Invalid value for key {}: {}", key, e)))
    }

    /// A non-empty string value, or `None` when missing or blank
    fn get_non_empty(&self, key: &str) -> Option<String> {
        self.get_string(key)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    /// Get a string configuration value with a default
    fn get_string_or(&self, key: &str, default: &str) -> String {
        self.get_non_empty(key).unwrap_or_else(|| default.to_string())
    }

    /// Get an integer configuration value with a default
    fn get_int_or(&self, key: &str, default: i64) -> i64 {
        self.get_int(key).unwrap_or(default)
    }

    /// Get a boolean configuration value with a default
    fn get_bool_or(&self, key: &str, default: bool) -> bool {
        self.get_bool(key).unwrap_or(default)
    }
}

impl<T: ConfigProvider + ?Sized> ConfigProviderExt for T {}

/// Environment variable based configuration provider
#[derive(Debug, Clone, Default)]
pub struct EnvConfigProvider {
    /// Optional prefix for environment variables
    prefix: Option<String>,

    /// Optional namespace for variables (e.g., "GITHUB", "SERVICENOW")
    namespace: Option<String>,
}

impl EnvConfigProvider {
    /// Create a new environment variable config provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a prefix for environment variables
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Set a namespace for environment variables
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Format a configuration key as an environment variable
    fn format_key(&self, key: &str) -> String {
        let mut env_key = String::new();

        if let Some(ref prefix) = self.prefix {
            env_key.push_str(prefix);
            env_key.push('_');
        }

        if let Some(ref namespace) = self.namespace {
            env_key.push_str(namespace);
            env_key.push('_');
        }

        env_key.push_str(&key.to_uppercase().replace(|c: char| !c.is_ascii_alphanumeric(), "_"));

        env_key
    }
}

impl ConfigProvider for EnvConfigProvider {
    fn get_string(&self, key: &str) -> Result<String> {
        let env_key = self.format_key(key);

        env::var(&env_key).map_err(|e| match e {
            env::VarError::NotPresent => {
                ServiceError::configuration(format!("Environment variable not set: {}", env_key))
            }
            env::VarError::NotUnicode(_) => ServiceError::configuration(format!(
                "Environment variable is not valid unicode: {}",
                env_key
            )),
        })
    }
}

/// In-memory config provider for testing or static configuration
#[derive(Debug, Clone, Default)]
pub struct MemoryConfigProvider {
    values: HashMap<String, String>,
}

impl MemoryConfigProvider {
    /// Create a new empty memory config provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a memory config provider with initial values
    pub fn with_values(values: HashMap<String, String>) -> Self {
        Self { values }
    }

    /// Set a configuration value
    pub fn set<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: ToString,
    {
        self.values.insert(key.into(), value.to_string());
    }
}

impl ConfigProvider for MemoryConfigProvider {
    fn get_string(&self, key: &str) -> Result<String> {
        self.values
            .get(key)
            .cloned()
            .ok_or_else(|| ServiceError::configuration(format!("Configuration key not found: {}", key)))
    }
}

/// A composite config provider that tries multiple providers in order
pub struct CompositeConfigProvider {
    providers: Vec<Box<dyn ConfigProvider>>,
}

impl Default for CompositeConfigProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl CompositeConfigProvider {
    /// Create a new composite config provider
    pub fn new() -> Self {
        Self { providers: Vec::new() }
    }

    /// Add a provider to the chain
    pub fn add_provider(&mut self, provider: impl ConfigProvider + 'static) {
        self.providers.push(Box::new(provider));
    }
}

impl ConfigProvider for CompositeConfigProvider {
    fn get_string(&self, key: &str) -> Result<String> {
        for provider in &self.providers {
            if let Ok(value) = provider.get_string(key) {
                return Ok(value);
            }
        }

        Err(ServiceError::configuration(format!(
            "Configuration key not found in any provider: {}",
            key
        )))
    }
}

/// Global default configuration provider
pub static DEFAULT_PROVIDER: Lazy<Arc<EnvConfigProvider>> = Lazy::new(|| Arc::new(EnvConfigProvider::new()));

/// Comma-separated list, trimmed, blanks dropped
fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Debug stand-in for a secret
fn redacted(secret: Option<&String>) -> Option<&'static str> {
    secret.map(|_| "<redacted>")
}

/// Trait for service-specific configuration
pub trait ServiceConfig: Debug + Send + Sync {
    /// Validate this configuration
    fn validate(&self) -> Result<()>;

    /// Service name
    fn service_name(&self) -> &str;
}

/// Configuration for the GitHub adapter
#[derive(Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// Personal access token
    pub token: String,

    /// REST API base URL
    pub api_url: String,

    /// Timeout in seconds
    pub timeout_seconds: u64,
}

impl Debug for GitHubConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitHubConfig")
            .field("token", &redacted(Some(&self.token)))
            .field("api_url", &self.api_url)
            .field("timeout_seconds", &self.timeout_seconds)
            .finish()
    }
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            api_url: "https://api.github.com".to_string(),
            timeout_seconds: 30,
        }
    }
}

impl GitHubConfig {
    /// Load configuration from a config provider
    pub fn from_provider<P: ConfigProvider + ?Sized>(provider: &P) -> Result<Self> {
        let token = provider
            .get_non_empty("github_token")
            .ok_or_else(|| ServiceError::configuration("GITHUB_TOKEN is not set"))?;
        let api_url = provider.get_string_or("github_api_url", "https://api.github.com");
        let timeout_seconds = provider.get_int_or("github_timeout_seconds", 30).max(1) as u64;

        let config = Self {
            token,
            api_url,
            timeout_seconds,
        };

        config.validate()?;
        Ok(config)
    }

    /// Bearer authentication with the configured token
    pub fn auth(&self) -> Auth {
        Auth::Bearer(self.token.clone())
    }
}

impl ServiceConfig for GitHubConfig {
    fn validate(&self) -> Result<()> {
        if self.token.is_empty() {
            return Err(ServiceError::configuration("GitHub token is required"));
        }

        if self.api_url.is_empty() {
            return Err(ServiceError::configuration("GitHub API URL is required"));
        }

        Ok(())
    }

    fn service_name(&self) -> &str {
        "github"
    }
}

/// Configuration for the Elasticsearch adapter
#[derive(Clone, Serialize, Deserialize)]
pub struct ElasticsearchConfig {
    /// Cluster URL
    pub url: String,

    /// Index (or pattern) searched by default
    pub index: String,

    /// API key, sent as `Authorization: ApiKey <key>`
    pub api_key: Option<String>,

    pub username: Option<String>,
    pub password: Option<String>,

    /// Timeout in seconds
    pub timeout_seconds: u64,
}

impl Debug for ElasticsearchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElasticsearchConfig")
            .field("url", &self.url)
            .field("index", &self.index)
            .field("api_key", &redacted(self.api_key.as_ref()))
            .field("username", &self.username)
            .field("password", &redacted(self.password.as_ref()))
            .field("timeout_seconds", &self.timeout_seconds)
            .finish()
    }
}

impl Default for ElasticsearchConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            index: String::new(),
            api_key: None,
            username: None,
            password: None,
            timeout_seconds: 30,
        }
    }
}

impl ElasticsearchConfig {
    /// Load configuration from a config provider
    pub fn from_provider<P: ConfigProvider + ?Sized>(provider: &P) -> Result<Self> {
        let url = provider
            .get_non_empty("elasticsearch_url")
            .ok_or_else(|| ServiceError::configuration("ELASTICSEARCH_URL is not set"))?;
        let index = provider
            .get_non_empty("elasticsearch_index")
            .ok_or_else(|| ServiceError::configuration("ELASTICSEARCH_INDEX is not set"))?;

        let config = Self {
            url,
            index,
            api_key: provider.get_non_empty("elasticsearch_api_key"),
            username: provider.get_non_empty("elasticsearch_username"),
            password: provider.get_non_empty("elasticsearch_password"),
            timeout_seconds: provider.get_int_or("elasticsearch_timeout_seconds", 30).max(1) as u64,
        };

        config.validate()?;
        Ok(config)
    }

    /// API key first, then basic credentials, else unauthenticated
    pub fn auth(&self) -> Auth {
        if let Some(ref key) = self.api_key {
            return Auth::ApiKey {
                header: "Authorization".to_string(),
                value: format!("ApiKey {}", key),
            };
        }

        match (&self.username, &self.password) {
            (Some(username), Some(password)) => Auth::Basic {
                username: username.clone(),
                password: password.clone(),
            },
            _ => Auth::None,
        }
    }
}

impl ServiceConfig for ElasticsearchConfig {
    fn validate(&self) -> Result<()> {
        if self.url.is_empty() {
            return Err(ServiceError::configuration("Elasticsearch URL is required"));
        }

        if self.index.is_empty() {
            return Err(ServiceError::configuration("Elasticsearch index is required"));
        }

        if self.username.is_some() != self.password.is_some() && self.api_key.is_none() {
            return Err(ServiceError::configuration(
                "Elasticsearch username and password must be set together",
            ));
        }

        Ok(())
    }

    fn service_name(&self) -> &str {
        "elasticsearch"
    }
}

/// Configuration for the ServiceNow adapter
#[derive(Clone, Serialize, Deserialize)]
pub struct ServiceNowConfig {
    /// Instance host (`dev12345.service-now.com`) or full URL
    pub instance: String,

    pub username: Option<String>,
    pub password: Option<String>,

    /// OAuth/API token; takes precedence over basic credentials
    pub api_token: Option<String>,

    /// Table the case operations act on
    pub table: String,

    /// Largest page size sent to the Table API
    pub max_page_size: i64,

    /// Fields returned by queries (`sysparm_fields`); empty returns all
    #[serde(default)]
    pub fields: Vec<String>,

    /// Timeout in seconds
    pub timeout_seconds: u64,
}

impl Debug for ServiceNowConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceNowConfig")
            .field("instance", &self.instance)
            .field("username", &self.username)
            .field("password", &redacted(self.password.as_ref()))
            .field("api_token", &redacted(self.api_token.as_ref()))
            .field("table", &self.table)
            .field("max_page_size", &self.max_page_size)
            .field("fields", &self.fields)
            .field("timeout_seconds", &self.timeout_seconds)
            .finish()
    }
}

impl Default for ServiceNowConfig {
    fn default() -> Self {
        Self {
            instance: String::new(),
            username: None,
            password: None,
            api_token: None,
            table: "incident".to_string(),
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
            fields: Vec::new(),
            timeout_seconds: 30,
        }
    }
}

impl ServiceNowConfig {
    /// Load configuration from a config provider
    pub fn from_provider<P: ConfigProvider + ?Sized>(provider: &P) -> Result<Self> {
        let instance = provider
            .get_non_empty("servicenow_instance")
            .ok_or_else(|| ServiceError::configuration("SERVICENOW_INSTANCE is not set"))?;

        let config = Self {
            instance,
            username: provider.get_non_empty("servicenow_username"),
            password: provider.get_non_empty("servicenow_password"),
            api_token: provider.get_non_empty("servicenow_api_token"),
            table: provider.get_string_or("servicenow_table", "incident"),
            max_page_size: provider.get_int_or("servicenow_max_page_size", DEFAULT_MAX_PAGE_SIZE),
            fields: provider
                .get_non_empty("servicenow_fields")
                .map(|fields| split_list(&fields))
                .unwrap_or_default(),
            timeout_seconds: provider.get_int_or("servicenow_timeout_seconds", 30).max(1) as u64,
        };

        config.validate()?;
        Ok(config)
    }

    /// Base URL of the instance, with `https://` prepended to bare hosts
    pub fn instance_url(&self) -> String {
        let instance = self.instance.trim().trim_end_matches('/');
        if instance.starts_with("http://") || instance.starts_with("https://") {
            instance.to_string()
        } else {
            format!("https://{}", instance)
        }
    }

    /// Token wins over basic credentials when both are configured
    pub fn auth(&self) -> Result<Auth> {
        if let Some(ref token) = self.api_token {
            return Ok(Auth::Bearer(token.clone()));
        }

        match (&self.username, &self.password) {
            (Some(username), Some(password)) => Ok(Auth::Basic {
                username: username.clone(),
                password: password.clone(),
            }),
            _ => Err(ServiceError::configuration(
                "ServiceNow needs SERVICENOW_API_TOKEN or SERVICENOW_USERNAME and SERVICENOW_PASSWORD",
            )),
        }
    }
}

impl ServiceConfig for ServiceNowConfig {
    fn validate(&self) -> Result<()> {
        if self.instance.trim().is_empty() {
            return Err(ServiceError::configuration("ServiceNow instance is required"));
        }

        if self.table.trim().is_empty() {
            return Err(ServiceError::configuration("ServiceNow table is required"));
        }

        if self.max_page_size <= 0 {
            return Err(ServiceError::configuration("ServiceNow max page size must be positive"));
        }

        self.auth().map(|_| ())
    }

    fn service_name(&self) -> &str {
        "servicenow"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_config_provider() {
        let mut provider = MemoryConfigProvider::new();
        provider.set("key1", "value1");
        provider.set("key2", "123");

        assert_eq!(provider.get_string("key1").unwrap(), "value1");
        assert_eq!(provider.get_int("key2").unwrap(), 123);
        assert!(provider.get_string("key3").is_err());
    }

    #[test]
    fn test_env_config_provider_key_format() {
        let provider = EnvConfigProvider::new().with_prefix("TEST").with_namespace("CONFIG");

        assert_eq!(provider.format_key("api_key"), "TEST_CONFIG_API_KEY");
        assert_eq!(provider.format_key("base-url"), "TEST_CONFIG_BASE_URL");
        assert_eq!(EnvConfigProvider::new().format_key("servicenow_instance"), "SERVICENOW_INSTANCE");
    }

    #[test]
    fn test_composite_config_provider() {
        let mut mem1 = MemoryConfigProvider::new();
        mem1.set("key1", "value1");

        let mut mem2 = MemoryConfigProvider::new();
        mem2.set("key1", "shadowed");
        mem2.set("key2", "value2");

        let mut provider = CompositeConfigProvider::new();
        provider.add_provider(mem1);
        provider.add_provider(mem2);

        assert_eq!(provider.get_string("key1").unwrap(), "value1");
        assert_eq!(provider.get_string("key2").unwrap(), "value2");
        assert!(provider.get_string("key3").is_err());
    }

    #[test]
    fn test_servicenow_token_wins_over_basic() {
        let mut provider = MemoryConfigProvider::new();
        provider.set("servicenow_instance", "dev1.service-now.com");
        provider.set("servicenow_username", "admin");
        provider.set("servicenow_password", "secret");
        provider.set("servicenow_api_token", "tok");

        let config = ServiceNowConfig::from_provider(&provider).unwrap();

        assert!(matches!(config.auth().unwrap(), Auth::Bearer(ref t) if t == "tok"));
        assert_eq!(config.instance_url(), "https://dev1.service-now.com");
        assert_eq!(config.table, "incident");
        assert_eq!(config.max_page_size, 100);
    }

    #[test]
    fn test_servicenow_field_list() {
        let mut provider = MemoryConfigProvider::new();
        provider.set("servicenow_instance", "dev1.service-now.com");
        provider.set("servicenow_api_token", "tok");

        assert!(ServiceNowConfig::from_provider(&provider).unwrap().fields.is_empty());

        provider.set("servicenow_fields", " number, short_description ,,");
        let config = ServiceNowConfig::from_provider(&provider).unwrap();
        assert_eq!(config.fields, vec!["number".to_string(), "short_description".to_string()]);
    }

    #[test]
    fn test_debug_output_hides_secrets() {
        let servicenow = ServiceNowConfig {
            instance: "dev1.service-now.com".to_string(),
            username: Some("admin".to_string()),
            password: Some("hunter2".to_string()),
            api_token: Some("snow-secret-token".to_string()),
            ..Default::default()
        };
        let github = GitHubConfig {
            token: "ghp_secret".to_string(),
            ..Default::default()
        };
        let elasticsearch = ElasticsearchConfig {
            url: "http://localhost:9200".to_string(),
            index: "logs-*".to_string(),
            api_key: Some("es-secret-key".to_string()),
            username: Some("elastic".to_string()),
            password: Some("changeme".to_string()),
            ..Default::default()
        };

        let rendered = format!("{:?} {:?} {:?}", servicenow, github, elasticsearch);
        for secret in ["hunter2", "snow-secret-token", "ghp_secret", "es-secret-key", "changeme"] {
            assert!(!rendered.contains(secret), "{} leaked in {}", secret, rendered);
        }
        assert!(rendered.contains("<redacted>"));
        assert!(rendered.contains("dev1.service-now.com"));
        assert!(rendered.contains("admin"));
    }

    #[test]
    fn test_servicenow_basic_when_no_token() {
        let mut provider = MemoryConfigProvider::new();
        provider.set("servicenow_instance", "http://localhost:8080/");
        provider.set("servicenow_username", "admin");
        provider.set("servicenow_password", "secret");

        let config = ServiceNowConfig::from_provider(&provider).unwrap();

        assert!(matches!(config.auth().unwrap(), Auth::Basic { .. }));
        assert_eq!(config.instance_url(), "http://localhost:8080");
    }

    #[test]
    fn test_servicenow_without_credentials_is_rejected() {
        let mut provider = MemoryConfigProvider::new();
        provider.set("servicenow_instance", "dev1.service-now.com");
        provider.set("servicenow_username", "admin");

        let err = ServiceNowConfig::from_provider(&provider).unwrap_err();
        assert!(matches!(err, ServiceError::Configuration(_)));
    }

    #[test]
    fn test_github_config_defaults() {
        let mut provider = MemoryConfigProvider::new();
        provider.set("github_token", "ghp_test");

        let config = GitHubConfig::from_provider(&provider).unwrap();
        assert_eq!(config.api_url, "https://api.github.com");
        assert_eq!(config.timeout_seconds, 30);

        assert!(GitHubConfig::from_provider(&MemoryConfigProvider::new()).is_err());
    }

    #[test]
    fn test_elasticsearch_auth_selection() {
        let mut provider = MemoryConfigProvider::new();
        provider.set("elasticsearch_url", "http://localhost:9200");
        provider.set("elasticsearch_index", "logs-*");

        let open = ElasticsearchConfig::from_provider(&provider).unwrap();
        assert!(matches!(open.auth(), Auth::None));

        provider.set("elasticsearch_api_key", "abc");
        let keyed = ElasticsearchConfig::from_provider(&provider).unwrap();
        assert!(matches!(keyed.auth(), Auth::ApiKey { ref value, .. } if value == "ApiKey abc"));
    }
}
