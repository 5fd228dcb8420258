//! Tool bindings
//!
//! Exposes adapter operations as named tools. Each backend contributes its
//! tools only when its configuration is present.

mod elasticsearch;
mod github;
mod servicenow;

pub use elasticsearch::ElasticsearchTool;
pub use github::GitHubTool;
pub use servicenow::ServiceNowTool;

use std::sync::Arc;

use backend_sdk::config::{ElasticsearchConfig, GitHubConfig, ServiceNowConfig};
use backend_sdk::{ConfigProvider, ElasticsearchAdapter, GitHubAdapter, ServiceError, ServiceNowAdapter};
use log::{info, warn};
use serde::Serialize;
use serde_json::Value;

use crate::registry::{RegistryError, ToolRegistry};

/// The configured backend adapters
#[derive(Default)]
pub struct Backends {
    pub github: Option<Arc<GitHubAdapter>>,
    pub elasticsearch: Option<Arc<ElasticsearchAdapter>>,
    pub servicenow: Option<Arc<ServiceNowAdapter>>,
}

impl Backends {
    /// Build every adapter whose configuration loads
    ///
    /// A backend with missing or invalid configuration is skipped with a
    /// warning; the assistant runs with whatever is left.
    pub fn from_provider<P: ConfigProvider + ?Sized>(provider: &P) -> Self {
        Self {
            github: load("github", || GitHubAdapter::new(GitHubConfig::from_provider(provider)?)),
            elasticsearch: load("elasticsearch", || {
                ElasticsearchAdapter::new(ElasticsearchConfig::from_provider(provider)?)
            }),
            servicenow: load("servicenow", || {
                ServiceNowAdapter::new(ServiceNowConfig::from_provider(provider)?)
            }),
        }
    }

    /// Names of the configured backends
    pub fn configured(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.github.is_some() {
            names.push("github");
        }
        if self.elasticsearch.is_some() {
            names.push("elasticsearch");
        }
        if self.servicenow.is_some() {
            names.push("servicenow");
        }
        names
    }
}

fn load<T>(service: &str, build: impl FnOnce() -> backend_sdk::Result<T>) -> Option<Arc<T>> {
    match build() {
        Ok(adapter) => {
            info!("{} backend configured", service);
            Some(Arc::new(adapter))
        }
        Err(err) => {
            warn!("{} tools disabled: {}", service, err.message());
            None
        }
    }
}

/// Register the tools of every configured backend; returns how many
pub fn register_backend_tools(registry: &mut ToolRegistry, backends: &Backends) -> Result<usize, RegistryError> {
    let before = registry.len();

    if let Some(ref adapter) = backends.github {
        github::register(registry, adapter)?;
    }
    if let Some(ref adapter) = backends.elasticsearch {
        elasticsearch::register(registry, adapter)?;
    }
    if let Some(ref adapter) = backends.servicenow {
        servicenow::register(registry, adapter)?;
    }

    if registry.len() == before {
        warn!("No backend is configured; the assistant has no tools");
    }
    Ok(registry.len() - before)
}

/// Serialize a tool payload
pub(crate) fn to_payload<T: Serialize>(value: &T) -> backend_sdk::Result<Value> {
    serde_json::to_value(value).map_err(ServiceError::from)
}
