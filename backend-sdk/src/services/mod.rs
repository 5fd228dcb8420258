//! Backend adapter implementations
//!
//! One `OperationsAdapter` per backend:
//! - GitHub (repository search, files, issues)
//! - Elasticsearch (log search)
//! - ServiceNow (Table API cases/incidents)

pub mod common;
pub mod elasticsearch;
pub mod github;
pub mod servicenow;

pub use elasticsearch::ElasticsearchAdapter;
pub use github::GitHubAdapter;
pub use servicenow::ServiceNowAdapter;
