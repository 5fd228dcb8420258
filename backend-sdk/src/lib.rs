//! # Backend SDK
//!
//! Uniform access to the three backends the support assistant talks to: a
//! source-hosting platform (GitHub), a log-search engine (Elasticsearch) and an
//! incident/case system (ServiceNow).
//!
//! This crate provides:
//!
//! - The `OperationsAdapter` capability surface every backend implements
//! - A normalized error taxonomy with HTTP error mapping per backend
//! - A single retry policy keyed on error kind and operation mutability
//! - Query encoding from predicate trees into each backend's native syntax
//! - Pagination planning and continuation state
//! - Configuration management utilities
//!
//! ## Architecture
//!
//! - `OperationsAdapter`: create/read/update/query/comment/transition/assign
//! - `FilterPredicate` + `encode`: dialect-specific query strings
//! - `Paginator`: page/offset requests into limit/offset plans
//! - `RetryPolicy`: the only place retries happen
//! - `ServiceError`: every backend fault is classified into one of its kinds

pub mod core;
pub use core::{Ack, Assignee, Auth, Capability, ClientBuilder, Entity, Fields, OperationsAdapter, Visibility};

pub mod services;
pub use services::{elasticsearch, github, servicenow, ElasticsearchAdapter, GitHubAdapter, ServiceNowAdapter};

pub mod error;
pub use error::{ErrorContext, ErrorKind, Result, ServiceError};

pub mod resilience;
pub use resilience::{OperationClass, RetryConfig, RetryPolicy};

pub mod config;
pub use config::{ConfigProvider, ConfigProviderExt, ServiceConfig};

pub mod query;
pub use query::{encode, encode_order, Dialect, FilterPredicate, FilterValue, Operator, OrderBy, SortDirection};

pub mod pagination;
pub use pagination::{PagePlan, PagePosition, PageRequest, PageResult, Paginator};

pub mod util;

#[cfg(test)]
mod tests;
