//! GitHub adapter
//!
//! Repository search, repository file listing, raw file content and issue
//! creation over the GitHub REST API, authenticated with a bearer token.

mod models;
pub use models::*;

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::Client;
use serde_json::{json, Value};
use url::Url;

use crate::config::GitHubConfig;
use crate::core::{Auth, Capability, ClientBuilder, Entity, Fields, OperationsAdapter};
use crate::error::{Result, ServiceError};
use crate::pagination::{PageRequest, PageResult, Paginator};
use crate::query::{encode, encode_order, Dialect, FilterPredicate, OrderBy, SortDirection};
use crate::resilience::{OperationClass, RetryPolicy};
use crate::services::common::{join_segments, parse_base_url, read_json, read_text, send};

const SERVICE: &str = "github";

const CAPABILITIES: &[Capability] = &[Capability::Create, Capability::Read, Capability::Query];

/// GitHub search never pages past 100 items
const MAX_PAGE_SIZE: i64 = 100;

/// Adapter over the GitHub REST API
pub struct GitHubAdapter {
    http: Client,
    base_url: Url,
    auth: Auth,
    retry: RetryPolicy,
    paginator: Paginator,
}

impl GitHubAdapter {
    /// Create an adapter from configuration
    pub fn new(config: GitHubConfig) -> Result<Self> {
        let http = ClientBuilder::new()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
            .build_http_client()?;

        Ok(Self {
            http,
            base_url: parse_base_url(SERVICE, &config.api_url)?,
            auth: config.auth(),
            retry: RetryPolicy::default(),
            paginator: Paginator::with_max_page_size(MAX_PAGE_SIZE),
        })
    }

    /// Replace the retry policy
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Repositories owned by `user`, one page at a time
    pub async fn list_user_repos(&self, user: &str, page: &PageRequest) -> Result<PageResult<Entity>> {
        if user.trim().is_empty() {
            return Err(ServiceError::validation("user must not be empty"));
        }

        self.query(
            &FilterPredicate::eq("user", user.trim()),
            page,
            Some(&OrderBy::desc("updated")),
        )
        .await
    }

    /// Every file path in the default branch of `repo`
    pub async fn list_files(&self, repo: &str) -> Result<Vec<String>> {
        let repo = RepoRef::parse(repo)?;

        let url = join_segments(&self.base_url, ["repos", repo.owner.as_str(), repo.name.as_str()])?;
        let info: RepositoryInfo = serde_json::from_value(self.get_json("get_repository", url, &[]).await?)?;

        let url = join_segments(
            &self.base_url,
            [
                "repos",
                repo.owner.as_str(),
                repo.name.as_str(),
                "git",
                "trees",
                info.default_branch.as_str(),
            ],
        )?;
        let tree: GitTree = serde_json::from_value(
            self.get_json("get_tree", url, &[("recursive", "1".to_string())]).await?,
        )?;

        if tree.truncated {
            warn!("Git tree for {} was truncated by GitHub; file list is partial", repo);
        }

        let files: Vec<String> = tree
            .tree
            .into_iter()
            .filter(|entry| entry.kind == "blob")
            .map(|entry| entry.path)
            .collect();

        debug!("Listed {} files in {}", files.len(), repo);
        Ok(files)
    }

    /// Raw content of `path` in `repo`
    pub async fn file_content(&self, repo: &str, path: &str) -> Result<String> {
        let repo = RepoRef::parse(repo)?;
        let path = path.trim().trim_matches('/');
        if path.is_empty() {
            return Err(ServiceError::validation("path must not be empty"));
        }

        let mut segments = vec!["repos", repo.owner.as_str(), repo.name.as_str(), "contents"];
        segments.extend(path.split('/').filter(|s| !s.is_empty()));
        let url = join_segments(&self.base_url, segments)?;

        self.retry
            .run("get_file_content", OperationClass::Read, || {
                let request = self
                    .auth
                    .apply(self.http.get(url.clone()))
                    .header("Accept", "application/vnd.github.raw");
                async move {
                    let response = send(&self.http, SERVICE, request).await?;
                    read_text(SERVICE, response).await
                }
            })
            .await
    }

    /// Open an issue; attempted exactly once
    pub async fn create_issue(&self, repo: &str, title: &str, body: &str) -> Result<Entity> {
        let repo = RepoRef::parse(repo)?;
        if title.trim().is_empty() {
            return Err(ServiceError::validation("title must not be empty"));
        }

        let url = join_segments(&self.base_url, ["repos", repo.owner.as_str(), repo.name.as_str(), "issues"])?;
        let payload = json!({ "title": title, "body": body });

        let value = self
            .retry
            .run("create_issue", OperationClass::Mutating, || {
                let request = self.auth.apply(self.http.post(url.clone())).json(&payload);
                async move {
                    let response = send(&self.http, SERVICE, request).await?;
                    read_json(SERVICE, response).await
                }
            })
            .await?;

        let issue: Issue = serde_json::from_value(value)?;
        info!("Created issue #{} in {}", issue.number, repo);
        Ok(issue.into_entity(&repo))
    }

    async fn get_json(&self, label: &str, url: Url, query: &[(&str, String)]) -> Result<Value> {
        self.retry
            .run(label, OperationClass::Read, || {
                let request = self.auth.apply(self.http.get(url.clone())).query(query);
                async move {
                    let response = send(&self.http, SERVICE, request).await?;
                    read_json(SERVICE, response).await
                }
            })
            .await
    }
}

#[async_trait]
impl OperationsAdapter for GitHubAdapter {
    fn name(&self) -> &str {
        SERVICE
    }

    fn capabilities(&self) -> &[Capability] {
        CAPABILITIES
    }

    /// Fields: `repo`, `title`, optional `body`
    async fn create(&self, fields: Fields) -> Result<Entity> {
        let repo = required_str(&fields, "repo")?;
        let title = required_str(&fields, "title")?;
        let body = fields.get("body").and_then(Value::as_str).unwrap_or_default();
        self.create_issue(repo, title, body).await
    }

    /// Identifier: `owner/repo/path/to/file`
    async fn read(&self, identifier: &str) -> Result<Entity> {
        let mut parts = identifier.trim().splitn(3, '/');
        let (owner, name, path) = match (parts.next(), parts.next(), parts.next()) {
            (Some(owner), Some(name), Some(path)) if !owner.is_empty() && !name.is_empty() && !path.is_empty() => {
                (owner, name, path)
            }
            _ => {
                return Err(ServiceError::validation(format!(
                    "Expected 'owner/repo/path', got '{}'",
                    identifier
                )))
            }
        };

        let repo = format!("{}/{}", owner, name);
        let content = self.file_content(&repo, path).await?;

        let mut fields = Fields::new();
        fields.insert("repo".to_string(), Value::String(repo));
        fields.insert("path".to_string(), Value::String(path.to_string()));
        fields.insert("content".to_string(), Value::String(content));
        Ok(Entity::new(fields))
    }

    /// Repository search; the predicate must carry at least one qualifier
    async fn query(
        &self,
        predicate: &FilterPredicate,
        page: &PageRequest,
        order: Option<&OrderBy>,
    ) -> Result<PageResult<Entity>> {
        let q = encode(predicate, Dialect::GitHubSearch)?;
        if q.is_empty() {
            return Err(ServiceError::validation(
                "GitHub repository search needs at least one qualifier",
            ));
        }

        let plan = self.paginator.plan(page)?;
        let page_number = plan.page_number()?;

        let mut params = vec![
            ("q", q),
            ("per_page", plan.limit.to_string()),
            ("page", page_number.to_string()),
        ];
        if let Some(order) = order {
            let encoded = encode_order(order, Dialect::GitHubSearch)?;
            let field = encoded.trim_start_matches(Dialect::GitHubSearch.descending_marker());
            params.push(("sort", field.to_string()));
            params.push((
                "order",
                match order.direction {
                    SortDirection::Ascending => "asc".to_string(),
                    SortDirection::Descending => "desc".to_string(),
                },
            ));
        }

        let url = join_segments(&self.base_url, ["search", "repositories"])?;
        let value = self.get_json("search_repositories", url, &params).await?;
        let search: RepositorySearch = serde_json::from_value(value)?;

        let items = search.items.into_iter().map(Repository::into_entity).collect();
        Ok(self.paginator.interpret(items, &plan, Some(search.total_count)))
    }
}

fn required_str<'a>(fields: &'a Fields, name: &str) -> Result<&'a str> {
    fields
        .get(name)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ServiceError::validation(format!("Missing required field '{}'", name)))
}
