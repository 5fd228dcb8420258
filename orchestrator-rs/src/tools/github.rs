//! GitHub tools

use std::sync::Arc;

use async_trait::async_trait;
use backend_sdk::{GitHubAdapter, OperationClass};
use serde_json::{json, Value};

use super::to_payload;
use crate::registry::{ParamType, ParameterSpec, RegistryError, ToolArguments, ToolDefinition, ToolHandler, ToolRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    ReposByUser,
    FilesByRepo,
    FileContent,
    CreateIssue,
}

/// One GitHub operation exposed as a tool
pub struct GitHubTool {
    adapter: Arc<GitHubAdapter>,
    operation: Operation,
}

fn repo_param() -> ParameterSpec {
    ParameterSpec::required("repo", ParamType::String, "Repository as 'owner/name'")
}

fn page_params(definition: ToolDefinition) -> ToolDefinition {
    definition
        .param(ParameterSpec::optional("page_size", ParamType::Integer, "Results per page (default 20, max 100)"))
        .param(ParameterSpec::optional("page_number", ParamType::Integer, "1-based page number").with_default(json!(1)))
}

pub(super) fn register(registry: &mut ToolRegistry, adapter: &Arc<GitHubAdapter>) -> Result<(), RegistryError> {
    let tools = [
        (
            page_params(
                ToolDefinition::new(
                    "get_repos_by_user",
                    "List the GitHub repositories owned by a user, most recently updated first.",
                    OperationClass::Read,
                )
                .param(ParameterSpec::required("user", ParamType::String, "GitHub user or organization")),
            ),
            Operation::ReposByUser,
        ),
        (
            ToolDefinition::new(
                "get_files_by_repo",
                "List every file path in the default branch of a repository.",
                OperationClass::Read,
            )
            .param(repo_param()),
            Operation::FilesByRepo,
        ),
        (
            ToolDefinition::new(
                "get_file_content",
                "Fetch the raw content of one file in a repository.",
                OperationClass::Read,
            )
            .param(repo_param())
            .param(ParameterSpec::required("path", ParamType::String, "File path within the repository")),
            Operation::FileContent,
        ),
        (
            ToolDefinition::new(
                "create_issue",
                "Open a new issue in a repository.",
                OperationClass::Mutating,
            )
            .param(repo_param())
            .param(ParameterSpec::required("title", ParamType::String, "Issue title"))
            .param(ParameterSpec::required("body", ParamType::String, "Issue body (Markdown)")),
            Operation::CreateIssue,
        ),
    ];

    for (definition, operation) in tools {
        let handler = GitHubTool {
            adapter: Arc::clone(adapter),
            operation,
        };
        registry.register(definition, Arc::new(handler))?;
    }
    Ok(())
}

#[async_trait]
impl ToolHandler for GitHubTool {
    async fn call(&self, arguments: ToolArguments) -> backend_sdk::Result<Value> {
        match self.operation {
            Operation::ReposByUser => {
                let user = arguments.require_str("user")?;
                let page = self.adapter.list_user_repos(user, &arguments.page_request()).await?;
                to_payload(&page)
            }
            Operation::FilesByRepo => {
                let repo = arguments.require_str("repo")?;
                let files = self.adapter.list_files(repo).await?;
                Ok(json!({ "repo": repo, "count": files.len(), "files": files }))
            }
            Operation::FileContent => {
                let repo = arguments.require_str("repo")?;
                let path = arguments.require_str("path")?;
                let content = self.adapter.file_content(repo, path).await?;
                Ok(json!({ "repo": repo, "path": path, "content": content }))
            }
            Operation::CreateIssue => {
                let issue = self
                    .adapter
                    .create_issue(
                        arguments.require_str("repo")?,
                        arguments.require_str("title")?,
                        arguments.require_str("body")?,
                    )
                    .await?;
                to_payload(&issue)
            }
        }
    }
}
