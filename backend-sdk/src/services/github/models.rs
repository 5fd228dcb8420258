//! Wire models for the GitHub REST API

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::core::Entity;
use crate::error::{Result, ServiceError};

/// `owner/name` repository reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    /// Parse `owner/name`, rejecting anything else
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim().trim_end_matches(".git");
        let mut parts = raw.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(owner), Some(name), None) if !owner.is_empty() && !name.is_empty() => Ok(Self {
                owner: owner.to_string(),
                name: name.to_string(),
            }),
            _ => Err(ServiceError::validation(format!(
                "Repository must be in the form 'owner/repo', got '{}'",
                raw
            ))),
        }
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepositoryInfo {
    pub default_branch: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitTree {
    #[serde(default)]
    pub tree: Vec<GitTreeEntry>,
    #[serde(default)]
    pub truncated: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitTreeEntry {
    pub path: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepositorySearch {
    pub total_count: u64,
    #[serde(default)]
    pub items: Vec<Repository>,
}

/// Repository fields surfaced to callers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    pub full_name: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub html_url: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub stargazers_count: u64,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl Repository {
    pub fn into_entity(self) -> Entity {
        match serde_json::to_value(self) {
            Ok(Value::Object(fields)) => Entity::new(fields),
            _ => Entity::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Issue {
    pub number: u64,
    pub html_url: String,
    pub state: String,
    pub title: String,
}

impl Issue {
    pub fn into_entity(self, repo: &RepoRef) -> Entity {
        let value = json!({
            "number": self.number,
            "state": self.state,
            "title": self.title,
            "url": self.html_url,
            "repo": repo.to_string(),
        });
        match value {
            Value::Object(fields) => Entity::new(fields),
            _ => Entity::default(),
        }
    }
}
