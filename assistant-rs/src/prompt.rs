// assistant-rs/src/prompt.rs
// System prompt seeded into every new session

use backend_sdk::{ConfigProvider, ConfigProviderExt};
use chrono::{DateTime, Local};

const BASE_PROMPT: &str = "You are a support assistant for an operations team. \
Use the available tools to look up repositories and files, search logs, and manage support cases. \
Prefer calling a tool over guessing; when a tool fails, explain what went wrong and what the user can do next. \
Before creating, updating, closing or assigning anything, make sure the user asked for it.";

const DEFAULT_LOG_FIELDS: &str = "level, message, host, @timestamp";

/// Deployment-specific hints appended to the base prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptContext {
    /// GitHub user assumed when the request names none
    pub github_user: Option<String>,
    /// `owner/repo` assumed when the request names none
    pub github_repo: Option<String>,
    /// Field names the log documents carry
    pub log_fields: Vec<String>,
}

impl Default for PromptContext {
    fn default() -> Self {
        Self {
            github_user: None,
            github_repo: None,
            log_fields: split_fields(DEFAULT_LOG_FIELDS),
        }
    }
}

impl PromptContext {
    /// Reads `github_default_user`, `github_default_repo` and
    /// `elasticsearch_log_fields` (comma-separated)
    pub fn from_provider<P: ConfigProvider + ?Sized>(provider: &P) -> Self {
        let github_repo = provider.get_non_empty("github_default_repo");
        let github_user = provider.get_non_empty("github_default_user").or_else(|| {
            github_repo
                .as_deref()
                .and_then(|repo| repo.split_once('/'))
                .map(|(owner, _)| owner.to_string())
        });

        Self {
            github_user,
            github_repo,
            log_fields: split_fields(&provider.get_string_or("elasticsearch_log_fields", DEFAULT_LOG_FIELDS)),
        }
    }
}

fn split_fields(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Build the system prompt for a session started at `now`
pub fn system_prompt(backends: &[&str], context: &PromptContext, now: DateTime<Local>) -> String {
    let mut prompt = format!(
        "{}\n\nCurrent date and time: {}",
        BASE_PROMPT,
        now.format("%Y-%m-%d %H:%M:%S %Z")
    );

    if backends.is_empty() {
        prompt.push_str("\n\nNo backend systems are connected; answer from the conversation only.");
        return prompt;
    }

    prompt.push_str(&format!("\n\nConnected systems: {}.", backends.join(", ")));

    if backends.contains(&"github") {
        let mut defaults = Vec::new();
        if let Some(ref user) = context.github_user {
            defaults.push(format!("GitHub user '{}'", user));
        }
        if let Some(ref repo) = context.github_repo {
            defaults.push(format!("repository '{}'", repo));
        }
        if !defaults.is_empty() {
            prompt.push_str(&format!(
                "\n\nDefaults: {}. Use them when the user does not name one, and confirm with the user before acting on a different one.",
                defaults.join(", ")
            ));
        }
    }

    if backends.contains(&"elasticsearch") && !context.log_fields.is_empty() {
        prompt.push_str(&format!(
            "\n\nLog documents carry fields such as {}. \
When searching logs, translate the request into an Elasticsearch query body over these fields.",
            context.log_fields.join(", ")
        ));
    }

    prompt
}
