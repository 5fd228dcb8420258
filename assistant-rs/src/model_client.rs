// assistant-rs/src/model_client.rs
//
// HTTP client for OpenAI-compatible chat-completions endpoints
//
// This module provides:
// - Conversation replay into the chat-completions message format
// - Tool definitions sent as `function` tools, tool calls parsed back
// - Exponential backoff with jitter for rate limits, 5xx and network faults
//
// Configuration (.env file):
// - LLM_API_URL: endpoint URL (defaults to the OpenAI chat completions endpoint)
// - LLM_API_KEY: API key for the provider
// - LLM_MODEL: model name (e.g. "gpt-4o-mini")
// - LLM_AUTH_HEADER: "bearer" (Authorization: Bearer) or "api-key" (api-key header)
// - LLM_MAX_RETRIES: retries after the first attempt (default: 3)
// - LLM_INITIAL_RETRY_DELAY_MS / LLM_MAX_RETRY_DELAY_MS: backoff bounds
// - LLM_TIMEOUT_SECONDS: per-request timeout (default: 60)

use std::time::Duration;

use async_trait::async_trait;
use backend_sdk::util::sanitize_for_logging;
use backend_sdk::{ConfigProvider, ConfigProviderExt};
use backoff::{backoff::Backoff, ExponentialBackoff, ExponentialBackoffBuilder};
use orchestrator::{Message, ModelClient, ModelError, ModelResponse, ToolCallRequest, ToolDefinition};
use rand::Rng;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

pub const DEFAULT_API_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// How the API key is presented
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthHeader {
    /// `Authorization: Bearer <key>`
    Bearer,
    /// `api-key: <key>` (Azure OpenAI style)
    ApiKey,
}

impl AuthHeader {
    fn parse(value: &str) -> Result<Self, ModelError> {
        match value.trim().to_lowercase().as_str() {
            "bearer" => Ok(AuthHeader::Bearer),
            "api-key" | "api_key" | "apikey" => Ok(AuthHeader::ApiKey),
            other => Err(ModelError::Configuration(format!(
                "LLM_AUTH_HEADER must be 'bearer' or 'api-key', got '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub api_url: String,
    pub api_key: String,
    pub model: String,
    pub auth_header: AuthHeader,
    pub max_retries: u32,
    pub initial_retry_delay_ms: u64,
    pub max_retry_delay_ms: u64,
    pub timeout_seconds: u64,
    pub temperature: Option<f32>,
}

impl ModelSettings {
    /// Read the `LLM_*` settings; the API key is mandatory
    pub fn from_provider<P: ConfigProvider + ?Sized>(provider: &P) -> Result<Self, ModelError> {
        let api_key = provider
            .get_non_empty("llm_api_key")
            .ok_or_else(|| ModelError::Configuration("LLM_API_KEY is not set".to_string()))?;

        Ok(Self {
            api_url: provider.get_string_or("llm_api_url", DEFAULT_API_URL),
            api_key,
            model: provider.get_string_or("llm_model", DEFAULT_MODEL),
            auth_header: AuthHeader::parse(&provider.get_string_or("llm_auth_header", "bearer"))?,
            max_retries: provider.get_int_or("llm_max_retries", 3).max(0) as u32,
            initial_retry_delay_ms: provider.get_int_or("llm_initial_retry_delay_ms", 1000).max(1) as u64,
            max_retry_delay_ms: provider.get_int_or("llm_max_retry_delay_ms", 30000).max(1) as u64,
            timeout_seconds: provider.get_int_or("llm_timeout_seconds", 60).max(1) as u64,
            temperature: provider.get::<f32>("llm_temperature").ok(),
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl ChatMessage {
    fn plain(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.to_string()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    #[serde(default)]
    id: String,
    #[serde(rename = "type", default = "function_type")]
    kind: String,
    function: WireFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunction {
    name: String,
    /// JSON-encoded argument object
    #[serde(default)]
    arguments: String,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct Usage {
    total_tokens: u32,
}

/// Replay the conversation in chat-completions form
fn wire_messages(messages: &[Message]) -> Vec<ChatMessage> {
    messages
        .iter()
        .map(|message| match message {
            Message::System { content } => ChatMessage::plain("system", content),
            Message::User { content } => ChatMessage::plain("user", content),
            Message::Assistant { content, tool_calls } => ChatMessage {
                role: "assistant".to_string(),
                content: content.clone(),
                tool_calls: tool_calls
                    .iter()
                    .map(|call| WireToolCall {
                        id: call.id.clone(),
                        kind: function_type(),
                        function: WireFunction {
                            name: call.name.clone(),
                            arguments: Value::Object(call.arguments.clone()).to_string(),
                        },
                    })
                    .collect(),
                tool_call_id: None,
            },
            Message::Tool(result) => ChatMessage {
                role: "tool".to_string(),
                content: Some(result.to_content()),
                tool_calls: Vec::new(),
                tool_call_id: Some(result.id.clone()),
            },
        })
        .collect()
}

fn wire_tools(tools: &[ToolDefinition]) -> Vec<Value> {
    tools
        .iter()
        .map(|tool| {
            json!({
                "type": "function",
                "function": {
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": tool.json_schema(),
                }
            })
        })
        .collect()
}

/// Arguments arrive as a JSON string; anything unparseable becomes an empty
/// object so parameter validation reports what is missing
fn parse_arguments(name: &str, raw: &str) -> Map<String, Value> {
    if raw.trim().is_empty() {
        return Map::new();
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            log::warn!("Arguments for '{}' are not an object: {}", name, other);
            Map::new()
        }
        Err(err) => {
            log::warn!("Arguments for '{}' are not valid JSON: {}", name, err);
            Map::new()
        }
    }
}

fn into_response(message: ChatMessage) -> ModelResponse {
    let tool_calls = message
        .tool_calls
        .into_iter()
        .map(|call| {
            let arguments = parse_arguments(&call.function.name, &call.function.arguments);
            ToolCallRequest::new(call.id, call.function.name, arguments)
        })
        .collect();

    ModelResponse {
        content: message.content.filter(|text| !text.trim().is_empty()),
        tool_calls,
    }
}

#[derive(Debug)]
pub struct ChatCompletionsClient {
    client: Client,
    settings: ModelSettings,
}

impl ChatCompletionsClient {
    pub fn new(settings: ModelSettings) -> Result<Self, ModelError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_seconds))
            .build()
            .map_err(|e| ModelError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        log::info!(
            "Model client initialized (endpoint: {}, model: {})",
            settings.api_url,
            settings.model
        );
        Ok(Self { client, settings })
    }

    pub fn model(&self) -> &str {
        &self.settings.model
    }

    /// Exponential backoff bounded by the configured delays
    fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(self.settings.initial_retry_delay_ms))
            .with_max_interval(Duration::from_millis(self.settings.max_retry_delay_ms))
            .with_multiplier(2.0)
            .with_max_elapsed_time(Some(Duration::from_secs(120)))
            .with_randomization_factor(0.5)
            .build()
    }

    async fn execute_request(&self, request: &ChatCompletionRequest<'_>) -> Result<ModelResponse, ModelError> {
        let builder = self.client.post(&self.settings.api_url).json(request);
        let builder = match self.settings.auth_header {
            AuthHeader::Bearer => builder.bearer_auth(&self.settings.api_key),
            AuthHeader::ApiKey => builder.header("api-key", &self.settings.api_key),
        };

        let response = builder.send().await.map_err(|err| {
            if err.is_timeout() {
                ModelError::Transport(format!("Request timed out: {}", err))
            } else if err.is_connect() {
                ModelError::Transport(format!("Connection failed: {}", err))
            } else {
                ModelError::Transport(format!("Network error: {}", err))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let text = sanitize_for_logging(&response.text().await.unwrap_or_default());
            return Err(match status {
                StatusCode::TOO_MANY_REQUESTS => ModelError::RateLimited(text),
                _ => ModelError::Status {
                    status: status.as_u16(),
                    message: text,
                },
            });
        }

        let data: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|err| ModelError::InvalidResponse(format!("Failed to parse response: {}", err)))?;

        if let Some(usage) = &data.usage {
            log::info!("Model request completed. Used {} tokens", usage.total_tokens);
        }

        data.choices
            .into_iter()
            .next()
            .map(|choice| into_response(choice.message))
            .ok_or_else(|| ModelError::InvalidResponse("No choices returned in response".to_string()))
    }
}

#[async_trait]
impl ModelClient for ChatCompletionsClient {
    async fn complete(&self, messages: &[Message], tools: &[ToolDefinition]) -> Result<ModelResponse, ModelError> {
        let request = ChatCompletionRequest {
            model: &self.settings.model,
            messages: wire_messages(messages),
            tools: wire_tools(tools),
            temperature: self.settings.temperature,
        };

        log::debug!(
            "Sending {} messages and {} tools to {}",
            request.messages.len(),
            request.tools.len(),
            self.settings.api_url
        );

        let mut backoff = self.create_backoff();
        let mut attempt = 0;

        loop {
            attempt += 1;
            if attempt > 1 {
                log::info!("Retry attempt {} for model request", attempt);
            }

            match self.execute_request(&request).await {
                Ok(response) => return Ok(response),
                Err(err) => {
                    if !err.is_retryable() || attempt > self.settings.max_retries {
                        log::error!("Model request failed after {} attempts: {}", attempt, err);
                        return Err(err);
                    }

                    match backoff.next_backoff() {
                        Some(delay) => {
                            let jitter = rand::thread_rng().gen_range(0..=200);
                            let delay = delay + Duration::from_millis(jitter);
                            log::warn!("Retryable model error: {}. Retrying in {:?}", err, delay);
                            tokio::time::sleep(delay).await;
                        }
                        None => {
                            log::error!("Exceeded maximum backoff time: {}", err);
                            return Err(err);
                        }
                    }
                }
            }
        }
    }
}
