//! Model-facing contract
//!
//! The language model is an external collaborator: it receives the
//! conversation snapshot plus the tool definitions, and answers with either
//! final text or a list of tool calls.

use async_trait::async_trait;
use thiserror::Error;

use crate::conversation::{Message, ToolCallRequest};
use crate::registry::ToolDefinition;

/// What the model proposed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelResponse {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCallRequest>,
}

impl ModelResponse {
    /// A final answer
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }

    /// A round of tool calls
    pub fn calls(tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            content: None,
            tool_calls,
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Model client errors
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Model request failed: {0}")]
    Transport(String),

    #[error("Model API returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Model rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("Invalid model response: {0}")]
    InvalidResponse(String),

    #[error("Model configuration error: {0}")]
    Configuration(String),
}

impl ModelError {
    /// Transient failures worth another attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            ModelError::Transport(_) | ModelError::RateLimited(_) => true,
            ModelError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// A chat model that can propose tool calls
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn complete(&self, messages: &[Message], tools: &[ToolDefinition]) -> Result<ModelResponse, ModelError>;
}
