//! Conversation state
//!
//! An append-only, ordered log of the messages exchanged in one session.
//! Insertion order is the replay order fed to the model.
//!
//! The log also tracks the open round: the tool calls proposed by the most
//! recent assistant message that have not been answered yet. A tool result
//! may only answer one of those calls, and only once, and nothing else may
//! be appended until every call has been answered.

use std::collections::HashSet;
use std::fmt;

use backend_sdk::{ErrorKind, ServiceError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        };
        f.write_str(name)
    }
}

/// A tool invocation proposed by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Unique within a turn
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl ToolCallRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// Structured error carried by a failed tool result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&ServiceError> for ToolFailure {
    fn from(error: &ServiceError) -> Self {
        Self {
            kind: error.kind(),
            message: error.message().to_string(),
        }
    }
}

/// Outcome of one tool call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResult {
    /// Equal to the originating request's id
    pub id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolFailure>,
}

impl ToolCallResult {
    pub fn success(id: impl Into<String>, payload: Value) -> Self {
        Self {
            id: id.into(),
            success: true,
            payload: Some(payload),
            error: None,
        }
    }

    pub fn failure(id: impl Into<String>, error: &ServiceError) -> Self {
        Self {
            id: id.into(),
            success: false,
            payload: None,
            error: Some(ToolFailure::from(error)),
        }
    }

    /// Kind of the carried error, if the call failed
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }

    /// JSON text handed back to the model
    pub fn to_content(&self) -> String {
        let value = if self.success {
            json!({ "success": true, "data": self.payload.clone().unwrap_or(Value::Null) })
        } else {
            json!({ "success": false, "error": self.error })
        };
        value.to_string()
    }
}

/// One entry in the conversation log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCallRequest>,
    },
    Tool(ToolCallResult),
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Message::System { content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Message::User { content: content.into() }
    }

    /// Final assistant text, with no tool calls
    pub fn assistant(content: impl Into<String>) -> Self {
        Message::Assistant {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }

    /// Assistant message proposing tool calls
    pub fn tool_calls(content: Option<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
        Message::Assistant { content, tool_calls }
    }

    pub fn tool(result: ToolCallResult) -> Self {
        Message::Tool(result)
    }

    pub fn role(&self) -> Role {
        match self {
            Message::System { .. } => Role::System,
            Message::User { .. } => Role::User,
            Message::Assistant { .. } => Role::Assistant,
            Message::Tool(_) => Role::Tool,
        }
    }

    /// Text content as the model sees it
    pub fn content(&self) -> Option<String> {
        match self {
            Message::System { content } | Message::User { content } => Some(content.clone()),
            Message::Assistant { content, .. } => content.clone(),
            Message::Tool(result) => Some(result.to_content()),
        }
    }
}

/// Violations of the conversation log's ordering rules
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversationError {
    #[error("Tool result '{0}' does not answer a call from the preceding assistant message")]
    OrphanToolResult(String),

    #[error("Tool call '{0}' was already answered")]
    DuplicateToolResult(String),

    #[error("Tool call id '{0}' was issued twice in one turn")]
    DuplicateToolCall(String),

    #[error("Round closed with {} unanswered tool call(s): {}", .0.len(), .0.join(", "))]
    UnansweredToolCalls(Vec<String>),
}

#[derive(Debug, Default)]
struct OpenRound {
    issued: Vec<String>,
    answered: HashSet<String>,
}

impl OpenRound {
    fn pending(&self) -> Vec<String> {
        self.issued
            .iter()
            .filter(|id| !self.answered.contains(*id))
            .cloned()
            .collect()
    }
}

/// Ordered message log for one session
#[derive(Debug, Default)]
pub struct ConversationState {
    messages: Vec<Message>,
    round: Option<OpenRound>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a session seeded with a system prompt
    pub fn with_system_prompt(prompt: impl Into<String>) -> Self {
        let mut state = Self::new();
        state.messages.push(Message::system(prompt));
        state
    }

    /// Append a message
    ///
    /// A tool message must answer an unanswered call of the open round. Any
    /// other message is rejected while that round still has unanswered
    /// calls; once accepted, an assistant message with tool calls opens a
    /// new round and anything else closes it.
    pub fn append(&mut self, message: Message) -> Result<(), ConversationError> {
        if !matches!(message, Message::Tool(_)) {
            self.ensure_round_closed()?;
        }

        match &message {
            Message::Tool(result) => {
                let round = self
                    .round
                    .as_mut()
                    .ok_or_else(|| ConversationError::OrphanToolResult(result.id.clone()))?;

                if !round.issued.contains(&result.id) {
                    return Err(ConversationError::OrphanToolResult(result.id.clone()));
                }
                if !round.answered.insert(result.id.clone()) {
                    return Err(ConversationError::DuplicateToolResult(result.id.clone()));
                }
            }
            Message::Assistant { tool_calls, .. } if !tool_calls.is_empty() => {
                self.round = Some(OpenRound {
                    issued: tool_calls.iter().map(|call| call.id.clone()).collect(),
                    answered: HashSet::new(),
                });
            }
            _ => self.round = None,
        }

        self.messages.push(message);
        Ok(())
    }

    /// Fail if the open round still has unanswered calls
    pub fn ensure_round_closed(&self) -> Result<(), ConversationError> {
        match &self.round {
            Some(round) => {
                let pending = round.pending();
                if pending.is_empty() {
                    Ok(())
                } else {
                    Err(ConversationError::UnansweredToolCalls(pending))
                }
            }
            None => Ok(()),
        }
    }

    /// Calls of the open round still waiting for a result, in issue order
    pub fn pending_tool_calls(&self) -> Vec<String> {
        self.round.as_ref().map(OpenRound::pending).unwrap_or_default()
    }

    /// Ordered view of every message, for submission to the model
    pub fn snapshot(&self) -> &[Message] {
        &self.messages
    }

    /// Drop everything, keeping the system prompt if one was seeded
    pub fn clear(&mut self) {
        let system = match self.messages.first() {
            Some(message @ Message::System { .. }) => Some(message.clone()),
            _ => None,
        };
        self.messages.clear();
        self.messages.extend(system);
        self.round = None;
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }
}
