//! # Orchestrator
//!
//! The conversational core of the support assistant: an append-only
//! conversation log, a declarative tool registry, and the loop that turns a
//! model's tool-call proposals into backend calls.
//!
//! A turn runs `AwaitingUserInput -> ModelProposing -> Dispatching ->
//! ModelProposing ... -> Finalized`. Tool calls within a round run
//! concurrently, and their results are appended in the order the model
//! issued them.

pub mod conversation;
pub use conversation::{ConversationError, ConversationState, Message, Role, ToolCallRequest, ToolCallResult, ToolFailure};

pub mod registry;
pub use registry::{
    ParamType, ParameterSpec, RegisteredTool, RegistryError, ToolArguments, ToolDefinition, ToolHandler, ToolRegistry,
};

pub mod model;
pub use model::{ModelClient, ModelError, ModelResponse};

pub mod orchestrator;
pub use orchestrator::{Orchestrator, OrchestratorConfig, TurnError, TurnPhase, TurnReply};

pub mod tools;
pub use tools::{register_backend_tools, Backends};

#[cfg(test)]
mod tests;
