//! Orchestration loop
//!
//! Drives one turn: append the user message, ask the model, dispatch any
//! proposed tool calls, append their results and ask again, until the model
//! answers with text or a bound is hit.
//!
//! Tool failures become failed results that the model sees on the next
//! round. Only unknown tools, conversation invariant violations, the round
//! bound, rejected credentials, model failures and the turn deadline end a
//! turn early; each of those appends a user-facing assistant message.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use backend_sdk::{ConfigProvider, ConfigProviderExt, ErrorKind, ServiceError};
use futures::stream::{self, StreamExt};
use log::{debug, error, info, warn};
use thiserror::Error;
use tokio::time::{timeout_at, Instant};

use crate::conversation::{ConversationError, ConversationState, Message, ToolCallRequest, ToolCallResult};
use crate::model::{ModelClient, ModelError};
use crate::registry::{RegisteredTool, ToolArguments, ToolDefinition, ToolRegistry};

/// Default bound on tool-dispatch rounds per turn
pub const DEFAULT_MAX_ROUNDS: usize = 10;

/// Default wall-clock budget for one turn
pub const DEFAULT_TURN_TIMEOUT: Duration = Duration::from_secs(120);

const CANCELLED_MESSAGE: &str = "cancelled: turn deadline exceeded";

/// Orchestration settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    pub max_rounds: usize,
    /// Concurrent tool calls per round; `None` runs the whole round at once
    pub max_concurrency: Option<usize>,
    pub turn_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_rounds: DEFAULT_MAX_ROUNDS,
            max_concurrency: None,
            turn_timeout: DEFAULT_TURN_TIMEOUT,
        }
    }
}

impl OrchestratorConfig {
    /// Load settings from a config provider
    ///
    /// Reads `orchestrator_max_rounds`, `orchestrator_max_concurrency` and
    /// `orchestrator_turn_timeout_secs`; missing or invalid values fall back
    /// to the defaults.
    pub fn from_provider<P: ConfigProvider + ?Sized>(provider: &P) -> Self {
        let max_rounds = provider.get_int_or("orchestrator_max_rounds", DEFAULT_MAX_ROUNDS as i64);
        let turn_timeout = provider.get_int_or(
            "orchestrator_turn_timeout_secs",
            DEFAULT_TURN_TIMEOUT.as_secs() as i64,
        );

        Self {
            max_rounds: max_rounds.max(1) as usize,
            max_concurrency: provider
                .get_int("orchestrator_max_concurrency")
                .ok()
                .filter(|n| *n > 0)
                .map(|n| n as usize),
            turn_timeout: Duration::from_secs(turn_timeout.max(1) as u64),
        }
    }
}

/// Where a turn is in its state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    AwaitingUserInput,
    ModelProposing,
    Dispatching,
    Finalized,
}

impl fmt::Display for TurnPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TurnPhase::AwaitingUserInput => "awaiting_user_input",
            TurnPhase::ModelProposing => "model_proposing",
            TurnPhase::Dispatching => "dispatching",
            TurnPhase::Finalized => "finalized",
        };
        f.write_str(name)
    }
}

/// Reasons a turn ends without a model answer
#[derive(Debug, Error)]
pub enum TurnError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Conversation invariant violated: {0}")]
    Invariant(#[from] ConversationError),

    #[error("Exceeded {0} tool-dispatch rounds")]
    MaxRoundsExceeded(usize),

    #[error("Authentication rejected by tool {tool}: {message}")]
    Authentication { tool: String, message: String },

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Turn timed out after {0:?}")]
    Timeout(Duration),
}

impl TurnError {
    /// Text shown to the user; never includes internal detail
    pub fn user_message(&self) -> String {
        match self {
            TurnError::UnknownTool(name) => format!(
                "I tried to use a tool that is not available ({}). Please rephrase your request.",
                name
            ),
            TurnError::Invariant(_) => {
                "Something went wrong while tracking this conversation. Please try again, or use /clear to start over."
                    .to_string()
            }
            TurnError::MaxRoundsExceeded(rounds) => format!(
                "MaxRoundsExceeded: I stopped after {} rounds of tool calls without reaching an answer. Please narrow the request.",
                rounds
            ),
            TurnError::Authentication { tool, .. } => format!(
                "The backend behind '{}' rejected the configured credentials. Please check them and try again.",
                tool
            ),
            TurnError::Model(_) => "The language model could not be reached. Please try again shortly.".to_string(),
            TurnError::Timeout(limit) => format!(
                "The request did not finish within {} seconds. Please try again.",
                limit.as_secs()
            ),
        }
    }
}

/// The model's final answer for a turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnReply {
    pub text: String,
    /// Tool-dispatch rounds the turn used
    pub rounds: usize,
    /// Tool calls dispatched across all rounds
    pub tool_calls: usize,
}

enum RoundEnd {
    Continue,
    Fatal(TurnError),
}

/// Runs turns for one session
pub struct Orchestrator {
    registry: Arc<ToolRegistry>,
    model: Arc<dyn ModelClient>,
    definitions: Vec<ToolDefinition>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(registry: Arc<ToolRegistry>, model: Arc<dyn ModelClient>) -> Self {
        Self::with_config(registry, model, OrchestratorConfig::default())
    }

    pub fn with_config(registry: Arc<ToolRegistry>, model: Arc<dyn ModelClient>, config: OrchestratorConfig) -> Self {
        let definitions = registry.definitions();
        Self {
            registry,
            model,
            definitions,
            config,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Run one turn for `input`
    ///
    /// On failure a user-facing assistant message is appended before the
    /// error is returned, so the log always ends in a closed turn.
    pub async fn run_turn(&self, state: &mut ConversationState, input: &str) -> Result<TurnReply, TurnError> {
        let deadline = Instant::now() + self.config.turn_timeout;

        let outcome = match self.drive(state, input, deadline).await {
            Ok(reply) => {
                log_phase(TurnPhase::Finalized);
                info!(
                    "Turn finished after {} round(s) and {} tool call(s)",
                    reply.rounds, reply.tool_calls
                );
                Ok(reply)
            }
            Err(err) => {
                error!("Turn terminated: {}", err);
                state.append(Message::assistant(err.user_message()))?;
                log_phase(TurnPhase::Finalized);
                Err(err)
            }
        };

        log_phase(TurnPhase::AwaitingUserInput);
        outcome
    }

    async fn drive(&self, state: &mut ConversationState, input: &str, deadline: Instant) -> Result<TurnReply, TurnError> {
        state.append(Message::user(input))?;

        let mut rounds = 0;
        let mut dispatched = 0;
        let mut issued_ids = HashSet::new();

        loop {
            log_phase(TurnPhase::ModelProposing);
            let response = timeout_at(deadline, self.model.complete(state.snapshot(), &self.definitions))
                .await
                .map_err(|_| TurnError::Timeout(self.config.turn_timeout))??;

            if !response.has_tool_calls() {
                let text = response.content.unwrap_or_default();
                state.append(Message::assistant(text.clone()))?;
                return Ok(TurnReply {
                    text,
                    rounds,
                    tool_calls: dispatched,
                });
            }

            if rounds >= self.config.max_rounds {
                return Err(TurnError::MaxRoundsExceeded(rounds));
            }
            rounds += 1;

            let mut calls = response.tool_calls;
            for (i, call) in calls.iter_mut().enumerate() {
                if call.id.trim().is_empty() {
                    call.id = format!("call_{}_{}", rounds, i + 1);
                }
                if !issued_ids.insert(call.id.clone()) {
                    return Err(ConversationError::DuplicateToolCall(call.id.clone()).into());
                }
            }
            dispatched += calls.len();

            log_phase(TurnPhase::Dispatching);
            info!("Round {}: dispatching {} tool call(s)", rounds, calls.len());

            match self.dispatch_round(state, response.content, calls, deadline).await? {
                RoundEnd::Continue => {}
                RoundEnd::Fatal(err) => return Err(err),
            }
        }
    }

    /// Dispatch one round and append its results in request order
    async fn dispatch_round(
        &self,
        state: &mut ConversationState,
        content: Option<String>,
        calls: Vec<ToolCallRequest>,
        deadline: Instant,
    ) -> Result<RoundEnd, TurnError> {
        // Unknown tools abort before the proposal enters the log
        let tools = calls
            .iter()
            .map(|call| {
                self.registry
                    .resolve(&call.name)
                    .map_err(|_| TurnError::UnknownTool(call.name.clone()))
            })
            .collect::<Result<Vec<&RegisteredTool>, TurnError>>()?;

        state.append(Message::tool_calls(content, calls.clone()))?;

        let mut slots: Vec<Option<ToolCallResult>> = vec![None; calls.len()];
        let mut runnable = Vec::new();

        for (i, (call, tool)) in calls.iter().zip(tools.iter()).enumerate() {
            match tool.validate(&call.arguments) {
                Ok(arguments) => runnable.push((i, call.id.clone(), *tool, arguments)),
                Err(err) => {
                    warn!("Tool {} ({}) rejected arguments: {}", call.name, call.id, err);
                    slots[i] = Some(ToolCallResult::failure(&call.id, &ServiceError::from(err)));
                }
            }
        }

        let limit = self.config.max_concurrency.unwrap_or(calls.len()).max(1);
        let mut in_flight = stream::iter(runnable.into_iter().map(|(i, id, tool, arguments)| async move {
            (i, execute(tool, id, arguments).await)
        }))
        .buffer_unordered(limit);

        let mut timed_out = false;
        loop {
            match timeout_at(deadline, in_flight.next()).await {
                Ok(Some((i, result))) => slots[i] = Some(result),
                Ok(None) => break,
                Err(_) => {
                    timed_out = true;
                    break;
                }
            }
        }
        // Dropping the stream cancels whatever is still running
        drop(in_flight);

        let mut auth_failure = None;
        for (call, slot) in calls.iter().zip(slots) {
            let result = slot.unwrap_or_else(|| {
                warn!("Tool {} ({}) cancelled at the turn deadline", call.name, call.id);
                ToolCallResult::failure(&call.id, &ServiceError::transient_network(CANCELLED_MESSAGE))
            });

            if auth_failure.is_none() && result.error_kind() == Some(ErrorKind::AuthError) {
                auth_failure = Some(TurnError::Authentication {
                    tool: call.name.clone(),
                    message: result.error.as_ref().map(|e| e.message.clone()).unwrap_or_default(),
                });
            }

            state.append(Message::tool(result))?;
        }
        state.ensure_round_closed()?;

        if timed_out {
            return Ok(RoundEnd::Fatal(TurnError::Timeout(self.config.turn_timeout)));
        }
        if let Some(err) = auth_failure {
            return Ok(RoundEnd::Fatal(err));
        }
        Ok(RoundEnd::Continue)
    }
}

/// Run one validated call; every error becomes a failed result
async fn execute(tool: &RegisteredTool, id: String, arguments: ToolArguments) -> ToolCallResult {
    let name = tool.definition.name.as_str();
    let start = Instant::now();
    let outcome = tool.handler.call(arguments).await;
    let elapsed = start.elapsed();

    match outcome {
        Ok(payload) => {
            debug!("Tool {} ({}) succeeded in {:?}", name, id, elapsed);
            ToolCallResult::success(id, payload)
        }
        Err(err) => {
            match err.kind() {
                ErrorKind::UnknownError => error!("Tool {} ({}) failed after {:?}: {:?}", name, id, elapsed, err),
                kind => warn!("Tool {} ({}) failed with {} after {:?}: {}", name, id, kind, elapsed, err),
            }
            ToolCallResult::failure(id, &err)
        }
    }
}

fn log_phase(phase: TurnPhase) {
    debug!("Turn phase: {}", phase);
}

#[cfg(test)]
mod tests {
    use super::*;
    use backend_sdk::config::MemoryConfigProvider;

    #[test]
    fn test_config_from_provider() {
        let mut provider = MemoryConfigProvider::new();
        provider.set("orchestrator_max_rounds", "4");
        provider.set("orchestrator_max_concurrency", "2");
        provider.set("orchestrator_turn_timeout_secs", "15");

        let config = OrchestratorConfig::from_provider(&provider);
        assert_eq!(config.max_rounds, 4);
        assert_eq!(config.max_concurrency, Some(2));
        assert_eq!(config.turn_timeout, Duration::from_secs(15));
    }

    #[test]
    fn test_config_defaults() {
        let config = OrchestratorConfig::from_provider(&MemoryConfigProvider::new());
        assert_eq!(config, OrchestratorConfig::default());
    }

    #[test]
    fn test_user_messages_hide_detail() {
        let err = TurnError::Authentication {
            tool: "get_case".to_string(),
            message: "Bearer abc rejected".to_string(),
        };
        assert!(!err.user_message().contains("abc"));
        assert!(TurnError::MaxRoundsExceeded(10).user_message().starts_with("MaxRoundsExceeded"));
    }
}
