// assistant-rs/src/main.rs
// Main entry point for the support assistant REPL

use std::sync::Arc;

use backend_sdk::config::DEFAULT_PROVIDER;
use dotenv::dotenv;
use orchestrator::{register_backend_tools, Backends, Orchestrator, OrchestratorConfig, ToolRegistry};

mod model_client;
mod prompt;
mod repl;


use model_client::{ChatCompletionsClient, ModelSettings};
use prompt::PromptContext;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let provider = DEFAULT_PROVIDER.clone();

    let backends = Backends::from_provider(provider.as_ref());
    let mut registry = ToolRegistry::new();
    let tool_count = register_backend_tools(&mut registry, &backends)?;
    let configured = backends.configured();
    log::info!("Registered {} tools for backends: {:?}", tool_count, configured);

    let settings = ModelSettings::from_provider(provider.as_ref())?;
    let model = Arc::new(ChatCompletionsClient::new(settings)?);
    log::info!("Using model {}", model.model());

    let config = OrchestratorConfig::from_provider(provider.as_ref());
    log::info!(
        "Orchestrator limits: {} rounds, {:?} turn timeout",
        config.max_rounds,
        config.turn_timeout
    );
    let orchestrator = Orchestrator::with_config(Arc::new(registry), model, config);

    let context = PromptContext::from_provider(provider.as_ref());
    repl::run(&orchestrator, &configured, &context).await
}
