//! Agent Sandbox - Chat Server Entry Point
//!
//! Starts the HTTP server that exposes the agent API.

use agent_sandbox::{api, config::Config};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agent_sandbox=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    info!(
        model = %config.oracle.model,
        max_iterations = config.max_iterations,
        remote_sandbox = config.sandbox_url.is_some(),
        "Loaded configuration"
    );

    api::serve(config).await?;

    Ok(())
}
