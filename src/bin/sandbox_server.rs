//! Sandbox Server Entry Point
//!
//! Exposes the code-execution sandbox over HTTP.

use agent_sandbox::{config::SandboxConfig, sandbox::server};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agent_sandbox=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = SandboxConfig::from_env()?;
    server::serve(config).await?;

    Ok(())
}
