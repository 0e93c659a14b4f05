//! relay-bot entry point: configuration from the environment, then the update loop

use relay_dl::{Bot, Config, run_with_shutdown};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("relay_dl=info")),
        )
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting relay-bot");

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            return Err(e.into());
        }
    };
    tracing::info!(
        workspace = ?config.workspace.root,
        strategy = ?config.partition.strategy,
        "configuration loaded"
    );

    let bot = Bot::connect(config).await?;
    run_with_shutdown(bot).await?;
    Ok(())
}
