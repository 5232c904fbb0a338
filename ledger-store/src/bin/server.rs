//! Ledger store server binary

use ledger_store::{Config, Storage};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting Tallybook ledger server");

    // Load configuration
    let config = Config::from_env()?;

    // Open store
    let _storage = Storage::open(&config)?;
    tracing::info!("Ledger store opened successfully");

    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down ledger server");
    Ok(())
}
