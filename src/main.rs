//! QuizDeck server binary.

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use quizdeck::{QuizServer, ServerConfig, VERSION};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_env();
    info!(version = VERSION, "starting quizdeck server");

    let server = QuizServer::new(config);
    server.run().await?;
    Ok(())
}
