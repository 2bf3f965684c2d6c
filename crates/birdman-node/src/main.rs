//! Birdman node binary
//!
//! Runs a single gossip node: listens for peers, discovers more through
//! `getpeers`, and relays application objects.

mod cli;
mod config;
mod node;

use anyhow::Result;
use cli::Cli;
use config::NodeConfig;
use node::Node;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse_args();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    tracing::info!("Birdman node starting...");

    let config = NodeConfig::from_cli(&cli)?;
    let node = Arc::new(Node::new(config)?);

    // Handle Ctrl+C for graceful shutdown
    let node_clone = Arc::clone(&node);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Shutdown signal received");
        node_clone.stop().await;
    });

    node.run().await?;

    tracing::info!("Birdman node stopped");

    Ok(())
}
