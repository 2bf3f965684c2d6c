//! CLI argument parsing for birdman-node

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Birdman gossip node
#[derive(Parser, Debug, Clone)]
#[command(name = "birdman")]
#[command(about = "Birdman gossip node")]
#[command(version)]
pub struct Cli {
    /// TOML configuration file (command-line values take precedence)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Listen address [default: 0.0.0.0:18018]
    #[arg(long)]
    pub listen: Option<SocketAddr>,

    /// Data directory holding peers.txt and objects.txt [default: ./data]
    #[arg(long)]
    pub datadir: Option<PathBuf>,

    /// Address other nodes should use to reach this one (host:port)
    #[arg(long)]
    pub advertise: Option<String>,

    /// Bootstrap peer addresses (comma-separated, e.g. "1.2.3.4:18018,node.example.org:18018")
    #[arg(long, value_delimiter = ',')]
    pub bootnodes: Vec<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
