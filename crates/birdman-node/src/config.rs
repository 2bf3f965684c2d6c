//! Configuration types for birdman-node

use crate::cli::Cli;
use birdman_network::{NetworkConfig, DEFAULT_MAX_LINE_LENGTH, DEFAULT_PORT};
use birdman_primitives::{AddressError, PeerAddress};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("failed to read config file {path:?}: {source}")]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },
    /// Config file is not valid TOML
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    /// Address does not parse
    #[error("invalid {field} address {value:?}: {source}")]
    InvalidAddress {
        /// Config field
        field: &'static str,
        /// Offending value
        value: String,
        /// Parse failure
        source: AddressError,
    },
    /// Address parses but has an unusable host or port
    #[error("unusable {field} address: {value}")]
    UnusableAddress {
        /// Config field
        field: &'static str,
        /// Offending value
        value: String,
    },
}

/// Contents of the optional TOML config file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    /// Listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
    /// Data directory
    #[serde(default = "default_datadir")]
    pub datadir: PathBuf,
    /// Address advertised to other nodes
    #[serde(default)]
    pub advertised_address: Option<String>,
    /// Bootstrap peers
    #[serde(default)]
    pub bootnodes: Vec<String>,
    /// Maximum accepted line length in bytes
    #[serde(default = "default_max_line_length")]
    pub max_line_length: usize,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT))
}

fn default_datadir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_max_line_length() -> usize {
    DEFAULT_MAX_LINE_LENGTH
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            datadir: default_datadir(),
            advertised_address: None,
            bootnodes: Vec::new(),
            max_line_length: default_max_line_length(),
        }
    }
}

impl FileConfig {
    /// Load from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }
}

/// Node configuration
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Data directory
    pub datadir: PathBuf,
    /// Network configuration
    pub network: NetworkConfig,
}

impl NodeConfig {
    /// Build the effective configuration: file values first, then CLI overrides.
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        let file = match &cli.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Self::merge(file, cli)
    }

    fn merge(file: FileConfig, cli: &Cli) -> Result<Self, ConfigError> {
        let listen_addr = cli.listen.unwrap_or(file.listen_addr);
        let datadir = cli.datadir.clone().unwrap_or(file.datadir);

        let advertised = cli.advertise.clone().or(file.advertised_address);
        let bootnodes = if cli.bootnodes.is_empty() {
            file.bootnodes
        } else {
            cli.bootnodes.clone()
        };

        let mut network = NetworkConfig::default()
            .with_listen_addr(listen_addr)
            .with_max_line_length(file.max_line_length)
            .with_bootnodes(
                bootnodes
                    .iter()
                    .map(|s| s.trim())
                    .filter(|s| !s.is_empty())
                    .map(|s| parse_peer("bootnodes", s))
                    .collect::<Result<Vec<_>, _>>()?,
            );
        if let Some(adv) = advertised {
            network = network.with_advertised_address(parse_peer("advertised", adv.trim())?);
        }

        Ok(Self { datadir, network })
    }
}

fn parse_peer(field: &'static str, value: &str) -> Result<PeerAddress, ConfigError> {
    let addr = PeerAddress::parse(value).map_err(|source| ConfigError::InvalidAddress {
        field,
        value: value.to_string(),
        source,
    })?;
    if !addr.is_valid() {
        return Err(ConfigError::UnusableAddress {
            field,
            value: value.to_string(),
        });
    }
    Ok(addr)
}
