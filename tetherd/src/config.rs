//! Server configuration
//!
//! A JSON file provides the base values; command-line flags override them.
//! Key and descriptor paths have no defaults and must come from one or the
//! other.

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Missing required setting: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid setting {name}: {reason}")]
    Invalid {
        name: &'static str,
        reason: &'static str,
    },
}

/// Command-line flags
///
/// Every value is optional here so that unset flags leave the config file's
/// value alone.
#[derive(Parser, Debug, Default, Clone)]
#[command(name = "tetherd")]
#[command(about = "Runs preloaded native code regions for authenticated remote clients")]
pub struct Args {
    /// Address to listen on [default: 0.0.0.0]
    #[arg(short = 'H', long)]
    pub host: Option<String>,

    /// Port to listen on [default: 1234]
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Maximum simultaneous clients [default: 128]
    #[arg(short = 'c', long)]
    pub max_clients: Option<usize>,

    /// Raw 32-byte server public key file
    #[arg(long, value_name = "FILE")]
    pub pubkey: Option<PathBuf>,

    /// Raw 32-byte server private key file
    #[arg(long, value_name = "FILE")]
    pub privkey: Option<PathBuf>,

    /// Tether region descriptor file
    #[arg(long, value_name = "FILE")]
    pub tether: Option<PathBuf>,

    /// JSON configuration file
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Longest wait for network events per loop iteration [default: 1000]
    #[arg(long)]
    pub poll_interval_ms: Option<u64>,

    /// Seconds of silence before a client is dropped [default: 30]
    #[arg(long)]
    pub idle_timeout_secs: Option<u64>,
}

/// File-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_clients: usize,
    pub public_key: Option<PathBuf>,
    pub private_key: Option<PathBuf>,
    pub tether: Option<PathBuf>,
    pub poll_interval_ms: u64,
    pub idle_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 1234,
            max_clients: 128,
            public_key: None,
            private_key: None,
            tether: None,
            poll_interval_ms: 1000,
            idle_timeout_secs: 30,
        }
    }
}

impl ServerConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Replaces every value the flags set
    pub fn overlay(mut self, args: &Args) -> Self {
        if let Some(host) = &args.host {
            self.host = host.clone();
        }
        if let Some(port) = args.port {
            self.port = port;
        }
        if let Some(max_clients) = args.max_clients {
            self.max_clients = max_clients;
        }
        if let Some(path) = &args.pubkey {
            self.public_key = Some(path.clone());
        }
        if let Some(path) = &args.privkey {
            self.private_key = Some(path.clone());
        }
        if let Some(path) = &args.tether {
            self.tether = Some(path.clone());
        }
        if let Some(ms) = args.poll_interval_ms {
            self.poll_interval_ms = ms;
        }
        if let Some(secs) = args.idle_timeout_secs {
            self.idle_timeout_secs = secs;
        }
        self
    }

    /// Loads the config file named by `args`, if any, and applies the flags
    pub fn from_args(args: &Args) -> Result<Self, ConfigError> {
        let base = match &args.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        Ok(base.overlay(args))
    }

    /// Checks that everything needed to start is present
    pub fn validate(&self) -> Result<ResolvedConfig, ConfigError> {
        let public_key = self
            .public_key
            .clone()
            .ok_or(ConfigError::MissingRequired("pubkey"))?;
        let private_key = self
            .private_key
            .clone()
            .ok_or(ConfigError::MissingRequired("privkey"))?;
        let tether = self
            .tether
            .clone()
            .ok_or(ConfigError::MissingRequired("tether"))?;

        if self.max_clients == 0 {
            return Err(ConfigError::Invalid {
                name: "max_clients",
                reason: "must be at least 1",
            });
        }
        if self.idle_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                name: "idle_timeout_secs",
                reason: "must be at least 1",
            });
        }

        Ok(ResolvedConfig {
            bind_addr: bind_addr(&self.host, self.port),
            max_clients: self.max_clients,
            public_key,
            private_key,
            tether,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
        })
    }
}

/// Joins host and port into a bindable address; IPv6 literals are bracketed
fn bind_addr(host: &str, port: u16) -> String {
    match host.parse::<IpAddr>() {
        Ok(ip) => SocketAddr::new(ip, port).to_string(),
        Err(_) => format!("{}:{}", host, port),
    }
}

/// Validated settings the server starts from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub bind_addr: String,
    pub max_clients: usize,
    pub public_key: PathBuf,
    pub private_key: PathBuf,
    pub tether: PathBuf,
    pub poll_interval: Duration,
    pub idle_timeout: Duration,
}
