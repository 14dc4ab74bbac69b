//! Application configuration: JSON file, then command-line overrides.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use pascfeed_core::{CacheConfig, ChannelConfig, ListenerConfig};
use pascfeed_server::ServerConfig;

use crate::tracing_setup::LogConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// JSON-RPC endpoint of the PascalCoin node
    #[serde(default = "default_node_url")]
    pub node_url: String,
    #[serde(default)]
    pub listener: ListenerConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub channel: ChannelConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub log: LogConfig,
}

fn default_node_url() -> String {
    "http://127.0.0.1:4003".into()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_url: default_node_url(),
            listener: ListenerConfig::default(),
            cache: CacheConfig::default(),
            channel: ChannelConfig::default(),
            server: ServerConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_json(&content).with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn from_json(content: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Load from `--config` when given, then apply `--node`, `--listen`
    /// and `--log-level`.
    pub fn from_args(args: &[String]) -> anyhow::Result<Self> {
        let mut config = match parse_flag(args, "--config") {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        if let Some(url) = parse_flag(args, "--node") {
            config.node_url = url;
        }
        if let Some(addr) = parse_flag(args, "--listen") {
            config.server.listen_addr = addr;
        }
        if let Some(level) = parse_flag(args, "--log-level") {
            config.log.level = level;
        }
        if args.iter().any(|a| a == "--json-logs") {
            config.log.json = true;
        }
        Ok(config)
    }
}

pub fn parse_flag(args: &[String], flag: &str) -> Option<String> {
    let pos = args.iter().position(|a| a == flag)?;
    args.get(pos + 1).cloned()
}
