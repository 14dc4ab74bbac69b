//! WebSocket server configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the WebSocket listener binds to, e.g. "0.0.0.0:1337"
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Interval between `ping` events (milliseconds); 0 disables the heartbeat
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
}

fn default_listen_addr() -> String { "127.0.0.1:1337".into() }
fn default_heartbeat_interval_ms() -> u64 { 30_000 }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
        }
    }
}

impl ServerConfig {
    pub fn heartbeat_interval(&self) -> Option<Duration> {
        (self.heartbeat_interval_ms > 0).then(|| Duration::from_millis(self.heartbeat_interval_ms))
    }
}
