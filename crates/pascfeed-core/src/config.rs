//! Configuration for the listener, entity cache, and delivery channel.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Polling loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerConfig {
    /// Interval between ticks (milliseconds).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Upper bound on a single tick; expiry is fatal (milliseconds).
    #[serde(default = "default_tick_timeout_ms")]
    pub tick_timeout_ms: u64,
    /// Number of blocks, ending at the head, replayed into history on startup.
    /// Also bounds how far back a tick catches up after a gap.
    #[serde(default = "default_bootstrap_blocks")]
    pub bootstrap_blocks: u64,
    /// Page size for `getblockoperations` / `getpendings`.
    #[serde(default = "default_page_size")]
    pub page_size: u64,
}

fn default_poll_interval_ms() -> u64 { 1_000 }
fn default_tick_timeout_ms() -> u64 { 30_000 }
fn default_bootstrap_blocks() -> u64 { 10 }
fn default_page_size() -> u64 { 100 }

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            tick_timeout_ms: default_tick_timeout_ms(),
            bootstrap_blocks: default_bootstrap_blocks(),
            page_size: default_page_size(),
        }
    }
}

impl ListenerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn tick_timeout(&self) -> Duration {
        Duration::from_millis(self.tick_timeout_ms)
    }

    /// Upper bound on bootstrap: one tick timeout per replayed block.
    pub fn bootstrap_timeout(&self) -> Duration {
        Duration::from_millis(
            self.tick_timeout_ms
                .saturating_mul(self.bootstrap_blocks.max(1)),
        )
    }
}

/// Entity cache configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum entries per entity type; `None` keeps everything.
    #[serde(default)]
    pub capacity: Option<usize>,
}

/// Delivery channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Largest snapshot lookback a client may request (blocks).
    #[serde(default = "default_max_snapshot_blocks")]
    pub max_snapshot_blocks: u64,
    #[serde(default = "default_max_subscriptions")]
    pub max_subscriptions_per_client: usize,
}

fn default_max_snapshot_blocks() -> u64 { 100 }
fn default_max_subscriptions() -> usize { 64 }

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            max_snapshot_blocks: default_max_snapshot_blocks(),
            max_subscriptions_per_client: default_max_subscriptions(),
        }
    }
}
