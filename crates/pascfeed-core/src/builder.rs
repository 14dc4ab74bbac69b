//! Fluent builder for listeners.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pascfeed_core::builder::ListenerBuilder;
//! use pascfeed_core::channel::Channel;
//! use pascfeed_core::config::ChannelConfig;
//! use pascfeed_core::memory::MemoryNode;
//!
//! let channel = Arc::new(Channel::new(ChannelConfig::default()));
//! let listener = ListenerBuilder::new()
//!     .poll_interval_ms(2_000)
//!     .bootstrap_blocks(50)
//!     .page_size(200)
//!     .build(Arc::new(MemoryNode::new()), channel);
//! ```

use std::sync::Arc;

use crate::cache::EntityCache;
use crate::chain::ChainState;
use crate::channel::EventSink;
use crate::config::{CacheConfig, ListenerConfig};
use crate::listener::Listener;
use crate::node::NodeClient;

/// Fluent builder for [`Listener`] and its `ListenerConfig`.
#[derive(Default)]
pub struct ListenerBuilder {
    config: ListenerConfig,
    cache: CacheConfig,
}

impl ListenerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration.
    pub fn from_config(config: ListenerConfig, cache: CacheConfig) -> Self {
        Self { config, cache }
    }

    /// Set the polling interval in milliseconds.
    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms;
        self
    }

    /// Set the per-tick time limit in milliseconds.
    pub fn tick_timeout_ms(mut self, ms: u64) -> Self {
        self.config.tick_timeout_ms = ms;
        self
    }

    /// Set how many blocks are replayed into history on startup.
    pub fn bootstrap_blocks(mut self, blocks: u64) -> Self {
        self.config.bootstrap_blocks = blocks;
        self
    }

    /// Set the page size for operation list requests.
    pub fn page_size(mut self, size: u64) -> Self {
        self.config.page_size = size;
        self
    }

    /// Bound the entity cache to `capacity` entries per entity type.
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache.capacity = Some(capacity);
        self
    }

    pub fn build_config(self) -> ListenerConfig {
        self.config
    }

    /// Wire a listener around `client`, emitting into `sink`.
    pub fn build<C: NodeClient>(self, client: Arc<C>, sink: Arc<dyn EventSink>) -> Listener<C> {
        let cache = EntityCache::new(Arc::clone(&client), &self.cache);
        Listener::new(self.config, client, ChainState::new(cache, sink))
    }
}
