//! pascfeed-core: ingestion, event log and subscription engine for PascFeed.
//!
//! # Architecture
//!
//! ```text
//! ListenerBuilder → Listener ──poll──▶ NodeClient (HTTP JSON-RPC / memory)
//!                      └── ChainState   (pending vs mined, maturation)
//!                            ├── EntityCache  (accounts, public keys)
//!                            └── EventSink = Channel
//!                                  ├── EventLog             (recent + sealed history)
//!                                  ├── SubscriptionRegistry (kind + filters)
//!                                  └── per-client queues → transport
//! ```

pub mod account;
pub mod block;
pub mod builder;
pub mod cache;
pub mod chain;
pub mod channel;
pub mod config;
pub mod error;
pub mod event;
pub mod event_log;
pub mod filter;
pub mod listener;
pub mod memory;
pub mod node;
pub mod operation;
pub mod subscription;
pub mod types;

pub use account::{Account, PublicKey, SaleState};
pub use block::Block;
pub use builder::ListenerBuilder;
pub use cache::EntityCache;
pub use chain::ChainState;
pub use channel::{Channel, EventSink, Outbound};
pub use config::{CacheConfig, ChannelConfig, ListenerConfig};
pub use error::FeedError;
pub use event::{Event, EventData, EventKind};
pub use event_log::EventLog;
pub use filter::{Filter, FilterOp};
pub use listener::{Listener, TickSummary};
pub use node::NodeClient;
pub use operation::{Operation, OperationHash, OperationInfo, OperationType};
pub use subscription::{ClientId, SubscribeError, Subscription, SubscriptionRegistry};
pub use types::{AccountNumber, Currency};
