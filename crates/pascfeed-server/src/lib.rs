//! pascfeed-server: WebSocket delivery of PascFeed events.
//!
//! ```text
//! TcpListener ──accept──▶ handle_connection (one task per client)
//!                            ├── inbound text  → Channel::handle_message
//!                            └── Outbound queue → text frames
//! spawn_heartbeat ──ping──▶ Channel::publish
//! ```

pub mod config;
pub mod error;
pub mod server;

pub use config::ServerConfig;
pub use error::ServerError;
pub use server::{handle_connection, spawn_heartbeat, FeedServer};
