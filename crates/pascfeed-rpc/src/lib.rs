//! pascfeed-rpc: PascalCoin node JSON-RPC client.
//!
//! ```text
//! Listener ──NodeClient──▶ HttpNodeClient ──reqwest POST──▶ node :4003
//!                              └── JsonRpcRequest { method, params: {..} }
//! ```

pub mod client;
pub mod error;
pub mod request;

pub use client::{HttpClientConfig, HttpNodeClient};
pub use error::TransportError;
pub use request::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, RpcId};
