//! Error types for the ingestion pipeline.

use thiserror::Error;

/// Errors that can occur while ingesting and distributing chain state.
#[derive(Debug, Error)]
pub enum FeedError {
    /// The node could not be reached or answered with something unparseable.
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Tick timed out after {ms}ms")]
    Timeout { ms: u64 },

    #[error("Invalid checksum for account {account}: expected {expected}, got {actual}")]
    InvalidChecksum {
        account: u64,
        expected: u8,
        actual: u8,
    },

    #[error("Invalid account number: {0}")]
    InvalidAccountNumber(String),

    #[error("Invalid account state: {0}")]
    InvalidAccountState(String),

    #[error("Invalid operation hash: {0}")]
    InvalidOperationHash(String),

    #[error("Block {got} is not newer than the latest known block {latest}")]
    OutOfOrderBlock { latest: u64, got: u64 },

    #[error("Block {block} has already been sealed")]
    AlreadySealed { block: u64 },

    #[error("Node has no block {0}")]
    BlockNotFound(u64),

    #[error("{0}")]
    Other(String),
}

impl FeedError {
    /// Returns `true` for errors raised while constructing a domain value.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidChecksum { .. }
                | Self::InvalidAccountNumber(_)
                | Self::InvalidAccountState(_)
                | Self::InvalidOperationHash(_)
        )
    }
}
