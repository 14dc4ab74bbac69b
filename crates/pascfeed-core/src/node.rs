//! The node collaborator: raw RPC records and the `NodeClient` trait.
//!
//! Field names follow the PascalCoin JSON-RPC API so implementations can
//! deserialize responses straight into these records.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::FeedError;
use crate::types::{AccountNumber, Currency};

/// A block as returned by `getblock`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockRecord {
    pub block: u64,
    pub enc_pubkey: String,
    pub reward: Currency,
    pub fee: Currency,
    pub ver: u32,
    pub ver_a: u32,
    pub timestamp: i64,
    pub target: u64,
    pub nonce: u64,
    pub payload: String,
    pub sbh: String,
    pub oph: String,
    pub pow: String,
    pub operations: u32,
    pub hashratekhs: u64,
    pub maturation: u64,
}

/// One sending party of an operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SenderRecord {
    pub account: AccountNumber,
    #[serde(default)]
    pub n_operation: u64,
    #[serde(default)]
    pub amount: Currency,
    #[serde(default)]
    pub payload: String,
}

/// One receiving party of an operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiverRecord {
    pub account: AccountNumber,
    #[serde(default)]
    pub amount: Currency,
    #[serde(default)]
    pub payload: String,
}

/// One account whose properties an operation changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangerRecord {
    pub account: AccountNumber,
    #[serde(default)]
    pub n_operation: Option<u64>,
    #[serde(default)]
    pub new_enc_pubkey: Option<String>,
    #[serde(default)]
    pub new_name: Option<String>,
    #[serde(default)]
    pub new_type: Option<u32>,
    #[serde(default)]
    pub seller_account: Option<AccountNumber>,
    #[serde(default)]
    pub account_price: Option<Currency>,
    #[serde(default)]
    pub locked_until_block: Option<u64>,
    #[serde(default)]
    pub fee: Option<Currency>,
}

/// An operation as returned by `getblockoperations` / `getpendings`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationRecord {
    pub ophash: String,
    #[serde(default)]
    pub block: u64,
    #[serde(default)]
    pub time: i64,
    #[serde(default)]
    pub opblock: u32,
    #[serde(default)]
    pub optype: u32,
    #[serde(default)]
    pub subtype: u32,
    pub account: AccountNumber,
    #[serde(default)]
    pub signer_account: Option<AccountNumber>,
    #[serde(default)]
    pub n_operation: u64,
    #[serde(default)]
    pub fee: Currency,
    #[serde(default)]
    pub amount: Currency,
    #[serde(default)]
    pub payload: String,
    #[serde(default)]
    pub optxt: String,
    #[serde(default)]
    pub senders: Vec<SenderRecord>,
    #[serde(default)]
    pub receivers: Vec<ReceiverRecord>,
    #[serde(default)]
    pub changers: Vec<ChangerRecord>,
}

/// An account as returned by `getaccount`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub account: AccountNumber,
    #[serde(default)]
    pub enc_pubkey: String,
    #[serde(default)]
    pub balance: Currency,
    #[serde(default)]
    pub n_operation: u64,
    #[serde(default)]
    pub updated_b: u64,
    #[serde(default = "default_state")]
    pub state: String,
    #[serde(default)]
    pub locked_until_block: Option<u64>,
    #[serde(default)]
    pub price: Option<Currency>,
    #[serde(default)]
    pub seller_account: Option<AccountNumber>,
    #[serde(default)]
    pub private_sale: Option<bool>,
    #[serde(default)]
    pub new_enc_pubkey: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type")]
    pub account_type: u32,
}

fn default_state() -> String {
    "normal".into()
}

/// A decoded public key as returned by `decodepubkey`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublicKeyRecord {
    pub name: String,
    pub can_use: bool,
    pub enc_pubkey: String,
    pub b58_pubkey: String,
    pub ec_nid: u32,
    pub x: String,
    pub y: String,
}

/// The RPC interface of a PascalCoin node.
///
/// Transport failures are returned as `Err` and are fatal to the caller.
/// A structured protocol-level error reported by the node is logged by the
/// implementation and surfaces as `None` / an empty list instead.
#[async_trait]
pub trait NodeClient: Send + Sync {
    /// Number of blocks in the chain (`getblockcount`); the head is `count - 1`.
    async fn block_count(&self) -> Result<Option<u64>, FeedError>;

    async fn block(&self, number: u64) -> Result<Option<BlockRecord>, FeedError>;

    async fn block_operations(
        &self,
        number: u64,
        start: u64,
        max: u64,
    ) -> Result<Vec<OperationRecord>, FeedError>;

    /// A page of the pending pool. The node may return `null` entries.
    async fn pending_operations(
        &self,
        start: u64,
        max: u64,
    ) -> Result<Vec<Option<OperationRecord>>, FeedError>;

    async fn account(&self, number: AccountNumber) -> Result<Option<AccountRecord>, FeedError>;

    async fn decode_public_key(&self, hex: &str) -> Result<Option<PublicKeyRecord>, FeedError>;
}
