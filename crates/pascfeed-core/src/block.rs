//! Sealed block data.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::node::BlockRecord;
use crate::types::{AccountNumber, Currency};

/// Number of accounts PascalCoin mints with every block.
pub const ACCOUNTS_PER_BLOCK: u64 = 5;

/// A block as stored by the chain state machine. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub number: u64,
    /// Hex-encoded public key of the miner.
    pub miner_public_key: String,
    pub reward: Currency,
    pub fee: Currency,
    pub protocol_version: u32,
    pub protocol_available: u32,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub timestamp: DateTime<Utc>,
    pub target: u64,
    pub nonce: u64,
    pub payload: String,
    pub safe_box_hash: String,
    pub operations_hash: String,
    pub proof_of_work: String,
    pub operation_count: u32,
    pub hash_rate_khs: u64,
}

impl Block {
    /// Blocks elapsed since this block was mined, relative to `latest`.
    pub fn maturation_at(&self, latest: u64) -> u64 {
        latest.saturating_sub(self.number)
    }

    /// The accounts created by this block.
    pub fn created_accounts(&self) -> impl Iterator<Item = AccountNumber> {
        let first = self.number * ACCOUNTS_PER_BLOCK;
        (first..first + ACCOUNTS_PER_BLOCK).map(AccountNumber::new)
    }
}

impl From<BlockRecord> for Block {
    fn from(r: BlockRecord) -> Self {
        Self {
            number: r.block,
            miner_public_key: r.enc_pubkey,
            reward: r.reward,
            fee: r.fee,
            protocol_version: r.ver,
            protocol_available: r.ver_a,
            timestamp: Utc
                .timestamp_opt(r.timestamp, 0)
                .single()
                .unwrap_or_default(),
            target: r.target,
            nonce: r.nonce,
            payload: r.payload,
            safe_box_hash: r.sbh,
            operations_hash: r.oph,
            proof_of_work: r.pow,
            operation_count: r.operations,
            hash_rate_khs: r.hashratekhs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(number: u64) -> Block {
        Block::from(BlockRecord {
            block: number,
            timestamp: 1_500_000_000,
            ..Default::default()
        })
    }

    #[test]
    fn maturation_relative_to_latest() {
        let b = block(100);
        assert_eq!(b.maturation_at(100), 0);
        assert_eq!(b.maturation_at(103), 3);
        assert_eq!(b.maturation_at(90), 0);
    }

    #[test]
    fn five_accounts_per_block() {
        let accounts: Vec<_> = block(10).created_accounts().map(|a| a.account()).collect();
        assert_eq!(accounts, vec![50, 51, 52, 53, 54]);
    }

    #[test]
    fn timestamp_serialized_as_unix_seconds() {
        let v = serde_json::to_value(block(1)).unwrap();
        assert_eq!(v["timestamp"], 1_500_000_000);
        assert_eq!(v["number"], 1);
    }
}
