//! In-memory node for tests and offline runs.
//!
//! Serves blocks, operations, accounts and keys from RAM, counts calls per
//! method, and can be switched into a failing mode to exercise the fatal
//! error paths.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::FeedError;
use crate::node::{AccountRecord, BlockRecord, NodeClient, OperationRecord, PublicKeyRecord};
use crate::types::AccountNumber;

/// Number of calls made per `NodeClient` method.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub block_count: u32,
    pub block: u32,
    pub block_operations: u32,
    pub pending_operations: u32,
    pub account: u32,
    pub decode_public_key: u32,
}

#[derive(Default)]
struct NodeData {
    blocks: BTreeMap<u64, (BlockRecord, Vec<OperationRecord>)>,
    pending: Vec<Option<OperationRecord>>,
    accounts: HashMap<AccountNumber, AccountRecord>,
    keys: HashMap<String, PublicKeyRecord>,
    failure: Option<String>,
    calls: CallCounts,
}

/// A `NodeClient` backed by in-memory maps.
#[derive(Default)]
pub struct MemoryNode {
    data: Mutex<NodeData>,
}

impl MemoryNode {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a block with its operations; it becomes the new head.
    pub fn push_block(&self, block: BlockRecord, operations: Vec<OperationRecord>) {
        self.data
            .lock()
            .unwrap()
            .blocks
            .insert(block.block, (block, operations));
    }

    /// Replace the pending pool.
    pub fn set_pending(&self, pending: Vec<OperationRecord>) {
        self.data.lock().unwrap().pending = pending.into_iter().map(Some).collect();
    }

    /// Replace the pending pool, including `null` entries as a node may return.
    pub fn set_raw_pending(&self, pending: Vec<Option<OperationRecord>>) {
        self.data.lock().unwrap().pending = pending;
    }

    pub fn insert_account(&self, account: AccountRecord) {
        self.data
            .lock()
            .unwrap()
            .accounts
            .insert(account.account, account);
    }

    pub fn insert_public_key(&self, key: PublicKeyRecord) {
        self.data
            .lock()
            .unwrap()
            .keys
            .insert(key.enc_pubkey.to_ascii_uppercase(), key);
    }

    /// Make every subsequent call fail with a transport error.
    pub fn fail_with(&self, reason: impl Into<String>) {
        self.data.lock().unwrap().failure = Some(reason.into());
    }

    pub fn recover(&self) {
        self.data.lock().unwrap().failure = None;
    }

    pub fn calls(&self) -> CallCounts {
        self.data.lock().unwrap().calls.clone()
    }

    fn enter(&self, count: impl FnOnce(&mut CallCounts)) -> Result<std::sync::MutexGuard<'_, NodeData>, FeedError> {
        let mut data = self.data.lock().unwrap();
        count(&mut data.calls);
        match &data.failure {
            Some(reason) => Err(FeedError::Rpc(reason.clone())),
            None => Ok(data),
        }
    }
}

fn page<T: Clone>(items: &[T], start: u64, max: u64) -> Vec<T> {
    items
        .iter()
        .skip(start as usize)
        .take(max as usize)
        .cloned()
        .collect()
}

#[async_trait]
impl NodeClient for MemoryNode {
    async fn block_count(&self) -> Result<Option<u64>, FeedError> {
        let data = self.enter(|c| c.block_count += 1)?;
        Ok(Some(data.blocks.keys().next_back().map(|n| n + 1).unwrap_or(0)))
    }

    async fn block(&self, number: u64) -> Result<Option<BlockRecord>, FeedError> {
        let data = self.enter(|c| c.block += 1)?;
        Ok(data.blocks.get(&number).map(|(b, _)| b.clone()))
    }

    async fn block_operations(
        &self,
        number: u64,
        start: u64,
        max: u64,
    ) -> Result<Vec<OperationRecord>, FeedError> {
        let data = self.enter(|c| c.block_operations += 1)?;
        Ok(data
            .blocks
            .get(&number)
            .map(|(_, ops)| page(ops, start, max))
            .unwrap_or_default())
    }

    async fn pending_operations(
        &self,
        start: u64,
        max: u64,
    ) -> Result<Vec<Option<OperationRecord>>, FeedError> {
        let data = self.enter(|c| c.pending_operations += 1)?;
        Ok(page(&data.pending, start, max))
    }

    async fn account(&self, number: AccountNumber) -> Result<Option<AccountRecord>, FeedError> {
        let data = self.enter(|c| c.account += 1)?;
        Ok(data.accounts.get(&number).cloned())
    }

    async fn decode_public_key(&self, hex: &str) -> Result<Option<PublicKeyRecord>, FeedError> {
        let data = self.enter(|c| c.decode_public_key += 1)?;
        Ok(data.keys.get(&hex.to_ascii_uppercase()).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn head_follows_pushed_blocks() {
        let node = MemoryNode::new();
        assert_eq!(node.block_count().await.unwrap(), Some(0));
        node.push_block(BlockRecord { block: 7, ..Default::default() }, vec![]);
        assert_eq!(node.block_count().await.unwrap(), Some(8));
        assert_eq!(node.calls().block_count, 2);
    }

    #[tokio::test]
    async fn failure_mode() {
        let node = MemoryNode::new();
        node.fail_with("down");
        assert!(node.block(1).await.is_err());
        node.recover();
        assert!(node.block(1).await.unwrap().is_none());
    }
}
