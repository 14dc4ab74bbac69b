//! Chain state machine: the single producer of domain events.
//!
//! `ChainState` reconciles pending and mined operations, tracks maturation
//! and emits events in a fixed order for every block:
//!
//! 1. block-mined, then account-added for each account the block creates
//! 2. operation-matured for mined operations now 1 or 2 blocks deep
//! 3. operation-included and the typed account events for the block's operations
//! 4. operation-not-included for pending operations that vanished
//! 5. the seal signal, always last
//!
//! Mutation requires `&mut self`, so the owner of a `ChainState` (the
//! [`Listener`](crate::listener::Listener)) is the only place blocks and
//! operations can enter, and one `add_block` can never interleave with
//! another.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use crate::account::{Account, PublicKey};
use crate::block::Block;
use crate::cache::EntityCache;
use crate::channel::EventSink;
use crate::error::FeedError;
use crate::event::{Event, EventData};
use crate::node::NodeClient;
use crate::operation::{Operation, OperationHash};
use crate::types::AccountNumber;

/// Maturation values (exclusive) between which operation-matured fires.
const MATURED_RANGE: std::ops::Range<i64> = 1..3;

pub struct ChainState<C> {
    cache: EntityCache<C>,
    sink: Arc<dyn EventSink>,
    blocks: BTreeMap<u64, Arc<Block>>,
    latest: Option<u64>,
    pending: HashMap<OperationHash, Arc<Operation>>,
    mined: HashMap<OperationHash, Arc<Operation>>,
}

impl<C: NodeClient> ChainState<C> {
    pub fn new(cache: EntityCache<C>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            cache,
            sink,
            blocks: BTreeMap::new(),
            latest: None,
            pending: HashMap::new(),
            mined: HashMap::new(),
        }
    }

    /// Store a newly mined block and emit everything that follows from it.
    ///
    /// Fails with [`FeedError::OutOfOrderBlock`] unless `block` is newer than
    /// every block seen so far. Any error leaves the block partially
    /// processed and must stop ingestion.
    pub async fn add_block(
        &mut self,
        block: Block,
        operations: Vec<Operation>,
    ) -> Result<(), FeedError> {
        self.process_block(block, operations, &HashMap::new()).await
    }

    /// Process consecutive blocks fetched in one catch-up, in ascending order.
    ///
    /// A pending operation mined in any of these blocks stays pending until
    /// its block is processed, so it is never reported not-included first.
    pub async fn add_blocks(&mut self, blocks: Vec<(Block, Vec<Operation>)>) -> Result<(), FeedError> {
        // fingerprint -> occurrences in the blocks not yet processed
        let mut ahead: HashMap<String, usize> = HashMap::new();
        for operation in blocks.iter().flat_map(|(_, ops)| ops) {
            *ahead.entry(operation.fingerprint().to_string()).or_default() += 1;
        }
        for (block, operations) in blocks {
            for operation in &operations {
                if let Some(count) = ahead.get_mut(operation.fingerprint()) {
                    *count -= 1;
                    if *count == 0 {
                        ahead.remove(operation.fingerprint());
                    }
                }
            }
            self.process_block(block, operations, &ahead).await?;
        }
        Ok(())
    }

    async fn process_block(
        &mut self,
        block: Block,
        operations: Vec<Operation>,
        ahead: &HashMap<String, usize>,
    ) -> Result<(), FeedError> {
        let number = block.number;
        if let Some(latest) = self.latest {
            if number <= latest {
                return Err(FeedError::OutOfOrderBlock { latest, got: number });
            }
        }
        let block = Arc::new(block);
        self.blocks.insert(number, Arc::clone(&block));
        self.latest = Some(number);

        let miner = self.cache.public_key(Some(&block.miner_public_key)).await?;
        self.emit(Event::block_mined(Arc::clone(&block), miner))?;
        for account_number in block.created_accounts() {
            let account = self.cache.account(Some(account_number)).await?;
            self.emit(Event::new(EventData::AccountAdded {
                account_number,
                block: number,
                account,
            }))?;
        }

        let formerly_pending: BTreeMap<String, Arc<Operation>> = self
            .pending
            .drain()
            .map(|(_, op)| (op.fingerprint().to_string(), op))
            .collect();

        // make_mut clones only while an emitted event still shares the operation
        let mut matured = Vec::new();
        for op in self.mined.values_mut() {
            Arc::make_mut(op).mature_to(number);
            if MATURED_RANGE.contains(&op.maturation) {
                matured.push(Arc::clone(op));
            }
        }
        matured.sort_by_key(|op| (op.block, op.position));
        for operation in matured {
            self.emit(Event::new(EventData::OperationMatured { operation }))?;
        }

        let included_count = operations.len();
        let mut included = HashSet::with_capacity(included_count);
        for operation in operations {
            included.insert(operation.fingerprint().to_string());
            self.add_operation(operation).await?;
        }

        let mut dropped = 0usize;
        for (fingerprint, operation) in formerly_pending {
            if included.contains(&fingerprint) {
                continue;
            }
            if ahead.contains_key(&fingerprint) {
                self.pending.insert(operation.hash.clone(), operation);
            } else {
                dropped += 1;
                self.emit(Event::new(EventData::OperationNotIncluded { operation }))?;
            }
        }

        self.emit(Event::seal(block))?;
        tracing::info!(
            block = number,
            operations = included_count,
            not_included = dropped,
            "processed block"
        );
        Ok(())
    }

    /// Insert or overwrite an operation by its full hash and emit its events.
    pub async fn add_operation(&mut self, mut operation: Operation) -> Result<(), FeedError> {
        operation.mature_to(self.latest.unwrap_or(0));
        let operation = Arc::new(operation);
        let hash = operation.hash.clone();
        if operation.is_pending() {
            self.pending.insert(hash, Arc::clone(&operation));
            self.emit(Event::new(EventData::OperationPending {
                operation: Arc::clone(&operation),
            }))?;
        } else {
            self.mined.insert(hash, Arc::clone(&operation));
            self.emit(Event::new(EventData::OperationIncluded {
                operation: Arc::clone(&operation),
            }))?;
        }

        for info in &operation.info {
            let account = self.cache.account(info.affected_account()).await?;
            self.emit(Event::new(EventData::Account {
                operation: Arc::clone(&operation),
                operation_info: info.clone(),
                account,
            }))?;
        }
        Ok(())
    }

    fn emit(&self, event: Event) -> Result<(), FeedError> {
        tracing::debug!(event = %event.kind(), "emit");
        self.sink.emit(event)
    }

    /// Whether an operation with this exact hash is known, pending or mined.
    pub fn has_operation(&self, hash: &OperationHash) -> bool {
        self.pending.contains_key(hash) || self.mined.contains_key(hash)
    }

    /// A known operation by full hash, pending or mined, with its current maturation.
    pub fn operation(&self, hash: &OperationHash) -> Option<&Arc<Operation>> {
        self.pending.get(hash).or_else(|| self.mined.get(hash))
    }

    pub async fn account(
        &self,
        number: Option<AccountNumber>,
    ) -> Result<Option<Arc<Account>>, FeedError> {
        self.cache.account(number).await
    }

    pub async fn public_key(&self, hex: Option<&str>) -> Result<Option<Arc<PublicKey>>, FeedError> {
        self.cache.public_key(hex).await
    }

    pub fn latest(&self) -> Option<u64> {
        self.latest
    }

    pub fn block(&self, number: u64) -> Option<&Arc<Block>> {
        self.blocks.get(&number)
    }

    /// Blocks elapsed since block `number` was mined, relative to the latest block.
    pub fn block_maturation(&self, number: u64) -> Option<u64> {
        let latest = self.latest?;
        self.blocks.get(&number).map(|b| b.maturation_at(latest))
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn mined_count(&self) -> usize {
        self.mined.len()
    }

    pub fn cache(&self) -> &EntityCache<C> {
        &self.cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::config::CacheConfig;
    use crate::event::EventKind;
    use crate::memory::MemoryNode;
    use crate::node::{BlockRecord, OperationRecord, ReceiverRecord, SenderRecord};
    use crate::types::Currency;

    const FINGERPRINT: &str = "6400000007000000ABCDEF0123456789";

    #[derive(Default)]
    struct Recorder(Mutex<Vec<Event>>);

    impl Recorder {
        fn kinds(&self) -> Vec<EventKind> {
            self.0.lock().unwrap().iter().map(Event::kind).collect()
        }

        fn clear(&self) {
            self.0.lock().unwrap().clear();
        }
    }

    impl EventSink for Recorder {
        fn emit(&self, event: Event) -> Result<(), FeedError> {
            self.0.lock().unwrap().push(event);
            Ok(())
        }
    }

    fn setup() -> (ChainState<MemoryNode>, Arc<Recorder>) {
        let node = Arc::new(MemoryNode::new());
        let recorder = Arc::new(Recorder::default());
        let cache = EntityCache::new(node, &CacheConfig::default());
        (ChainState::new(cache, recorder.clone()), recorder)
    }

    fn block(number: u64) -> Block {
        Block::from(BlockRecord {
            block: number,
            ..Default::default()
        })
    }

    fn transfer(block: u64, tag: &str) -> Operation {
        let prefix = format!("{block:08X}");
        Operation::try_from(OperationRecord {
            ophash: format!("{prefix}{FINGERPRINT}{tag}"),
            block,
            optype: 1,
            account: AccountNumber::new(100),
            amount: Currency::from_pasc(10.0),
            senders: vec![SenderRecord {
                account: AccountNumber::new(100),
                n_operation: 1,
                amount: Currency::from_pasc(-10.0),
                payload: String::new(),
            }],
            receivers: vec![ReceiverRecord {
                account: AccountNumber::new(200),
                amount: Currency::from_pasc(10.0),
                payload: String::new(),
            }],
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn block_emits_in_fixed_order() {
        let (mut chain, recorder) = setup();
        chain.add_block(block(500), vec![transfer(500, "01")]).await.unwrap();

        use EventKind::*;
        assert_eq!(
            recorder.kinds(),
            vec![
                BlockMined,
                AccountAdded,
                AccountAdded,
                AccountAdded,
                AccountAdded,
                AccountAdded,
                OperationIncluded,
                AccountTransaction,
                Seal,
            ]
        );
        assert_eq!(chain.latest(), Some(500));
        assert_eq!(chain.mined_count(), 1);
    }

    #[tokio::test]
    async fn out_of_order_block_rejected() {
        let (mut chain, _) = setup();
        chain.add_block(block(10), vec![]).await.unwrap();
        let err = chain.add_block(block(10), vec![]).await.unwrap_err();
        assert!(matches!(err, FeedError::OutOfOrderBlock { latest: 10, got: 10 }));
    }

    #[tokio::test]
    async fn vanished_pending_operation_is_not_included() {
        let (mut chain, recorder) = setup();
        chain.add_block(block(10), vec![]).await.unwrap();
        chain.add_operation(transfer(0, "01")).await.unwrap();
        chain.add_operation(transfer(0, "02")).await.unwrap();
        assert_eq!(chain.pending_count(), 2);
        recorder.clear();

        // only "01" is mined in block 11
        chain.add_block(block(11), vec![transfer(11, "01")]).await.unwrap();

        let events = recorder.0.lock().unwrap();
        let not_included: Vec<_> = events
            .iter()
            .filter_map(|e| match e.data() {
                EventData::OperationNotIncluded { operation } => Some(operation.fingerprint().to_string()),
                _ => None,
            })
            .collect();
        assert_eq!(not_included, vec![format!("{FINGERPRINT}02")]);
        assert_eq!(chain.pending_count(), 0);
    }

    #[tokio::test]
    async fn maturation_fires_for_one_and_two_only() {
        let (mut chain, recorder) = setup();
        chain.add_block(block(100), vec![transfer(100, "01")]).await.unwrap();

        let mut matured = vec![];
        for n in 101..=104 {
            recorder.clear();
            chain.add_block(block(n), vec![]).await.unwrap();
            let count = recorder
                .kinds()
                .into_iter()
                .filter(|k| *k == EventKind::OperationMatured)
                .count();
            matured.push(count);
        }
        assert_eq!(matured, vec![1, 1, 0, 0]);
    }

    #[tokio::test]
    async fn matured_event_carries_updated_maturation() {
        let (mut chain, recorder) = setup();
        chain.add_block(block(100), vec![transfer(100, "01")]).await.unwrap();
        recorder.clear();
        chain.add_block(block(102), vec![]).await.unwrap();

        let events = recorder.0.lock().unwrap();
        let maturation = events.iter().find_map(|e| match e.data() {
            EventData::OperationMatured { operation } => Some(operation.maturation),
            _ => None,
        });
        assert_eq!(maturation, Some(2));
    }

    #[tokio::test]
    async fn mined_operation_retrievable_by_hash() {
        let (mut chain, _) = setup();
        let op = transfer(100, "01");
        let hash = op.hash.clone();
        chain.add_block(block(100), vec![op]).await.unwrap();

        let stored = chain.operation(&hash).unwrap();
        assert_eq!(stored.block, 100);
        assert_eq!(stored.maturation, 0);
        assert_eq!(chain.block_maturation(100), Some(0));

        chain.add_block(block(101), vec![]).await.unwrap();
        assert_eq!(chain.operation(&hash).unwrap().maturation, 1);
        assert_eq!(chain.block_maturation(100), Some(1));
        assert_eq!(chain.block_maturation(99), None);
    }

    #[tokio::test]
    async fn deep_operations_mature_in_place() {
        let (mut chain, _) = setup();
        let op = transfer(100, "01");
        let hash = op.hash.clone();
        chain.add_block(block(100), vec![op]).await.unwrap();
        for n in 101..=103 {
            chain.add_block(block(n), vec![]).await.unwrap();
        }
        let before = Arc::as_ptr(chain.operation(&hash).unwrap());

        chain.add_block(block(104), vec![]).await.unwrap();
        chain.add_block(block(105), vec![]).await.unwrap();

        let after = chain.operation(&hash).unwrap();
        assert_eq!(Arc::as_ptr(after), before);
        assert_eq!(after.maturation, 5);
    }

    #[tokio::test]
    async fn catch_up_defers_operations_mined_in_a_later_block() {
        let (mut chain, recorder) = setup();
        chain.add_block(block(10), vec![]).await.unwrap();
        chain.add_operation(transfer(0, "01")).await.unwrap();
        chain.add_operation(transfer(0, "02")).await.unwrap();
        recorder.clear();

        // "01" is mined in block 12, "02" in none of them
        chain
            .add_blocks(vec![
                (block(11), vec![]),
                (block(12), vec![transfer(12, "01")]),
            ])
            .await
            .unwrap();

        let events = recorder.0.lock().unwrap();
        let not_included: Vec<_> = events
            .iter()
            .filter_map(|e| match e.data() {
                EventData::OperationNotIncluded { operation } => Some(operation.fingerprint().to_string()),
                _ => None,
            })
            .collect();
        assert_eq!(not_included, vec![format!("{FINGERPRINT}02")]);
        let first_seal = events.iter().position(|e| e.kind() == EventKind::Seal).unwrap();
        let dropped_at = events
            .iter()
            .position(|e| e.kind() == EventKind::OperationNotIncluded)
            .unwrap();
        assert!(dropped_at < first_seal);
        assert_eq!(chain.pending_count(), 0);
        assert_eq!(chain.latest(), Some(12));
    }

    #[tokio::test]
    async fn pending_operation_tracked_by_hash() {
        let (mut chain, recorder) = setup();
        let op = transfer(0, "01");
        let hash = op.hash.clone();
        chain.add_operation(op).await.unwrap();

        assert!(chain.has_operation(&hash));
        assert_eq!(chain.operation(&hash).unwrap().maturation, -1);
        assert_eq!(
            recorder.kinds(),
            vec![EventKind::OperationPending, EventKind::AccountTransaction]
        );
        let events = recorder.0.lock().unwrap();
        assert_eq!(events[0].serialized()["operation"]["maturation"], -1);
    }
}
