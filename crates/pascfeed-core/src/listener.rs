//! The polling loop that drives the chain state machine from a node.
//!
//! # Startup
//! `bootstrap` replays the last `bootstrap_blocks` blocks ending at the head,
//! then loads the pending pool.
//!
//! # Ticks
//! Every `poll_interval_ms`:
//!   - Query the head; process every block between the latest known block
//!     and the head, in ascending order
//!   - Fetch the pending pool and add operations not yet known by hash
//!
//! The listener owns its [`ChainState`] and ticks are awaited one at a time
//! inside a single task, so ticks never overlap. Each tick is bounded by
//! `tick_timeout_ms`, and bootstrap by that bound once per replayed block.
//! Any error, including a timeout, ends `run`.

use std::future::Future;
use std::sync::Arc;

use tokio::time::MissedTickBehavior;

use crate::block::Block;
use crate::chain::ChainState;
use crate::config::ListenerConfig;
use crate::error::FeedError;
use crate::node::NodeClient;
use crate::operation::Operation;

/// What a single tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub blocks: usize,
    pub pending: usize,
}

pub struct Listener<C> {
    config: ListenerConfig,
    client: Arc<C>,
    chain: ChainState<C>,
}

impl<C: NodeClient> Listener<C> {
    pub fn new(config: ListenerConfig, client: Arc<C>, chain: ChainState<C>) -> Self {
        Self {
            config,
            client,
            chain,
        }
    }

    pub fn chain(&self) -> &ChainState<C> {
        &self.chain
    }

    pub fn config(&self) -> &ListenerConfig {
        &self.config
    }

    /// Latest block number on the node; `None` when the node has no blocks
    /// or reported a protocol error.
    pub async fn head(&self) -> Result<Option<u64>, FeedError> {
        Ok(self
            .client
            .block_count()
            .await?
            .and_then(|count| count.checked_sub(1)))
    }

    /// Rebuild state from the last `bootstrap_blocks` blocks and the pending pool.
    pub async fn bootstrap(&mut self) -> Result<TickSummary, FeedError> {
        let mut summary = TickSummary::default();
        match self.head().await? {
            Some(head) => {
                let first = (head + 1).saturating_sub(self.config.bootstrap_blocks);
                summary.blocks = self.sync_blocks(first, head).await?;
            }
            None => tracing::info!("node reports no blocks yet"),
        }
        summary.pending = self.sync_pending().await?;
        tracing::info!(
            blocks = summary.blocks,
            pending = summary.pending,
            latest = ?self.chain.latest(),
            "bootstrap complete"
        );
        Ok(summary)
    }

    /// One polling step: catch up to the head, then refresh pending operations.
    pub async fn tick(&mut self) -> Result<TickSummary, FeedError> {
        let mut summary = TickSummary::default();
        if let Some(head) = self.head().await? {
            let first = match self.chain.latest() {
                Some(latest) if head == latest => None,
                Some(latest) if head < latest => {
                    return Err(FeedError::OutOfOrderBlock { latest, got: head });
                }
                Some(latest) => Some((latest + 1).max(head.saturating_sub(self.config.bootstrap_blocks))),
                None => Some((head + 1).saturating_sub(self.config.bootstrap_blocks.max(1))),
            };
            if let Some(first) = first {
                summary.blocks = self.sync_blocks(first, head).await?;
            }
        }
        summary.pending = self.sync_pending().await?;
        Ok(summary)
    }

    /// Bootstrap, then tick every `poll_interval_ms` until `shutdown`
    /// resolves or a tick fails.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) -> Result<(), FeedError> {
        tokio::pin!(shutdown);

        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("listener stopped during bootstrap");
                return Ok(());
            }
            result = self.bounded(true) => {
                result?;
            }
        }

        let mut interval = tokio::time::interval(self.config.poll_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        interval.tick().await;

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!(latest = ?self.chain.latest(), "listener stopped");
                    return Ok(());
                }
                _ = interval.tick() => {
                    let summary = self.bounded(false).await?;
                    if summary.blocks > 0 {
                        tracing::debug!(blocks = summary.blocks, pending = summary.pending, "tick");
                    }
                }
            }
        }
    }

    async fn bounded(&mut self, bootstrap: bool) -> Result<TickSummary, FeedError> {
        let limit = if bootstrap {
            self.config.bootstrap_timeout()
        } else {
            self.config.tick_timeout()
        };
        let ms = limit.as_millis() as u64;
        let result = if bootstrap {
            tokio::time::timeout(limit, self.bootstrap()).await
        } else {
            tokio::time::timeout(limit, self.tick()).await
        };
        match result {
            Ok(Ok(summary)) => Ok(summary),
            Ok(Err(e)) => {
                tracing::error!(error = %e, "listener failed");
                Err(e)
            }
            Err(_) => {
                tracing::error!(ms, "tick timed out");
                Err(FeedError::Timeout { ms })
            }
        }
    }

    /// Fetch blocks `first..=head`, then hand them to the chain as one catch-up.
    async fn sync_blocks(&mut self, first: u64, head: u64) -> Result<usize, FeedError> {
        let mut blocks = Vec::new();
        for number in first..=head {
            let record = self
                .client
                .block(number)
                .await?
                .ok_or(FeedError::BlockNotFound(number))?;
            let operations = self.block_operations(number).await?;
            blocks.push((Block::from(record), operations));
        }
        let count = blocks.len();
        self.chain.add_blocks(blocks).await?;
        Ok(count)
    }

    /// All operations of a block, fetched page by page until a short page.
    async fn block_operations(&self, number: u64) -> Result<Vec<Operation>, FeedError> {
        let page_size = self.config.page_size.max(1);
        let mut operations = Vec::new();
        let mut start = 0;
        loop {
            let page = self.client.block_operations(number, start, page_size).await?;
            let len = page.len() as u64;
            for record in page {
                operations.push(Operation::try_from(record)?);
            }
            if len < page_size {
                break;
            }
            start += len;
        }
        Ok(operations)
    }

    /// The pending pool; `null` entries are skipped.
    async fn pending_operations(&self) -> Result<Vec<Operation>, FeedError> {
        let page_size = self.config.page_size.max(1);
        let mut operations = Vec::new();
        let mut start = 0;
        loop {
            let page = self.client.pending_operations(start, page_size).await?;
            let len = page.len() as u64;
            for record in page.into_iter().flatten() {
                operations.push(Operation::try_from(record)?);
            }
            if len < page_size {
                break;
            }
            start += len;
        }
        Ok(operations)
    }

    async fn sync_pending(&mut self) -> Result<usize, FeedError> {
        let mut added = 0;
        for operation in self.pending_operations().await? {
            if !self.chain.has_operation(&operation.hash) {
                self.chain.add_operation(operation).await?;
                added += 1;
            }
        }
        Ok(added)
    }
}
