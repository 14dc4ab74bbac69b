//! Event log: every emitted event, grouped into per-block history on sealing.
//!
//! Events accumulate in the recent (unsealed) buffer until the chain state
//! machine emits the seal signal for block `B`. Sealing stamps the buffered
//! events with `associated = B`, drops transient kinds, stores the rest as
//! `history[B]` and clears the buffer. A block is sealed exactly once and its
//! history never changes afterwards.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::FeedError;
use crate::event::{Event, EventData, EventKind};

#[derive(Default)]
pub struct EventLog {
    history: BTreeMap<u64, Vec<Arc<Event>>>,
    recent: Vec<Arc<Event>>,
    latest_sealed: Option<u64>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an event.
    ///
    /// Returns the stored event when it should be published to subscribers,
    /// or `None` for the seal signal, which is consumed here.
    pub fn emit(&mut self, event: Event) -> Result<Option<Arc<Event>>, FeedError> {
        if let EventData::Seal { block } = event.data() {
            self.seal(block.number)?;
            return Ok(None);
        }
        let event = Arc::new(event);
        self.recent.push(Arc::clone(&event));
        Ok(Some(event))
    }

    fn seal(&mut self, block: u64) -> Result<(), FeedError> {
        if self.history.contains_key(&block) || self.latest_sealed.is_some_and(|b| block <= b) {
            return Err(FeedError::AlreadySealed { block });
        }
        let sealed: Vec<Arc<Event>> = self
            .recent
            .drain(..)
            .filter(|e| !e.kind().is_transient())
            .map(|e| Arc::new(e.associate(block)))
            .collect();
        tracing::debug!(block, events = sealed.len(), "sealed block history");
        self.history.insert(block, sealed);
        self.latest_sealed = Some(block);
        Ok(())
    }

    /// Sealed events of `kind` from blocks `[latest - look_back, latest]`,
    /// block-ascending.
    pub fn events(&self, kind: EventKind, look_back: u64) -> Vec<Arc<Event>> {
        let Some(latest) = self.latest_sealed else {
            return vec![];
        };
        self.history
            .range(latest.saturating_sub(look_back)..=latest)
            .flat_map(|(_, events)| events.iter())
            .filter(|e| e.kind() == kind)
            .cloned()
            .collect()
    }

    /// Unsealed events of `kind`.
    pub fn recent_events(&self, kind: EventKind) -> Vec<Arc<Event>> {
        self.recent
            .iter()
            .filter(|e| e.kind() == kind)
            .cloned()
            .collect()
    }

    pub fn history(&self, block: u64) -> Option<&[Arc<Event>]> {
        self.history.get(&block).map(Vec::as_slice)
    }

    pub fn recent(&self) -> &[Arc<Event>] {
        &self.recent
    }

    pub fn latest_sealed(&self) -> Option<u64> {
        self.latest_sealed
    }

    pub fn sealed_blocks(&self) -> usize {
        self.history.len()
    }
}
