//! Per-client subscriptions and the registry that matches events to them.

use std::collections::HashMap;
use std::fmt;

use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::config::ChannelConfig;
use crate::event::{Event, EventKind};
use crate::filter::{Filter, FilterSpec};

/// Identifies one connected client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// Reasons a subscribe request is refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubscribeError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("malformed request: {0}")]
    Malformed(String),

    #[error("unknown event `{0}`")]
    UnknownEvent(String),

    #[error("event `{0}` cannot be subscribed to")]
    NotSubscribable(EventKind),

    #[error("ident `{0}` is already in use")]
    DuplicateIdent(String),

    #[error("subscription limit of {0} reached")]
    TooManySubscriptions(usize),
}

/// The inbound `subscribe` message.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscribeRequest {
    pub ident: Option<String>,
    pub event: Option<String>,
    /// Blocks of history to replay; absent means no replay.
    pub snapshot: Option<u64>,
    #[serde(default)]
    pub filters: Vec<FilterSpec>,
}

impl SubscribeRequest {
    pub fn parse(message: &Value) -> Result<Self, SubscribeError> {
        serde_json::from_value(message.clone()).map_err(|e| SubscribeError::Malformed(e.to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct Subscription {
    client: ClientId,
    ident: String,
    kind: EventKind,
    snapshot: Option<u64>,
    filters: Vec<Filter>,
    active: bool,
}

impl Subscription {
    /// Build an inactive subscription for `client`, validated against the
    /// client's existing subscriptions. The snapshot depth is capped at
    /// `max_snapshot_blocks`.
    pub fn from_request(
        client: ClientId,
        request: SubscribeRequest,
        registry: &SubscriptionRegistry,
        config: &ChannelConfig,
    ) -> Result<Self, SubscribeError> {
        let ident = request.ident.ok_or(SubscribeError::MissingField("ident"))?;
        let event = request.event.ok_or(SubscribeError::MissingField("event"))?;
        let kind: EventKind = event
            .parse()
            .map_err(|_| SubscribeError::UnknownEvent(event.clone()))?;
        if !kind.is_subscribable() {
            return Err(SubscribeError::NotSubscribable(kind));
        }
        if registry.get(client, &ident).is_some() {
            return Err(SubscribeError::DuplicateIdent(ident));
        }
        if registry.count_for(client) >= config.max_subscriptions_per_client {
            return Err(SubscribeError::TooManySubscriptions(
                config.max_subscriptions_per_client,
            ));
        }
        Ok(Self {
            client,
            ident,
            kind,
            snapshot: request.snapshot.map(|n| n.min(config.max_snapshot_blocks)),
            filters: request.filters.into_iter().map(Filter::from).collect(),
            active: false,
        })
    }

    pub fn new(client: ClientId, ident: impl Into<String>, kind: EventKind, filters: Vec<Filter>) -> Self {
        Self {
            client,
            ident: ident.into(),
            kind,
            snapshot: None,
            filters,
            active: false,
        }
    }

    pub fn client(&self) -> ClientId {
        self.client
    }

    pub fn ident(&self) -> &str {
        &self.ident
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn snapshot(&self) -> Option<u64> {
        self.snapshot
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn activate(&mut self) {
        self.active = true;
    }

    /// Whether `event` is of this subscription's kind and passes every filter.
    pub fn matches(&self, event: &Event) -> bool {
        event.kind() == self.kind
            && self
                .filters
                .iter()
                .all(|f| f.is_valid(event.lookup(f.property())))
    }

    /// The subscription as echoed back in `subscription-succeeded`.
    pub fn describe(&self) -> Value {
        json!({
            "ident": self.ident,
            "event": self.kind.as_str(),
            "snapshot": self.snapshot,
            "filters": self.filters.iter().map(Filter::to_spec).collect::<Vec<_>>(),
        })
    }
}

/// All subscriptions, indexed by event kind.
#[derive(Default)]
pub struct SubscriptionRegistry {
    by_kind: HashMap<EventKind, Vec<Subscription>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, subscription: Subscription) {
        self.by_kind
            .entry(subscription.kind)
            .or_default()
            .push(subscription);
    }

    pub fn get(&self, client: ClientId, ident: &str) -> Option<&Subscription> {
        self.by_kind
            .values()
            .flatten()
            .find(|s| s.client == client && s.ident == ident)
    }

    /// Mark a subscription active; returns `false` if it does not exist.
    pub fn activate(&mut self, client: ClientId, ident: &str) -> bool {
        match self
            .by_kind
            .values_mut()
            .flatten()
            .find(|s| s.client == client && s.ident == ident)
        {
            Some(sub) => {
                sub.activate();
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, client: ClientId, ident: &str) -> Option<Subscription> {
        for subs in self.by_kind.values_mut() {
            if let Some(pos) = subs.iter().position(|s| s.client == client && s.ident == ident) {
                return Some(subs.remove(pos));
            }
        }
        None
    }

    /// Drop every subscription held by `client`; returns how many were removed.
    pub fn remove_client(&mut self, client: ClientId) -> usize {
        let mut removed = 0;
        for subs in self.by_kind.values_mut() {
            let before = subs.len();
            subs.retain(|s| s.client != client);
            removed += before - subs.len();
        }
        self.by_kind.retain(|_, subs| !subs.is_empty());
        removed
    }

    /// Active subscriptions whose filters all pass for `event`.
    pub fn matching<'a>(&'a self, event: &'a Event) -> impl Iterator<Item = &'a Subscription> + 'a {
        self.by_kind
            .get(&event.kind())
            .into_iter()
            .flatten()
            .filter(move |s| s.active && s.matches(event))
    }

    pub fn count_for(&self, client: ClientId) -> usize {
        self.by_kind
            .values()
            .flatten()
            .filter(|s| s.client == client)
            .count()
    }

    pub fn len(&self) -> usize {
        self.by_kind.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterOp;
    use crate::event::EventData;
    use crate::types::AccountNumber;

    fn added(account: u64) -> Event {
        Event::new(EventData::AccountAdded {
            account_number: AccountNumber::new(account),
            block: account / 5,
            account: None,
        })
    }

    fn request(value: Value) -> SubscribeRequest {
        SubscribeRequest::parse(&value).unwrap()
    }

    #[test]
    fn all_filters_must_pass() {
        let sub = Subscription::new(
            ClientId(1),
            "a",
            EventKind::AccountAdded,
            vec![
                Filter::new("block", FilterOp::GreaterOrEqual, json!(10)),
                Filter::new("accountNumber", FilterOp::Equal, json!("50-76")),
            ],
        );
        assert!(sub.matches(&added(50)));
        assert!(!sub.matches(&added(51)));
        assert!(!sub.matches(&added(5)));
    }

    #[test]
    fn empty_filters_match_every_event_of_kind() {
        let sub = Subscription::new(ClientId(1), "a", EventKind::AccountAdded, vec![]);
        assert!(sub.matches(&added(1)));
        assert!(!sub.matches(&Event::ping()));
    }

    #[test]
    fn request_validation() {
        let registry = SubscriptionRegistry::new();
        let config = ChannelConfig::default();
        let client = ClientId(1);

        let err = Subscription::from_request(client, request(json!({"event": "ping"})), &registry, &config)
            .unwrap_err();
        assert_eq!(err, SubscribeError::MissingField("ident"));

        let err = Subscription::from_request(
            client,
            request(json!({"ident": "x", "event": "block.mined"})),
            &registry,
            &config,
        )
        .unwrap_err();
        assert_eq!(err, SubscribeError::UnknownEvent("block.mined".into()));

        let err = Subscription::from_request(
            client,
            request(json!({"ident": "x", "event": "seal"})),
            &registry,
            &config,
        )
        .unwrap_err();
        assert_eq!(err, SubscribeError::NotSubscribable(EventKind::Seal));

        let sub = Subscription::from_request(
            client,
            request(json!({"ident": "x", "event": "block-mined", "snapshot": 5000})),
            &registry,
            &config,
        )
        .unwrap();
        assert_eq!(sub.snapshot(), Some(config.max_snapshot_blocks));
        assert!(!sub.is_active());
    }

    #[test]
    fn duplicate_ident_and_limit() {
        let mut registry = SubscriptionRegistry::new();
        let config = ChannelConfig {
            max_subscriptions_per_client: 2,
            ..Default::default()
        };
        let client = ClientId(7);
        registry.insert(Subscription::new(client, "a", EventKind::Ping, vec![]));

        let err = Subscription::from_request(
            client,
            request(json!({"ident": "a", "event": "ping"})),
            &registry,
            &config,
        )
        .unwrap_err();
        assert_eq!(err, SubscribeError::DuplicateIdent("a".into()));

        // a different client may reuse the ident
        assert!(Subscription::from_request(
            ClientId(8),
            request(json!({"ident": "a", "event": "ping"})),
            &registry,
            &config,
        )
        .is_ok());

        registry.insert(Subscription::new(client, "b", EventKind::BlockMined, vec![]));
        let err = Subscription::from_request(
            client,
            request(json!({"ident": "c", "event": "ping"})),
            &registry,
            &config,
        )
        .unwrap_err();
        assert_eq!(err, SubscribeError::TooManySubscriptions(2));
    }

    #[test]
    fn registry_matches_only_active() {
        let mut registry = SubscriptionRegistry::new();
        registry.insert(Subscription::new(ClientId(1), "a", EventKind::AccountAdded, vec![]));
        registry.insert(Subscription::new(ClientId(2), "b", EventKind::AccountAdded, vec![]));
        let event = added(10);

        assert_eq!(registry.matching(&event).count(), 0);
        assert!(registry.activate(ClientId(1), "a"));
        let matched: Vec<_> = registry.matching(&event).map(|s| s.client()).collect();
        assert_eq!(matched, vec![ClientId(1)]);
    }

    #[test]
    fn remove_and_remove_client() {
        let mut registry = SubscriptionRegistry::new();
        registry.insert(Subscription::new(ClientId(1), "a", EventKind::Ping, vec![]));
        registry.insert(Subscription::new(ClientId(1), "b", EventKind::BlockMined, vec![]));
        registry.insert(Subscription::new(ClientId(2), "a", EventKind::Ping, vec![]));

        assert!(registry.remove(ClientId(1), "a").is_some());
        assert!(registry.remove(ClientId(1), "a").is_none());
        assert_eq!(registry.remove_client(ClientId(1)), 1);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.count_for(ClientId(2)), 1);
    }
}
