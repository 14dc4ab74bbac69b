//! Delivery channel: routes logged events to matching client subscriptions.
//!
//! The channel owns the event log, the subscription registry and one
//! unbounded outbound queue per connected client. Publishing an event,
//! activating a subscription and replaying its snapshot all happen under the
//! same lock, so a new subscriber always sees history, then recent events,
//! then live events, with nothing lost or duplicated in between. The lock is
//! never held across an `.await`.
//!
//! ```text
//!  ChainState ──emit──▶ Channel ──▶ EventLog (recent / history)
//!                          │
//!                          ├──▶ SubscriptionRegistry::matching
//!                          ▼
//!               per-client mpsc::UnboundedSender<Outbound>
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::config::ChannelConfig;
use crate::error::FeedError;
use crate::event::{Event, EventData};
use crate::event_log::EventLog;
use crate::subscription::{ClientId, SubscribeRequest, Subscription, SubscriptionRegistry};

/// Receives every event the chain state machine produces.
///
/// Implementations must accept events in emission order; an error aborts the
/// block being processed.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event) -> Result<(), FeedError>;
}

/// A message queued for one client.
#[derive(Debug, Clone)]
pub enum Outbound {
    Event {
        event: Arc<Event>,
        ident: Option<String>,
        snapshot: bool,
    },
    /// Inline protocol error; does not affect subscription state.
    Error { message: String },
}

impl Outbound {
    fn event(event: Arc<Event>, ident: Option<&str>, snapshot: bool) -> Self {
        Self::Event {
            event,
            ident: ident.map(str::to_string),
            snapshot,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Event {
                event,
                ident,
                snapshot,
            } => event.to_wire(ident.as_deref(), *snapshot),
            Self::Error { message } => json!({ "error": true, "message": message }),
        }
    }

    pub fn to_text(&self) -> String {
        self.to_json().to_string()
    }
}

struct ChannelState {
    log: EventLog,
    registry: SubscriptionRegistry,
    clients: HashMap<ClientId, mpsc::UnboundedSender<Outbound>>,
}

pub struct Channel {
    config: ChannelConfig,
    next_client: AtomicU64,
    state: Mutex<ChannelState>,
}

impl Channel {
    pub fn new(config: ChannelConfig) -> Self {
        Self {
            config,
            next_client: AtomicU64::new(1),
            state: Mutex::new(ChannelState {
                log: EventLog::new(),
                registry: SubscriptionRegistry::new(),
                clients: HashMap::new(),
            }),
        }
    }

    /// Register a new client and queue its welcome event.
    pub fn connect(&self) -> (ClientId, mpsc::UnboundedReceiver<Outbound>) {
        let id = ClientId(self.next_client.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.lock().unwrap();
        let welcome = Event::welcome(state.log.latest_sealed());
        let _ = tx.send(Outbound::event(Arc::new(welcome), None, false));
        state.clients.insert(id, tx);
        tracing::debug!(client = %id, "client connected");
        (id, rx)
    }

    /// Remove a client and every subscription it holds.
    pub fn disconnect(&self, client: ClientId) {
        let mut state = self.state.lock().unwrap();
        state.clients.remove(&client);
        let removed = state.registry.remove_client(client);
        tracing::debug!(client = %client, subscriptions = removed, "client disconnected");
    }

    /// Record an event in the log and deliver it to matching subscriptions.
    pub fn publish(&self, event: Event) -> Result<(), FeedError> {
        let mut state = self.state.lock().unwrap();
        let Some(event) = state.log.emit(event)? else {
            return Ok(());
        };
        let state = &*state;
        for sub in state.registry.matching(&event) {
            if let Some(tx) = state.clients.get(&sub.client()) {
                let _ = tx.send(Outbound::event(Arc::clone(&event), Some(sub.ident()), false));
            }
        }
        Ok(())
    }

    /// Handle one inbound text message from `client`.
    pub fn handle_message(&self, client: ClientId, text: &str) {
        let message: Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(client = %client, error = %e, "unparseable client message");
                self.reply(client, Outbound::error(format!("invalid JSON: {e}")));
                return;
            }
        };
        match message.get("action").and_then(Value::as_str) {
            Some("subscribe") => self.subscribe(client, &message),
            Some("unsubscribe") => self.unsubscribe(client, &message),
            Some(other) => {
                tracing::warn!(client = %client, action = other, "unknown client action");
                self.reply(client, Outbound::error(format!("unknown action `{other}`")));
            }
            None => self.reply(client, Outbound::error("missing field `action`")),
        }
    }

    fn subscribe(&self, client: ClientId, message: &Value) {
        let ident = message.get("ident").and_then(Value::as_str).map(str::to_string);
        let mut state = self.state.lock().unwrap();
        let Some(tx) = state.clients.get(&client).cloned() else {
            return;
        };

        let subscription = SubscribeRequest::parse(message).and_then(|request| {
            Subscription::from_request(client, request, &state.registry, &self.config)
        });
        let subscription = match subscription {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(client = %client, error = %e, "subscription rejected");
                let reply = Event::new(EventData::SubscriptionError {
                    reason: e.to_string(),
                });
                let _ = tx.send(Outbound::event(Arc::new(reply), ident.as_deref(), false));
                return;
            }
        };

        let ack = Event::new(EventData::SubscriptionSucceeded {
            subscription: subscription.describe(),
        });
        let _ = tx.send(Outbound::event(Arc::new(ack), Some(subscription.ident()), false));

        let replay: Vec<Arc<Event>> = match subscription.snapshot() {
            Some(look_back) => state
                .log
                .events(subscription.kind(), look_back)
                .into_iter()
                .chain(state.log.recent_events(subscription.kind()))
                .filter(|e| subscription.matches(e))
                .collect(),
            None => vec![],
        };
        for event in replay.iter() {
            let _ = tx.send(Outbound::event(Arc::clone(event), Some(subscription.ident()), true));
        }

        let ident = subscription.ident().to_string();
        tracing::debug!(
            client = %client,
            ident = %ident,
            event = %subscription.kind(),
            replayed = replay.len(),
            "subscription active"
        );
        state.registry.insert(subscription);
        state.registry.activate(client, &ident);
    }

    fn unsubscribe(&self, client: ClientId, message: &Value) {
        let Some(ident) = message.get("ident").and_then(Value::as_str) else {
            self.reply(client, Outbound::error("missing field `ident`"));
            return;
        };
        let removed = self.state.lock().unwrap().registry.remove(client, ident);
        if removed.is_none() {
            self.reply(client, Outbound::error(format!("no subscription `{ident}`")));
        }
    }

    fn reply(&self, client: ClientId, message: Outbound) {
        if let Some(tx) = self.state.lock().unwrap().clients.get(&client) {
            let _ = tx.send(message);
        }
    }

    /// Run `f` against the event log.
    pub fn with_log<R>(&self, f: impl FnOnce(&EventLog) -> R) -> R {
        f(&self.state.lock().unwrap().log)
    }

    pub fn latest_sealed(&self) -> Option<u64> {
        self.with_log(EventLog::latest_sealed)
    }

    pub fn client_count(&self) -> usize {
        self.state.lock().unwrap().clients.len()
    }

    pub fn subscription_count(&self) -> usize {
        self.state.lock().unwrap().registry.len()
    }
}

impl EventSink for Channel {
    fn emit(&self, event: Event) -> Result<(), FeedError> {
        self.publish(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::Block;
    use crate::event::EventKind;
    use crate::node::BlockRecord;

    fn block(number: u64) -> Arc<Block> {
        Arc::new(Block::from(BlockRecord {
            block: number,
            ..Default::default()
        }))
    }

    fn mine(channel: &Channel, number: u64) {
        channel.publish(Event::block_mined(block(number), None)).unwrap();
        channel.publish(Event::seal(block(number))).unwrap();
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> Vec<Value> {
        let mut out = vec![];
        while let Ok(msg) = rx.try_recv() {
            out.push(msg.to_json());
        }
        out
    }

    #[test]
    fn connect_sends_welcome() {
        let channel = Channel::new(ChannelConfig::default());
        mine(&channel, 3);
        let (_, mut rx) = channel.connect();
        let msgs = drain(&mut rx);
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0]["event"], "welcome");
        assert_eq!(msgs[0]["latestBlock"], 3);
    }

    #[test]
    fn invalid_json_gets_inline_error() {
        let channel = Channel::new(ChannelConfig::default());
        let (id, mut rx) = channel.connect();
        drain(&mut rx);
        channel.handle_message(id, "not json");
        let msgs = drain(&mut rx);
        assert_eq!(msgs[0]["error"], true);
        assert_eq!(channel.subscription_count(), 0);
    }

    #[test]
    fn subscribe_ack_then_live_events() {
        let channel = Channel::new(ChannelConfig::default());
        let (id, mut rx) = channel.connect();
        drain(&mut rx);

        channel.handle_message(id, r#"{"action":"subscribe","ident":"blocks","event":"block-mined"}"#);
        mine(&channel, 1);

        let msgs = drain(&mut rx);
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0]["event"], "subscription-succeeded");
        assert_eq!(msgs[0]["ident"], "blocks");
        assert_eq!(msgs[0]["subscription"]["event"], "block-mined");
        assert_eq!(msgs[1]["event"], "block-mined");
        assert_eq!(msgs[1]["ident"], "blocks");
        assert!(msgs[1].get("snapshot").is_none());
    }

    #[test]
    fn rejected_subscription_reports_reason() {
        let channel = Channel::new(ChannelConfig::default());
        let (id, mut rx) = channel.connect();
        drain(&mut rx);
        channel.handle_message(id, r#"{"action":"subscribe","ident":"x","event":"nope"}"#);
        let msgs = drain(&mut rx);
        assert_eq!(msgs[0]["event"], "subscription-error");
        assert_eq!(msgs[0]["ident"], "x");
        assert_eq!(channel.subscription_count(), 0);
    }

    #[test]
    fn snapshot_replays_history_then_recent() {
        let channel = Channel::new(ChannelConfig::default());
        for n in 95..=100 {
            mine(&channel, n);
        }
        channel.publish(Event::block_mined(block(101), None)).unwrap();

        let (id, mut rx) = channel.connect();
        drain(&mut rx);
        channel.handle_message(
            id,
            r#"{"action":"subscribe","ident":"s","event":"block-mined","snapshot":2}"#,
        );
        let msgs = drain(&mut rx);
        let numbers: Vec<_> = msgs[1..].iter().map(|m| m["block"]["number"].clone()).collect();
        assert_eq!(numbers, vec![json!(98), json!(99), json!(100), json!(101)]);
        assert!(msgs[1..].iter().all(|m| m["snapshot"] == true));
        assert_eq!(msgs[1]["associated"], 98);
        assert!(msgs[4].get("associated").is_none());
    }

    #[test]
    fn no_snapshot_means_no_replay() {
        let channel = Channel::new(ChannelConfig::default());
        mine(&channel, 1);
        let (id, mut rx) = channel.connect();
        drain(&mut rx);
        channel.handle_message(id, r#"{"action":"subscribe","ident":"s","event":"block-mined"}"#);
        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let channel = Channel::new(ChannelConfig::default());
        let (id, mut rx) = channel.connect();
        channel.handle_message(id, r#"{"action":"subscribe","ident":"p","event":"ping"}"#);
        channel.handle_message(id, r#"{"action":"unsubscribe","ident":"p"}"#);
        drain(&mut rx);

        channel.publish(Event::ping()).unwrap();
        assert!(drain(&mut rx).is_empty());

        channel.handle_message(id, r#"{"action":"unsubscribe","ident":"p"}"#);
        assert_eq!(drain(&mut rx)[0]["error"], true);
    }

    #[test]
    fn disconnect_drops_subscriptions() {
        let channel = Channel::new(ChannelConfig::default());
        let (id, _rx) = channel.connect();
        channel.handle_message(id, r#"{"action":"subscribe","ident":"p","event":"ping"}"#);
        assert_eq!(channel.subscription_count(), 1);
        channel.disconnect(id);
        assert_eq!(channel.subscription_count(), 0);
        assert_eq!(channel.client_count(), 0);
    }

    #[test]
    fn clients_only_receive_their_own_matches() {
        let channel = Channel::new(ChannelConfig::default());
        let (a, mut rx_a) = channel.connect();
        let (_b, mut rx_b) = channel.connect();
        channel.handle_message(a, r#"{"action":"subscribe","ident":"p","event":"ping"}"#);
        drain(&mut rx_a);
        drain(&mut rx_b);

        channel.publish(Event::ping()).unwrap();
        assert_eq!(drain(&mut rx_a).len(), 1);
        assert!(drain(&mut rx_b).is_empty());
        assert!(channel.with_log(|log| log.recent_events(EventKind::Ping).len()) == 1);
    }
}
