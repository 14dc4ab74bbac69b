//! Domain events and their serialized form.
//!
//! Every event is serialized once at construction into a JSON object of the
//! shape `{event, message, associated?, ...kind-specific fields}`. Filters
//! walk that object; the transport adds `ident`/`snapshot` on delivery.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::account::{Account, PublicKey};
use crate::block::Block;
use crate::operation::{Operation, OperationInfo};
use crate::types::AccountNumber;

// ─── EventKind ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    BlockMined,
    AccountAdded,
    OperationPending,
    OperationIncluded,
    OperationMatured,
    OperationNotIncluded,
    AccountBuy,
    AccountChangeKey,
    AccountChangeName,
    AccountChangeType,
    AccountDelist,
    AccountForSale,
    AccountTransaction,
    SubscriptionSucceeded,
    SubscriptionError,
    Welcome,
    Ping,
    /// Internal sealing signal; never delivered.
    Seal,
}

impl EventKind {
    pub const ALL: [EventKind; 18] = [
        Self::BlockMined,
        Self::AccountAdded,
        Self::OperationPending,
        Self::OperationIncluded,
        Self::OperationMatured,
        Self::OperationNotIncluded,
        Self::AccountBuy,
        Self::AccountChangeKey,
        Self::AccountChangeName,
        Self::AccountChangeType,
        Self::AccountDelist,
        Self::AccountForSale,
        Self::AccountTransaction,
        Self::SubscriptionSucceeded,
        Self::SubscriptionError,
        Self::Welcome,
        Self::Ping,
        Self::Seal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BlockMined => "block-mined",
            Self::AccountAdded => "account-added",
            Self::OperationPending => "operation-pending",
            Self::OperationIncluded => "operation-included",
            Self::OperationMatured => "operation-matured",
            Self::OperationNotIncluded => "operation-not-included",
            Self::AccountBuy => "account-buy",
            Self::AccountChangeKey => "account-change-key",
            Self::AccountChangeName => "account-change-name",
            Self::AccountChangeType => "account-change-type",
            Self::AccountDelist => "account-delist",
            Self::AccountForSale => "account-for-sale",
            Self::AccountTransaction => "account-transaction",
            Self::SubscriptionSucceeded => "subscription-succeeded",
            Self::SubscriptionError => "subscription-error",
            Self::Welcome => "welcome",
            Self::Ping => "ping",
            Self::Seal => "seal",
        }
    }

    /// Kinds a client may subscribe to. Connection-level replies and the
    /// internal seal signal are excluded.
    pub fn is_subscribable(&self) -> bool {
        !matches!(
            self,
            Self::SubscriptionSucceeded | Self::SubscriptionError | Self::Welcome | Self::Seal
        )
    }

    /// Transient signals that are never stored in sealed history.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::OperationPending | Self::Ping)
    }

    /// The account event kind for an info record.
    pub fn for_info(info: &OperationInfo) -> Self {
        match info {
            OperationInfo::Transaction { .. } => Self::AccountTransaction,
            OperationInfo::Buy { .. } => Self::AccountBuy,
            OperationInfo::ChangeKey { .. } => Self::AccountChangeKey,
            OperationInfo::ChangeName { .. } => Self::AccountChangeName,
            OperationInfo::ChangeType { .. } => Self::AccountChangeType,
            OperationInfo::Delist { .. } => Self::AccountDelist,
            OperationInfo::ForSale { .. } => Self::AccountForSale,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEventKind(pub String);

impl fmt::Display for UnknownEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown event kind {:?}", self.0)
    }
}

impl std::error::Error for UnknownEventKind {}

impl FromStr for EventKind {
    type Err = UnknownEventKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| UnknownEventKind(s.to_string()))
    }
}

// ─── EventData ────────────────────────────────────────────────────────────────

/// The kind-specific content of an event.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum EventData {
    #[serde(rename_all = "camelCase")]
    BlockMined {
        block: Arc<Block>,
        miner_public_key: Option<Arc<PublicKey>>,
    },
    #[serde(rename_all = "camelCase")]
    AccountAdded {
        account_number: AccountNumber,
        block: u64,
        account: Option<Arc<Account>>,
    },
    OperationPending { operation: Arc<Operation> },
    OperationIncluded { operation: Arc<Operation> },
    OperationMatured { operation: Arc<Operation> },
    OperationNotIncluded { operation: Arc<Operation> },
    /// One of the typed account events; the kind follows the info variant.
    #[serde(rename_all = "camelCase")]
    Account {
        operation: Arc<Operation>,
        operation_info: OperationInfo,
        account: Option<Arc<Account>>,
    },
    #[serde(rename_all = "camelCase")]
    SubscriptionSucceeded { subscription: Value },
    SubscriptionError { reason: String },
    #[serde(rename_all = "camelCase")]
    Welcome {
        version: String,
        latest_block: Option<u64>,
    },
    Ping {
        #[serde(with = "chrono::serde::ts_seconds")]
        timestamp: DateTime<Utc>,
    },
    Seal { block: Arc<Block> },
}

impl EventData {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::BlockMined { .. } => EventKind::BlockMined,
            Self::AccountAdded { .. } => EventKind::AccountAdded,
            Self::OperationPending { .. } => EventKind::OperationPending,
            Self::OperationIncluded { .. } => EventKind::OperationIncluded,
            Self::OperationMatured { .. } => EventKind::OperationMatured,
            Self::OperationNotIncluded { .. } => EventKind::OperationNotIncluded,
            Self::Account { operation_info, .. } => EventKind::for_info(operation_info),
            Self::SubscriptionSucceeded { .. } => EventKind::SubscriptionSucceeded,
            Self::SubscriptionError { .. } => EventKind::SubscriptionError,
            Self::Welcome { .. } => EventKind::Welcome,
            Self::Ping { .. } => EventKind::Ping,
            Self::Seal { .. } => EventKind::Seal,
        }
    }

    fn message(&self) -> String {
        match self {
            Self::BlockMined { block, .. } => format!("Block {} was mined", block.number),
            Self::AccountAdded { account_number, block, .. } => {
                format!("Account {account_number} was created in block {block}")
            }
            Self::OperationPending { operation } => {
                format!("Operation {} is pending", operation.hash)
            }
            Self::OperationIncluded { operation } => format!(
                "Operation {} was included in block {}",
                operation.hash, operation.block
            ),
            Self::OperationMatured { operation } => format!(
                "Operation {} reached maturation {}",
                operation.hash, operation.maturation
            ),
            Self::OperationNotIncluded { operation } => {
                format!("Operation {} was not included", operation.hash)
            }
            Self::Account { operation_info, .. } => info_message(operation_info),
            Self::SubscriptionSucceeded { .. } => "Subscription succeeded".into(),
            Self::SubscriptionError { reason } => format!("Subscription failed: {reason}"),
            Self::Welcome { .. } => "Welcome".into(),
            Self::Ping { .. } => "ping".into(),
            Self::Seal { block } => format!("Sealing block {}", block.number),
        }
    }
}

fn info_message(info: &OperationInfo) -> String {
    match info {
        OperationInfo::Transaction {
            sender_account,
            receiver_account,
            amount,
            ..
        } => format!("{sender_account} sent {amount} PASC to {receiver_account}"),
        OperationInfo::Buy {
            buyer_account,
            account,
            price,
            ..
        } => format!("{buyer_account} bought account {account} for {price} PASC"),
        OperationInfo::ChangeKey { account, .. } => format!("Key of account {account} changed"),
        OperationInfo::ChangeName { account, new_name } => {
            format!("Account {account} renamed to {new_name:?}")
        }
        OperationInfo::ChangeType { account, new_type } => {
            format!("Type of account {account} changed to {new_type}")
        }
        OperationInfo::Delist { account } => format!("Account {account} delisted"),
        OperationInfo::ForSale { account, price, .. } => {
            format!("Account {account} listed for {price} PASC")
        }
    }
}

// ─── Event ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Event {
    data: EventData,
    serialized: Value,
    associated: Option<u64>,
}

impl Event {
    pub fn new(data: EventData) -> Self {
        let mut object = Map::new();
        object.insert("event".into(), Value::from(data.kind().as_str()));
        object.insert("message".into(), Value::from(data.message()));
        if let Ok(Value::Object(fields)) = serde_json::to_value(&data) {
            object.extend(fields);
        }
        Self {
            data,
            serialized: Value::Object(object),
            associated: None,
        }
    }

    pub fn block_mined(block: Arc<Block>, miner_public_key: Option<Arc<PublicKey>>) -> Self {
        Self::new(EventData::BlockMined {
            block,
            miner_public_key,
        })
    }

    pub fn ping() -> Self {
        Self::new(EventData::Ping {
            timestamp: Utc::now(),
        })
    }

    pub fn seal(block: Arc<Block>) -> Self {
        Self::new(EventData::Seal { block })
    }

    pub fn welcome(latest_block: Option<u64>) -> Self {
        Self::new(EventData::Welcome {
            version: env!("CARGO_PKG_VERSION").to_string(),
            latest_block,
        })
    }

    pub fn kind(&self) -> EventKind {
        self.data.kind()
    }

    pub fn data(&self) -> &EventData {
        &self.data
    }

    pub fn message(&self) -> &str {
        self.serialized["message"].as_str().unwrap_or_default()
    }

    /// The block this event was sealed under, once sealed.
    pub fn associated(&self) -> Option<u64> {
        self.associated
    }

    /// A copy stamped with the block it was sealed under.
    pub fn associate(&self, block: u64) -> Self {
        let mut event = self.clone();
        event.associated = Some(block);
        if let Value::Object(object) = &mut event.serialized {
            object.insert("associated".into(), Value::from(block));
        }
        event
    }

    /// The serialized form filters are evaluated against.
    pub fn serialized(&self) -> &Value {
        &self.serialized
    }

    /// Walk a dot-separated path into the serialized form.
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        path.split('.')
            .filter(|segment| !segment.is_empty())
            .try_fold(&self.serialized, |value, segment| match value {
                Value::Object(map) => map.get(segment),
                Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            })
    }

    /// The wire form for one subscription.
    pub fn to_wire(&self, ident: Option<&str>, snapshot: bool) -> Value {
        let mut value = self.serialized.clone();
        if let Value::Object(object) = &mut value {
            if let Some(ident) = ident {
                object.insert("ident".into(), Value::from(ident));
            }
            if snapshot {
                object.insert("snapshot".into(), Value::Bool(true));
            }
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::BlockRecord;

    fn block(number: u64) -> Arc<Block> {
        Arc::new(Block::from(BlockRecord {
            block: number,
            ..Default::default()
        }))
    }

    #[test]
    fn kind_names_round_trip() {
        for kind in EventKind::ALL {
            assert_eq!(kind.as_str().parse::<EventKind>().unwrap(), kind);
        }
        assert!("block.mined".parse::<EventKind>().is_err());
    }

    #[test]
    fn serialized_shape() {
        let event = Event::block_mined(block(500), None);
        let v = event.serialized();
        assert_eq!(v["event"], "block-mined");
        assert_eq!(v["message"], "Block 500 was mined");
        assert_eq!(v["block"]["number"], 500);
        assert!(v.get("associated").is_none());
    }

    #[test]
    fn lookup_walks_dot_path() {
        let event = Event::block_mined(block(42), None);
        assert_eq!(event.lookup("block.number"), Some(&Value::from(42)));
        assert_eq!(event.lookup("block.missing.deeper"), None);
        assert_eq!(event.lookup("event"), Some(&Value::from("block-mined")));
    }

    #[test]
    fn associate_stamps_copy() {
        let event = Event::block_mined(block(7), None);
        let sealed = event.associate(7);
        assert_eq!(event.associated(), None);
        assert_eq!(sealed.associated(), Some(7));
        assert_eq!(sealed.serialized()["associated"], 7);
    }

    #[test]
    fn wire_adds_ident_and_snapshot() {
        let wire = Event::ping().to_wire(Some("hb"), true);
        assert_eq!(wire["event"], "ping");
        assert_eq!(wire["ident"], "hb");
        assert_eq!(wire["snapshot"], true);
    }

    #[test]
    fn seal_is_not_subscribable() {
        assert!(!EventKind::Seal.is_subscribable());
        assert!(EventKind::Ping.is_subscribable());
        assert!(EventKind::OperationPending.is_transient());
        assert!(!EventKind::OperationIncluded.is_transient());
    }
}
