//! Operations, their hashes, and the typed info records derived from them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::FeedError;
use crate::node::{ChangerRecord, OperationRecord, ReceiverRecord, SenderRecord};
use crate::types::{AccountNumber, Currency};

/// Hex characters that encode the owning block at the front of an ophash.
const BLOCK_PREFIX_LEN: usize = 8;

// ─── OperationHash ────────────────────────────────────────────────────────────

/// An operation hash: 8 hex chars of block number followed by a content
/// fingerprint that stays the same when a pending operation is mined.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OperationHash(String);

impl OperationHash {
    pub fn new(hash: impl Into<String>) -> Result<Self, FeedError> {
        let hash = hash.into();
        if hash.len() <= BLOCK_PREFIX_LEN || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(FeedError::InvalidOperationHash(hash));
        }
        Ok(Self(hash.to_ascii_uppercase()))
    }

    /// Everything after the block prefix.
    pub fn fingerprint(&self) -> &str {
        &self.0[BLOCK_PREFIX_LEN..]
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for OperationHash {
    type Error = FeedError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<OperationHash> for String {
    fn from(h: OperationHash) -> Self {
        h.0
    }
}

impl fmt::Display for OperationHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ─── OperationType ────────────────────────────────────────────────────────────

/// The node's operation-type code, decided once at parse time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationType {
    BlockchainReward,
    Transaction,
    ChangeKey,
    RecoverFunds,
    ListForSale,
    Delist,
    Buy,
    ChangeKeySigned,
    ChangeAccountInfo,
    MultiOperation,
    Data,
    Other(u32),
}

impl OperationType {
    pub fn code(&self) -> u32 {
        match self {
            Self::BlockchainReward => 0,
            Self::Transaction => 1,
            Self::ChangeKey => 2,
            Self::RecoverFunds => 3,
            Self::ListForSale => 4,
            Self::Delist => 5,
            Self::Buy => 6,
            Self::ChangeKeySigned => 7,
            Self::ChangeAccountInfo => 8,
            Self::MultiOperation => 9,
            Self::Data => 10,
            Self::Other(code) => *code,
        }
    }
}

impl From<u32> for OperationType {
    fn from(code: u32) -> Self {
        match code {
            0 => Self::BlockchainReward,
            1 => Self::Transaction,
            2 => Self::ChangeKey,
            3 => Self::RecoverFunds,
            4 => Self::ListForSale,
            5 => Self::Delist,
            6 => Self::Buy,
            7 => Self::ChangeKeySigned,
            8 => Self::ChangeAccountInfo,
            9 => Self::MultiOperation,
            10 => Self::Data,
            other => Self::Other(other),
        }
    }
}

impl Serialize for OperationType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.code())
    }
}

impl<'de> Deserialize<'de> for OperationType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        u32::deserialize(deserializer).map(Self::from)
    }
}

// ─── Parties ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sender {
    pub account: AccountNumber,
    pub n_operation: u64,
    pub amount: Currency,
    pub payload: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receiver {
    pub account: AccountNumber,
    pub amount: Currency,
    pub payload: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Changer {
    pub account: AccountNumber,
    pub new_public_key: Option<String>,
    pub new_name: Option<String>,
    pub new_type: Option<u32>,
    pub seller_account: Option<AccountNumber>,
    pub account_price: Option<Currency>,
    pub locked_until_block: Option<u64>,
}

impl From<SenderRecord> for Sender {
    fn from(r: SenderRecord) -> Self {
        Self {
            account: r.account,
            n_operation: r.n_operation,
            amount: r.amount,
            payload: r.payload,
        }
    }
}

impl From<ReceiverRecord> for Receiver {
    fn from(r: ReceiverRecord) -> Self {
        Self {
            account: r.account,
            amount: r.amount,
            payload: r.payload,
        }
    }
}

impl From<ChangerRecord> for Changer {
    fn from(r: ChangerRecord) -> Self {
        Self {
            account: r.account,
            new_public_key: r.new_enc_pubkey.filter(|k| !k.is_empty()),
            new_name: r.new_name,
            new_type: r.new_type,
            seller_account: r.seller_account,
            account_price: r.account_price,
            locked_until_block: r.locked_until_block,
        }
    }
}

// ─── OperationInfo ────────────────────────────────────────────────────────────

/// What an operation did, one variant per kind of account event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum OperationInfo {
    #[serde(rename_all = "camelCase")]
    Transaction {
        sender_account: AccountNumber,
        receiver_account: AccountNumber,
        amount: Currency,
        payload: String,
    },
    #[serde(rename_all = "camelCase")]
    Buy {
        buyer_account: AccountNumber,
        account: AccountNumber,
        price: Currency,
        seller_account: Option<AccountNumber>,
    },
    #[serde(rename_all = "camelCase")]
    ChangeKey {
        account: AccountNumber,
        new_public_key: String,
    },
    #[serde(rename_all = "camelCase")]
    ChangeName {
        account: AccountNumber,
        new_name: String,
    },
    #[serde(rename_all = "camelCase")]
    ChangeType {
        account: AccountNumber,
        new_type: u32,
    },
    Delist {
        account: AccountNumber,
    },
    #[serde(rename_all = "camelCase")]
    ForSale {
        account: AccountNumber,
        price: Currency,
        seller_account: Option<AccountNumber>,
        locked_until_block: u64,
        private_buyer_key: Option<String>,
    },
}

impl OperationInfo {
    /// The account whose state the operation changed; `None` for transfers.
    pub fn affected_account(&self) -> Option<AccountNumber> {
        match self {
            Self::Transaction { .. } => None,
            Self::Buy { account, .. }
            | Self::ChangeKey { account, .. }
            | Self::ChangeName { account, .. }
            | Self::ChangeType { account, .. }
            | Self::Delist { account }
            | Self::ForSale { account, .. } => Some(*account),
        }
    }
}

// ─── Operation ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub hash: OperationHash,
    /// Owning block; 0 while pending.
    pub block: u64,
    /// Position within the block.
    pub position: u32,
    #[serde(rename = "type")]
    pub op_type: OperationType,
    pub subtype: u32,
    pub account: AccountNumber,
    pub signer_account: Option<AccountNumber>,
    pub n_operation: u64,
    pub fee: Currency,
    pub amount: Currency,
    /// −1 while pending, else blocks elapsed since the owning block.
    pub maturation: i64,
    pub time: i64,
    pub payload: String,
    /// Node-supplied description, passed through untouched.
    pub description: String,
    pub info: Vec<OperationInfo>,
    pub senders: Vec<Sender>,
    pub receivers: Vec<Receiver>,
    pub changers: Vec<Changer>,
}

impl Operation {
    pub fn is_pending(&self) -> bool {
        self.block == 0
    }

    pub fn fingerprint(&self) -> &str {
        self.hash.fingerprint()
    }

    /// Recompute maturation against the latest known block.
    pub fn mature_to(&mut self, latest: u64) {
        self.maturation = if self.is_pending() {
            -1
        } else {
            latest.saturating_sub(self.block) as i64
        };
    }

    fn derive_info(&self) -> Vec<OperationInfo> {
        let sender = self
            .senders
            .first()
            .map(|s| s.account)
            .unwrap_or(self.account);
        let transactions = || {
            self.receivers
                .iter()
                .map(|r| OperationInfo::Transaction {
                    sender_account: sender,
                    receiver_account: r.account,
                    amount: r.amount,
                    payload: r.payload.clone(),
                })
                .collect::<Vec<_>>()
        };

        match self.op_type {
            OperationType::Transaction => transactions(),
            OperationType::ChangeKey | OperationType::ChangeKeySigned => self.key_changes(),
            OperationType::ChangeAccountInfo => self.info_changes(),
            OperationType::MultiOperation => {
                let mut info = transactions();
                info.extend(self.key_changes());
                info.extend(self.info_changes());
                info
            }
            OperationType::ListForSale => self
                .changers
                .iter()
                .map(|c| OperationInfo::ForSale {
                    account: c.account,
                    price: c.account_price.unwrap_or_default(),
                    seller_account: c.seller_account,
                    locked_until_block: c.locked_until_block.unwrap_or(0),
                    private_buyer_key: c.new_public_key.clone(),
                })
                .collect(),
            OperationType::Delist => self
                .changers
                .iter()
                .map(|c| OperationInfo::Delist { account: c.account })
                .collect(),
            OperationType::Buy => {
                let bought = self
                    .changers
                    .first()
                    .map(|c| (c.account, c.seller_account))
                    .or_else(|| self.receivers.first().map(|r| (r.account, None)));
                match bought {
                    Some((account, seller_account)) => vec![OperationInfo::Buy {
                        buyer_account: sender,
                        account,
                        price: self.amount,
                        seller_account,
                    }],
                    None => vec![],
                }
            }
            OperationType::BlockchainReward
            | OperationType::RecoverFunds
            | OperationType::Data
            | OperationType::Other(_) => {
                tracing::debug!(
                    ophash = %self.hash,
                    optype = self.op_type.code(),
                    "operation type carries no info records"
                );
                vec![]
            }
        }
    }

    fn key_changes(&self) -> Vec<OperationInfo> {
        self.changers
            .iter()
            .filter_map(|c| {
                c.new_public_key
                    .as_ref()
                    .map(|key| OperationInfo::ChangeKey {
                        account: c.account,
                        new_public_key: key.clone(),
                    })
            })
            .collect()
    }

    fn info_changes(&self) -> Vec<OperationInfo> {
        let mut info = Vec::new();
        for c in &self.changers {
            if let Some(name) = &c.new_name {
                info.push(OperationInfo::ChangeName {
                    account: c.account,
                    new_name: name.clone(),
                });
            }
            if let Some(new_type) = c.new_type {
                info.push(OperationInfo::ChangeType {
                    account: c.account,
                    new_type,
                });
            }
        }
        info
    }
}

impl TryFrom<OperationRecord> for Operation {
    type Error = FeedError;

    fn try_from(r: OperationRecord) -> Result<Self, Self::Error> {
        let mut op = Self {
            hash: OperationHash::new(r.ophash)?,
            block: r.block,
            position: r.opblock,
            op_type: OperationType::from(r.optype),
            subtype: r.subtype,
            account: r.account,
            signer_account: r.signer_account,
            n_operation: r.n_operation,
            fee: r.fee,
            amount: r.amount,
            maturation: -1,
            time: r.time,
            payload: r.payload,
            description: r.optxt,
            info: vec![],
            senders: r.senders.into_iter().map(Sender::from).collect(),
            receivers: r.receivers.into_iter().map(Receiver::from).collect(),
            changers: r.changers.into_iter().map(Changer::from).collect(),
        };
        op.info = op.derive_info();
        Ok(op)
    }
}
