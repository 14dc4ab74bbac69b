//! Accounts and public keys, resolved lazily through the entity cache.

use serde::{Deserialize, Serialize};

use crate::error::FeedError;
use crate::node::{AccountRecord, PublicKeyRecord};
use crate::types::{AccountNumber, Currency};

/// Whether an account is up for sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum SaleState {
    Normal,
    #[serde(rename_all = "camelCase")]
    Listed {
        seller: AccountNumber,
        price: Currency,
        locked_until_block: u64,
        /// Set for private sales: only the holder of this key may buy.
        private_buyer_key: Option<String>,
    },
}

impl SaleState {
    pub fn is_listed(&self) -> bool {
        matches!(self, Self::Listed { .. })
    }
}

/// A PascalCoin account (PASA).
///
/// References to other entities (public key, seller) are kept as keys and
/// resolved on demand through the cache, so reference cycles never recurse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub number: AccountNumber,
    pub public_key: String,
    pub balance: Currency,
    pub n_operation: u64,
    pub updated_block: u64,
    #[serde(flatten)]
    pub sale: SaleState,
    pub name: String,
    #[serde(rename = "type")]
    pub account_type: u32,
}

impl Account {
    /// The seller account, if the account is listed.
    pub fn seller(&self) -> Option<AccountNumber> {
        match &self.sale {
            SaleState::Listed { seller, .. } => Some(*seller),
            SaleState::Normal => None,
        }
    }
}

impl TryFrom<AccountRecord> for Account {
    type Error = FeedError;

    fn try_from(r: AccountRecord) -> Result<Self, Self::Error> {
        let sale = match r.state.as_str() {
            "normal" => SaleState::Normal,
            "listed" => {
                let seller = r.seller_account.ok_or_else(|| {
                    FeedError::InvalidAccountState(format!(
                        "account {} is listed without a seller",
                        r.account
                    ))
                })?;
                let private_buyer_key = match r.private_sale {
                    Some(true) => r.new_enc_pubkey.filter(|k| !k.is_empty()),
                    _ => None,
                };
                SaleState::Listed {
                    seller,
                    price: r.price.unwrap_or_default(),
                    locked_until_block: r.locked_until_block.unwrap_or(0),
                    private_buyer_key,
                }
            }
            other => return Err(FeedError::InvalidAccountState(other.to_string())),
        };
        Ok(Self {
            number: r.account,
            public_key: r.enc_pubkey,
            balance: r.balance,
            n_operation: r.n_operation,
            updated_block: r.updated_b,
            sale,
            name: r.name,
            account_type: r.account_type,
        })
    }
}

/// A decoded public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKey {
    pub name: String,
    pub usable: bool,
    /// Encoded hex value, no checksum.
    pub encoded: String,
    /// Base-58 value, with checksum.
    pub base58: String,
    pub curve: u32,
    pub x: String,
    pub y: String,
}

impl From<PublicKeyRecord> for PublicKey {
    fn from(r: PublicKeyRecord) -> Self {
        Self {
            name: r.name,
            usable: r.can_use,
            encoded: r.enc_pubkey,
            base58: r.b58_pubkey,
            curve: r.ec_nid,
            x: r.x,
            y: r.y,
        }
    }
}
