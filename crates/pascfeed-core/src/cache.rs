//! Entity cache: memoized, lazily-resolved accounts and public keys.
//!
//! Entries are fetched from the node on first lookup and kept for the
//! lifetime of the cache. Resolution is idempotent, so two lookups racing on
//! the same key may both fetch but will store equal values. An optional
//! capacity turns on oldest-first eviction without changing the lookup
//! contract.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use crate::account::{Account, PublicKey};
use crate::config::CacheConfig;
use crate::error::FeedError;
use crate::node::NodeClient;
use crate::types::AccountNumber;

/// An insertion-ordered map with an optional size bound.
struct Memo<K, V> {
    entries: HashMap<K, Arc<V>>,
    order: VecDeque<K>,
    capacity: Option<usize>,
}

impl<K: Eq + Hash + Clone, V> Memo<K, V> {
    fn new(capacity: Option<usize>) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            capacity,
        }
    }

    fn get(&self, key: &K) -> Option<Arc<V>> {
        self.entries.get(key).cloned()
    }

    /// Insert unless present; returns the stored value either way.
    fn insert(&mut self, key: K, value: Arc<V>) -> Arc<V> {
        if let Some(existing) = self.entries.get(&key) {
            return Arc::clone(existing);
        }
        if let Some(cap) = self.capacity {
            while self.entries.len() >= cap.max(1) {
                match self.order.pop_front() {
                    Some(oldest) => {
                        self.entries.remove(&oldest);
                    }
                    None => break,
                }
            }
        }
        self.order.push_back(key.clone());
        self.entries.insert(key, Arc::clone(&value));
        value
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Memoizing resolver for accounts and public keys backed by a node.
pub struct EntityCache<C> {
    client: Arc<C>,
    accounts: Mutex<Memo<AccountNumber, Account>>,
    keys: Mutex<Memo<String, PublicKey>>,
}

impl<C: NodeClient> EntityCache<C> {
    pub fn new(client: Arc<C>, config: &CacheConfig) -> Self {
        Self {
            client,
            accounts: Mutex::new(Memo::new(config.capacity)),
            keys: Mutex::new(Memo::new(config.capacity)),
        }
    }

    /// Resolve an account. `None` input short-circuits without a lookup.
    ///
    /// Returns `Ok(None)` when the node reported a protocol-level error.
    pub async fn account(
        &self,
        number: Option<AccountNumber>,
    ) -> Result<Option<Arc<Account>>, FeedError> {
        let Some(number) = number else {
            return Ok(None);
        };
        if let Some(hit) = self.accounts.lock().unwrap().get(&number) {
            return Ok(Some(hit));
        }
        let Some(record) = self.client.account(number).await? else {
            return Ok(None);
        };
        let account = Arc::new(Account::try_from(record)?);
        Ok(Some(self.accounts.lock().unwrap().insert(number, account)))
    }

    /// Resolve a public key by its encoded hex value. Empty or `None` input
    /// short-circuits without a lookup.
    pub async fn public_key(
        &self,
        hex: Option<&str>,
    ) -> Result<Option<Arc<PublicKey>>, FeedError> {
        let Some(hex) = hex.filter(|h| !h.is_empty()) else {
            return Ok(None);
        };
        let key = hex.to_ascii_uppercase();
        if let Some(hit) = self.keys.lock().unwrap().get(&key) {
            return Ok(Some(hit));
        }
        let Some(record) = self.client.decode_public_key(hex).await? else {
            return Ok(None);
        };
        let public_key = Arc::new(PublicKey::from(record));
        Ok(Some(self.keys.lock().unwrap().insert(key, public_key)))
    }

    /// The seller of a listed account.
    pub async fn seller(&self, account: &Account) -> Result<Option<Arc<Account>>, FeedError> {
        self.account(account.seller()).await
    }

    pub fn cached_accounts(&self) -> usize {
        self.accounts.lock().unwrap().len()
    }

    pub fn cached_keys(&self) -> usize {
        self.keys.lock().unwrap().len()
    }
}
