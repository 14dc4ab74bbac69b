//! Shared primitive types: account numbers and PASC amounts.

use std::fmt;
use std::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::FeedError;

// ─── AccountNumber ────────────────────────────────────────────────────────────

/// A PascalCoin account number: base value plus a two-digit checksum.
///
/// Displayed and serialized as `"<base>-<checksum>"`, e.g. `"12345-54"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AccountNumber {
    account: u64,
    checksum: u8,
}

impl AccountNumber {
    /// Build an account number from its base value, computing the checksum.
    pub fn new(account: u64) -> Self {
        Self {
            account,
            checksum: Self::checksum_for(account),
        }
    }

    /// `(base * 101) % 89 + 10`
    pub fn checksum_for(account: u64) -> u8 {
        ((account.wrapping_mul(101)) % 89 + 10) as u8
    }

    /// The base value without checksum.
    pub fn account(&self) -> u64 {
        self.account
    }

    pub fn checksum(&self) -> u8 {
        self.checksum
    }
}

impl Default for AccountNumber {
    fn default() -> Self {
        Self::new(0)
    }
}

impl From<u64> for AccountNumber {
    fn from(account: u64) -> Self {
        Self::new(account)
    }
}

impl FromStr for AccountNumber {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (base, checksum) = match s.split_once('-') {
            Some((base, checksum)) => (base, Some(checksum)),
            None => (s, None),
        };
        let account: u64 = base
            .parse()
            .map_err(|_| FeedError::InvalidAccountNumber(s.to_string()))?;
        let expected = Self::checksum_for(account);
        if let Some(checksum) = checksum {
            let actual: u8 = checksum
                .parse()
                .map_err(|_| FeedError::InvalidAccountNumber(s.to_string()))?;
            if actual != expected {
                return Err(FeedError::InvalidChecksum {
                    account,
                    expected,
                    actual,
                });
            }
        }
        Ok(Self {
            account,
            checksum: expected,
        })
    }
}

impl fmt::Display for AccountNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.account, self.checksum)
    }
}

impl Serialize for AccountNumber {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for AccountNumber {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct AccountVisitor;

        impl<'de> Visitor<'de> for AccountVisitor {
            type Value = AccountNumber;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an account number or a \"<number>-<checksum>\" string")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                Ok(AccountNumber::new(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                u64::try_from(v)
                    .map(AccountNumber::new)
                    .map_err(|_| E::custom(format!("negative account number {v}")))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_any(AccountVisitor)
    }
}

// ─── Currency ─────────────────────────────────────────────────────────────────

/// A PASC amount stored as an integer count of molinas (1 PASC = 10 000 molinas).
///
/// Serialized as a decimal PASC number so that numeric filters work on it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Currency(i64);

impl Currency {
    pub const MOLINAS_PER_PASC: i64 = 10_000;

    pub fn from_molinas(molinas: i64) -> Self {
        Self(molinas)
    }

    pub fn from_pasc(pasc: f64) -> Self {
        Self((pasc * Self::MOLINAS_PER_PASC as f64).round() as i64)
    }

    pub fn molinas(&self) -> i64 {
        self.0
    }

    pub fn as_pasc(&self) -> f64 {
        self.0 as f64 / Self::MOLINAS_PER_PASC as f64
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}", self.as_pasc())
    }
}

impl Serialize for Currency {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_pasc())
    }
}

impl<'de> Deserialize<'de> for Currency {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct CurrencyVisitor;

        impl<'de> Visitor<'de> for CurrencyVisitor {
            type Value = Currency;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a PASC amount")
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
                Ok(Currency::from_pasc(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                Ok(Currency::from_pasc(v as f64))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                Ok(Currency::from_pasc(v as f64))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                v.trim()
                    .parse::<f64>()
                    .map(Currency::from_pasc)
                    .map_err(|_| E::custom(format!("invalid PASC amount {v:?}")))
            }
        }

        deserializer.deserialize_any(CurrencyVisitor)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_number_with_valid_checksum() {
        let n: AccountNumber = "12345-54".parse().unwrap();
        assert_eq!(n.account(), 12345);
        assert_eq!(n.checksum(), 54);
    }

    #[test]
    fn account_number_rejects_bad_checksum() {
        let err = "12345-1".parse::<AccountNumber>().unwrap_err();
        assert!(matches!(
            err,
            FeedError::InvalidChecksum {
                account: 12345,
                expected: 54,
                actual: 1
            }
        ));
    }

    #[test]
    fn account_number_without_checksum_computes_it() {
        let n: AccountNumber = "12345".parse().unwrap();
        assert_eq!(n.checksum(), 54);
        assert_eq!(n.to_string(), "12345-54");
    }

    #[test]
    fn account_number_rejects_garbage() {
        assert!("abc".parse::<AccountNumber>().is_err());
        assert!("12-xy".parse::<AccountNumber>().is_err());
    }

    #[test]
    fn account_number_serde_accepts_number_and_string() {
        let a: AccountNumber = serde_json::from_str("440065").unwrap();
        let b: AccountNumber = serde_json::from_str("\"440065-64\"").unwrap();
        assert_eq!(a, b);
        assert_eq!(serde_json::to_string(&a).unwrap(), "\"440065-64\"");
    }

    #[test]
    fn currency_rounds_to_molinas() {
        let c: Currency = serde_json::from_str("10.0001").unwrap();
        assert_eq!(c.molinas(), 100_001);
        assert_eq!(c.to_string(), "10.0001");
        assert_eq!(serde_json::to_value(c).unwrap(), serde_json::json!(10.0001));
    }
}
