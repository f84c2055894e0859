//! Entry - one feedback record plus the identifiers it is keyed by

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Wallet address as reported by the provider or the contract.
///
/// Opaque, but lowercased on construction so the provider's checksummed form and
/// the event's raw form compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Account(String);

impl Account {
    pub fn new(address: impl AsRef<str>) -> Self {
        Self(address.as_ref().trim().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short `0x1234...abcd` form for display.
    pub fn short(&self) -> String {
        format_address(&self.0)
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Account {
    fn from(s: &str) -> Self {
        Account::new(s)
    }
}

/// EIP-155 chain id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainId(pub u64);

impl ChainId {
    /// Parse `0x`-prefixed hex (as providers report it) or plain decimal.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
            Some(hex) => u64::from_str_radix(hex, 16).ok().map(ChainId),
            None => value.parse().ok().map(ChainId),
        }
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Pending transaction reference (hash).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxRef(pub String);

impl fmt::Display for TxRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One feedback record. Equality and hashing cover the whole record, which is the dedup key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub author: Account,
    pub message: String,
    pub observed_at: DateTime<Utc>,
}

impl Entry {
    pub fn new(author: Account, message: impl Into<String>, observed_at: DateTime<Utc>) -> Self {
        Self { author, message: message.into(), observed_at }
    }

    /// Build from the contract's `(address, string, uint256 seconds)` triple.
    pub fn from_chain(author: Account, message: impl Into<String>, seconds: u64) -> Option<Self> {
        let millis = i64::try_from(seconds).ok()?.checked_mul(1000)?;
        let observed_at = DateTime::from_timestamp_millis(millis)?;
        Some(Self::new(author, message, observed_at))
    }

    pub fn key(&self) -> (&Account, &str, DateTime<Utc>) {
        (&self.author, &self.message, self.observed_at)
    }
}

/// `0xABCDEF1234...` -> `0xABCD...1234`. Short inputs are returned unchanged.
pub fn format_address(address: &str) -> String {
    let chars: Vec<char> = address.chars().collect();
    if chars.len() <= 10 {
        return address.to_string();
    }
    let head: String = chars[..6].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}
