//! On-chain identifiers: account addresses and transaction hashes.
//!
//! Both are stored and compared in lowercase `0x`-prefixed hex so that the
//! same account typed with different casing resolves to the same wallet.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

fn parse_hex(s: &str, bytes: usize) -> Option<String> {
  let body = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X"))?;
  if body.len() != bytes * 2 {
    return None;
  }
  hex::decode(body).ok()?;
  Some(format!("0x{}", body.to_ascii_lowercase()))
}

// ─── Address ─────────────────────────────────────────────────────────────────

/// A 20-byte account address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
  pub fn as_str(&self) -> &str { &self.0 }
}

impl FromStr for Address {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    parse_hex(s.trim(), 20)
      .map(Self)
      .ok_or_else(|| Error::InvalidAddress(s.to_owned()))
  }
}

impl TryFrom<String> for Address {
  type Error = Error;

  fn try_from(s: String) -> Result<Self> { s.parse() }
}

impl From<Address> for String {
  fn from(a: Address) -> Self { a.0 }
}

impl fmt::Display for Address {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

// ─── TxHash ──────────────────────────────────────────────────────────────────

/// A 32-byte transaction hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TxHash(String);

impl TxHash {
  pub fn from_bytes(bytes: [u8; 32]) -> Self {
    Self(format!("0x{}", hex::encode(bytes)))
  }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl FromStr for TxHash {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    parse_hex(s.trim(), 32)
      .map(Self)
      .ok_or_else(|| Error::InvalidTxHash(s.to_owned()))
  }
}

impl TryFrom<String> for TxHash {
  type Error = Error;

  fn try_from(s: String) -> Result<Self> { s.parse() }
}

impl From<TxHash> for String {
  fn from(h: TxHash) -> Self { h.0 }
}

impl fmt::Display for TxHash {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn address_is_normalised_to_lowercase() {
    let a: Address = "0xABCDEF0123456789abcdef0123456789ABCDEF01".parse().unwrap();
    assert_eq!(a.as_str(), "0xabcdef0123456789abcdef0123456789abcdef01");
  }

  #[test]
  fn address_rejects_wrong_length_and_non_hex() {
    assert!("0x1234".parse::<Address>().is_err());
    assert!("abcdef0123456789abcdef0123456789abcdef01".parse::<Address>().is_err());
    assert!("0xzzcdef0123456789abcdef0123456789abcdef01".parse::<Address>().is_err());
  }

  #[test]
  fn tx_hash_from_bytes() {
    let h = TxHash::from_bytes([0xab; 32]);
    assert_eq!(h.as_str().len(), 66);
    assert_eq!(h.as_str().parse::<TxHash>().unwrap(), h);
  }
}
