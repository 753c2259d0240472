//! Fixed-point money and token amounts.
//!
//! Every price, valuation and payment value is an unsigned integer count of
//! 10⁻¹⁸ units, the same scale as the token's wei. Amounts are parsed from
//! and rendered as decimal strings; floating point never enters the path.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{Error, Result};

/// Number of fractional decimal digits.
pub const DECIMALS: u32 = 18;

const SCALE: u128 = 10u128.pow(DECIMALS);

/// An 18-decimal fixed-point amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(u128);

impl Amount {
  pub const ZERO: Self = Self(0);

  /// Wrap a raw count of 10⁻¹⁸ units (i.e. wei).
  pub const fn from_raw(raw: u128) -> Self { Self(raw) }

  /// The raw count of 10⁻¹⁸ units.
  pub const fn raw(self) -> u128 { self.0 }

  pub fn from_whole(units: u64) -> Self { Self(u128::from(units) * SCALE) }

  pub fn is_zero(self) -> bool { self.0 == 0 }

  /// Price of `quantity` items at `self` each.
  pub fn checked_mul_quantity(self, quantity: u64) -> Option<Self> {
    self.0.checked_mul(u128::from(quantity)).map(Self)
  }
}

impl FromStr for Amount {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    let invalid = |why| Error::InvalidAmount(s.to_owned(), why);
    let (whole, frac) = match s.split_once('.') {
      Some((w, f)) => (w, f),
      None => (s, ""),
    };

    if whole.is_empty() {
      return Err(invalid("missing integer part"));
    }
    if !whole.bytes().all(|b| b.is_ascii_digit())
      || !frac.bytes().all(|b| b.is_ascii_digit())
    {
      return Err(invalid("expected a plain decimal number"));
    }
    if s.contains('.') && frac.is_empty() {
      return Err(invalid("missing fractional digits"));
    }
    if frac.len() > DECIMALS as usize {
      return Err(invalid("more than 18 fractional digits"));
    }

    let whole: u128 = whole.parse().map_err(|_| invalid("out of range"))?;
    let frac_raw: u128 = if frac.is_empty() {
      0
    } else {
      let digits: u128 = frac.parse().map_err(|_| invalid("out of range"))?;
      digits * 10u128.pow(DECIMALS - frac.len() as u32)
    };

    whole
      .checked_mul(SCALE)
      .and_then(|w| w.checked_add(frac_raw))
      .map(Self)
      .ok_or_else(|| invalid("out of range"))
  }
}

impl fmt::Display for Amount {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let whole = self.0 / SCALE;
    let frac = self.0 % SCALE;
    if frac == 0 {
      return write!(f, "{whole}");
    }
    let digits = format!("{frac:018}");
    write!(f, "{whole}.{}", digits.trim_end_matches('0'))
  }
}

impl Serialize for Amount {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(self)
  }
}

impl<'de> Deserialize<'de> for Amount {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    // Integers are accepted as whole units; floats are refused outright.
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
      Text(String),
      Whole(u64),
    }

    match Repr::deserialize(deserializer)? {
      Repr::Text(s) => s.parse().map_err(serde::de::Error::custom),
      Repr::Whole(n) => Ok(Self::from_whole(n)),
    }
  }
}
