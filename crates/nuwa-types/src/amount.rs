//! Amount types for payment accounting.
//!
//! Asset amounts are 256-bit unsigned integers in the asset's base unit,
//! serialized as decimal strings to stay compatible with JSON clients that
//! cannot represent them natively. USD costs are tracked in pico-USD
//! (10^-12 USD) as 128-bit integers.

use alloy_primitives::U256;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{self, Display};
use std::ops::Add;
use std::str::FromStr;

/// An asset amount in base units, wire-encoded as a decimal string.
///
/// For example, `U256` value `1000000` serializes as `"1000000"`, never as
/// hex. Deserialization rejects negative values, hex strings, and anything
/// that does not parse as an unsigned decimal integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(pub U256);

impl Amount {
    pub const ZERO: Amount = Amount(U256::ZERO);

    pub fn from_u64(value: u64) -> Self {
        Amount(U256::from(value))
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Saturating addition; channel accumulators never wrap.
    pub fn saturating_add(self, rhs: Amount) -> Amount {
        Amount(self.0.saturating_add(rhs.0))
    }
}

impl Add for Amount {
    type Output = Amount;

    fn add(self, rhs: Amount) -> Amount {
        Amount(self.0 + rhs.0)
    }
}

impl From<U256> for Amount {
    fn from(value: U256) -> Self {
        Amount(value)
    }
}

impl From<Amount> for U256 {
    fn from(value: Amount) -> Self {
        value.0
    }
}

impl Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid amount: {0}")]
pub struct AmountParseError(String);

impl FromStr for Amount {
    type Err = AmountParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(AmountParseError(s.into()));
        }
        let value = U256::from_str_radix(s, 10).map_err(|_| AmountParseError(s.into()))?;
        Ok(Amount(value))
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Amount::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// A USD cost in pico-USD (10^-12 USD).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PicoUsd(pub u128);

impl PicoUsd {
    pub const ZERO: PicoUsd = PicoUsd(0);

    /// 10^12 pico-USD per USD.
    const SCALE: u32 = 12;

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn saturating_add(self, rhs: PicoUsd) -> PicoUsd {
        PicoUsd(self.0.saturating_add(rhs.0))
    }

    pub fn saturating_mul(self, factor: u64) -> PicoUsd {
        PicoUsd(self.0.saturating_mul(factor as u128))
    }

    /// Converts this USD cost to asset base units at `rate` pico-USD per base
    /// unit. Rounds up: a nonzero USD cost never converts to zero units.
    pub fn to_asset_units(self, rate: PicoUsd) -> Option<Amount> {
        if rate.0 == 0 {
            return None;
        }
        let units = self.0.div_ceil(rate.0);
        Some(Amount(U256::from(units)))
    }

    /// Renders the cost as a decimal USD string, e.g. `1_500_000_000_000`
    /// pico-USD becomes `"1.5"`.
    pub fn to_usd_string(self) -> String {
        if self.0 <= i128::MAX as u128 {
            if let Ok(decimal) = Decimal::try_from_i128_with_scale(self.0 as i128, Self::SCALE) {
                return decimal.normalize().to_string();
            }
        }
        // Past Decimal's 96-bit mantissa: render the parts directly.
        let scale = 10u128.pow(Self::SCALE);
        let fraction = format!("{:012}", self.0 % scale);
        let fraction = fraction.trim_end_matches('0');
        if fraction.is_empty() {
            format!("{}", self.0 / scale)
        } else {
            format!("{}.{}", self.0 / scale, fraction)
        }
    }
}

impl Display for PicoUsd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
