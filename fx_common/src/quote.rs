//! Quote payload and price precision helpers.
//!
//! A `Quote` is the record pushed to every subscriber. Its field names and the
//! 4-digit decimal precision of `bid` and `ask` are part of the wire contract, so
//! prices are serialized as JSON numbers that keep their trailing zeros
//! (`1.1000`, not `1.1`).

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::Result;

/// Number of fractional digits carried by every published price.
pub const PRICE_SCALE: u32 = 4;

/// Round a price to [`PRICE_SCALE`] digits, half-up.
///
/// Prices are positive, so "away from zero" on the midpoint is half-up.
pub fn round_price(value: Decimal) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(PRICE_SCALE, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(PRICE_SCALE);
    rounded
}

/// Two-way FX quote for a single instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    /// Bid price, 4 fractional digits.
    #[serde(with = "fixed_scale")]
    pub bid: Decimal,
    /// Ask price, 4 fractional digits. Always above `bid`.
    #[serde(with = "fixed_scale")]
    pub ask: Decimal,
    /// Instrument symbol, e.g. `EURUSD`.
    pub symbol: String,
    /// Generation time.
    pub timestamp: DateTime<Utc>,
}

impl Quote {
    /// Build a quote stamped with the current time. Prices are rounded to
    /// [`PRICE_SCALE`] digits.
    pub fn new(symbol: impl Into<String>, bid: Decimal, ask: Decimal) -> Self {
        Self {
            bid: round_price(bid),
            ask: round_price(ask),
            symbol: symbol.into(),
            timestamp: Utc::now(),
        }
    }

    /// Distance between ask and bid.
    pub fn spread(&self) -> Decimal {
        self.ask - self.bid
    }

    /// Encode the quote to JSON bytes.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode a quote from JSON bytes.
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Prices as JSON numbers carrying exactly [`PRICE_SCALE`] fractional digits.
mod fixed_scale {
    use rust_decimal::Decimal;
    use serde::de::Deserializer;
    use serde::ser::{Error, Serializer};
    use serde::{Deserialize, Serialize};
    use serde_json::value::RawValue;

    use super::round_price;

    pub fn serialize<S: Serializer>(value: &Decimal, serializer: S) -> Result<S::Ok, S::Error> {
        let raw = RawValue::from_string(round_price(*value).to_string()).map_err(S::Error::custom)?;
        raw.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Decimal, D::Error> {
        <Decimal as Deserialize>::deserialize(deserializer).map(round_price)
    }
}
