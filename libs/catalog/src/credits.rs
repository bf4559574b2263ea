use std::fmt;
use std::ops::{Add, Neg, Sub};
use std::str::FromStr;

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Number of fractional digits every amount is rounded to.
pub const CREDIT_SCALE: u32 = 10;

/// Fixed-point currency amount.
///
/// Amounts are rounded to [`CREDIT_SCALE`] fractional digits on construction,
/// so arithmetic between two `Credits` never accumulates binary floating-point
/// drift. Persistence uses [`Credits::to_units`], an integer count of
/// `10^-CREDIT_SCALE` units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Credits(Decimal);

impl Credits {
    pub const ZERO: Credits = Credits(Decimal::ZERO);

    pub fn new(value: Decimal) -> Self {
        Self(value.round_dp_with_strategy(CREDIT_SCALE, RoundingStrategy::MidpointAwayFromZero))
    }

    pub fn from_f64(value: f64) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        Decimal::from_f64(value).map(Self::new)
    }

    pub fn from_units(units: i64) -> Self {
        Self(Decimal::new(units, CREDIT_SCALE))
    }

    /// Integer representation used by storage backends.
    pub fn to_units(self) -> Option<i64> {
        let mut scaled = self.0;
        scaled.rescale(CREDIT_SCALE);
        i64::try_from(scaled.mantissa()).ok()
    }

    pub fn as_decimal(self) -> Decimal {
        self.0
    }

    pub fn to_f64(self) -> f64 {
        self.0.to_f64().unwrap_or_default()
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    pub fn checked_add(self, other: Credits) -> Option<Credits> {
        self.0.checked_add(other.0).map(Self::new)
    }

    pub fn checked_sub(self, other: Credits) -> Option<Credits> {
        self.0.checked_sub(other.0).map(Self::new)
    }
}

impl Add for Credits {
    type Output = Credits;

    fn add(self, rhs: Credits) -> Credits {
        Credits::new(self.0 + rhs.0)
    }
}

impl Sub for Credits {
    type Output = Credits;

    fn sub(self, rhs: Credits) -> Credits {
        Credits::new(self.0 - rhs.0)
    }
}

impl Neg for Credits {
    type Output = Credits;

    fn neg(self) -> Credits {
        Credits(-self.0)
    }
}

impl From<Decimal> for Credits {
    fn from(value: Decimal) -> Self {
        Credits::new(value)
    }
}

impl fmt::Display for Credits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

impl FromStr for Credits {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Decimal::from_str(s.trim()).map(Credits::new)
    }
}

impl Serialize for Credits {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.to_f64())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawAmount {
    Int(i64),
    Float(f64),
    Text(String),
}

impl<'de> Deserialize<'de> for Credits {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match RawAmount::deserialize(deserializer)? {
            RawAmount::Int(value) => Ok(Credits::new(Decimal::from(value))),
            RawAmount::Float(value) => Credits::from_f64(value)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid amount {value}"))),
            RawAmount::Text(value) => value
                .parse()
                .map_err(|err| serde::de::Error::custom(format!("invalid amount {value}: {err}"))),
        }
    }
}
