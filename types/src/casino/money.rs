use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error as ThisError;

const CENTS_PER_UNIT: u64 = 100;

#[derive(Debug, ThisError, Clone, PartialEq, Eq)]
pub enum MoneyError {
    #[error("amount is empty")]
    Empty,
    #[error("amount is negative")]
    Negative,
    #[error("amount is not numeric: {0}")]
    NotNumeric(String),
    #[error("amount has more than two decimal places")]
    TooPrecise,
    #[error("amount overflows")]
    Overflow,
}

/// Monetary amount with two decimal places, stored as whole cents.
///
/// Balances never go through floating point: every operation is checked integer arithmetic on
/// cents and a negative amount is unrepresentable.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money(u64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    pub const fn from_units(units: u64) -> Self {
        Self(units * CENTS_PER_UNIT)
    }

    /// Whole units to cents, or `None` when the amount does not fit.
    pub const fn checked_from_units(units: u64) -> Option<Self> {
        match units.checked_mul(CENTS_PER_UNIT) {
            Some(cents) => Some(Self(cents)),
            None => None,
        }
    }

    pub const fn cents(self) -> u64 {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    pub fn checked_sub(self, other: Money) -> Option<Money> {
        self.0.checked_sub(other.0).map(Money)
    }

    pub fn checked_mul(self, factor: u64) -> Option<Money> {
        self.0.checked_mul(factor).map(Money)
    }

    pub fn saturating_sub(self, other: Money) -> Money {
        Money(self.0.saturating_sub(other.0))
    }

    /// Share of this amount in basis points, rounded down to the cent. Shares above 100% are
    /// capped at the whole amount.
    pub fn bps(self, bps: u16) -> Money {
        let bps = u128::from(bps.min(10_000));
        let cents = u128::from(self.0) * bps / 10_000;
        // cents <= self.0 once bps is capped.
        Money(u64::try_from(cents).unwrap_or(self.0))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / CENTS_PER_UNIT, self.0 % CENTS_PER_UNIT)
    }
}

impl FromStr for Money {
    type Err = MoneyError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(MoneyError::Empty);
        }
        if raw.starts_with('-') {
            return Err(MoneyError::Negative);
        }
        let (whole, fraction) = match raw.split_once('.') {
            Some((whole, fraction)) => (whole, fraction),
            None => (raw, ""),
        };
        let is_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
        if whole.is_empty() || !is_digits(whole) || !is_digits(fraction) {
            return Err(MoneyError::NotNumeric(raw.to_string()));
        }
        if raw.contains('.') && fraction.is_empty() {
            return Err(MoneyError::NotNumeric(raw.to_string()));
        }
        if fraction.len() > 2 {
            return Err(MoneyError::TooPrecise);
        }

        let units = whole
            .parse::<u64>()
            .map_err(|_| MoneyError::Overflow)?;
        let mut cents = 0u64;
        for (idx, digit) in fraction.bytes().enumerate() {
            let scale = if idx == 0 { 10 } else { 1 };
            cents += u64::from(digit - b'0') * scale;
        }
        units
            .checked_mul(CENTS_PER_UNIT)
            .and_then(|value| value.checked_add(cents))
            .map(Money)
            .ok_or(MoneyError::Overflow)
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

struct MoneyVisitor;

impl<'de> de::Visitor<'de> for MoneyVisitor {
    type Value = Money;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a non-negative amount with at most two decimal places")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Money, E> {
        v.parse().map_err(E::custom)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Money, E> {
        v.checked_mul(CENTS_PER_UNIT)
            .map(Money)
            .ok_or_else(|| E::custom(MoneyError::Overflow))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Money, E> {
        if v < 0 {
            return Err(E::custom(MoneyError::Negative));
        }
        self.visit_u64(v as u64)
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Money, E> {
        if !v.is_finite() {
            return Err(E::custom(MoneyError::NotNumeric(v.to_string())));
        }
        // Display yields the shortest round-trip representation, so 0.1 parses as "0.1".
        self.visit_str(&v.to_string())
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(MoneyVisitor)
    }
}
