//! Money, percentage and exchange-rate value objects.
//!
//! Amounts are `rust_decimal::Decimal` in the currency's major unit. The base
//! currency (BRL) is what catalog prices and freight are quoted in; the
//! settlement currency (USD) is what the client pays. Conversion always divides
//! a base amount by a rate expressed as "base units per settlement unit".
//!
//! An invoice carries two rates at once (the reference rate and the risk rate),
//! and they are distinct types so a conversion always names which one it uses.

use core::fmt;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::value_object::ValueObject;

/// Minor-unit precision of both currencies (cents).
pub const MONEY_SCALE: u32 = 2;

/// Round an amount to minor-unit precision, midpoint away from zero.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// A non-negative percentage, stored as "percent" (10 means 10%).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Percentage(Decimal);

impl Percentage {
    pub const ZERO: Percentage = Percentage(Decimal::ZERO);

    pub fn new(percent: Decimal) -> DomainResult<Self> {
        if percent.is_sign_negative() && !percent.is_zero() {
            return Err(DomainError::validation(format!(
                "percentage must not be negative (got {percent})"
            )));
        }
        Ok(Self(percent))
    }

    pub fn percent(self) -> Decimal {
        self.0
    }

    /// The fraction this percentage represents (10% → 0.10).
    pub fn fraction(self) -> Decimal {
        self.0 / Decimal::ONE_HUNDRED
    }

    /// Multiplier that adds this percentage on top of an amount (10% → 1.10).
    pub fn markup_factor(self) -> Decimal {
        Decimal::ONE + self.fraction()
    }
}

impl TryFrom<Decimal> for Percentage {
    type Error = DomainError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Percentage> for Decimal {
    fn from(value: Percentage) -> Self {
        value.0
    }
}

impl fmt::Display for Percentage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

impl ValueObject for Percentage {}

/// Which of an invoice's two rates a conversion used.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateKind {
    Reference,
    Risk,
}

impl fmt::Display for RateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateKind::Reference => f.write_str("reference"),
            RateKind::Risk => f.write_str("risk"),
        }
    }
}

/// A base→settlement exchange rate.
pub trait ConversionRate: Copy + fmt::Debug {
    const KIND: RateKind;

    /// Base-currency units per one settlement-currency unit.
    fn base_per_settlement(&self) -> Decimal;

    /// Convert a base-currency amount into the settlement currency (unrounded).
    fn to_settlement(&self, base_amount: Decimal) -> DomainResult<Decimal> {
        base_amount
            .checked_div(self.base_per_settlement())
            .ok_or_else(|| {
                DomainError::consistency(format!(
                    "{} conversion of {base_amount} overflowed",
                    Self::KIND
                ))
            })
    }
}

fn positive_rate(kind: RateKind, value: Decimal) -> DomainResult<Decimal> {
    if value <= Decimal::ZERO {
        return Err(DomainError::validation(format!(
            "{kind} exchange rate must be positive (got {value})"
        )));
    }
    Ok(value)
}

/// The market reference rate captured when the invoice is created.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct ReferenceRate(Decimal);

impl ReferenceRate {
    pub fn new(value: Decimal) -> DomainResult<Self> {
        positive_rate(RateKind::Reference, value).map(Self)
    }

    pub fn value(self) -> Decimal {
        self.0
    }
}

impl ConversionRate for ReferenceRate {
    const KIND: RateKind = RateKind::Reference;

    fn base_per_settlement(&self) -> Decimal {
        self.0
    }
}

/// The conservative rate used to quote a worst-case settlement total.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct RiskRate(Decimal);

impl RiskRate {
    pub fn new(value: Decimal) -> DomainResult<Self> {
        positive_rate(RateKind::Risk, value).map(Self)
    }

    pub fn value(self) -> Decimal {
        self.0
    }
}

impl ConversionRate for RiskRate {
    const KIND: RateKind = RateKind::Risk;

    fn base_per_settlement(&self) -> Decimal {
        self.0
    }
}

macro_rules! impl_rate_conversions {
    ($t:ty) => {
        impl TryFrom<Decimal> for $t {
            type Error = DomainError;

            fn try_from(value: Decimal) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$t> for Decimal {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl fmt::Display for $t {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl ValueObject for $t {}
    };
}

impl_rate_conversions!(ReferenceRate);
impl_rate_conversions!(RiskRate);
