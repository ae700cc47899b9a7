use crate::error::GatewayError;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Sub};

/// Largest amount accepted from a request. Keeps installment math well inside `Decimal` range.
pub const MAX_AMOUNT: i64 = 1_000_000_000_000_000;

/// Rejects negative amounts and amounts above [`MAX_AMOUNT`] for the field `name`.
pub fn validate_amount(name: &str, value: Decimal) -> Result<Decimal, GatewayError> {
    if value < Decimal::ZERO {
        return Err(GatewayError::ValidationError(format!(
            "{name} must not be negative, got {value}"
        )));
    }
    if value > Decimal::from(MAX_AMOUNT) {
        return Err(GatewayError::ValidationError(format!(
            "{name} exceeds the largest accepted amount of {MAX_AMOUNT}"
        )));
    }
    Ok(value)
}

/// Rounds a monetary value to cents, half-up.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// A monetary value always held at two decimal places.
///
/// Every constructor rounds half-up to the cent so that figures reported to the counterparty
/// and figures stored on a loan mapping can never drift apart by sub-cent residue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn new(value: Decimal) -> Self {
        Self(round_money(value))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// Clamps negative values to zero.
    pub fn non_negative(self) -> Self {
        if self.0 < Decimal::ZERO { Self::ZERO } else { self }
    }
}

impl From<Decimal> for Money {
    fn from(value: Decimal) -> Self {
        Self::new(value)
    }
}

impl From<Money> for Decimal {
    fn from(money: Money) -> Self {
        money.0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl Add for Money {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Money {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Mul<Decimal> for Money {
    type Output = Self;
    fn mul(self, rhs: Decimal) -> Self::Output {
        Self::new(self.0 * rhs)
    }
}

/// A strictly positive amount taken from an inbound request.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Amount(Money);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, GatewayError> {
        Self::named("Amount", value)
    }

    /// Like [`Self::new`], naming the offending field in the error.
    pub fn named(name: &str, value: Decimal) -> Result<Self, GatewayError> {
        let value = validate_amount(name, value)?;
        if value > Decimal::ZERO {
            Ok(Self(Money::new(value)))
        } else {
            Err(GatewayError::ValidationError(format!(
                "{name} must be positive"
            )))
        }
    }

    pub fn money(&self) -> Money {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = GatewayError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Money {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}
