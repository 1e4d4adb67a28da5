//! Money and currency value objects.
//!
//! Amounts are stored as integer counts of the currency's minor unit (cents for
//! USD, yen for JPY). All ledger arithmetic is exact integer arithmetic; only
//! proportional splitting goes through `Decimal` before a single rounding step.

use core::iter::Sum;
use core::ops::{Add, AddAssign, Neg, Sub, SubAssign};

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::value_object::ValueObject;

/// Largest minor-unit exponent we accept (e.g. 3 for BHD/KWD).
const MAX_EXPONENT: u32 = 4;

/// ISO-4217 style currency with its minor-unit exponent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Currency {
    code: String,
    exponent: u32,
}

impl Currency {
    pub fn new(code: impl Into<String>, exponent: u32) -> DomainResult<Self> {
        let code = code.into();
        if code.len() != 3 || !code.bytes().all(|b| b.is_ascii_uppercase()) {
            return Err(DomainError::validation(format!(
                "currency code must be three uppercase letters, got '{code}'"
            )));
        }
        if exponent > MAX_EXPONENT {
            return Err(DomainError::validation(format!(
                "currency exponent {exponent} exceeds {MAX_EXPONENT}"
            )));
        }
        Ok(Self { code, exponent })
    }

    /// Currency from an ISO code, with the exponent looked up from a small table
    /// (defaults to 2 decimal places).
    pub fn iso(code: &str) -> DomainResult<Self> {
        let upper = code.trim().to_ascii_uppercase();
        let exponent = match upper.as_str() {
            "JPY" | "KRW" | "VND" | "CLP" | "ISK" | "HUF" => 0,
            "BHD" | "KWD" | "OMR" | "JOD" | "TND" => 3,
            _ => 2,
        };
        Self::new(upper, exponent)
    }

    pub fn usd() -> Self {
        Self {
            code: "USD".to_string(),
            exponent: 2,
        }
    }

    pub fn eur() -> Self {
        Self {
            code: "EUR".to_string(),
            exponent: 2,
        }
    }

    pub fn jpy() -> Self {
        Self {
            code: "JPY".to_string(),
            exponent: 0,
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    /// Number of decimal places of the minor unit.
    pub fn exponent(&self) -> u32 {
        self.exponent
    }
}

impl core::fmt::Display for Currency {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.code)
    }
}

impl ValueObject for Currency {}

/// Signed amount in minor units of some currency.
///
/// The currency is carried next to the amount (on the expense, the ledger, ...)
/// rather than inside it, so balances stay `Copy`.
#[derive(
    Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    /// One minor unit (0.01 for two-decimal currencies).
    pub const MINOR_UNIT: Money = Money(1);

    pub const fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    /// Convert a major-unit decimal (e.g. `20.05`) into minor units.
    ///
    /// Fails when the value has more decimal places than the currency allows.
    pub fn from_decimal(value: Decimal, currency: &Currency) -> DomainResult<Self> {
        let factor = Decimal::from(10_i64.pow(currency.exponent()));
        let minor = value
            .checked_mul(factor)
            .ok_or_else(|| DomainError::validation(format!("amount {value} is out of range")))?;
        if !minor.fract().is_zero() {
            return Err(DomainError::validation(format!(
                "amount {value} has more than {} decimal places for {currency}",
                currency.exponent()
            )));
        }
        minor
            .to_i64()
            .map(Self)
            .ok_or_else(|| DomainError::validation(format!("amount {value} is out of range")))
    }

    /// Major-unit decimal view of this amount (e.g. `2005` cents → `20.05`).
    pub fn to_decimal(self, currency: &Currency) -> Decimal {
        Decimal::new(self.0, currency.exponent())
    }

    pub fn minor(self) -> i64 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn abs(self) -> Self {
        Self(self.0.abs())
    }

    pub fn signum(self) -> i64 {
        self.0.signum()
    }

    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }

    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        self.0.checked_sub(rhs.0).map(Self)
    }

    /// Whether `|self| <= tolerance`.
    pub fn within(self, tolerance: Money) -> bool {
        self.0.unsigned_abs() <= tolerance.0.unsigned_abs()
    }
}

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ValueObject for Money {}

impl Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl Neg for Money {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self(-self.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Money::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.copied().sum()
    }
}
