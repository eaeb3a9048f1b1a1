//! Fixed-point quantities and money.
//!
//! Both types store an integer number of hundredths. Everything that sums,
//! compares or splits amounts works on those integers, so a distribution that
//! is supposed to add up to the purchased quantity adds up exactly.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{self, Display};
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use thiserror::Error;

const SCALE: i64 = 100;

/// Why a decimal input could not become a fixed-point amount.
#[derive(Debug, Clone, Copy, Error, PartialEq)]
pub enum AmountError {
    #[error("value is not a finite number")]
    NotFinite,
    #[error("{0} has more than two decimal places")]
    TooManyDecimals(f64),
    #[error("{0} is out of range")]
    OutOfRange(f64),
}

fn hundredths_from_f64(value: f64) -> Result<i64, AmountError> {
    if !value.is_finite() {
        return Err(AmountError::NotFinite);
    }
    let scaled = value * SCALE as f64;
    if scaled.abs() > i64::MAX as f64 / 2.0 {
        return Err(AmountError::OutOfRange(value));
    }
    let rounded = scaled.round();
    // 1.15 * 100 lands at 114.99999999999999
    if (scaled - rounded).abs() > 1e-6 {
        return Err(AmountError::TooManyDecimals(value));
    }
    Ok(rounded as i64)
}

/// `numerator / denominator` rounded half away from zero.
fn div_round(numerator: i128, denominator: i128) -> i128 {
    debug_assert!(denominator != 0);
    let (numerator, denominator) = if denominator < 0 {
        (-numerator, -denominator)
    } else {
        (numerator, denominator)
    };
    if numerator >= 0 {
        (2 * numerator + denominator) / (2 * denominator)
    } else {
        -((-2 * numerator + denominator) / (2 * denominator))
    }
}

fn fmt_hundredths(value: i64, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let sign = if value < 0 { "-" } else { "" };
    let abs = value.unsigned_abs();
    write!(f, "{sign}{}.{:02}", abs / SCALE as u64, abs % SCALE as u64)
}

/// A product quantity with two decimal places (e.g. 2.5 kg).
///
/// Signed so that deltas (shortages, surpluses) use the same type; bids
/// themselves are validated to be non-negative.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Quantity(i64);

impl Quantity {
    pub const ZERO: Quantity = Quantity(0);

    pub const fn from_hundredths(hundredths: i64) -> Self {
        Self(hundredths)
    }

    /// Whole units, for literals in code and tests.
    pub const fn units(units: i64) -> Self {
        Self(units * SCALE)
    }

    /// Converts a decimal input, rejecting anything finer than 0.01.
    pub fn from_f64(value: f64) -> Result<Self, AmountError> {
        hundredths_from_f64(value).map(Self)
    }

    pub const fn hundredths(self) -> i64 {
        self.0
    }

    pub fn as_f64(self) -> f64 {
        self.0 as f64 / SCALE as f64
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn abs(self) -> Self {
        Self(self.0.abs())
    }

    /// `self * numerator / denominator`, rounded to two decimals.
    ///
    /// Used for proportional splits where the ratio itself is a quotient of two
    /// quantities; the division happens last so no precision is lost.
    pub fn scale(self, numerator: Quantity, denominator: Quantity) -> Quantity {
        if denominator.is_zero() {
            return Quantity::ZERO;
        }
        let value = div_round(
            self.0 as i128 * numerator.0 as i128,
            denominator.0 as i128,
        );
        Quantity(value as i64)
    }
}

impl Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_hundredths(self.0, f)
    }
}

impl Add for Quantity {
    type Output = Quantity;
    fn add(self, rhs: Quantity) -> Quantity {
        Quantity(self.0 + rhs.0)
    }
}

impl Sub for Quantity {
    type Output = Quantity;
    fn sub(self, rhs: Quantity) -> Quantity {
        Quantity(self.0 - rhs.0)
    }
}

impl AddAssign for Quantity {
    fn add_assign(&mut self, rhs: Quantity) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Quantity {
    fn sub_assign(&mut self, rhs: Quantity) {
        self.0 -= rhs.0;
    }
}

impl Neg for Quantity {
    type Output = Quantity;
    fn neg(self) -> Quantity {
        Quantity(-self.0)
    }
}

impl Sum for Quantity {
    fn sum<I: Iterator<Item = Quantity>>(iter: I) -> Quantity {
        iter.fold(Quantity::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a Quantity> for Quantity {
    fn sum<I: Iterator<Item = &'a Quantity>>(iter: I) -> Quantity {
        iter.copied().sum()
    }
}

impl Serialize for Quantity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_f64())
    }
}

impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = f64::deserialize(deserializer)?;
        Quantity::from_f64(value).map_err(serde::de::Error::custom)
    }
}

/// An amount of money in cents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    pub fn from_f64(value: f64) -> Result<Self, AmountError> {
        hundredths_from_f64(value).map(Self)
    }

    pub const fn cents(self) -> i64 {
        self.0
    }

    pub fn as_f64(self) -> f64 {
        self.0 as f64 / SCALE as f64
    }

    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Price of `quantity` units at `self` per unit, rounded to the cent.
    pub fn times(self, quantity: Quantity) -> Result<Money, AmountError> {
        let cents = div_round(self.0 as i128 * quantity.0 as i128, SCALE as i128);
        i64::try_from(cents)
            .map(Money)
            .map_err(|_| AmountError::OutOfRange(self.as_f64() * quantity.as_f64()))
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_hundredths(self.0, f)
    }
}

impl Add for Money {
    type Output = Money;
    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, Add::add)
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_f64())
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = f64::deserialize(deserializer)?;
        Money::from_f64(value).map_err(serde::de::Error::custom)
    }
}
