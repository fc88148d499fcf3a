//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ WRONG!                           │
//! │                                                                         │
//! │  A 5% commission on $4999.99 computed in floats can drift by a cent    │
//! │  depending on evaluation order. Commission, loan balances and order    │
//! │  totals must agree to the cent across every report.                    │
//! │                                                                         │
//! │  OUR SOLUTION: Integer Cents                                            │
//! │    Every amount is an i64 number of cents. Percentages are basis       │
//! │    points. Rounding happens once, explicitly, half-up.                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Wire Format
//! Money serializes as a fixed-point string with two decimals (`"250.00"`),
//! never as a float. It is stored as INTEGER cents in the database.
//!
//! ## Usage
//! ```rust
//! use emporia_core::money::Money;
//!
//! let unit = Money::from_cents(800); // $8.00
//! let line = unit.multiply_quantity(100);
//! assert_eq!(line.to_decimal_string(), "800.00");
//!
//! let commission = Money::from_cents(500_000).percentage(500); // 5% of $5000
//! assert_eq!(commission, Money::from_cents(25_000));
//! ```

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};
use std::str::FromStr;

use crate::error::ValidationError;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in cents.
///
/// ## Design Decisions
/// - **i64 (signed)**: subtraction never wraps; negative values are rejected
///   at the validation layer, not by the type
/// - **Single field tuple struct**: zero-cost abstraction over i64
/// - **Serde as string**: `"12.34"` on the wire, so no client ever parses
///   money into a float
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(transparent))]
pub struct Money(i64);

impl Money {
    /// Zero dollars.
    pub const ZERO: Money = Money(0);

    /// Creates a Money value from cents (the smallest currency unit).
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a Money value from dollars and cents.
    ///
    /// ```rust
    /// use emporia_core::money::Money;
    ///
    /// assert_eq!(Money::from_major_minor(7, 50).cents(), 750);
    /// ```
    #[inline]
    pub const fn from_major_minor(major: i64, minor: i64) -> Self {
        if major < 0 {
            Money(major * 100 - minor)
        } else {
            Money(major * 100 + minor)
        }
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the whole-dollar portion.
    #[inline]
    pub const fn dollars(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the cents portion (always 0-99).
    #[inline]
    pub const fn cents_part(&self) -> i64 {
        (self.0 % 100).abs()
    }

    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Multiplies a unit price by a quantity.
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }

    /// Returns `bps` basis points of this amount, rounded half-up to the cent.
    ///
    /// ## Rounding
    /// `(cents * bps + 5000) / 10000` in i128. The +5000 is the half-up
    /// nudge (5000/10000 = 0.5 cent). Negative amounts round half away from
    /// zero so that `-x.percentage(b) == -(x.percentage(b))`.
    ///
    /// ```rust
    /// use emporia_core::money::Money;
    ///
    /// // 5% of $4.99 = 24.95 cents → 25 cents
    /// assert_eq!(Money::from_cents(499).percentage(500).cents(), 25);
    /// ```
    pub fn percentage(&self, bps: u32) -> Money {
        let raw = self.0.unsigned_abs() as i128 * bps as i128;
        let rounded = ((raw + 5000) / 10000) as i64;
        if self.0 < 0 {
            Money(-rounded)
        } else {
            Money(rounded)
        }
    }

    /// Applies a percentage discount and returns the discounted amount.
    ///
    /// ```rust
    /// use emporia_core::money::Money;
    ///
    /// let price = Money::from_cents(1000);
    /// assert_eq!(price.apply_percentage_discount(1000).cents(), 900); // 10% off
    /// ```
    pub fn apply_percentage_discount(&self, discount_bps: u32) -> Money {
        *self - self.percentage(discount_bps)
    }

    /// Formats as a plain fixed-point decimal: `"1234.50"`, `"-5.00"`.
    pub fn to_decimal_string(&self) -> String {
        let sign = if self.0 < 0 { "-" } else { "" };
        format!("{}{}.{:02}", sign, self.dollars().abs(), self.cents_part())
    }
}

// =============================================================================
// Parsing
// =============================================================================

/// Parses `"8"`, `"8.5"`, `"8.50"`, `"-3.25"`. More than two decimals is an
/// error rather than a silent rounding.
impl FromStr for Money {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ValidationError::InvalidFormat {
            field: "amount".to_string(),
            reason: reason.to_string(),
        };

        let s = s.trim();
        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };

        let (whole, frac) = match digits.split_once('.') {
            Some((w, f)) => (w, f),
            None => (digits, ""),
        };

        if whole.is_empty() || !whole.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid("expected a decimal number"));
        }
        if frac.len() > 2 || !frac.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid("at most two decimal places"));
        }

        let whole: i64 = whole.parse().map_err(|_| invalid("amount too large"))?;
        let frac_cents: i64 = match frac.len() {
            0 => 0,
            1 => frac.parse::<i64>().map_err(|_| invalid("bad fraction"))? * 10,
            _ => frac.parse::<i64>().map_err(|_| invalid("bad fraction"))?,
        };

        let cents = whole
            .checked_mul(100)
            .and_then(|c| c.checked_add(frac_cents))
            .ok_or_else(|| invalid("amount too large"))?;

        Ok(Money(if negative { -cents } else { cents }))
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Human-readable `$12.34` for logs and error messages.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}${}.{:02}", sign, self.dollars().abs(), self.cents_part())
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_decimal_string())
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::ZERO, |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.fold(Money::ZERO, |acc, m| acc + *m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
