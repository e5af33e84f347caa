//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  In JavaScript/floating point:                                          │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ WRONG!                           │
//! │                                                                         │
//! │  OUR SOLUTION: Integer minor units                                      │
//! │    Rp5.000 is stored as 5000. Every sum is exact.                      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use apothecary_core::money::Money;
//!
//! let price = Money::from_minor(5000); // Rp5.000
//! let line_total = price.checked_mul_quantity(3).unwrap();
//! assert_eq!(line_total.minor(), 15000);
//! assert_eq!(line_total.to_string(), "Rp15.000");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub, SubAssign};
use ts_rs::TS;

// =============================================================================
// Money Type
// =============================================================================

/// Represents a monetary value in the smallest currency unit.
///
/// ## Design Decisions
/// - **i64 (signed)**: Allows negative values for net-profit figures
/// - **Single field tuple struct**: Zero-cost abstraction over i64
///
/// ## Where Money is Used
/// ```text
/// Product.price ──► SaleLineItem.unit_price ──► SaleLineItem.line_total
///                                                       │
///                                          Σ ───► Sale.total_amount
///                                                       │
///                                                       ▼
///                                           SalesReport.revenue
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from minor units.
    ///
    /// ## Example
    /// ```rust
    /// use apothecary_core::money::Money;
    ///
    /// let price = Money::from_minor(25000);
    /// assert_eq!(price.minor(), 25000);
    /// ```
    #[inline]
    pub const fn from_minor(minor: i64) -> Self {
        Money(minor)
    }

    /// Returns the value in minor units.
    #[inline]
    pub const fn minor(&self) -> i64 {
        self.0
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is negative (less than zero).
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Multiplies money by a quantity, returning `None` on overflow.
    ///
    /// ## Example
    /// ```rust
    /// use apothecary_core::money::Money;
    ///
    /// let unit_price = Money::from_minor(22000);
    /// assert_eq!(unit_price.checked_mul_quantity(3), Some(Money::from_minor(66000)));
    /// assert_eq!(Money::from_minor(i64::MAX).checked_mul_quantity(2), None);
    /// ```
    #[inline]
    pub const fn checked_mul_quantity(&self, qty: i64) -> Option<Self> {
        match self.0.checked_mul(qty) {
            Some(v) => Some(Money(v)),
            None => None,
        }
    }

    /// Adds two amounts, returning `None` on overflow.
    #[inline]
    pub const fn checked_add(&self, other: Money) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(v) => Some(Money(v)),
            None => None,
        }
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Display shows Rupiah with `.` thousands separators, e.g. `Rp1.250.000`.
///
/// ## Note
/// This is for logs and tests. The web client formats with its own locale.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let digits = self.0.unsigned_abs().to_string();

        let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
        for (i, ch) in digits.chars().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                grouped.push('.');
            }
            grouped.push(ch);
        }

        write!(f, "{}Rp{}", sign, grouped)
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
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

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), Add::add)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
