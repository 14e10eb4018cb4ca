//! # Money Module
//!
//! Provides the `Money` and `Rate` types used by every financial document.
//!
//! ## Integer Cents
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Every amount on an invoice, payout, transaction or receipt is an       │
//! │  i64 count of cents. Every percentage is a count of basis points.       │
//! │                                                                         │
//! │    1 bp = 0.01%        800 bps = 8%        290 bps = 2.9%               │
//! │                                                                         │
//! │  Applying a rate:  (cents × bps + 5000) / 10000   (half-up, in i128)    │
//! │                                                                         │
//! │    $1000.00 × 8%    = 100000 × 800  / 10000 = 8000 cents  ($80.00)      │
//! │    $1000.00 × 2.9%  = 100000 × 290  / 10000 = 2900 cents  ($29.00)      │
//! │                                                                         │
//! │  Derived amounts are computed by subtraction, never by a second        │
//! │  rate application, so  net + fee == gross  holds to the cent.          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use encore_core::money::{Money, Rate};
//!
//! let subtotal = Money::from_major_minor(1000, 0);
//! let tax = subtotal.apply_rate(Rate::from_bps(800));
//! assert_eq!(tax.cents(), 8000);
//! assert_eq!((subtotal + tax).to_string(), "1080.00");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub, SubAssign};

use crate::error::ValidationError;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit (cents).
///
/// ## Design Decisions
/// - **i64 (signed)**: refunds and corrections can be negative in reports,
///   documents themselves are validated non-negative on creation
/// - **No float constructor**: decimals only enter through
///   [`Money::parse_decimal`], which is exact
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents.
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a Money value from major and minor units.
    ///
    /// ## Example
    /// ```rust
    /// use encore_core::money::Money;
    ///
    /// assert_eq!(Money::from_major_minor(10, 99).cents(), 1099);
    /// assert_eq!(Money::from_major_minor(-5, 50).cents(), -550);
    /// ```
    #[inline]
    pub const fn from_major_minor(major: i64, minor: i64) -> Self {
        if major < 0 {
            Money(major * 100 - minor)
        } else {
            Money(major * 100 + minor)
        }
    }

    /// Parses a decimal string such as `"1500"`, `"1500.5"` or `"-12.30"`.
    ///
    /// ## Errors
    /// Returns [`ValidationError::InvalidFormat`] for anything that is not a
    /// plain decimal with at most two fractional digits.
    ///
    /// ## Example
    /// ```rust
    /// use encore_core::money::Money;
    ///
    /// assert_eq!(Money::parse_decimal("1500.5").unwrap().cents(), 150050);
    /// assert!(Money::parse_decimal("12.345").is_err());
    /// ```
    pub fn parse_decimal(input: &str) -> Result<Self, ValidationError> {
        let invalid = |reason: &str| ValidationError::InvalidFormat {
            field: "amount".to_string(),
            reason: format!("'{}': {}", input, reason),
        };

        let trimmed = input.trim();
        let (negative, digits) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };

        let (major_str, minor_str) = match digits.split_once('.') {
            Some((major, minor)) => (major, minor),
            None => (digits, ""),
        };

        if major_str.is_empty() || !major_str.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid("expected digits before the decimal point"));
        }
        if minor_str.len() > 2 || !minor_str.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid("at most two decimal places are allowed"));
        }

        let major: i64 = major_str
            .parse()
            .map_err(|_| invalid("amount is too large"))?;
        let minor: i64 = match minor_str.len() {
            0 => 0,
            1 => minor_str.parse::<i64>().map_err(|_| invalid("bad cents"))? * 10,
            _ => minor_str.parse::<i64>().map_err(|_| invalid("bad cents"))?,
        };

        let cents = major
            .checked_mul(100)
            .and_then(|c| c.checked_add(minor))
            .ok_or_else(|| invalid("amount is too large"))?;

        Ok(Money(if negative { -cents } else { cents }))
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the major unit portion.
    #[inline]
    pub const fn major(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the minor unit portion (always 0-99).
    #[inline]
    pub const fn minor(&self) -> i64 {
        (self.0 % 100).abs()
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Applies a basis-point rate with half-up rounding to the cent.
    ///
    /// ## Implementation
    /// `(amount × bps + 5000) / 10000` in i128 so large budgets cannot
    /// overflow the intermediate product. Negative amounts round half away
    /// from zero, mirroring the positive case.
    ///
    /// ## Example
    /// ```rust
    /// use encore_core::money::{Money, Rate};
    ///
    /// // $10.00 at 8.25% = $0.825 → $0.83
    /// let tax = Money::from_cents(1000).apply_rate(Rate::from_bps(825));
    /// assert_eq!(tax.cents(), 83);
    /// ```
    pub fn apply_rate(&self, rate: Rate) -> Money {
        let product = self.0 as i128 * rate.bps() as i128;
        let rounded = if product < 0 {
            (product - 5000) / 10000
        } else {
            (product + 5000) / 10000
        };
        Money(rounded as i64)
    }

    /// Checked addition, `None` on overflow.
    #[inline]
    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    /// Checked subtraction, `None` on overflow.
    #[inline]
    pub fn checked_sub(self, other: Money) -> Option<Money> {
        self.0.checked_sub(other.0).map(Money)
    }
}

/// Renders as a plain two-decimal amount (`"1080.00"`, `"-5.50"`).
///
/// ## Note
/// No currency symbol: documents carry their currency code separately.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}{}.{:02}", sign, self.major().abs(), self.minor())
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
// Rate
// =============================================================================

/// A percentage rate in basis points (1 bp = 0.01%).
///
/// Used for the invoice tax rate, the payout share of a booking, the
/// platform commission and the platform/gateway transaction fees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rate(u32);

impl Rate {
    /// Creates a rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        Rate(bps)
    }

    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn zero() -> Self {
        Rate(0)
    }

    /// Formats the rate as a percentage with two decimals (`"15.00"`).
    ///
    /// ## Example
    /// ```rust
    /// use encore_core::money::Rate;
    ///
    /// assert_eq!(Rate::from_bps(1500).percentage_string(), "15.00");
    /// assert_eq!(Rate::from_bps(290).percentage_string(), "2.90");
    /// ```
    pub fn percentage_string(&self) -> String {
        format!("{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.percentage_string())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Money::from_cents(108000).to_string(), "1080.00");
        assert_eq!(Money::from_cents(500).to_string(), "5.00");
        assert_eq!(Money::from_cents(-550).to_string(), "-5.50");
        assert_eq!(Money::zero().to_string(), "0.00");
    }

    #[test]
    fn test_parse_decimal() {
        assert_eq!(Money::parse_decimal("1500").unwrap().cents(), 150000);
        assert_eq!(Money::parse_decimal("1500.5").unwrap().cents(), 150050);
        assert_eq!(Money::parse_decimal("0.07").unwrap().cents(), 7);
        assert_eq!(Money::parse_decimal(" 12.30 ").unwrap().cents(), 1230);
        assert_eq!(Money::parse_decimal("-12.30").unwrap().cents(), -1230);
    }

    #[test]
    fn test_parse_decimal_rejects_garbage() {
        assert!(Money::parse_decimal("").is_err());
        assert!(Money::parse_decimal("abc").is_err());
        assert!(Money::parse_decimal(".50").is_err());
        assert!(Money::parse_decimal("1.234").is_err());
        assert!(Money::parse_decimal("1e5").is_err());
        assert!(Money::parse_decimal("99999999999999999999").is_err());
    }

    #[test]
    fn test_apply_rate_rounds_half_up() {
        // $10.00 at 8.25% = 82.5 cents → 83
        assert_eq!(Money::from_cents(1000).apply_rate(Rate::from_bps(825)).cents(), 83);
        // 1 cent at 50% = 0.5 → 1
        assert_eq!(Money::from_cents(1).apply_rate(Rate::from_bps(5000)).cents(), 1);
        // 1 cent at 49.99% rounds down
        assert_eq!(Money::from_cents(1).apply_rate(Rate::from_bps(4999)).cents(), 0);
    }

    #[test]
    fn test_apply_rate_negative_is_symmetric() {
        let positive = Money::from_cents(1000).apply_rate(Rate::from_bps(825));
        let negative = Money::from_cents(-1000).apply_rate(Rate::from_bps(825));
        assert_eq!(negative.cents(), -positive.cents());
    }

    #[test]
    fn test_apply_rate_large_amount_does_not_overflow() {
        let huge = Money::from_cents(i64::MAX / 2);
        let share = huge.apply_rate(Rate::from_bps(10000));
        assert_eq!(share, huge);
    }

    #[test]
    fn test_sum() {
        let total: Money = [100, 250, 650].into_iter().map(Money::from_cents).sum();
        assert_eq!(total.cents(), 1000);
    }

    #[test]
    fn test_rate_formatting() {
        assert_eq!(Rate::from_bps(800).to_string(), "8.00%");
        assert_eq!(Rate::from_bps(5).percentage_string(), "0.05");
    }
}
