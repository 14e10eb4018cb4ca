//! # Validation
//!
//! Input checks run before any document is built or persisted.
//!
//! ## Validation Points
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Booking budget ───► validate_amount ───► InvoiceTotals / PayoutSplit   │
//! │  Transaction amount ─► validate_amount ─► FeeBreakdown                  │
//! │  Currency code ────► validate_currency ─► transactions, payouts         │
//! │  Decline reason ───► validate_required ─► PayoutRequest::decline        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::money::Money;

/// Amounts entering the engine must not be negative.
pub fn validate_amount(field: &str, amount: Money) -> Result<(), ValidationError> {
    if amount.is_negative() {
        return Err(ValidationError::MustNotBeNegative {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Currency codes are three uppercase ASCII letters (ISO 4217 shape).
///
/// ## Example
/// ```rust
/// use encore_core::validation::validate_currency;
///
/// assert!(validate_currency("USD").is_ok());
/// assert!(validate_currency("usd").is_err());
/// ```
pub fn validate_currency(code: &str) -> Result<(), ValidationError> {
    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_uppercase()) {
        return Err(ValidationError::InvalidFormat {
            field: "currency".to_string(),
            reason: format!("'{}' is not a three-letter currency code", code),
        });
    }
    Ok(())
}

/// Rejects empty or whitespace-only text.
pub fn validate_required(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Basis-point rates above 100% make no sense for shares and fees.
pub fn validate_bps(field: &str, bps: u32) -> Result<(), ValidationError> {
    if bps > 10_000 {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: 10_000,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_amount() {
        assert!(validate_amount("amount", Money::zero()).is_ok());
        assert!(validate_amount("amount", Money::from_cents(1)).is_ok());
        assert!(validate_amount("amount", Money::from_cents(-1)).is_err());
    }

    #[test]
    fn test_validate_currency() {
        assert!(validate_currency("EUR").is_ok());
        assert!(validate_currency("EU").is_err());
        assert!(validate_currency("EURO").is_err());
        assert!(validate_currency("E1R").is_err());
    }

    #[test]
    fn test_validate_required() {
        assert!(validate_required("reason", "missing bank details").is_ok());
        assert!(validate_required("reason", "   ").is_err());
    }

    #[test]
    fn test_validate_bps() {
        assert!(validate_bps("tax_bps", 800).is_ok());
        assert!(validate_bps("tax_bps", 10_000).is_ok());
        assert!(validate_bps("tax_bps", 10_001).is_err());
    }
}
