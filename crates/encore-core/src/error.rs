//! # Error Types
//!
//! Domain-specific error types for encore-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  encore-core errors (this file)                                        │
//! │  ├── CoreError        - Business rule violations                       │
//! │  └── ValidationError  - Malformed or out-of-range input                │
//! │                                                                         │
//! │  encore-db errors (separate crate)                                     │
//! │  └── DbError          - Storage failures                               │
//! │                                                                         │
//! │  encore-finance errors                                                 │
//! │  ├── FinanceError     - NotFound / InvalidState / Validation /         │
//! │  │                      Persistence / Render / NumberGeneration        │
//! │  └── ApiError         - What callers see (kind + message)              │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → FinanceError → ApiError           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A status or stage transition is not allowed.
    ///
    /// ## When This Occurs
    /// - Approving a payout that was already declined
    /// - Marking a cancelled invoice as paid
    /// - Moving a booking out of `cancelled`
    /// - Reporting a booking status change where old == new
    #[error("{entity} cannot move from {from} to {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    /// An invoice is not a convertible proforma.
    ///
    /// ## When This Occurs
    /// - Converting a `booking_deposit` or `final` invoice
    /// - Converting the same proforma twice
    /// - Converting a proforma that was cancelled or paid
    ///
    /// ## User Workflow
    /// ```text
    /// convert PRO-2026-000042
    ///      │
    ///      ▼
    /// stage = final (already converted)
    ///      │
    ///      ▼
    /// NotConvertible { number: "INV-2026-000007", stage: "final" }
    /// ```
    #[error("Invoice {number} is {stage} and cannot be converted to final")]
    NotConvertible { number: String, stage: String },

    /// A contract does not carry a fee for its assigned performer.
    #[error("Contract {contract_id} has no individual price for performer {performer_id}")]
    MissingPerformerFee { contract_id: i64, performer_id: i64 },

    /// A contract has no assigned performer.
    #[error("Contract {contract_id} has no assigned performer")]
    UnassignedContract { contract_id: i64 },

    /// An amount calculation overflowed i64 cents.
    #[error("Amount overflow while computing {context}")]
    AmountOverflow { context: &'static str },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Creates an InvalidTransition error from any displayable states.
    pub fn transition(
        entity: &'static str,
        from: impl std::fmt::Display,
        to: impl std::fmt::Display,
    ) -> Self {
        CoreError::InvalidTransition {
            entity,
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when input doesn't meet requirements.
/// Used for early validation before any document is built.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Amount must not be negative.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// Value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Invalid format (e.g., bad decimal, bad currency code).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },
}

impl ValidationError {
    /// Shorthand for an unknown enum value.
    pub fn not_allowed(field: &str, allowed: &[&str]) -> Self {
        ValidationError::NotAllowed {
            field: field.to_string(),
            allowed: allowed.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
