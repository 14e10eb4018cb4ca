//! # Finance Error Types
//!
//! The error taxonomy every service operation surfaces, and the structured
//! [`ApiError`] handed to callers.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Flow in Encore Finance                         │
//! │                                                                         │
//! │  ValidationError ──► CoreError ─────────┐                              │
//! │   (encore-core)       (encore-core)     │                              │
//! │                                         ▼                              │
//! │  sqlx::Error ──────► DbError ──────► FinanceError ──────► ApiError     │
//! │                      (encore-db)     NotFound            { kind,       │
//! │                                      InvalidState          message }   │
//! │                                      Validation                        │
//! │                                      Persistence  ── raw text logged,  │
//! │                                      Render          generic message   │
//! │                                      NumberGeneration   returned       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use encore_core::{CoreError, RenderTarget, ValidationError};
use encore_db::DbError;

/// Result type alias for finance operations.
pub type FinanceResult<T> = Result<T, FinanceError>;

/// Error type covering every way a finance operation can fail.
#[derive(Debug, Error)]
pub enum FinanceError {
    /// A booking, invoice, performer, payment or contract is missing.
    ///
    /// ## When This Occurs
    /// - Creating a proforma for a booking id the store doesn't know
    /// - Completing a booking whose assigned performer has no user record
    /// - Recording a transaction against a non-existent invoice
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// The requested transition is not allowed from the current state.
    ///
    /// ## When This Occurs
    /// - Converting a deposit or final invoice
    /// - Converting the same proforma twice
    /// - Approving a declined payout
    /// - Reporting a booking status change out of `cancelled`
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Malformed or negative input.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Storage failed or timed out. The operation was rolled back.
    #[error("Persistence failed: {0}")]
    Persistence(String),

    /// The PDF renderer failed. Never fatal to the document itself.
    #[error("Render failed for {target}: {reason}")]
    Render { target: RenderTarget, reason: String },

    /// The numbering authority could not issue a number.
    ///
    /// ## When This Occurs
    /// - The sequence statement failed (locked database, disk full)
    /// - A generated number collided with an existing document number
    #[error("Number generation failed: {0}")]
    NumberGeneration(String),
}

impl FinanceError {
    pub fn not_found(entity: impl Into<String>, id: impl ToString) -> Self {
        FinanceError::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            FinanceError::NotFound { .. } => ErrorKind::NotFound,
            FinanceError::InvalidState(_) => ErrorKind::InvalidState,
            FinanceError::Validation(_) => ErrorKind::Validation,
            FinanceError::Persistence(_) => ErrorKind::Persistence,
            FinanceError::Render { .. } => ErrorKind::Render,
            FinanceError::NumberGeneration(_) => ErrorKind::NumberGeneration,
        }
    }
}

/// Maps storage errors into the taxonomy.
///
/// ```text
/// DbError::NotFound            → FinanceError::NotFound
/// DbError::ForeignKeyViolation → FinanceError::NotFound (dangling reference)
/// Everything else              → FinanceError::Persistence
/// ```
impl From<DbError> for FinanceError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => FinanceError::NotFound { entity, id },
            DbError::ForeignKeyViolation { message } => {
                tracing::warn!("Foreign key violation: {}", message);
                FinanceError::NotFound {
                    entity: "Referenced document".to_string(),
                    id: "unknown".to_string(),
                }
            }
            other => FinanceError::Persistence(other.to_string()),
        }
    }
}

impl From<CoreError> for FinanceError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidTransition { .. } | CoreError::NotConvertible { .. } => {
                FinanceError::InvalidState(err.to_string())
            }
            CoreError::MissingPerformerFee { .. }
            | CoreError::UnassignedContract { .. }
            | CoreError::AmountOverflow { .. }
            | CoreError::Validation(_) => FinanceError::Validation(err.to_string()),
        }
    }
}

impl From<ValidationError> for FinanceError {
    fn from(err: ValidationError) -> Self {
        FinanceError::Validation(err.to_string())
    }
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors raised while loading [`FinanceConfig`](crate::config::FinanceConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file exists but couldn't be read.
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// The config file isn't valid TOML for the expected shape.
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// =============================================================================
// API Error
// =============================================================================

/// Structured error returned to callers (HTTP layer, webhook handlers).
///
/// ## Serialization
/// ```json
/// {
///   "kind": "INVALID_STATE",
///   "message": "Invoice INV-2026-000007 is final and cannot be converted to final"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    /// Machine-readable error kind for programmatic handling
    pub kind: ErrorKind,

    /// Human-readable error message for display
    pub message: String,
}

/// Error kinds for API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Referenced entity doesn't exist (404)
    NotFound,

    /// Transition not allowed (409)
    InvalidState,

    /// Input validation failed (400)
    Validation,

    /// Storage failure (500)
    Persistence,

    /// PDF render failed (502, retryable)
    Render,

    /// No document number could be issued (500)
    NumberGeneration,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        ApiError {
            kind,
            message: message.into(),
        }
    }
}

/// Converts finance errors to API errors.
///
/// Storage and numbering failures are logged with their raw text and replaced
/// by a generic message.
impl From<FinanceError> for ApiError {
    fn from(err: FinanceError) -> Self {
        let kind = err.kind();
        match err {
            FinanceError::Persistence(e) => {
                tracing::error!("Persistence failure: {}", e);
                ApiError::new(kind, "Database operation failed")
            }
            FinanceError::NumberGeneration(e) => {
                tracing::error!("Number generation failure: {}", e);
                ApiError::new(kind, "Could not issue a document number")
            }
            other => ApiError::new(kind, other.to_string()),
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}", self.kind, self.message)
    }
}

impl std::error::Error for ApiError {}

// =============================================================================
// Unit Tests
// =============================================================================
