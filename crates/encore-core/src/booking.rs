//! # Booking Reference Data
//!
//! Read-only views of the records the finance engine consumes but does not
//! own: bookings, their performer assignments, users, payments and
//! contracts. Also the booking lifecycle rules that decide which financial
//! side effect a status change triggers.
//!
//! ## Booking Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Booking Status Machine                            │
//! │                                                                         │
//! │  pending ──► accepted ──► contract_generated ──► signed ──► paid        │
//! │     │           │                                             │         │
//! │     │           │      (any non-terminal order is accepted)   ▼         │
//! │     │           └──────────────────────────────────────► completed      │
//! │     │                                                         │         │
//! │     └──────────────► cancelled ◄──────────────────────────────┘         │
//! │                     (terminal)                                          │
//! │                                                                         │
//! │  Side effects:                                                          │
//! │    → accepted   : acceptance invoice                                    │
//! │    → completed  : one payout request per active assignment              │
//! │    → cancelled  : recorded, refund workflow deferred                    │
//! │                                                                         │
//! │  Rejected: old == new, anything out of cancelled,                       │
//! │            completed → anything but cancelled                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;

// =============================================================================
// Booking Status
// =============================================================================

/// Lifecycle status of a booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Accepted,
    ContractGenerated,
    Signed,
    Paid,
    Completed,
    Cancelled,
}

text_enum!(BookingStatus {
    Pending => "pending",
    Accepted => "accepted",
    ContractGenerated => "contract_generated",
    Signed => "signed",
    Paid => "paid",
    Completed => "completed",
    Cancelled => "cancelled",
});

/// The financial side effect a booking status change calls for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinancialAction {
    /// Generate the acceptance (deposit) invoice.
    IssueAcceptanceInvoice,
    /// Generate one payout request per active assignment.
    RequestPayouts,
    /// Booking was cancelled. Refunds are not automated.
    RecordCancellation,
    /// Status change with no financial consequence.
    None,
}

impl BookingStatus {
    /// Returns true for statuses no booking leaves (except completed → cancelled).
    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Completed | BookingStatus::Cancelled)
    }

    /// Validates a reported status change and returns its side effect.
    ///
    /// ## Example
    /// ```rust
    /// use encore_core::booking::{BookingStatus, FinancialAction};
    ///
    /// let action = BookingStatus::Pending
    ///     .check_transition(BookingStatus::Accepted)
    ///     .unwrap();
    /// assert_eq!(action, FinancialAction::IssueAcceptanceInvoice);
    ///
    /// assert!(BookingStatus::Cancelled
    ///     .check_transition(BookingStatus::Accepted)
    ///     .is_err());
    /// ```
    pub fn check_transition(self, to: BookingStatus) -> CoreResult<FinancialAction> {
        let allowed = match (self, to) {
            (from, to) if from == to => false,
            (BookingStatus::Cancelled, _) => false,
            (BookingStatus::Completed, BookingStatus::Cancelled) => true,
            (BookingStatus::Completed, _) => false,
            _ => true,
        };

        if !allowed {
            return Err(CoreError::transition("Booking", self, to));
        }

        Ok(match to {
            BookingStatus::Accepted => FinancialAction::IssueAcceptanceInvoice,
            BookingStatus::Completed => FinancialAction::RequestPayouts,
            BookingStatus::Cancelled => FinancialAction::RecordCancellation,
            _ => FinancialAction::None,
        })
    }
}

// =============================================================================
// Booking Snapshot
// =============================================================================

/// A performer assigned to a booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub user_id: i64,
    pub role: Option<String>,
}

/// The booking fields the finance engine reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingSnapshot {
    pub id: i64,
    pub booker_user_id: Option<i64>,
    pub guest_name: Option<String>,
    pub event_name: String,
    pub event_type: String,
    pub event_date: Option<DateTime<Utc>>,
    pub venue_address: Option<String>,
    pub total_budget: Money,
    pub final_price: Option<Money>,
    pub status: BookingStatus,
    /// Only assignments flagged active.
    pub active_assignments: Vec<Assignment>,
}

impl BookingSnapshot {
    /// Recipient name: guest, then booker, then `"Client"`.
    pub fn recipient_name(&self, booker_name: Option<&str>) -> String {
        self.guest_name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .or(booker_name.filter(|n| !n.trim().is_empty()))
            .unwrap_or("Client")
            .to_string()
    }

    /// Recipient address: venue address, then `"Client Address"`.
    pub fn recipient_address(&self) -> String {
        self.venue_address
            .as_deref()
            .filter(|a| !a.trim().is_empty())
            .unwrap_or("Client Address")
            .to_string()
    }

    /// Exact match on the stored event type; `"Corporate"` is not corporate.
    pub fn is_corporate(&self) -> bool {
        self.event_type == "corporate"
    }
}

// =============================================================================
// Users, Payments, Contracts
// =============================================================================

/// A user record (booker or performer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i64,
    pub full_name: String,
    pub address: Option<String>,
}

/// A payment received against a booking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: i64,
    pub booking_id: i64,
    pub amount: Money,
    pub currency: String,
    pub paid_at: Option<DateTime<Utc>>,
}

/// Kind of contract a receipt can fulfil.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum ContractType {
    BookingAgreement,
    PerformanceAgreement,
    TechnicalRider,
}

text_enum!(ContractType {
    BookingAgreement => "booking_agreement",
    PerformanceAgreement => "performance_agreement",
    TechnicalRider => "technical_rider",
});

/// A contract attached to a booking.
///
/// `content` is the contract body as stored. The engine reads one key:
/// `individualPricing`, a map from performer id to that performer's fee.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractRecord {
    pub id: i64,
    pub booking_id: i64,
    pub contract_type: ContractType,
    pub assigned_to_user_id: Option<i64>,
    pub content: serde_json::Value,
}

impl ContractRecord {
    /// Returns `(performer_id, fee)` for the contract's assigned performer.
    ///
    /// ## Accepted Shapes
    /// ```text
    /// { "individualPricing": { "17": 1500 } }
    /// { "individualPricing": { "17": "1500.00" } }
    /// ```
    ///
    /// ## Errors
    /// - [`CoreError::UnassignedContract`] when no performer is assigned
    /// - [`CoreError::MissingPerformerFee`] when the map has no entry
    /// - [`ValidationError`] for unparseable or negative fees
    pub fn performer_fee(&self) -> CoreResult<(i64, Money)> {
        let performer_id = self
            .assigned_to_user_id
            .ok_or(CoreError::UnassignedContract {
                contract_id: self.id,
            })?;

        let missing = || CoreError::MissingPerformerFee {
            contract_id: self.id,
            performer_id,
        };

        let raw = self
            .content
            .get("individualPricing")
            .and_then(|pricing| pricing.get(performer_id.to_string()))
            .ok_or_else(missing)?;

        let fee = match raw {
            serde_json::Value::Number(n) => Money::parse_decimal(&n.to_string())?,
            serde_json::Value::String(s) => Money::parse_decimal(s)?,
            _ => return Err(missing()),
        };

        if fee.is_negative() {
            return Err(ValidationError::MustNotBeNegative {
                field: "individualPricing".to_string(),
            }
            .into());
        }

        Ok((performer_id, fee))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
