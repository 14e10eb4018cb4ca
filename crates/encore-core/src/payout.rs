//! # Payout Requests
//!
//! Performer payout requests and the commission split.
//!
//! ## Split Calculation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  booking total (1000.00)                                                │
//! │       │                                                                 │
//! │       ▼  × payout share (15%)                                           │
//! │  base amount (150.00)                                                   │
//! │       │                                                                 │
//! │       ├──► × commission (15%) ──► commission (22.50)                    │
//! │       │                                                                 │
//! │       ▼  base − commission                                              │
//! │  net payout (127.50)                                                    │
//! │                                                                         │
//! │  Net is derived by subtraction: net + commission == base, exactly.     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Status Flow
//! ```text
//! pending ──approve──► approved ──mark_processed──► processed ──mark_paid──► paid
//!    │                    │
//!    └──────decline───────┴──► declined
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::booking::BookingSnapshot;
use crate::error::{CoreError, CoreResult};
use crate::money::{Money, Rate};
use crate::types::{Actor, TriggeredBy};
use crate::validation::{validate_amount, validate_required};

// =============================================================================
// Enums
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum PayoutRequestType {
    PerformanceFee,
    MilestonePayment,
    Bonus,
    ExpenseReimbursement,
}

text_enum!(PayoutRequestType {
    PerformanceFee => "performance_fee",
    MilestonePayment => "milestone_payment",
    Bonus => "bonus",
    ExpenseReimbursement => "expense_reimbursement",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum PayoutStatus {
    Pending,
    Approved,
    Processed,
    Paid,
    Declined,
}

text_enum!(PayoutStatus {
    Pending => "pending",
    Approved => "approved",
    Processed => "processed",
    Paid => "paid",
    Declined => "declined",
});

// =============================================================================
// Split
// =============================================================================

/// Base, commission and net of one payout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutSplit {
    pub base: Money,
    pub commission_rate: Rate,
    pub commission: Money,
    pub net: Money,
}

impl PayoutSplit {
    /// Computes the performer's share of a booking total.
    ///
    /// ## Example
    /// ```rust
    /// use encore_core::money::{Money, Rate};
    /// use encore_core::payout::PayoutSplit;
    ///
    /// let split = PayoutSplit::compute(
    ///     Money::from_cents(100000),
    ///     Rate::from_bps(1500),
    ///     Rate::from_bps(1500),
    /// ).unwrap();
    /// assert_eq!(split.base.cents(), 15000);
    /// assert_eq!(split.commission.cents(), 2250);
    /// assert_eq!(split.net.cents(), 12750);
    /// ```
    pub fn compute(booking_total: Money, share: Rate, commission_rate: Rate) -> CoreResult<Self> {
        validate_amount("booking total", booking_total)?;
        let base = booking_total.apply_rate(share);
        let commission = base.apply_rate(commission_rate);
        let net = base
            .checked_sub(commission)
            .ok_or(CoreError::AmountOverflow {
                context: "net payout",
            })?;
        Ok(PayoutSplit {
            base,
            commission_rate,
            commission,
            net,
        })
    }
}

/// Rates and defaults applied to generated payouts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutPolicy {
    /// Share of the booking total forming the base amount.
    pub share: Rate,
    /// Commission retained from the base amount.
    pub commission: Rate,
    pub currency: String,
    pub payment_method: String,
}

// =============================================================================
// Draft
// =============================================================================

/// A payout request before it has a number and a row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutDraft {
    pub booking_id: i64,
    pub performer_user_id: i64,
    pub request_type: PayoutRequestType,
    pub split: PayoutSplit,
    pub currency: String,
    pub payment_method: String,
    pub triggered_by: TriggeredBy,
    pub triggered_by_user_id: Option<i64>,
    pub notes: String,
}

impl PayoutDraft {
    /// Drafts the payout owed to one performer when a booking completes.
    pub fn on_completion(
        booking: &BookingSnapshot,
        performer_user_id: i64,
        request_type: PayoutRequestType,
        policy: &PayoutPolicy,
        actor: Actor,
    ) -> CoreResult<Self> {
        let split = PayoutSplit::compute(booking.total_budget, policy.share, policy.commission)?;
        Ok(PayoutDraft {
            booking_id: booking.id,
            performer_user_id,
            request_type,
            split,
            currency: policy.currency.clone(),
            payment_method: policy.payment_method.clone(),
            triggered_by: TriggeredBy::BookingCompletion,
            triggered_by_user_id: actor.user_id(),
            notes: format!(
                "Automatic payout request generated for {} on booking completion",
                request_type
            ),
        })
    }
}

// =============================================================================
// Payout Request
// =============================================================================

/// A persisted payout request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutRequest {
    pub id: i64,
    pub booking_id: i64,
    pub performer_user_id: i64,
    pub request_number: String,
    pub request_type: PayoutRequestType,
    pub base_amount: Money,
    pub commission_rate: Rate,
    pub commission_amount: Money,
    pub net_payout_amount: Money,
    pub currency: String,
    pub payment_method: String,
    pub status: PayoutStatus,
    pub triggered_by: TriggeredBy,
    pub triggered_by_user_id: Option<i64>,
    pub approved_by_user_id: Option<i64>,
    pub approved_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub decline_reason: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A requested payout status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "transition", rename_all = "snake_case")]
pub enum PayoutTransition {
    Approve,
    Decline { reason: String },
    MarkProcessed,
    MarkPaid,
}

impl PayoutTransition {
    pub fn target(&self) -> PayoutStatus {
        match self {
            PayoutTransition::Approve => PayoutStatus::Approved,
            PayoutTransition::Decline { .. } => PayoutStatus::Declined,
            PayoutTransition::MarkProcessed => PayoutStatus::Processed,
            PayoutTransition::MarkPaid => PayoutStatus::Paid,
        }
    }
}

impl PayoutRequest {
    /// Applies a status transition, stamping the matching timestamp.
    ///
    /// ## Errors
    /// [`CoreError::InvalidTransition`] when the current status does not
    /// allow it, [`CoreError::Validation`] for an empty decline reason.
    pub fn apply(
        &self,
        transition: PayoutTransition,
        actor: Actor,
        now: DateTime<Utc>,
    ) -> CoreResult<PayoutRequest> {
        let to = transition.target();
        let allowed = matches!(
            (self.status, to),
            (PayoutStatus::Pending, PayoutStatus::Approved)
                | (PayoutStatus::Pending, PayoutStatus::Declined)
                | (PayoutStatus::Approved, PayoutStatus::Declined)
                | (PayoutStatus::Approved, PayoutStatus::Processed)
                | (PayoutStatus::Processed, PayoutStatus::Paid)
        );
        if !allowed {
            return Err(CoreError::transition("Payout request", self.status, to));
        }

        let mut next = PayoutRequest {
            status: to,
            updated_at: now,
            ..self.clone()
        };

        match transition {
            PayoutTransition::Approve => {
                next.approved_by_user_id = actor.user_id();
                next.approved_at = Some(now);
            }
            PayoutTransition::Decline { reason } => {
                validate_required("decline reason", &reason)?;
                next.decline_reason = Some(reason);
            }
            PayoutTransition::MarkProcessed => next.processed_at = Some(now),
            PayoutTransition::MarkPaid => next.paid_at = Some(now),
        }

        Ok(next)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
