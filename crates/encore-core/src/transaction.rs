//! # Payment Transactions
//!
//! Ledger rows for money movements and their fee breakdown.
//!
//! ## Fee Breakdown
//! ```text
//! amount 1000.00
//!   ├── platform fee  5.0%  →  50.00
//!   ├── gateway fee   2.9%  →  29.00
//!   └── net                 → 921.00   (amount − platform − gateway)
//! ```
//!
//! ## Status Flow
//! ```text
//! pending ──► completed ──► refunded
//!    │            │
//!    │            └──► disputed ──► completed | refunded
//!    └──► failed
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::money::{Money, Rate};
use crate::validation::{validate_amount, validate_currency};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    PaymentReceived,
    PayoutSent,
    RefundIssued,
    FeeCharged,
}

text_enum!(TransactionType {
    PaymentReceived => "payment_received",
    PayoutSent => "payout_sent",
    RefundIssued => "refund_issued",
    FeeCharged => "fee_charged",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
    Disputed,
}

text_enum!(TransactionStatus {
    Pending => "pending",
    Completed => "completed",
    Failed => "failed",
    Refunded => "refunded",
    Disputed => "disputed",
});

impl TransactionStatus {
    pub fn can_transition_to(&self, to: TransactionStatus) -> bool {
        use TransactionStatus::*;
        matches!(
            (self, to),
            (Pending, Completed)
                | (Pending, Failed)
                | (Completed, Refunded)
                | (Completed, Disputed)
                | (Disputed, Completed)
                | (Disputed, Refunded)
        )
    }
}

// =============================================================================
// Fees
// =============================================================================

/// Platform and gateway fee rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    pub platform: Rate,
    pub gateway: Rate,
}

/// Fees deducted from a gross amount.
///
/// ## Invariant
/// `net + platform_fee + gateway_fee == amount`, exact in cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeBreakdown {
    pub amount: Money,
    pub platform_fee: Money,
    pub gateway_fee: Money,
    pub net: Money,
}

impl FeeBreakdown {
    /// ## Example
    /// ```rust
    /// use encore_core::money::{Money, Rate};
    /// use encore_core::transaction::{FeeBreakdown, FeeSchedule};
    ///
    /// let fees = FeeSchedule { platform: Rate::from_bps(500), gateway: Rate::from_bps(290) };
    /// let b = FeeBreakdown::compute(Money::from_cents(100000), fees).unwrap();
    /// assert_eq!(b.platform_fee.to_string(), "50.00");
    /// assert_eq!(b.gateway_fee.to_string(), "29.00");
    /// assert_eq!(b.net.to_string(), "921.00");
    /// ```
    pub fn compute(amount: Money, schedule: FeeSchedule) -> CoreResult<Self> {
        validate_amount("amount", amount)?;
        let platform_fee = amount.apply_rate(schedule.platform);
        let gateway_fee = amount.apply_rate(schedule.gateway);
        let net = amount
            .checked_sub(platform_fee)
            .and_then(|m| m.checked_sub(gateway_fee))
            .ok_or(CoreError::AmountOverflow {
                context: "transaction net amount",
            })?;
        Ok(FeeBreakdown {
            amount,
            platform_fee,
            gateway_fee,
            net,
        })
    }
}

// =============================================================================
// Transaction
// =============================================================================

/// Input for recording a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub booking_id: i64,
    pub transaction_type: TransactionType,
    pub amount: Money,
    pub currency: String,
    pub payment_method: String,
    pub invoice_id: Option<i64>,
    pub payout_request_id: Option<i64>,
    pub gateway_transaction_id: Option<String>,
}

/// A transaction with its fees computed, before it has a row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionDraft {
    pub request: TransactionRequest,
    pub fees: FeeBreakdown,
    pub usd_equivalent: Money,
    pub notes: String,
    pub metadata: serde_json::Value,
}

impl TransactionDraft {
    /// Computes fees and the descriptive fields for a transaction request.
    ///
    /// New transactions always start `pending`.
    pub fn new(
        request: TransactionRequest,
        schedule: FeeSchedule,
        usd_equivalent: Money,
    ) -> CoreResult<Self> {
        validate_currency(&request.currency)?;
        let fees = FeeBreakdown::compute(request.amount, schedule)?;
        let notes = format!(
            "{} transaction for booking {}",
            request.transaction_type, request.booking_id
        );
        let metadata = serde_json::json!({
            "platformFeeBps": schedule.platform.bps(),
            "gatewayFeeBps": schedule.gateway.bps(),
            "originalAmount": request.amount.to_string(),
        });
        Ok(TransactionDraft {
            request,
            fees,
            usd_equivalent,
            notes,
            metadata,
        })
    }
}

/// A persisted payment transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentTransaction {
    pub id: i64,
    pub booking_id: i64,
    pub invoice_id: Option<i64>,
    pub payout_request_id: Option<i64>,
    pub transaction_type: TransactionType,
    pub amount: Money,
    pub currency: String,
    pub usd_equivalent: Money,
    pub payment_method: String,
    pub gateway_transaction_id: Option<String>,
    pub gateway_fee: Money,
    pub platform_fee: Money,
    pub net_amount: Money,
    pub status: TransactionStatus,
    pub processed_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub disputed_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentTransaction {
    /// Applies a status transition, stamping the matching timestamp.
    pub fn with_status(&self, to: TransactionStatus, now: DateTime<Utc>) -> CoreResult<Self> {
        if !self.status.can_transition_to(to) {
            return Err(CoreError::transition("Transaction", self.status, to));
        }
        let mut next = PaymentTransaction {
            status: to,
            updated_at: now,
            ..self.clone()
        };
        match to {
            TransactionStatus::Completed if next.processed_at.is_none() => {
                next.processed_at = Some(now)
            }
            TransactionStatus::Refunded => next.refunded_at = Some(now),
            TransactionStatus::Disputed => next.disputed_at = Some(now),
            _ => {}
        }
        Ok(next)
    }
}
