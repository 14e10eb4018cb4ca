//! # Receipts
//!
//! A receipt acknowledges one payment against a booking. It may fulfil one
//! or more contracts through linkage edges.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::booking::{BookingSnapshot, PaymentRecord};
use crate::error::CoreResult;
use crate::money::Money;
use crate::types::RenderStatus;
use crate::validation::validate_amount;

/// One line of a receipt's items breakdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptItem {
    pub description: String,
    pub amount: Money,
    pub date: DateTime<Utc>,
}

/// A receipt before it has a number and a row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptDraft {
    pub booking_id: i64,
    pub payment_id: i64,
    pub recipient_name: String,
    pub items: Vec<ReceiptItem>,
    pub subtotal: Money,
    pub tax: Money,
    pub total: Money,
    pub currency: String,
}

impl ReceiptDraft {
    /// Receipts are untaxed: the total is the payment amount.
    pub fn for_payment(
        booking: &BookingSnapshot,
        payment: &PaymentRecord,
        booker_name: Option<&str>,
        now: DateTime<Utc>,
    ) -> CoreResult<Self> {
        validate_amount("payment amount", payment.amount)?;
        Ok(ReceiptDraft {
            booking_id: booking.id,
            payment_id: payment.id,
            recipient_name: booking.recipient_name(booker_name),
            items: vec![ReceiptItem {
                description: format!("Payment for {}", booking.event_name),
                amount: payment.amount,
                date: payment.paid_at.unwrap_or(now),
            }],
            subtotal: payment.amount,
            tax: Money::zero(),
            total: payment.amount,
            currency: payment.currency.clone(),
        })
    }
}

/// A persisted receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub id: i64,
    pub booking_id: i64,
    pub payment_id: i64,
    pub receipt_number: String,
    pub recipient_name: String,
    pub items: Vec<ReceiptItem>,
    pub subtotal: Money,
    pub tax: Money,
    pub total: Money,
    pub currency: String,
    pub document_url: Option<String>,
    pub render_status: RenderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::booking::BookingStatus;
    use chrono::TimeZone;

    #[test]
    fn test_receipt_mirrors_payment() {
        let now = Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap();
        let booking = BookingSnapshot {
            id: 3,
            booker_user_id: None,
            guest_name: Some("Lee".into()),
            event_name: "Jazz Night".into(),
            event_type: "standard".into(),
            event_date: None,
            venue_address: None,
            total_budget: Money::from_cents(100000),
            final_price: None,
            status: BookingStatus::Paid,
            active_assignments: vec![],
        };
        let payment = PaymentRecord {
            id: 11,
            booking_id: 3,
            amount: Money::from_cents(54000),
            currency: "USD".into(),
            paid_at: None,
        };

        let draft = ReceiptDraft::for_payment(&booking, &payment, None, now).unwrap();
        assert_eq!(draft.total, payment.amount);
        assert!(draft.tax.is_zero());
        assert_eq!(draft.recipient_name, "Lee");
        assert_eq!(draft.items[0].description, "Payment for Jazz Night");
        assert_eq!(draft.items[0].date, now);
    }
}
