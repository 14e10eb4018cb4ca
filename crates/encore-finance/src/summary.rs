//! Per-booking roll-up of every financial document and its totals.

use serde::Serialize;

use encore_core::invoice::{Invoice, InvoiceStatus};
use encore_core::payout::{PayoutRequest, PayoutStatus};
use encore_core::receipt::Receipt;
use encore_core::transaction::PaymentTransaction;
use encore_core::{CoreError, Money};
use encore_db::Database;

use crate::error::FinanceResult;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancialTotals {
    /// Invoice totals, cancelled invoices excluded.
    pub total_invoiced: Money,
    /// Net payout amounts, declined requests excluded.
    pub total_payouts: Money,
    pub total_transactions: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingFinancialSummary {
    pub booking_id: i64,
    pub invoices: Vec<Invoice>,
    pub payout_requests: Vec<PayoutRequest>,
    pub transactions: Vec<PaymentTransaction>,
    pub receipts: Vec<Receipt>,
    pub totals: FinancialTotals,
}

impl BookingFinancialSummary {
    pub async fn load(db: &Database, booking_id: i64) -> FinanceResult<Self> {
        let invoices = db.invoices().list_for_booking(booking_id).await?;
        let payout_requests = db.payouts().list_for_booking(booking_id).await?;
        let transactions = db.transactions().list_for_booking(booking_id).await?;
        let receipts = db.receipts().list_for_booking(booking_id).await?;

        let totals = FinancialTotals {
            total_invoiced: sum(
                invoices
                    .iter()
                    .filter(|i| i.status != InvoiceStatus::Cancelled)
                    .map(|i| i.total),
            )?,
            total_payouts: sum(
                payout_requests
                    .iter()
                    .filter(|p| p.status != PayoutStatus::Declined)
                    .map(|p| p.net_payout_amount),
            )?,
            total_transactions: sum(transactions.iter().map(|t| t.amount))?,
        };

        Ok(BookingFinancialSummary {
            booking_id,
            invoices,
            payout_requests,
            transactions,
            receipts,
            totals,
        })
    }
}

fn sum(amounts: impl Iterator<Item = Money>) -> FinanceResult<Money> {
    let mut total = Money::zero();
    for amount in amounts {
        total = total.checked_add(amount).ok_or(CoreError::AmountOverflow {
            context: "financial summary",
        })?;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::Fixture;
    use encore_core::payout::PayoutRequestType;
    use encore_core::transaction::{TransactionRequest, TransactionType};
    use encore_core::Actor;

    #[tokio::test]
    async fn test_totals_skip_cancelled_and_declined() {
        let fx = Fixture::new().await;
        let booking = fx.booking("Standard", 100000).await;
        let performer = fx.user("Nina Simone").await;
        let other_performer = fx.user("Etta James").await;

        let invoices = fx.invoices();
        invoices.create_proforma(booking, Actor::System).await.unwrap();
        let dropped = invoices.create_proforma(booking, Actor::System).await.unwrap();
        invoices.cancel(dropped.id, Actor::System).await.unwrap();

        let payouts = fx.payouts();
        payouts
            .create_on_completion(booking, performer, PayoutRequestType::PerformanceFee, Actor::System)
            .await
            .unwrap();
        let declined = payouts
            .create_on_completion(booking, other_performer, PayoutRequestType::PerformanceFee, Actor::System)
            .await
            .unwrap();
        payouts.decline(declined.id, "Did not perform", Actor::User(1)).await.unwrap();

        fx.ledger()
            .record(
                TransactionRequest {
                    booking_id: booking,
                    transaction_type: TransactionType::PaymentReceived,
                    amount: Money::from_cents(54000),
                    currency: "USD".into(),
                    payment_method: "card".into(),
                    invoice_id: None,
                    payout_request_id: None,
                    gateway_transaction_id: None,
                },
                Actor::System,
            )
            .await
            .unwrap();

        let summary = BookingFinancialSummary::load(&fx.db, booking).await.unwrap();
        assert_eq!(summary.invoices.len(), 2);
        assert_eq!(summary.payout_requests.len(), 2);
        assert_eq!(summary.totals.total_invoiced.to_string(), "1080.00");
        assert_eq!(summary.totals.total_payouts.to_string(), "127.50");
        assert_eq!(summary.totals.total_transactions.to_string(), "540.00");

        let json = serde_json::to_value(&summary).unwrap();
        assert!(json["totals"]["totalInvoiced"].is_number());
        assert!(json["payoutRequests"].is_array());
    }

    #[tokio::test]
    async fn test_empty_booking() {
        let fx = Fixture::new().await;
        let summary = BookingFinancialSummary::load(&fx.db, 77).await.unwrap();
        assert!(summary.invoices.is_empty());
        assert_eq!(summary.totals.total_invoiced, Money::zero());
    }
}
