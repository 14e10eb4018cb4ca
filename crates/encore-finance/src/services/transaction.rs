//! # Transaction Ledger
//!
//! Records money movements with their fees and USD equivalent, and links
//! each one to the booking and to the invoice or payout it settles.
//!
//! ```text
//!   booking#7 ──references──► transaction#9 ──fulfills──► invoice#42
//!                                   │
//!                                   └──fulfills──► payout_request#3
//! ```

use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};

use encore_core::audit::AuditRecord;
use encore_core::linkage::NewLinkage;
use encore_core::transaction::{
    PaymentTransaction, TransactionDraft, TransactionRequest, TransactionStatus,
};
use encore_core::types::{Actor, AuditAction, DocumentRef, LinkageType};
use encore_db::repository::{invoice, payout, transaction};

use crate::error::{FinanceError, FinanceResult};
use crate::ports::CurrencyConverter;
use crate::services::{lost_race, snapshot, AuditLog, DocumentLinkageGraph, ServiceContext};

#[derive(Clone)]
pub struct TransactionLedger {
    ctx: ServiceContext,
    converter: Arc<dyn CurrencyConverter>,
}

impl TransactionLedger {
    pub fn new(ctx: ServiceContext, converter: Arc<dyn CurrencyConverter>) -> Self {
        TransactionLedger { ctx, converter }
    }

    /// Records a transaction in `pending`.
    ///
    /// ## Errors
    /// - [`FinanceError::Validation`] for a negative amount, a malformed or
    ///   unconvertible currency, or a referenced document of another booking
    /// - [`FinanceError::NotFound`] when the referenced invoice or payout
    ///   request does not exist
    pub async fn record(
        &self,
        request: TransactionRequest,
        actor: Actor,
    ) -> FinanceResult<PaymentTransaction> {
        self.ctx
            .bounded("record transaction", async {
                let usd = self.converter.to_usd(request.amount, &request.currency).await?;
                let draft = TransactionDraft::new(request, self.ctx.config.fee_schedule(), usd)?;
                let booking_id = draft.request.booking_id;

                let now = self.ctx.now();
                let mut uow = self.ctx.db.begin().await?;

                if let Some(invoice_id) = draft.request.invoice_id {
                    let settled = invoice::fetch_by_id(&mut *uow.conn(), invoice_id)
                        .await?
                        .ok_or_else(|| FinanceError::not_found("Invoice", invoice_id))?;
                    ensure_same_booking("Invoice", invoice_id, settled.booking_id, booking_id)?;
                }
                if let Some(payout_id) = draft.request.payout_request_id {
                    let settled = payout::fetch_by_id(&mut *uow.conn(), payout_id)
                        .await?
                        .ok_or_else(|| FinanceError::not_found("Payout request", payout_id))?;
                    ensure_same_booking("Payout request", payout_id, settled.booking_id, booking_id)?;
                }

                let recorded = transaction::insert(uow.conn(), &draft, now).await?;
                let this = DocumentRef::transaction(recorded.id);

                DocumentLinkageGraph::link_in(
                    uow.conn(),
                    &NewLinkage::new(DocumentRef::booking(booking_id), LinkageType::References, this, actor)
                        .describe(format!("Booking {} transaction", recorded.transaction_type)),
                    now,
                )
                .await?;
                if let Some(invoice_id) = recorded.invoice_id {
                    DocumentLinkageGraph::link_in(
                        uow.conn(),
                        &NewLinkage::new(this, LinkageType::Fulfills, DocumentRef::invoice(invoice_id), actor)
                            .describe("Transaction settles invoice"),
                        now,
                    )
                    .await?;
                }
                if let Some(payout_id) = recorded.payout_request_id {
                    DocumentLinkageGraph::link_in(
                        uow.conn(),
                        &NewLinkage::new(this, LinkageType::Fulfills, DocumentRef::payout_request(payout_id), actor)
                            .describe("Transaction settles payout request"),
                        now,
                    )
                    .await?;
                }

                AuditLog::record(
                    uow.conn(),
                    &AuditRecord::new(
                        this,
                        AuditAction::Created,
                        actor,
                        format!(
                            "Recorded {} of {} {} for booking {}",
                            recorded.transaction_type, recorded.amount, recorded.currency, booking_id
                        ),
                    )
                    .new_values(snapshot(&recorded)),
                    now,
                )
                .await?;

                uow.commit().await?;

                info!(
                    id = recorded.id,
                    booking_id,
                    transaction_type = %recorded.transaction_type,
                    amount = %recorded.amount,
                    currency = %recorded.currency,
                    net = %recorded.net_amount,
                    "Transaction recorded"
                );
                Ok(recorded)
            })
            .await
    }

    /// Moves a transaction along its status machine.
    pub async fn update_status(
        &self,
        transaction_id: i64,
        to: TransactionStatus,
        actor: Actor,
    ) -> FinanceResult<PaymentTransaction> {
        self.ctx
            .bounded("update transaction status", async {
                let now = self.ctx.now();
                let mut uow = self.ctx.db.begin().await?;

                let current = transaction::fetch_by_id(&mut *uow.conn(), transaction_id)
                    .await?
                    .ok_or_else(|| FinanceError::not_found("Transaction", transaction_id))?;
                let next = current.with_status(to, now)?;

                if !transaction::update_status(uow.conn(), &next, current.status).await? {
                    return Err(lost_race("Transaction", transaction_id));
                }

                AuditLog::record(
                    uow.conn(),
                    &AuditRecord::new(
                        DocumentRef::transaction(transaction_id),
                        AuditAction::StatusChanged,
                        actor,
                        format!("Transaction {} moved from {} to {}", transaction_id, current.status, next.status),
                    )
                    .previous(json!({ "status": current.status }))
                    .new_values(json!({ "status": next.status })),
                    now,
                )
                .await?;

                uow.commit().await?;

                info!(id = transaction_id, status = %next.status, "Transaction status changed");
                Ok(next)
            })
            .await
    }

    pub async fn get(&self, transaction_id: i64) -> FinanceResult<PaymentTransaction> {
        self.ctx
            .db
            .transactions()
            .get_by_id(transaction_id)
            .await?
            .ok_or_else(|| FinanceError::not_found("Transaction", transaction_id))
    }
}

fn ensure_same_booking(what: &str, id: i64, actual: i64, expected: i64) -> FinanceResult<()> {
    if actual != expected {
        warn!(what, id, actual, expected, "Transaction references a document of another booking");
        return Err(FinanceError::Validation(format!(
            "{} {} belongs to booking {}, not {}",
            what, id, actual, expected
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FinanceConfig;
    use crate::fixtures::{fixed_now, Fixture};
    use encore_core::payout::PayoutRequestType;
    use encore_core::transaction::TransactionType;
    use encore_core::Money;

    fn payment(booking_id: i64, cents: i64, currency: &str) -> TransactionRequest {
        TransactionRequest {
            booking_id,
            transaction_type: TransactionType::PaymentReceived,
            amount: Money::from_cents(cents),
            currency: currency.to_string(),
            payment_method: "card".to_string(),
            invoice_id: None,
            payout_request_id: None,
            gateway_transaction_id: Some("ch_123".to_string()),
        }
    }

    #[tokio::test]
    async fn test_fees_are_deducted() {
        let fx = Fixture::new().await;
        let booking = fx.booking("Standard", 100000).await;
        let invoice = fx.invoices().create_proforma(booking, Actor::System).await.unwrap();

        let request = TransactionRequest {
            invoice_id: Some(invoice.id),
            ..payment(booking, 100000, "USD")
        };
        let txn = fx.ledger().record(request, Actor::User(4)).await.unwrap();

        assert_eq!(txn.status, TransactionStatus::Pending);
        assert_eq!(txn.platform_fee.to_string(), "50.00");
        assert_eq!(txn.gateway_fee.to_string(), "29.00");
        assert_eq!(txn.net_amount.to_string(), "921.00");
        assert_eq!(txn.usd_equivalent, Money::from_cents(100000));
        assert_eq!(txn.metadata["platformFeeBps"], 500);

        let outgoing = fx.graph().find_linked(DocumentRef::transaction(txn.id), None).await.unwrap();
        assert_eq!(outgoing.len(), 1);
        assert_eq!(outgoing[0].linkage_type, LinkageType::Fulfills);
        assert_eq!(outgoing[0].linked, DocumentRef::invoice(invoice.id));

        let from_booking = fx
            .graph()
            .find_linked(DocumentRef::booking(booking), Some(LinkageType::References))
            .await
            .unwrap();
        assert_eq!(from_booking.len(), 1);
        assert_eq!(fx.audit().for_entity(DocumentRef::transaction(txn.id)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_payout_settlement_links_to_the_request() {
        let fx = Fixture::new().await;
        let booking = fx.booking("Standard", 100000).await;
        let performer = fx.user("Nina Simone").await;
        let payout = fx
            .payouts()
            .create_on_completion(booking, performer, PayoutRequestType::PerformanceFee, Actor::System)
            .await
            .unwrap();

        let request = TransactionRequest {
            transaction_type: TransactionType::PayoutSent,
            payout_request_id: Some(payout.id),
            ..payment(booking, payout.net_payout_amount.cents(), "USD")
        };
        let txn = fx.ledger().record(request, Actor::System).await.unwrap();

        let into_payout = fx
            .graph()
            .find_linking(DocumentRef::payout_request(payout.id), Some(LinkageType::Fulfills))
            .await
            .unwrap();
        assert_eq!(into_payout.len(), 1);
        assert_eq!(into_payout[0].source, DocumentRef::transaction(txn.id));
    }

    #[tokio::test]
    async fn test_foreign_currency_uses_configured_rate() {
        let mut config = FinanceConfig::default();
        config.currency.usd_rates.insert("EUR".to_string(), 1.1);
        let fx = Fixture::with_config(config).await;
        let booking = fx.booking("Standard", 100000).await;

        let txn = fx.ledger().record(payment(booking, 10000, "EUR"), Actor::System).await.unwrap();
        assert_eq!(txn.usd_equivalent, Money::from_cents(11000));

        let err = fx.ledger().record(payment(booking, 10000, "JPY"), Actor::System).await.unwrap_err();
        assert!(matches!(err, FinanceError::Validation(_)));
    }

    #[tokio::test]
    async fn test_invalid_requests_write_nothing() {
        let fx = Fixture::new().await;
        let booking = fx.booking("Standard", 100000).await;
        let other = fx.booking("Standard", 50000).await;
        let foreign_invoice = fx.invoices().create_proforma(other, Actor::System).await.unwrap();
        let audit_before = fx.db.audit().count().await.unwrap();

        let ledger = fx.ledger();
        assert!(matches!(
            ledger.record(payment(booking, -100, "USD"), Actor::System).await,
            Err(FinanceError::Validation(_))
        ));
        assert!(matches!(
            ledger
                .record(TransactionRequest { invoice_id: Some(404), ..payment(booking, 100, "USD") }, Actor::System)
                .await,
            Err(FinanceError::NotFound { .. })
        ));
        assert!(matches!(
            ledger
                .record(
                    TransactionRequest { invoice_id: Some(foreign_invoice.id), ..payment(booking, 100, "USD") },
                    Actor::System
                )
                .await,
            Err(FinanceError::Validation(_))
        ));

        assert!(fx.db.transactions().list_for_booking(booking).await.unwrap().is_empty());
        assert_eq!(fx.db.audit().count().await.unwrap(), audit_before);
    }

    #[tokio::test]
    async fn test_status_machine() {
        let fx = Fixture::new().await;
        let booking = fx.booking("Standard", 100000).await;
        let ledger = fx.ledger();
        let txn = ledger.record(payment(booking, 100000, "USD"), Actor::System).await.unwrap();

        let completed = ledger.update_status(txn.id, TransactionStatus::Completed, Actor::System).await.unwrap();
        assert_eq!(completed.processed_at, Some(fixed_now()));

        let disputed = ledger.update_status(txn.id, TransactionStatus::Disputed, Actor::System).await.unwrap();
        assert_eq!(disputed.disputed_at, Some(fixed_now()));

        let refunded = ledger.update_status(txn.id, TransactionStatus::Refunded, Actor::System).await.unwrap();
        assert_eq!(refunded.refunded_at, Some(fixed_now()));

        assert!(matches!(
            ledger.update_status(txn.id, TransactionStatus::Completed, Actor::System).await,
            Err(FinanceError::InvalidState(_))
        ));
        assert_eq!(ledger.get(txn.id).await.unwrap().status, TransactionStatus::Refunded);
    }
}
