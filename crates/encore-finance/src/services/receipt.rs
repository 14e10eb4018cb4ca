//! # Receipt Service
//!
//! Issues a receipt for a recorded payment and ties it to the contracts
//! the payment settles.

use std::sync::Arc;

use tracing::{debug, info};

use encore_core::audit::AuditRecord;
use encore_core::booking::ContractRecord;
use encore_core::linkage::{DocumentLinkage, NewLinkage};
use encore_core::numbering::NumberSeries;
use encore_core::receipt::{Receipt, ReceiptDraft};
use encore_core::types::{Actor, AuditAction, DocumentRef, LinkageType};
use encore_core::RenderTarget;
use encore_db::repository::receipt;
use sqlx::SqliteConnection;

use crate::error::{FinanceError, FinanceResult};
use crate::ports::{BookingStore, ContractStore, PaymentStore, UserStore};
use crate::services::{
    numbered_insert, snapshot, AuditLog, DocumentLinkageGraph, NumberingAuthority, ServiceContext,
};

#[derive(Clone)]
pub struct ReceiptService {
    ctx: ServiceContext,
    bookings: Arc<dyn BookingStore>,
    users: Arc<dyn UserStore>,
    payments: Arc<dyn PaymentStore>,
    contracts: Arc<dyn ContractStore>,
}

impl ReceiptService {
    pub fn new(
        ctx: ServiceContext,
        bookings: Arc<dyn BookingStore>,
        users: Arc<dyn UserStore>,
        payments: Arc<dyn PaymentStore>,
        contracts: Arc<dyn ContractStore>,
    ) -> Self {
        ReceiptService {
            ctx,
            bookings,
            users,
            payments,
            contracts,
        }
    }

    /// Issues a receipt for `payment_id` and links it to each contract.
    ///
    /// ## Errors
    /// - [`FinanceError::NotFound`] for an unknown booking, payment or contract
    /// - [`FinanceError::Validation`] when the payment or a contract belongs
    ///   to another booking
    pub async fn issue(
        &self,
        booking_id: i64,
        payment_id: i64,
        contract_ids: &[i64],
        actor: Actor,
    ) -> FinanceResult<Receipt> {
        self.ctx
            .bounded("issue receipt", async {
                let booking = self.bookings.get_booking(booking_id).await?;
                let payment = self.payments.get_payment(payment_id).await?;
                if payment.booking_id != booking.id {
                    return Err(FinanceError::Validation(format!(
                        "Payment {} belongs to booking {}, not {}",
                        payment.id, payment.booking_id, booking.id
                    )));
                }

                let mut contracts = Vec::with_capacity(contract_ids.len());
                for &id in contract_ids {
                    let contract = self.contracts.get_contract(id).await?;
                    ensure_contract_of(&contract, booking.id)?;
                    contracts.push(contract);
                }

                let booker_name = match booking.booker_user_id {
                    Some(id) => match self.users.get_user(id).await {
                        Ok(user) => Some(user.full_name),
                        Err(FinanceError::NotFound { .. }) => None,
                        Err(e) => return Err(e),
                    },
                    None => None,
                };

                let now = self.ctx.now();
                let draft = ReceiptDraft::for_payment(&booking, &payment, booker_name.as_deref(), now)?;

                let mut uow = self.ctx.db.begin().await?;
                let number = NumberingAuthority::issue(uow.conn(), NumberSeries::Receipt, now).await?;
                let issued = receipt::insert(uow.conn(), &draft, &number, now)
                    .await
                    .map_err(numbered_insert)?;
                let this = DocumentRef::receipt(issued.id);

                DocumentLinkageGraph::link_in(
                    uow.conn(),
                    &NewLinkage::new(DocumentRef::booking(booking.id), LinkageType::Generates, this, actor)
                        .describe(format!("Payment {} generated receipt {}", payment.id, number)),
                    now,
                )
                .await?;

                AuditLog::record(
                    uow.conn(),
                    &AuditRecord::new(
                        this,
                        AuditAction::Created,
                        actor,
                        format!(
                            "Issued receipt {} for payment {} on booking {}",
                            number, payment.id, booking.id
                        ),
                    )
                    .new_values(snapshot(&issued)),
                    now,
                )
                .await?;

                for contract in &contracts {
                    Self::fulfils(uow.conn(), &issued, contract, actor, now).await?;
                }

                uow.commit().await?;

                info!(
                    id = issued.id,
                    number = %issued.receipt_number,
                    booking_id,
                    payment_id,
                    contracts = contracts.len(),
                    total = %issued.total,
                    "Receipt issued"
                );
                self.ctx.request_render(RenderTarget::Receipt(issued.id));
                Ok(issued)
            })
            .await
    }

    /// Links an existing receipt to a contract it fulfils.
    pub async fn link_receipt_to_contract(
        &self,
        receipt_id: i64,
        contract_id: i64,
        actor: Actor,
    ) -> FinanceResult<DocumentLinkage> {
        self.ctx
            .bounded("link receipt to contract", async {
                let contract = self.contracts.get_contract(contract_id).await?;

                let now = self.ctx.now();
                let mut uow = self.ctx.db.begin().await?;
                let issued = receipt::fetch_by_id(&mut *uow.conn(), receipt_id)
                    .await?
                    .ok_or_else(|| FinanceError::not_found("Receipt", receipt_id))?;
                ensure_contract_of(&contract, issued.booking_id)?;

                let edge = Self::fulfils(uow.conn(), &issued, &contract, actor, now).await?;
                uow.commit().await?;

                info!(receipt_id, contract_id, edge = edge.id, "Receipt linked to contract");
                Ok(edge)
            })
            .await
    }

    async fn fulfils(
        conn: &mut SqliteConnection,
        issued: &Receipt,
        contract: &ContractRecord,
        actor: Actor,
        now: chrono::DateTime<chrono::Utc>,
    ) -> FinanceResult<DocumentLinkage> {
        debug!(receipt = %issued.receipt_number, contract_id = contract.id, "Linking receipt to contract");
        DocumentLinkageGraph::link_audited(
            conn,
            &NewLinkage::new(
                DocumentRef::receipt(issued.id),
                LinkageType::Fulfills,
                DocumentRef::contract(contract.id),
                actor,
            )
            .describe(format!(
                "Receipt fulfills {} contract obligations",
                contract.contract_type
            )),
            now,
        )
        .await
    }

    pub async fn get(&self, receipt_id: i64) -> FinanceResult<Receipt> {
        self.ctx
            .db
            .receipts()
            .get_by_id(receipt_id)
            .await?
            .ok_or_else(|| FinanceError::not_found("Receipt", receipt_id))
    }
}

fn ensure_contract_of(contract: &ContractRecord, booking_id: i64) -> FinanceResult<()> {
    if contract.booking_id != booking_id {
        return Err(FinanceError::Validation(format!(
            "Contract {} belongs to booking {}, not {}",
            contract.id, contract.booking_id, booking_id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{fixed_now, Fixture};
    use encore_core::types::DocumentType;
    use encore_core::Money;
    use serde_json::json;

    #[tokio::test]
    async fn test_receipt_for_payment_with_contracts() {
        let fx = Fixture::new().await;
        let booking = fx.booking("Standard", 100000).await;
        let payment = fx.payment(booking, 54000).await;
        let first = fx.contract(booking, None, json!({})).await;
        let second = fx.contract(booking, None, json!({})).await;

        let issued = fx.receipts().issue(booking, payment, &[first, second], Actor::User(3)).await.unwrap();

        assert_eq!(issued.receipt_number, "REC-2026-000001");
        assert_eq!(issued.total, Money::from_cents(54000));
        assert_eq!(issued.tax, Money::zero());
        assert_eq!(issued.recipient_name, "Ada Lovelace");
        assert_eq!(issued.items.len(), 1);
        assert_eq!(issued.items[0].description, "Payment for Spring Gala");
        assert_eq!(issued.items[0].date, fixed_now());

        let fulfils = fx
            .graph()
            .find_linked(DocumentRef::receipt(issued.id), Some(LinkageType::Fulfills))
            .await
            .unwrap();
        assert_eq!(fulfils.len(), 2);
        assert_eq!(fulfils[0].linked, DocumentRef::contract(first));
        assert_eq!(
            fulfils[0].description.as_deref(),
            Some("Receipt fulfills performance_agreement contract obligations")
        );

        let generated = fx.graph().find_linking(DocumentRef::receipt(issued.id), Some(LinkageType::Generates)).await.unwrap();
        assert_eq!(generated.len(), 1);
        assert_eq!(generated[0].source, DocumentRef::booking(booking));

        // One entry for the receipt, one per contract edge.
        assert_eq!(fx.audit().for_entity(DocumentRef::receipt(issued.id)).await.unwrap().len(), 1);
        let edge_history = fx
            .audit()
            .for_entity(DocumentRef::new(DocumentType::DocumentLinkage, fulfils[1].id))
            .await
            .unwrap();
        assert_eq!(edge_history.len(), 1);
        assert_eq!(edge_history[0].action, AuditAction::Linked);
    }

    #[tokio::test]
    async fn test_missing_records_fail_before_numbering() {
        let fx = Fixture::new().await;
        let booking = fx.booking("Standard", 100000).await;
        let payment = fx.payment(booking, 1000).await;
        let service = fx.receipts();

        assert!(matches!(service.issue(404, payment, &[], Actor::System).await, Err(FinanceError::NotFound { .. })));
        assert!(matches!(service.issue(booking, 404, &[], Actor::System).await, Err(FinanceError::NotFound { .. })));
        assert!(matches!(
            service.issue(booking, payment, &[404], Actor::System).await,
            Err(FinanceError::NotFound { .. })
        ));

        let other = fx.booking("Standard", 100000).await;
        let foreign_payment = fx.payment(other, 1000).await;
        assert!(matches!(
            service.issue(booking, foreign_payment, &[], Actor::System).await,
            Err(FinanceError::Validation(_))
        ));

        assert_eq!(fx.db.sequences().current("REC", "2026").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_link_existing_receipt() {
        let fx = Fixture::new().await;
        let booking = fx.booking("Standard", 100000).await;
        let payment = fx.payment(booking, 1000).await;
        let contract = fx.contract(booking, None, json!({})).await;
        let service = fx.receipts();
        let issued = service.issue(booking, payment, &[], Actor::System).await.unwrap();

        let edge = service.link_receipt_to_contract(issued.id, contract, Actor::User(2)).await.unwrap();
        assert_eq!(edge.source, DocumentRef::receipt(issued.id));
        assert_eq!(edge.linked, DocumentRef::contract(contract));
        assert_eq!(edge.created_by, Actor::User(2));

        assert!(matches!(
            service.link_receipt_to_contract(404, contract, Actor::System).await,
            Err(FinanceError::NotFound { .. })
        ));
    }
}
