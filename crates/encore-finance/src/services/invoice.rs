//! # Invoice Service
//!
//! Booking invoices (proforma and acceptance deposit), performer invoices,
//! the proforma → final conversion and invoice status changes.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  preview(booking)          ── draft only, nothing written              │
//! │                                                                         │
//! │  create_proforma(booking) ──► PRO-2026-000042 ──convert──► INV-2026-…  │
//! │                                  (same id, edges and history kept)    │
//! │                                                                         │
//! │  booking accepted ──────────► INV-2026-…  booking_deposit              │
//! │                                                                         │
//! │  contract signed ───────────► INV-17-42-00001  final, untaxed          │
//! │                                                                         │
//! │  mark_paid: pending → paid        cancel: draft|pending → cancelled    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info};

use encore_core::audit::AuditRecord;
use encore_core::booking::UserProfile;
use encore_core::invoice::{BookingInvoiceKind, Invoice, InvoiceDraft, InvoiceStatus};
use encore_core::linkage::NewLinkage;
use encore_core::numbering::NumberSeries;
use encore_core::types::{Actor, AuditAction, DocumentRef, LinkageType};
use encore_core::RenderTarget;
use encore_db::repository::invoice;

use crate::error::{FinanceError, FinanceResult};
use crate::ports::{BookingStore, ContractStore, UserStore};
use crate::services::{
    lost_race, numbered_insert, snapshot, AuditLog, DocumentLinkageGraph, NumberingAuthority,
    ServiceContext,
};

#[derive(Clone)]
pub struct InvoiceService {
    ctx: ServiceContext,
    bookings: Arc<dyn BookingStore>,
    users: Arc<dyn UserStore>,
    contracts: Arc<dyn ContractStore>,
}

impl InvoiceService {
    pub fn new(
        ctx: ServiceContext,
        bookings: Arc<dyn BookingStore>,
        users: Arc<dyn UserStore>,
        contracts: Arc<dyn ContractStore>,
    ) -> Self {
        InvoiceService {
            ctx,
            bookings,
            users,
            contracts,
        }
    }

    // =========================================================================
    // Booking Invoices
    // =========================================================================

    /// Drafts the proforma a booking would get, without writing anything.
    pub async fn preview(&self, booking_id: i64) -> FinanceResult<InvoiceDraft> {
        self.draft_for_booking(booking_id, BookingInvoiceKind::Preview, Actor::System)
            .await
    }

    pub async fn create_proforma(&self, booking_id: i64, actor: Actor) -> FinanceResult<Invoice> {
        self.ctx
            .bounded(
                "create proforma invoice",
                self.create_for_booking(booking_id, BookingInvoiceKind::Proforma, actor),
            )
            .await
    }

    /// Raises the deposit invoice for a booking that was just accepted.
    pub async fn create_from_booking_acceptance(
        &self,
        booking_id: i64,
        actor: Actor,
    ) -> FinanceResult<Invoice> {
        self.ctx
            .bounded(
                "create acceptance invoice",
                self.create_for_booking(booking_id, BookingInvoiceKind::AcceptanceDeposit, actor),
            )
            .await
    }

    async fn draft_for_booking(
        &self,
        booking_id: i64,
        kind: BookingInvoiceKind,
        actor: Actor,
    ) -> FinanceResult<InvoiceDraft> {
        let booking = self.bookings.get_booking(booking_id).await?;
        let booker = self.booker(booking.booker_user_id).await?;
        Ok(InvoiceDraft::for_booking(
            &booking,
            booker.as_ref(),
            &self.ctx.config.invoice_policy(),
            kind,
            actor,
            self.ctx.now(),
        )?)
    }

    /// A booker that no longer exists falls back to the generic recipient.
    async fn booker(&self, booker_user_id: Option<i64>) -> FinanceResult<Option<UserProfile>> {
        let Some(id) = booker_user_id else {
            return Ok(None);
        };
        match self.users.get_user(id).await {
            Ok(user) => Ok(Some(user)),
            Err(FinanceError::NotFound { .. }) => {
                debug!(booker_user_id = id, "Booker not found, using default recipient");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn create_for_booking(
        &self,
        booking_id: i64,
        kind: BookingInvoiceKind,
        actor: Actor,
    ) -> FinanceResult<Invoice> {
        let draft = self.draft_for_booking(booking_id, kind, actor).await?;
        let now = self.ctx.now();

        let mut uow = self.ctx.db.begin().await?;
        let number = NumberingAuthority::issue(uow.conn(), kind.series(), now).await?;
        let created = invoice::insert(uow.conn(), &draft, &number, now)
            .await
            .map_err(numbered_insert)?;

        DocumentLinkageGraph::link_in(
            uow.conn(),
            &NewLinkage::new(
                DocumentRef::booking(booking_id),
                LinkageType::Generates,
                DocumentRef::invoice(created.id),
                actor,
            )
            .describe(format!(
                "Booking generated {} invoice {}",
                created.invoice_type(),
                created.invoice_number
            )),
            now,
        )
        .await?;

        AuditLog::record(
            uow.conn(),
            &AuditRecord::new(
                DocumentRef::invoice(created.id),
                AuditAction::Created,
                actor,
                format!(
                    "Created {} invoice {} for booking {}",
                    created.invoice_type(),
                    created.invoice_number,
                    booking_id
                ),
            )
            .new_values(snapshot(&created)),
            now,
        )
        .await?;

        uow.commit().await?;

        info!(
            id = created.id,
            number = %created.invoice_number,
            booking_id,
            invoice_type = %created.invoice_type(),
            total = %created.total,
            "Invoice created"
        );
        self.ctx.request_render(RenderTarget::Invoice(created.id));
        Ok(created)
    }

    // =========================================================================
    // Conversion
    // =========================================================================

    /// Converts a proforma into a final invoice in place.
    ///
    /// The returned invoice has the same id. Its number moves from the `PRO`
    /// series to the `INV` series.
    ///
    /// ## Errors
    /// - [`FinanceError::NotFound`] for an unknown id
    /// - [`FinanceError::InvalidState`] unless the invoice is a draft or
    ///   pending proforma, including a second conversion of the same invoice
    pub async fn convert_proforma_to_final(
        &self,
        invoice_id: i64,
        actor: Actor,
    ) -> FinanceResult<Invoice> {
        self.ctx
            .bounded("convert proforma invoice", async {
                let now = self.ctx.now();
                let mut uow = self.ctx.db.begin().await?;

                let current = invoice::fetch_by_id(&mut *uow.conn(), invoice_id)
                    .await?
                    .ok_or_else(|| FinanceError::not_found("Invoice", invoice_id))?;

                let number = NumberingAuthority::issue(uow.conn(), NumberSeries::Invoice, now).await?;
                let converted = current.convert_to_final(number, actor, now)?;

                if !invoice::convert_to_final(uow.conn(), &converted)
                    .await
                    .map_err(numbered_insert)?
                {
                    return Err(lost_race("Invoice", invoice_id));
                }

                AuditLog::record(
                    uow.conn(),
                    &AuditRecord::new(
                        DocumentRef::invoice(invoice_id),
                        AuditAction::Converted,
                        actor,
                        format!(
                            "Converted proforma {} to final invoice {}",
                            current.invoice_number, converted.invoice_number
                        ),
                    )
                    .previous(snapshot(&current))
                    .new_values(json!({
                        "newInvoiceNumber": converted.invoice_number,
                        "newType": converted.invoice_type(),
                    })),
                    now,
                )
                .await?;

                uow.commit().await?;

                info!(
                    id = invoice_id,
                    from = %current.invoice_number,
                    to = %converted.invoice_number,
                    "Proforma converted to final"
                );
                self.ctx.request_render(RenderTarget::Invoice(invoice_id));
                Ok(converted)
            })
            .await
    }

    // =========================================================================
    // Performer Invoices
    // =========================================================================

    /// Raises the invoice a performer's signed contract entitles them to.
    ///
    /// ## Errors
    /// - [`FinanceError::NotFound`] for an unknown contract, booking or performer
    /// - [`FinanceError::Validation`] when the contract has no assigned
    ///   performer or no price for them
    pub async fn create_performer_invoice(
        &self,
        contract_id: i64,
        actor: Actor,
    ) -> FinanceResult<Invoice> {
        self.ctx
            .bounded("create performer invoice", async {
                let contract = self.contracts.get_contract(contract_id).await?;
                let (performer_id, _) = contract.performer_fee()?;
                let booking = self.bookings.get_booking(contract.booking_id).await?;
                let performer = self.users.get_user(performer_id).await?;

                let now = self.ctx.now();
                let issuer = self.ctx.config.issuer();
                let draft =
                    InvoiceDraft::for_performer(&contract, &booking, &performer, &issuer, actor, now)?;
                let series = NumberSeries::PerformerInvoice {
                    performer_id,
                    booking_id: booking.id,
                };

                let mut uow = self.ctx.db.begin().await?;
                let number = NumberingAuthority::issue(uow.conn(), series, now).await?;
                let created = invoice::insert(uow.conn(), &draft, &number, now)
                    .await
                    .map_err(numbered_insert)?;

                let target = DocumentRef::invoice(created.id);
                DocumentLinkageGraph::link_in(
                    uow.conn(),
                    &NewLinkage::new(DocumentRef::contract(contract_id), LinkageType::Generates, target, actor)
                        .describe(format!("Signed contract generated performer invoice {}", number)),
                    now,
                )
                .await?;
                DocumentLinkageGraph::link_in(
                    uow.conn(),
                    &NewLinkage::new(DocumentRef::booking(booking.id), LinkageType::Generates, target, actor)
                        .describe(format!("Booking generated performer invoice {}", number)),
                    now,
                )
                .await?;

                AuditLog::record(
                    uow.conn(),
                    &AuditRecord::new(
                        target,
                        AuditAction::Created,
                        actor,
                        format!(
                            "Created performer invoice {} for performer {} on booking {}",
                            number, performer_id, booking.id
                        ),
                    )
                    .new_values(snapshot(&created)),
                    now,
                )
                .await?;

                uow.commit().await?;

                info!(
                    id = created.id,
                    number = %created.invoice_number,
                    contract_id,
                    performer_id,
                    total = %created.total,
                    "Performer invoice created"
                );
                self.ctx.request_render(RenderTarget::Invoice(created.id));
                Ok(created)
            })
            .await
    }

    // =========================================================================
    // Status
    // =========================================================================

    pub async fn mark_paid(&self, invoice_id: i64, actor: Actor) -> FinanceResult<Invoice> {
        self.ctx
            .bounded("mark invoice paid", self.change_status(invoice_id, InvoiceStatus::Paid, actor))
            .await
    }

    pub async fn cancel(&self, invoice_id: i64, actor: Actor) -> FinanceResult<Invoice> {
        self.ctx
            .bounded("cancel invoice", self.change_status(invoice_id, InvoiceStatus::Cancelled, actor))
            .await
    }

    async fn change_status(
        &self,
        invoice_id: i64,
        to: InvoiceStatus,
        actor: Actor,
    ) -> FinanceResult<Invoice> {
        let now = self.ctx.now();
        let mut uow = self.ctx.db.begin().await?;

        let current = invoice::fetch_by_id(&mut *uow.conn(), invoice_id)
            .await?
            .ok_or_else(|| FinanceError::not_found("Invoice", invoice_id))?;
        let next = current.with_status(to, now)?;

        if !invoice::update_status(uow.conn(), &next, current.status).await? {
            return Err(lost_race("Invoice", invoice_id));
        }

        AuditLog::record(
            uow.conn(),
            &AuditRecord::new(
                DocumentRef::invoice(invoice_id),
                AuditAction::StatusChanged,
                actor,
                format!(
                    "Invoice {} moved from {} to {}",
                    current.invoice_number, current.status, next.status
                ),
            )
            .previous(json!({ "status": current.status }))
            .new_values(json!({ "status": next.status, "paidAt": next.paid_at })),
            now,
        )
        .await?;

        uow.commit().await?;

        info!(id = invoice_id, number = %next.invoice_number, status = %next.status, "Invoice status changed");
        Ok(next)
    }

    // =========================================================================
    // Rendering
    // =========================================================================

    /// Queues a PDF render. Never fails because of the renderer.
    pub async fn request_render(&self, invoice_id: i64) -> FinanceResult<()> {
        self.get(invoice_id).await?;
        self.ctx.request_render(RenderTarget::Invoice(invoice_id));
        Ok(())
    }

    pub async fn get(&self, invoice_id: i64) -> FinanceResult<Invoice> {
        self.ctx
            .db
            .invoices()
            .get_by_id(invoice_id)
            .await?
            .ok_or_else(|| FinanceError::not_found("Invoice", invoice_id))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{fixed_now, Fixture};
    use chrono::Duration;
    use encore_core::invoice::{InvoiceStage, InvoiceType, PaymentTerms};
    use encore_core::types::TriggeredBy;
    use encore_core::Money;

    #[tokio::test]
    async fn test_standard_booking_proforma() {
        let fx = Fixture::new().await;
        let booking = fx.booking("Standard", 100000).await;

        let inv = fx.invoices().create_proforma(booking, Actor::User(5)).await.unwrap();

        assert_eq!(inv.invoice_number, "PRO-2026-000001");
        assert_eq!(inv.invoice_type(), InvoiceType::Proforma);
        assert_eq!(inv.status, InvoiceStatus::Pending);
        assert_eq!(inv.total.to_string(), "1080.00");
        assert_eq!(inv.tax, Money::from_cents(8000));
        assert_eq!(inv.payment_terms, PaymentTerms::DueOnReceipt);
        assert_eq!(inv.due_date, fixed_now() + Duration::days(7));
        assert_eq!(inv.triggered_by, TriggeredBy::Manual);
        assert_eq!(inv.triggered_by_user_id, Some(5));
        assert_eq!(inv.line_items.len(), 1);
        assert_eq!(inv.line_items[0].description, "Standard Performance - Spring Gala");
        assert_eq!(inv.recipient.name, "Ada Lovelace");
        assert_eq!(inv.issuer.name, "Wai'tuMusic");

        let edges = fx.graph().find_linked(DocumentRef::booking(booking), Some(LinkageType::Generates)).await.unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].linked, DocumentRef::invoice(inv.id));

        let history = fx.audit().for_entity(DocumentRef::invoice(inv.id)).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].action, AuditAction::Created);
        assert_eq!(history[0].new_values.as_ref().unwrap()["invoice_number"], "PRO-2026-000001");
    }

    #[tokio::test]
    async fn test_corporate_booking_gets_net_30() {
        let fx = Fixture::new().await;
        let booking = fx.booking("corporate", 500000).await;

        let inv = fx.invoices().create_from_booking_acceptance(booking, Actor::System).await.unwrap();

        assert_eq!(inv.invoice_number, "INV-2026-000001");
        assert_eq!(inv.invoice_type(), InvoiceType::BookingDeposit);
        assert_eq!(inv.total.to_string(), "5400.00");
        assert_eq!(inv.payment_terms, PaymentTerms::Net30);
        assert_eq!(inv.due_date, fixed_now() + Duration::days(30));
        assert_eq!(inv.triggered_by, TriggeredBy::BookingAcceptance);
        assert_eq!(inv.triggered_by_user_id, None);
    }

    #[tokio::test]
    async fn test_event_type_match_is_case_sensitive() {
        let fx = Fixture::new().await;
        let booking = fx.booking("Corporate", 100000).await;

        let inv = fx.invoices().create_proforma(booking, Actor::System).await.unwrap();

        assert_eq!(inv.payment_terms, PaymentTerms::DueOnReceipt);
        assert_eq!(inv.due_date, fixed_now() + Duration::days(7));
    }

    #[tokio::test]
    async fn test_preview_writes_nothing() {
        let fx = Fixture::new().await;
        let booking = fx.booking("Standard", 100000).await;

        let draft = fx.invoices().preview(booking).await.unwrap();
        assert_eq!(draft.status, InvoiceStatus::Draft);
        assert_eq!(draft.stage, InvoiceStage::Proforma);
        assert_eq!(draft.totals.total.to_string(), "1080.00");

        assert!(fx.db.invoices().list_for_booking(booking).await.unwrap().is_empty());
        assert_eq!(fx.db.audit().count().await.unwrap(), 0);
        assert_eq!(fx.db.sequences().current("PRO", "2026").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_missing_booking_is_not_found() {
        let fx = Fixture::new().await;
        let err = fx.invoices().create_proforma(999, Actor::System).await.unwrap_err();
        assert!(matches!(err, FinanceError::NotFound { .. }));
        assert_eq!(fx.db.sequences().current("PRO", "2026").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_conversion_preserves_identity() {
        let fx = Fixture::new().await;
        let booking = fx.booking("Standard", 100000).await;
        let service = fx.invoices();
        let proforma = service.create_proforma(booking, Actor::User(5)).await.unwrap();

        let converted = service.convert_proforma_to_final(proforma.id, Actor::User(6)).await.unwrap();

        assert_eq!(converted.id, proforma.id);
        assert!(converted.invoice_number.starts_with("INV-"));
        assert_eq!(converted.invoice_type(), InvoiceType::Final);
        assert_eq!(converted.converted_at(), Some(fixed_now()));
        assert_eq!(converted.triggered_by, TriggeredBy::ProformaAcceptance);
        assert_eq!(converted.total, proforma.total);

        let stored = service.get(proforma.id).await.unwrap();
        assert_eq!(stored.invoice_number, converted.invoice_number);
        assert_eq!(stored.invoice_type(), InvoiceType::Final);

        // The booking edge still points at the same row.
        let edges = fx.graph().find_linked(DocumentRef::booking(booking), None).await.unwrap();
        assert_eq!(edges[0].linked, DocumentRef::invoice(proforma.id));

        let history = fx.audit().for_entity(DocumentRef::invoice(proforma.id)).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].action, AuditAction::Converted);
        assert_eq!(history[1].previous_values.as_ref().unwrap()["invoice_number"], "PRO-2026-000001");
        assert_eq!(history[1].new_values.as_ref().unwrap()["newInvoiceNumber"], converted.invoice_number.as_str());
        assert_eq!(history[1].new_values.as_ref().unwrap()["newType"], "final");
    }

    #[tokio::test]
    async fn test_second_conversion_fails_without_side_effects() {
        let fx = Fixture::new().await;
        let booking = fx.booking("Standard", 100000).await;
        let service = fx.invoices();
        let proforma = service.create_proforma(booking, Actor::System).await.unwrap();
        service.convert_proforma_to_final(proforma.id, Actor::System).await.unwrap();

        let err = service.convert_proforma_to_final(proforma.id, Actor::System).await.unwrap_err();
        assert!(matches!(err, FinanceError::InvalidState(_)));

        // No number consumed and no audit entry for the failed attempt.
        assert_eq!(fx.db.sequences().current("INV", "2026").await.unwrap(), Some(1));
        assert_eq!(fx.audit().for_entity(DocumentRef::invoice(proforma.id)).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_deposit_and_cancelled_proforma_cannot_convert() {
        let fx = Fixture::new().await;
        let booking = fx.booking("Standard", 100000).await;
        let service = fx.invoices();

        let deposit = service.create_from_booking_acceptance(booking, Actor::System).await.unwrap();
        assert!(matches!(
            service.convert_proforma_to_final(deposit.id, Actor::System).await,
            Err(FinanceError::InvalidState(_))
        ));

        let proforma = service.create_proforma(booking, Actor::System).await.unwrap();
        service.cancel(proforma.id, Actor::System).await.unwrap();
        assert!(matches!(
            service.convert_proforma_to_final(proforma.id, Actor::System).await,
            Err(FinanceError::InvalidState(_))
        ));

        assert!(matches!(
            service.convert_proforma_to_final(404, Actor::System).await,
            Err(FinanceError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_performer_invoice_from_contract() {
        let fx = Fixture::new().await;
        let booking = fx.booking("Standard", 100000).await;
        let performer = fx.user("Miles Davis").await;
        let contract = fx.contract(booking, Some(performer), json!({ "individualPricing": { performer.to_string(): 1500 } })).await;

        let inv = fx.invoices().create_performer_invoice(contract, Actor::User(5)).await.unwrap();

        assert_eq!(inv.invoice_number, format!("INV-{}-{}-00001", performer, booking));
        assert_eq!(inv.invoice_type(), InvoiceType::Final);
        assert_eq!(inv.converted_at(), None);
        assert_eq!(inv.total, Money::from_cents(150000));
        assert_eq!(inv.tax, Money::zero());
        assert_eq!(inv.payment_terms, PaymentTerms::Net30);
        assert_eq!(inv.recipient.name, "Miles Davis");
        assert_eq!(inv.triggered_by, TriggeredBy::ContractSignature);
        assert_eq!(
            inv.line_items[0].description,
            format!("Performance Fee for Booking #{} (Spring Gala)", booking)
        );

        let second = fx.invoices().create_performer_invoice(contract, Actor::User(5)).await.unwrap();
        assert_eq!(second.invoice_number, format!("INV-{}-{}-00002", performer, booking));

        let from_contract = fx.graph().find_linked(DocumentRef::contract(contract), None).await.unwrap();
        assert_eq!(from_contract.len(), 2);
        let into_invoice = fx.graph().find_linking(DocumentRef::invoice(inv.id), None).await.unwrap();
        assert_eq!(into_invoice.len(), 2);
        assert_eq!(fx.audit().for_entity(DocumentRef::invoice(inv.id)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_performer_invoice_requires_a_price() {
        let fx = Fixture::new().await;
        let booking = fx.booking("Standard", 100000).await;
        let performer = fx.user("Miles Davis").await;

        let unpriced = fx.contract(booking, Some(performer), json!({ "individualPricing": {} })).await;
        assert!(matches!(
            fx.invoices().create_performer_invoice(unpriced, Actor::System).await,
            Err(FinanceError::Validation(_))
        ));

        let unassigned = fx.contract(booking, None, json!({})).await;
        assert!(matches!(
            fx.invoices().create_performer_invoice(unassigned, Actor::System).await,
            Err(FinanceError::Validation(_))
        ));

        assert!(matches!(
            fx.invoices().create_performer_invoice(404, Actor::System).await,
            Err(FinanceError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_status_transitions_are_audited() {
        let fx = Fixture::new().await;
        let booking = fx.booking("Standard", 100000).await;
        let service = fx.invoices();
        let inv = service.create_from_booking_acceptance(booking, Actor::System).await.unwrap();

        let paid = service.mark_paid(inv.id, Actor::User(2)).await.unwrap();
        assert_eq!(paid.status, InvoiceStatus::Paid);
        assert_eq!(paid.paid_at, Some(fixed_now()));

        assert!(matches!(service.cancel(inv.id, Actor::User(2)).await, Err(FinanceError::InvalidState(_))));
        assert!(matches!(service.mark_paid(inv.id, Actor::User(2)).await, Err(FinanceError::InvalidState(_))));

        let history = fx.audit().for_entity(DocumentRef::invoice(inv.id)).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].action, AuditAction::StatusChanged);
        assert_eq!(history[1].previous_values.as_ref().unwrap()["status"], "pending");
        assert_eq!(history[1].new_values.as_ref().unwrap()["status"], "paid");
    }

    #[tokio::test]
    async fn test_request_render_checks_the_invoice_exists() {
        let fx = Fixture::new().await;
        assert!(matches!(fx.invoices().request_render(1).await, Err(FinanceError::NotFound { .. })));

        let booking = fx.booking("Standard", 100000).await;
        let inv = fx.invoices().create_proforma(booking, Actor::System).await.unwrap();
        fx.invoices().request_render(inv.id).await.unwrap();
    }
}
