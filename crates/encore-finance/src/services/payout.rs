//! # Payout Service
//!
//! Creates payout requests for the performers of a completed booking and
//! moves them through approval.
//!
//! ```text
//! pending ──approve──► approved ──mark_processed──► processed ──mark_paid──► paid
//!    │                    │
//!    └──────decline───────┴──► declined
//! ```
//!
//! The split is fixed when the request is created: base is a share of the
//! booking total, commission a share of the base, net what remains.

use std::sync::Arc;

use serde_json::json;
use tracing::info;

use encore_core::audit::AuditRecord;
use encore_core::linkage::NewLinkage;
use encore_core::numbering::NumberSeries;
use encore_core::payout::{PayoutDraft, PayoutRequest, PayoutRequestType, PayoutTransition};
use encore_core::types::{Actor, AuditAction, DocumentRef, LinkageType};
use encore_db::repository::payout;

use crate::error::{FinanceError, FinanceResult};
use crate::ports::{BookingStore, UserStore};
use crate::services::{
    lost_race, numbered_insert, snapshot, AuditLog, DocumentLinkageGraph, NumberingAuthority,
    ServiceContext,
};

#[derive(Clone)]
pub struct PayoutService {
    ctx: ServiceContext,
    bookings: Arc<dyn BookingStore>,
    users: Arc<dyn UserStore>,
}

impl PayoutService {
    pub fn new(
        ctx: ServiceContext,
        bookings: Arc<dyn BookingStore>,
        users: Arc<dyn UserStore>,
    ) -> Self {
        PayoutService {
            ctx,
            bookings,
            users,
        }
    }

    /// Creates the payout one performer is owed for a completed booking.
    ///
    /// ## Errors
    /// - [`FinanceError::NotFound`] for an unknown booking or performer
    /// - [`FinanceError::NumberGeneration`] if no number could be issued
    pub async fn create_on_completion(
        &self,
        booking_id: i64,
        performer_user_id: i64,
        request_type: PayoutRequestType,
        actor: Actor,
    ) -> FinanceResult<PayoutRequest> {
        self.ctx
            .bounded("create payout request", async {
                let booking = self.bookings.get_booking(booking_id).await?;
                let performer = self.users.get_user(performer_user_id).await?;
                let draft = PayoutDraft::on_completion(
                    &booking,
                    performer.id,
                    request_type,
                    &self.ctx.config.payout_policy(),
                    actor,
                )?;

                let now = self.ctx.now();
                let mut uow = self.ctx.db.begin().await?;
                let number = NumberingAuthority::issue(uow.conn(), NumberSeries::Payout, now).await?;
                let created = payout::insert(uow.conn(), &draft, &number, now)
                    .await
                    .map_err(numbered_insert)?;

                DocumentLinkageGraph::link_in(
                    uow.conn(),
                    &NewLinkage::new(
                        DocumentRef::booking(booking_id),
                        LinkageType::Generates,
                        DocumentRef::payout_request(created.id),
                        actor,
                    )
                    .describe(format!(
                        "Booking completion generated payout {} for {}",
                        created.request_number, performer.full_name
                    )),
                    now,
                )
                .await?;

                AuditLog::record(
                    uow.conn(),
                    &AuditRecord::new(
                        DocumentRef::payout_request(created.id),
                        AuditAction::Created,
                        actor,
                        format!(
                            "Created payout request {} of {} {} for performer {}",
                            created.request_number,
                            created.net_payout_amount,
                            created.currency,
                            performer_user_id
                        ),
                    )
                    .new_values(snapshot(&created)),
                    now,
                )
                .await?;

                uow.commit().await?;

                info!(
                    id = created.id,
                    number = %created.request_number,
                    booking_id,
                    performer_user_id,
                    net = %created.net_payout_amount,
                    "Payout request created"
                );
                Ok(created)
            })
            .await
    }

    pub async fn approve(&self, payout_id: i64, actor: Actor) -> FinanceResult<PayoutRequest> {
        self.transition(payout_id, PayoutTransition::Approve, actor).await
    }

    pub async fn decline(
        &self,
        payout_id: i64,
        reason: impl Into<String>,
        actor: Actor,
    ) -> FinanceResult<PayoutRequest> {
        let transition = PayoutTransition::Decline {
            reason: reason.into(),
        };
        self.transition(payout_id, transition, actor).await
    }

    pub async fn mark_processed(&self, payout_id: i64, actor: Actor) -> FinanceResult<PayoutRequest> {
        self.transition(payout_id, PayoutTransition::MarkProcessed, actor).await
    }

    pub async fn mark_paid(&self, payout_id: i64, actor: Actor) -> FinanceResult<PayoutRequest> {
        self.transition(payout_id, PayoutTransition::MarkPaid, actor).await
    }

    async fn transition(
        &self,
        payout_id: i64,
        transition: PayoutTransition,
        actor: Actor,
    ) -> FinanceResult<PayoutRequest> {
        self.ctx
            .bounded("change payout status", async {
                let now = self.ctx.now();
                let mut uow = self.ctx.db.begin().await?;

                let current = payout::fetch_by_id(&mut *uow.conn(), payout_id)
                    .await?
                    .ok_or_else(|| FinanceError::not_found("Payout request", payout_id))?;
                let next = current.apply(transition, actor, now)?;

                if !payout::update_status(uow.conn(), &next, current.status).await? {
                    return Err(lost_race("Payout request", payout_id));
                }

                AuditLog::record(
                    uow.conn(),
                    &AuditRecord::new(
                        DocumentRef::payout_request(payout_id),
                        AuditAction::StatusChanged,
                        actor,
                        format!(
                            "Payout request {} moved from {} to {}",
                            current.request_number, current.status, next.status
                        ),
                    )
                    .previous(json!({ "status": current.status }))
                    .new_values(json!({
                        "status": next.status,
                        "approvedByUserId": next.approved_by_user_id,
                        "declineReason": next.decline_reason,
                    })),
                    now,
                )
                .await?;

                uow.commit().await?;

                info!(
                    id = payout_id,
                    number = %next.request_number,
                    status = %next.status,
                    "Payout request status changed"
                );
                Ok(next)
            })
            .await
    }

    pub async fn get(&self, payout_id: i64) -> FinanceResult<PayoutRequest> {
        self.ctx
            .db
            .payouts()
            .get_by_id(payout_id)
            .await?
            .ok_or_else(|| FinanceError::not_found("Payout request", payout_id))
    }
}
