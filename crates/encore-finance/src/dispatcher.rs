//! # Booking Lifecycle Dispatcher
//!
//! Turns reported booking status changes into financial side effects.
//!
//! ## Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  on_booking_status_change(booking, old, new, actor)                     │
//! │                                                                         │
//! │  1. old.check_transition(new)          ── rejected: InvalidState,      │
//! │                                           nothing written             │
//! │  2. audit booking status_changed       ── own unit of work, committed  │
//! │  3. side effect by target status:                                       │
//! │                                                                         │
//! │     accepted  ──► acceptance invoice      InvoiceIssued(Ok | Err)      │
//! │     completed ──► one payout per active   PayoutsRequested([..])       │
//! │                   assignment, each one                                 │
//! │                   isolated from the others                             │
//! │     cancelled ──► (no refund workflow)    CancellationRecorded         │
//! │     other     ──►                         NoFinancialAction            │
//! │                                                                         │
//! │  Side-effect failures are reported in the outcome, never propagated.   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use encore_core::audit::AuditRecord;
use encore_core::booking::{BookingStatus, FinancialAction};
use encore_core::payout::PayoutRequestType;
use encore_core::types::{Actor, AuditAction, DocumentRef};

use crate::error::{ApiError, FinanceResult};
use crate::ports::BookingStore;
use crate::services::{AuditLog, InvoiceService, PayoutService, ServiceContext};

// =============================================================================
// Outcome
// =============================================================================

/// Payout result for one assigned performer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformerPayoutResult {
    pub performer_user_id: i64,
    pub result: Result<i64, ApiError>,
}

/// What the dispatcher did for an accepted status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum StatusChangeOutcome {
    /// `→ accepted`: the acceptance invoice id, or why it wasn't raised.
    InvoiceIssued(Result<i64, ApiError>),
    /// `→ completed`: one entry per active assignment.
    PayoutsRequested(Vec<PerformerPayoutResult>),
    /// `→ completed`, but the booking's assignments couldn't be read.
    PayoutsUnavailable(ApiError),
    /// `→ cancelled`.
    CancellationRecorded,
    NoFinancialAction,
}

// =============================================================================
// Dispatcher
// =============================================================================

#[derive(Clone)]
pub struct BookingLifecycleDispatcher {
    ctx: ServiceContext,
    bookings: Arc<dyn BookingStore>,
    invoices: InvoiceService,
    payouts: PayoutService,
}

impl BookingLifecycleDispatcher {
    pub fn new(
        ctx: ServiceContext,
        bookings: Arc<dyn BookingStore>,
        invoices: InvoiceService,
        payouts: PayoutService,
    ) -> Self {
        BookingLifecycleDispatcher {
            ctx,
            bookings,
            invoices,
            payouts,
        }
    }

    /// Same as [`Self::on_booking_status_change`] for statuses given as
    /// strings. Unknown statuses are a validation error.
    pub async fn on_booking_status_change_raw(
        &self,
        booking_id: i64,
        old_status: &str,
        new_status: &str,
        actor: Actor,
    ) -> FinanceResult<StatusChangeOutcome> {
        let old = BookingStatus::from_str(old_status)?;
        let new = BookingStatus::from_str(new_status)?;
        self.on_booking_status_change(booking_id, old, new, actor).await
    }

    /// Handles one booking status change.
    ///
    /// ## Errors
    /// - [`crate::FinanceError::InvalidState`] for a disallowed transition
    /// - any error writing the booking's audit entry
    ///
    /// Everything after the audit entry is reported in the outcome.
    pub async fn on_booking_status_change(
        &self,
        booking_id: i64,
        old: BookingStatus,
        new: BookingStatus,
        actor: Actor,
    ) -> FinanceResult<StatusChangeOutcome> {
        let action = old.check_transition(new)?;
        self.record_status_change(booking_id, old, new, actor).await?;

        let outcome = match action {
            FinancialAction::IssueAcceptanceInvoice => {
                let result = self
                    .invoices
                    .create_from_booking_acceptance(booking_id, actor)
                    .await
                    .map(|invoice| invoice.id)
                    .map_err(|e| {
                        warn!(booking_id, error = %e, "Acceptance invoice was not created");
                        ApiError::from(e)
                    });
                StatusChangeOutcome::InvoiceIssued(result)
            }
            FinancialAction::RequestPayouts => self.request_payouts(booking_id, actor).await,
            FinancialAction::RecordCancellation => StatusChangeOutcome::CancellationRecorded,
            FinancialAction::None => StatusChangeOutcome::NoFinancialAction,
        };

        info!(booking_id, from = %old, to = %new, ?outcome, "Booking status change dispatched");
        Ok(outcome)
    }

    async fn record_status_change(
        &self,
        booking_id: i64,
        old: BookingStatus,
        new: BookingStatus,
        actor: Actor,
    ) -> FinanceResult<()> {
        self.ctx
            .bounded("record booking status change", async {
                let now = self.ctx.now();
                let mut uow = self.ctx.db.begin().await?;
                AuditLog::record(
                    uow.conn(),
                    &AuditRecord::new(
                        DocumentRef::booking(booking_id),
                        AuditAction::StatusChanged,
                        actor,
                        format!("Booking {} moved from {} to {}", booking_id, old, new),
                    )
                    .previous(json!({ "status": old }))
                    .new_values(json!({ "status": new })),
                    now,
                )
                .await?;
                uow.commit().await?;
                Ok(())
            })
            .await
    }

    async fn request_payouts(&self, booking_id: i64, actor: Actor) -> StatusChangeOutcome {
        let booking = match self.bookings.get_booking(booking_id).await {
            Ok(booking) => booking,
            Err(e) => {
                warn!(booking_id, error = %e, "Could not load booking for payouts");
                return StatusChangeOutcome::PayoutsUnavailable(e.into());
            }
        };

        let mut results = Vec::with_capacity(booking.active_assignments.len());
        for assignment in &booking.active_assignments {
            let result = self
                .payouts
                .create_on_completion(
                    booking_id,
                    assignment.user_id,
                    PayoutRequestType::PerformanceFee,
                    actor,
                )
                .await
                .map(|payout| payout.id)
                .map_err(|e| {
                    warn!(
                        booking_id,
                        performer_user_id = assignment.user_id,
                        error = %e,
                        "Payout request failed for performer"
                    );
                    ApiError::from(e)
                });
            results.push(PerformerPayoutResult {
                performer_user_id: assignment.user_id,
                result,
            });
        }
        StatusChangeOutcome::PayoutsRequested(results)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
