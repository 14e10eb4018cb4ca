//! # Invoices
//!
//! Invoice types, the stage state machine, totals and payment terms.
//!
//! ## Stage State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Invoice Stages                                   │
//! │                                                                         │
//! │   ┌───────────┐   convert_to_final()   ┌──────────────────────────┐    │
//! │   │ Proforma  │ ─────────────────────► │ Final { converted_at: ✓ }│    │
//! │   │ PRO-…     │   same id, new INV-…   │ INV-…                    │    │
//! │   └───────────┘                        └──────────────────────────┘    │
//! │                                                                         │
//! │   ┌────────────────┐                   ┌──────────────────────────┐    │
//! │   │ BookingDeposit │  (never converts) │ Final { converted_at: ✗ }│    │
//! │   │ INV-…          │                   │ performer invoices       │    │
//! │   └────────────────┘                   └──────────────────────────┘    │
//! │                                                                         │
//! │  Conversion is identity-preserving: the row, its id, its linkage edges │
//! │  and its audit history stay. Only number, stage, status, trigger and   │
//! │  converted_at change. Converting anything but a live proforma fails.   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Status (orthogonal to stage)
//! ```text
//! draft ──► pending ──► paid
//!   │          │
//!   └──────────┴──────► cancelled
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::booking::{BookingSnapshot, ContractRecord, UserProfile};
use crate::error::{CoreError, CoreResult};
use crate::money::{Money, Rate};
use crate::numbering::NumberSeries;
use crate::types::{Actor, Party, RenderStatus, TriggeredBy};
use crate::validation::validate_amount;

// =============================================================================
// Invoice Type / Stage
// =============================================================================

/// Flat invoice type as stored in the `invoice_type` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum InvoiceType {
    Proforma,
    BookingDeposit,
    Final,
}

text_enum!(InvoiceType {
    Proforma => "proforma",
    BookingDeposit => "booking_deposit",
    Final => "final",
});

/// The stage of an invoice, carrying the data valid only in that stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "invoice_type", rename_all = "snake_case")]
pub enum InvoiceStage {
    /// Preliminary invoice, convertible in place.
    Proforma,
    /// Invoice raised when a booking is accepted.
    BookingDeposit,
    /// Definitive invoice. `converted_at` is set when it was a proforma.
    Final {
        converted_at: Option<DateTime<Utc>>,
    },
}

impl InvoiceStage {
    pub fn invoice_type(&self) -> InvoiceType {
        match self {
            InvoiceStage::Proforma => InvoiceType::Proforma,
            InvoiceStage::BookingDeposit => InvoiceType::BookingDeposit,
            InvoiceStage::Final { .. } => InvoiceType::Final,
        }
    }

    /// Rebuilds the stage from its stored columns.
    pub fn from_columns(invoice_type: InvoiceType, converted_at: Option<DateTime<Utc>>) -> Self {
        match invoice_type {
            InvoiceType::Proforma => InvoiceStage::Proforma,
            InvoiceType::BookingDeposit => InvoiceStage::BookingDeposit,
            InvoiceType::Final => InvoiceStage::Final { converted_at },
        }
    }

    pub fn converted_at(&self) -> Option<DateTime<Utc>> {
        match self {
            InvoiceStage::Final { converted_at } => *converted_at,
            _ => None,
        }
    }
}

// =============================================================================
// Invoice Status
// =============================================================================

/// Payment status of an invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Pending,
    Paid,
    Cancelled,
}

text_enum!(InvoiceStatus {
    Draft => "draft",
    Pending => "pending",
    Paid => "paid",
    Cancelled => "cancelled",
});

impl InvoiceStatus {
    pub fn can_transition_to(&self, to: InvoiceStatus) -> bool {
        matches!(
            (self, to),
            (InvoiceStatus::Draft, InvoiceStatus::Pending)
                | (InvoiceStatus::Draft, InvoiceStatus::Cancelled)
                | (InvoiceStatus::Pending, InvoiceStatus::Paid)
                | (InvoiceStatus::Pending, InvoiceStatus::Cancelled)
        )
    }

    /// Draft and pending invoices are still open for payment or conversion.
    pub fn is_open(&self) -> bool {
        matches!(self, InvoiceStatus::Draft | InvoiceStatus::Pending)
    }
}

// =============================================================================
// Payment Terms
// =============================================================================

/// Payment terms printed on an invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentTerms {
    #[serde(rename = "Net 30")]
    Net30,
    #[serde(rename = "Due on Receipt")]
    DueOnReceipt,
}

text_enum!(PaymentTerms {
    Net30 => "Net 30",
    DueOnReceipt => "Due on Receipt",
});

impl PaymentTerms {
    /// Corporate events get Net 30, everything else is due on receipt.
    pub fn for_booking(booking: &BookingSnapshot) -> Self {
        if booking.is_corporate() {
            PaymentTerms::Net30
        } else {
            PaymentTerms::DueOnReceipt
        }
    }

    /// Days from issue until the invoice is due.
    ///
    /// "Due on Receipt" still allows a one-week grace period.
    pub fn days(&self) -> i64 {
        match self {
            PaymentTerms::Net30 => 30,
            PaymentTerms::DueOnReceipt => 7,
        }
    }

    pub fn due_date(&self, issued_at: DateTime<Utc>) -> DateTime<Utc> {
        issued_at + Duration::days(self.days())
    }
}

// =============================================================================
// Line Items and Totals
// =============================================================================

/// One billed line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub description: String,
    pub quantity: i64,
    pub rate: Money,
    pub amount: Money,
}

impl LineItem {
    /// A single-quantity line where rate == amount.
    pub fn single(description: impl Into<String>, amount: Money) -> Self {
        LineItem {
            description: description.into(),
            quantity: 1,
            rate: amount,
            amount,
        }
    }
}

/// Subtotal, tax and total of an invoice.
///
/// ## Invariant
/// `total == subtotal + tax`, exact in cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceTotals {
    pub subtotal: Money,
    pub tax: Money,
    pub total: Money,
}

impl InvoiceTotals {
    /// Computes totals for a subtotal at the given tax rate.
    ///
    /// ## Example
    /// ```rust
    /// use encore_core::invoice::InvoiceTotals;
    /// use encore_core::money::{Money, Rate};
    ///
    /// let totals = InvoiceTotals::compute(Money::from_cents(100000), Rate::from_bps(800)).unwrap();
    /// assert_eq!(totals.tax.cents(), 8000);
    /// assert_eq!(totals.total.to_string(), "1080.00");
    /// ```
    pub fn compute(subtotal: Money, tax_rate: Rate) -> CoreResult<Self> {
        validate_amount("subtotal", subtotal)?;
        let tax = subtotal.apply_rate(tax_rate);
        let total = subtotal
            .checked_add(tax)
            .ok_or(CoreError::AmountOverflow {
                context: "invoice total",
            })?;
        Ok(InvoiceTotals {
            subtotal,
            tax,
            total,
        })
    }
}

// =============================================================================
// Invoice Policy
// =============================================================================

/// Issuer identity and tax rate applied to booking invoices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoicePolicy {
    pub issuer: Party,
    pub tax_rate: Rate,
}

// =============================================================================
// Invoice Draft
// =============================================================================

/// Which booking invoice is being drafted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingInvoiceKind {
    /// Unpersisted preview of a proforma.
    Preview,
    /// Manually requested proforma.
    Proforma,
    /// Invoice raised on booking acceptance.
    AcceptanceDeposit,
}

impl BookingInvoiceKind {
    fn stage(&self) -> InvoiceStage {
        match self {
            BookingInvoiceKind::Preview | BookingInvoiceKind::Proforma => InvoiceStage::Proforma,
            BookingInvoiceKind::AcceptanceDeposit => InvoiceStage::BookingDeposit,
        }
    }

    fn status(&self) -> InvoiceStatus {
        match self {
            BookingInvoiceKind::Preview => InvoiceStatus::Draft,
            _ => InvoiceStatus::Pending,
        }
    }

    fn triggered_by(&self) -> TriggeredBy {
        match self {
            BookingInvoiceKind::AcceptanceDeposit => TriggeredBy::BookingAcceptance,
            _ => TriggeredBy::Manual,
        }
    }

    /// Numbering series for the persisted invoice.
    pub fn series(&self) -> NumberSeries {
        match self {
            BookingInvoiceKind::Preview | BookingInvoiceKind::Proforma => NumberSeries::Proforma,
            BookingInvoiceKind::AcceptanceDeposit => NumberSeries::Invoice,
        }
    }
}

/// An invoice before it has a number and a row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceDraft {
    pub booking_id: i64,
    pub stage: InvoiceStage,
    pub status: InvoiceStatus,
    pub issuer: Party,
    pub recipient: Party,
    pub line_items: Vec<LineItem>,
    pub totals: InvoiceTotals,
    pub due_date: DateTime<Utc>,
    pub payment_terms: PaymentTerms,
    pub triggered_by: TriggeredBy,
    pub triggered_by_user_id: Option<i64>,
}

impl InvoiceDraft {
    /// Drafts a booking invoice: one line summarising the performance,
    /// tax at the policy rate, terms by event type.
    pub fn for_booking(
        booking: &BookingSnapshot,
        booker: Option<&UserProfile>,
        policy: &InvoicePolicy,
        kind: BookingInvoiceKind,
        actor: Actor,
        now: DateTime<Utc>,
    ) -> CoreResult<Self> {
        let totals = InvoiceTotals::compute(booking.total_budget, policy.tax_rate)?;
        let payment_terms = PaymentTerms::for_booking(booking);
        let recipient = Party::new(
            booking.recipient_name(booker.map(|b| b.full_name.as_str())),
            Some(booking.recipient_address()),
        );

        Ok(InvoiceDraft {
            booking_id: booking.id,
            stage: kind.stage(),
            status: kind.status(),
            issuer: policy.issuer.clone(),
            recipient,
            line_items: vec![LineItem::single(
                format!("{} Performance - {}", booking.event_type, booking.event_name),
                totals.subtotal,
            )],
            totals,
            due_date: payment_terms.due_date(now),
            payment_terms,
            triggered_by: kind.triggered_by(),
            triggered_by_user_id: actor.user_id(),
        })
    }

    /// Drafts a performer's invoice from a signed contract.
    ///
    /// Untaxed, Net 30, issued directly as final.
    pub fn for_performer(
        contract: &ContractRecord,
        booking: &BookingSnapshot,
        performer: &UserProfile,
        issuer: &Party,
        actor: Actor,
        now: DateTime<Utc>,
    ) -> CoreResult<Self> {
        let (_, fee) = contract.performer_fee()?;
        let totals = InvoiceTotals::compute(fee, Rate::zero())?;
        let payment_terms = PaymentTerms::Net30;

        Ok(InvoiceDraft {
            booking_id: booking.id,
            stage: InvoiceStage::Final { converted_at: None },
            status: InvoiceStatus::Pending,
            issuer: issuer.clone(),
            recipient: Party::new(performer.full_name.clone(), performer.address.clone()),
            line_items: vec![LineItem::single(
                format!(
                    "Performance Fee for Booking #{} ({})",
                    booking.id, booking.event_name
                ),
                fee,
            )],
            totals,
            due_date: payment_terms.due_date(now),
            payment_terms,
            triggered_by: TriggeredBy::ContractSignature,
            triggered_by_user_id: actor.user_id(),
        })
    }
}

// =============================================================================
// Invoice
// =============================================================================

/// A persisted invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: i64,
    pub booking_id: i64,
    pub invoice_number: String,
    pub stage: InvoiceStage,
    pub status: InvoiceStatus,
    pub issuer: Party,
    pub recipient: Party,
    pub line_items: Vec<LineItem>,
    pub subtotal: Money,
    pub tax: Money,
    pub total: Money,
    pub due_date: DateTime<Utc>,
    pub payment_terms: PaymentTerms,
    pub triggered_by: TriggeredBy,
    pub triggered_by_user_id: Option<i64>,
    pub document_url: Option<String>,
    pub render_status: RenderStatus,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    pub fn invoice_type(&self) -> InvoiceType {
        self.stage.invoice_type()
    }

    pub fn converted_at(&self) -> Option<DateTime<Utc>> {
        self.stage.converted_at()
    }

    /// Applies the proforma → final transition.
    ///
    /// ## Errors
    /// [`CoreError::NotConvertible`] unless the invoice is a proforma whose
    /// status is still open (draft or pending).
    pub fn convert_to_final(
        &self,
        final_number: String,
        actor: Actor,
        now: DateTime<Utc>,
    ) -> CoreResult<Invoice> {
        let convertible =
            matches!(self.stage, InvoiceStage::Proforma) && self.status.is_open();
        if !convertible {
            let stage = if matches!(self.stage, InvoiceStage::Proforma) {
                format!("a {} proforma", self.status)
            } else {
                self.invoice_type().to_string()
            };
            return Err(CoreError::NotConvertible {
                number: self.invoice_number.clone(),
                stage,
            });
        }

        Ok(Invoice {
            invoice_number: final_number,
            stage: InvoiceStage::Final {
                converted_at: Some(now),
            },
            status: InvoiceStatus::Pending,
            triggered_by: TriggeredBy::ProformaAcceptance,
            triggered_by_user_id: actor.user_id(),
            updated_at: now,
            ..self.clone()
        })
    }

    /// Applies a status transition (mark paid, cancel).
    pub fn with_status(&self, to: InvoiceStatus, now: DateTime<Utc>) -> CoreResult<Invoice> {
        if !self.status.can_transition_to(to) {
            return Err(CoreError::transition("Invoice", self.status, to));
        }
        Ok(Invoice {
            status: to,
            paid_at: if to == InvoiceStatus::Paid {
                Some(now)
            } else {
                self.paid_at
            },
            updated_at: now,
            ..self.clone()
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::booking::BookingStatus;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn policy() -> InvoicePolicy {
        InvoicePolicy {
            issuer: Party::new("Wai'tuMusic", Some("123 Music Lane".into()))
                .with_tax_id(Some("TAX-123456789".into())),
            tax_rate: Rate::from_bps(800),
        }
    }

    fn booking(total_cents: i64, event_type: &str) -> BookingSnapshot {
        BookingSnapshot {
            id: 1,
            booker_user_id: Some(3),
            guest_name: None,
            event_name: "Spring Gala".into(),
            event_type: event_type.into(),
            event_date: None,
            venue_address: Some("9 Venue St".into()),
            total_budget: Money::from_cents(total_cents),
            final_price: None,
            status: BookingStatus::Accepted,
            active_assignments: vec![],
        }
    }

    fn persisted(draft: InvoiceDraft, number: &str) -> Invoice {
        Invoice {
            id: 42,
            booking_id: draft.booking_id,
            invoice_number: number.into(),
            stage: draft.stage,
            status: draft.status,
            issuer: draft.issuer,
            recipient: draft.recipient,
            line_items: draft.line_items,
            subtotal: draft.totals.subtotal,
            tax: draft.totals.tax,
            total: draft.totals.total,
            due_date: draft.due_date,
            payment_terms: draft.payment_terms,
            triggered_by: draft.triggered_by,
            triggered_by_user_id: draft.triggered_by_user_id,
            document_url: None,
            render_status: RenderStatus::Pending,
            paid_at: None,
            created_at: now(),
            updated_at: now(),
        }
    }

    #[test]
    fn test_standard_booking_is_due_in_a_week() {
        let draft = InvoiceDraft::for_booking(
            &booking(100000, "standard"),
            None,
            &policy(),
            BookingInvoiceKind::Proforma,
            Actor::User(3),
            now(),
        )
        .unwrap();

        assert_eq!(draft.totals.total.to_string(), "1080.00");
        assert_eq!(draft.payment_terms, PaymentTerms::DueOnReceipt);
        assert_eq!(draft.due_date, now() + Duration::days(7));
        assert_eq!(draft.line_items[0].description, "standard Performance - Spring Gala");
        assert_eq!(draft.line_items[0].amount, draft.totals.subtotal);
    }

    #[test]
    fn test_corporate_booking_is_net_30() {
        let draft = InvoiceDraft::for_booking(
            &booking(500000, "corporate"),
            None,
            &policy(),
            BookingInvoiceKind::AcceptanceDeposit,
            Actor::System,
            now(),
        )
        .unwrap();

        assert_eq!(draft.totals.total.to_string(), "5400.00");
        assert_eq!(draft.payment_terms.to_string(), "Net 30");
        assert_eq!(draft.due_date, now() + Duration::days(30));
        assert_eq!(draft.stage, InvoiceStage::BookingDeposit);
        assert_eq!(draft.triggered_by, TriggeredBy::BookingAcceptance);
        assert_eq!(draft.triggered_by_user_id, None);
    }

    #[test]
    fn test_totals_invariant_holds_for_odd_amounts() {
        for cents in [1, 7, 99, 12345, 99999, 1_000_001] {
            let t = InvoiceTotals::compute(Money::from_cents(cents), Rate::from_bps(800)).unwrap();
            assert_eq!(t.total, t.subtotal + t.tax);
        }
    }

    #[test]
    fn test_negative_budget_is_rejected() {
        assert!(InvoiceTotals::compute(Money::from_cents(-1), Rate::from_bps(800)).is_err());
    }

    #[test]
    fn test_convert_proforma_preserves_identity() {
        let draft = InvoiceDraft::for_booking(
            &booking(100000, "standard"),
            None,
            &policy(),
            BookingInvoiceKind::Proforma,
            Actor::User(3),
            now(),
        )
        .unwrap();
        let proforma = persisted(draft, "PRO-2026-000001");

        let converted = proforma
            .convert_to_final("INV-2026-000001".into(), Actor::User(8), now())
            .unwrap();

        assert_eq!(converted.id, proforma.id);
        assert_eq!(converted.invoice_type(), InvoiceType::Final);
        assert_eq!(converted.converted_at(), Some(now()));
        assert_eq!(converted.triggered_by, TriggeredBy::ProformaAcceptance);
        assert_eq!(converted.triggered_by_user_id, Some(8));
        assert_eq!(converted.total, proforma.total);

        let again = converted.convert_to_final("INV-2026-000002".into(), Actor::System, now());
        assert!(matches!(again, Err(CoreError::NotConvertible { .. })));
    }

    #[test]
    fn test_cancelled_proforma_cannot_convert() {
        let draft = InvoiceDraft::for_booking(
            &booking(100000, "standard"),
            None,
            &policy(),
            BookingInvoiceKind::Proforma,
            Actor::System,
            now(),
        )
        .unwrap();
        let cancelled = persisted(draft, "PRO-2026-000001")
            .with_status(InvoiceStatus::Cancelled, now())
            .unwrap();
        assert!(cancelled
            .convert_to_final("INV-2026-000001".into(), Actor::System, now())
            .is_err());
    }

    #[test]
    fn test_status_transitions() {
        assert!(InvoiceStatus::Pending.can_transition_to(InvoiceStatus::Paid));
        assert!(InvoiceStatus::Draft.can_transition_to(InvoiceStatus::Cancelled));
        assert!(!InvoiceStatus::Paid.can_transition_to(InvoiceStatus::Cancelled));
        assert!(!InvoiceStatus::Cancelled.can_transition_to(InvoiceStatus::Pending));
    }

    #[test]
    fn test_stage_columns_round_trip() {
        let stage = InvoiceStage::Final {
            converted_at: Some(now()),
        };
        let rebuilt = InvoiceStage::from_columns(stage.invoice_type(), stage.converted_at());
        assert_eq!(rebuilt, stage);
        assert_eq!(
            InvoiceStage::from_columns(InvoiceType::Proforma, None),
            InvoiceStage::Proforma
        );
    }
}
