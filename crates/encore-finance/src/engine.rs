//! # Finance Engine
//!
//! The entry point callers use: wires every service over one context and
//! exposes the operations the rest of the platform invokes.
//!
//! ```text
//!                     ┌──────────────────────────────┐
//!   HTTP / jobs ────► │        FinanceEngine         │
//!                     │                              │
//!                     │  invoices()   payouts()      │
//!                     │  ledger()     receipts()     │
//!                     │  linkages()   audit()        │
//!                     │  numbering()  dispatcher()   │
//!                     └──────────────┬───────────────┘
//!                                    │ ServiceContext (db, config, clock, renders)
//!                                    ▼
//!                              encore-db / SQLite
//! ```

use std::sync::Arc;

use encore_core::invoice::Invoice;
use encore_core::payout::{PayoutRequest, PayoutRequestType};
use encore_core::receipt::Receipt;
use encore_core::transaction::{PaymentTransaction, TransactionRequest};
use encore_core::Actor;

use crate::dispatcher::BookingLifecycleDispatcher;
use crate::error::FinanceResult;
use crate::ports::{BookingStore, ContractStore, CurrencyConverter, PaymentStore, UserStore};
use crate::services::{
    AuditLog, DocumentLinkageGraph, InvoiceService, NumberingAuthority, PayoutService,
    ReceiptService, ServiceContext, TransactionLedger,
};
use crate::summary::BookingFinancialSummary;

#[derive(Clone)]
pub struct FinanceEngine {
    ctx: ServiceContext,
    invoices: InvoiceService,
    payouts: PayoutService,
    ledger: TransactionLedger,
    receipts: ReceiptService,
    linkages: DocumentLinkageGraph,
    dispatcher: BookingLifecycleDispatcher,
}

impl FinanceEngine {
    /// Builds the engine over one store implementing every consumed port.
    pub fn new<S>(ctx: ServiceContext, stores: Arc<S>, converter: Arc<dyn CurrencyConverter>) -> Self
    where
        S: BookingStore + UserStore + PaymentStore + ContractStore + 'static,
    {
        let invoices = InvoiceService::new(ctx.clone(), stores.clone(), stores.clone(), stores.clone());
        let payouts = PayoutService::new(ctx.clone(), stores.clone(), stores.clone());
        let ledger = TransactionLedger::new(ctx.clone(), converter);
        let receipts = ReceiptService::new(
            ctx.clone(),
            stores.clone(),
            stores.clone(),
            stores.clone(),
            stores.clone(),
        );
        let linkages = DocumentLinkageGraph::new(ctx.clone());
        let dispatcher =
            BookingLifecycleDispatcher::new(ctx.clone(), stores, invoices.clone(), payouts.clone());

        FinanceEngine {
            ctx,
            invoices,
            payouts,
            ledger,
            receipts,
            linkages,
            dispatcher,
        }
    }

    // =========================================================================
    // Operations
    // =========================================================================

    pub async fn create_proforma_invoice(&self, booking_id: i64, actor: Actor) -> FinanceResult<Invoice> {
        self.invoices.create_proforma(booking_id, actor).await
    }

    pub async fn convert_proforma_to_final(&self, invoice_id: i64, actor: Actor) -> FinanceResult<Invoice> {
        self.invoices.convert_proforma_to_final(invoice_id, actor).await
    }

    pub async fn create_payout_request(
        &self,
        booking_id: i64,
        performer_user_id: i64,
        request_type: PayoutRequestType,
        actor: Actor,
    ) -> FinanceResult<PayoutRequest> {
        self.payouts
            .create_on_completion(booking_id, performer_user_id, request_type, actor)
            .await
    }

    pub async fn record_transaction(
        &self,
        request: TransactionRequest,
        actor: Actor,
    ) -> FinanceResult<PaymentTransaction> {
        self.ledger.record(request, actor).await
    }

    pub async fn issue_receipt(
        &self,
        booking_id: i64,
        payment_id: i64,
        contract_ids: &[i64],
        actor: Actor,
    ) -> FinanceResult<Receipt> {
        self.receipts.issue(booking_id, payment_id, contract_ids, actor).await
    }

    pub async fn get_booking_financial_summary(
        &self,
        booking_id: i64,
    ) -> FinanceResult<BookingFinancialSummary> {
        BookingFinancialSummary::load(&self.ctx.db, booking_id).await
    }

    // =========================================================================
    // Services
    // =========================================================================

    pub fn invoices(&self) -> &InvoiceService {
        &self.invoices
    }

    pub fn payouts(&self) -> &PayoutService {
        &self.payouts
    }

    pub fn ledger(&self) -> &TransactionLedger {
        &self.ledger
    }

    pub fn receipts(&self) -> &ReceiptService {
        &self.receipts
    }

    pub fn linkages(&self) -> &DocumentLinkageGraph {
        &self.linkages
    }

    pub fn dispatcher(&self) -> &BookingLifecycleDispatcher {
        &self.dispatcher
    }

    pub fn audit(&self) -> AuditLog {
        AuditLog::new(self.ctx.db.audit())
    }

    pub fn numbering(&self) -> NumberingAuthority {
        NumberingAuthority::new(self.ctx.db.sequences())
    }
}
