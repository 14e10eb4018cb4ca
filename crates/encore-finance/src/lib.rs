//! # encore-finance: Financial Automation for Encore
//!
//! Reacts to booking lifecycle events and produces the financial documents
//! that follow from them: invoices, payout requests, transactions and
//! receipts. Every document is numbered, linked into the document graph and
//! recorded in the audit ledger in the same database transaction.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         encore-finance                                  │
//! │                                                                         │
//! │  booking status change                                                  │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  ┌─────────────────────┐      ┌──────────────────────────────────────┐ │
//! │  │ BookingLifecycle    │─────►│ InvoiceService   PayoutService       │ │
//! │  │ Dispatcher          │      │ TransactionLedger ReceiptService     │ │
//! │  └─────────────────────┘      └──────────────┬───────────────────────┘ │
//! │                                              │ per operation, one UoW  │
//! │                        ┌─────────────────────┼─────────────────────┐   │
//! │                        ▼                     ▼                     ▼   │
//! │              NumberingAuthority   DocumentLinkageGraph       AuditLog  │
//! │                                                                         │
//! │  after commit ──► RenderHandle ──► RenderWorker ──► PdfRenderer        │
//! │                                                                         │
//! │  consumed ports: BookingStore UserStore PaymentStore ContractStore     │
//! │                  CurrencyConverter PdfRenderer Clock                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//! - [`config`] - File and environment configuration
//! - [`dispatcher`] - Booking status change → financial side effects
//! - [`engine`] - Facade wiring all services together
//! - [`error`] - Finance error taxonomy and the serializable [`ApiError`]
//! - [`ports`] - Traits for the stores and collaborators the engine consumes
//! - [`render`] - Background PDF rendering
//! - [`services`] - One service per document family
//! - [`summary`] - Per-booking financial roll-up
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use encore_db::{Database, DbConfig};
//! use encore_finance::{FinanceConfig, FinanceEngine, FixedRateConverter, ServiceContext, SqliteStores};
//!
//! let config = Arc::new(FinanceConfig::load_or_default(None));
//! let db = Database::new(DbConfig::new(&config.database.path)).await?;
//! let ctx = ServiceContext::new(db.clone(), config.clone());
//!
//! let engine = FinanceEngine::new(
//!     ctx,
//!     Arc::new(SqliteStores::new(db.reference())),
//!     Arc::new(FixedRateConverter::new(&config.currency)),
//! );
//! let invoice = engine.create_proforma_invoice(booking_id, Actor::User(5)).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod ports;
pub mod render;
pub mod services;
pub mod summary;

#[cfg(test)]
pub(crate) mod fixtures;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{FinanceConfig, RenderSettings};
pub use dispatcher::{BookingLifecycleDispatcher, PerformerPayoutResult, StatusChangeOutcome};
pub use engine::FinanceEngine;
pub use error::{ApiError, ConfigError, ErrorKind, FinanceError, FinanceResult};
pub use ports::{
    BookingStore, Clock, ContractStore, CurrencyConverter, FixedRateConverter, PaymentStore,
    PdfRenderer, RenderError, SqliteStores, SystemClock, UserStore,
};
pub use render::{RenderHandle, RenderService, RenderWorker};
pub use services::{
    AuditLog, DocumentLinkageGraph, InvoiceService, NumberingAuthority, PayoutService,
    ReceiptService, ServiceContext, TransactionLedger,
};
pub use summary::{BookingFinancialSummary, FinancialTotals};
