//! # Repository Module
//!
//! Database repository implementations for Encore Finance.
//!
//! ## Reads and Writes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Layout                                    │
//! │                                                                         │
//! │  Reads: a repository struct over the pool                               │
//! │       db.invoices().get_by_id(42)                                       │
//! │       db.linkages().find_from(DocumentRef::booking(7), None)            │
//! │                                                                         │
//! │  Writes: free functions over an open unit of work                       │
//! │       let mut uow = db.begin().await?;                                  │
//! │       let n  = sequence::next_value(uow.conn(), "INV", "2026").await?; │
//! │       let inv = invoice::insert(uow.conn(), &draft, &num, now).await?;│
//! │       linkage::insert(uow.conn(), &edge, now).await?;                   │
//! │       audit::append(uow.conn(), &record, now).await?;                   │
//! │       uow.commit().await?;                                              │
//! │                                                                         │
//! │  A write can only happen inside a unit of work, so a document, its     │
//! │  number, its edges and its audit entry commit or vanish together.       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`InvoiceRepository`](invoice::InvoiceRepository) - Proforma, deposit and final invoices
//! - [`PayoutRepository`](payout::PayoutRepository) - Performer payout requests
//! - [`TransactionRepository`](transaction::TransactionRepository) - Payment ledger
//! - [`ReceiptRepository`](receipt::ReceiptRepository) - Payment receipts
//! - [`LinkageRepository`](linkage::LinkageRepository) - Document graph queries
//! - [`AuditRepository`](audit::AuditRepository) - Audit ledger reads
//! - [`SequenceRepository`](sequence::SequenceRepository) - Counter state
//! - [`RenderQueueRepository`](render::RenderQueueRepository) - Documents awaiting a PDF
//! - [`ReferenceRepository`](reference::ReferenceRepository) - Bookings, users, payments, contracts

pub mod audit;
pub mod invoice;
pub mod linkage;
pub mod payout;
pub mod receipt;
pub mod reference;
pub mod render;
pub mod sequence;
pub mod transaction;
