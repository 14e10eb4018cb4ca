//! # encore-db: Database Layer for Encore Finance
//!
//! This crate provides storage for the finance engine's documents, its
//! document linkage graph and its audit ledger. It uses SQLite with sqlx
//! for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Encore Finance Data Flow                          │
//! │                                                                         │
//! │  FinanceEngine (create_proforma, record_transaction, ...)              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     encore-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │ (invoice.rs)  │    │  (embedded)  │  │   │
//! │  │   │               │    │               │    │              │  │   │
//! │  │   │ SqlitePool    │    │ InvoiceRepo   │    │ 001_ref.sql  │  │   │
//! │  │   │ UnitOfWork    │◄───│ PayoutRepo    │    │ 002_fin.sql  │  │   │
//! │  │   │               │    │ AuditRepo ... │    │              │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database (WAL)                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`unit_of_work`] - Transactions spanning one service operation
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use encore_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("path/to/finance.db")).await?;
//! let invoices = db.invoices().list_for_booking(7).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod unit_of_work;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};
pub use unit_of_work::UnitOfWork;

// Repository re-exports for convenience
pub use repository::audit::AuditRepository;
pub use repository::invoice::InvoiceRepository;
pub use repository::linkage::LinkageRepository;
pub use repository::payout::PayoutRepository;
pub use repository::receipt::ReceiptRepository;
pub use repository::reference::{NewBooking, ReferenceRepository};
pub use repository::render::RenderQueueRepository;
pub use repository::sequence::SequenceRepository;
pub use repository::transaction::TransactionRepository;
