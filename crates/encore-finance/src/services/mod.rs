//! # Services
//!
//! One service per document family, sharing a [`ServiceContext`].
//!
//! ## Anatomy of a Mutating Operation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │            ctx.bounded("create proforma", async { ... })                │
//! │                                                                         │
//! │  1. Read consumed stores (booking, users, contracts, payments)         │
//! │  2. Build the draft in encore-core (pure, may fail validation)         │
//! │  3. db.begin()                                   ── write lock held    │
//! │       NumberingAuthority::issue(conn, series)    ── atomic counter     │
//! │       repository::x::insert(conn, draft, number)                       │
//! │       DocumentLinkageGraph::link_in(conn, edge)                        │
//! │       AuditLog::record(conn, entry)              ── exactly one        │
//! │     uow.commit()                                                       │
//! │  4. ctx.request_render(target)                   ── never blocks       │
//! │                                                                         │
//! │  Any error or the timeout drops the unit of work: nothing is kept,     │
//! │  including the number.                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod audit;
pub mod invoice;
pub mod linkage;
pub mod numbering;
pub mod payout;
pub mod receipt;
pub mod transaction;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tracing::warn;

use encore_core::RenderTarget;
use encore_db::{Database, DbError};

use crate::config::FinanceConfig;
use crate::error::{FinanceError, FinanceResult};
use crate::ports::{Clock, SystemClock};
use crate::render::RenderHandle;

pub use audit::AuditLog;
pub use invoice::InvoiceService;
pub use linkage::DocumentLinkageGraph;
pub use numbering::NumberingAuthority;
pub use payout::PayoutService;
pub use receipt::ReceiptService;
pub use transaction::TransactionLedger;

// =============================================================================
// Service Context
// =============================================================================

/// Database, configuration and clock shared by every service.
#[derive(Clone)]
pub struct ServiceContext {
    pub db: Database,
    pub config: Arc<FinanceConfig>,
    clock: Arc<dyn Clock>,
    renders: Option<RenderHandle>,
}

impl ServiceContext {
    pub fn new(db: Database, config: Arc<FinanceConfig>) -> Self {
        ServiceContext {
            db,
            config,
            clock: Arc::new(SystemClock),
            renders: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Routes render requests to a running worker. Without one, new
    /// documents wait in `pending` for the next sweep.
    pub fn with_render_handle(mut self, handle: RenderHandle) -> Self {
        self.renders = Some(handle);
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub(crate) fn request_render(&self, target: RenderTarget) {
        if let Some(handle) = &self.renders {
            handle.request(target);
        }
    }

    /// Runs one operation under `database.operation_timeout_secs`.
    pub(crate) async fn bounded<T, F>(&self, operation: &'static str, work: F) -> FinanceResult<T>
    where
        F: Future<Output = FinanceResult<T>>,
    {
        let limit = self.config.operation_timeout();
        match tokio::time::timeout(limit, work).await {
            Ok(result) => result,
            Err(_) => {
                warn!(operation, ?limit, "Operation timed out");
                Err(FinanceError::Persistence(format!(
                    "{} timed out after {}s",
                    operation,
                    limit.as_secs()
                )))
            }
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// JSON snapshot of a document for audit entries.
pub(crate) fn snapshot<T: Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
}

/// A unique-number collision on insert means numbering failed, not the caller.
pub(crate) fn numbered_insert(err: DbError) -> FinanceError {
    match err {
        DbError::UniqueViolation { field, .. } => {
            FinanceError::NumberGeneration(format!("issued number already in use ({})", field))
        }
        other => other.into(),
    }
}

/// Error for a guarded update that matched no row.
pub(crate) fn lost_race(what: &str, id: i64) -> FinanceError {
    FinanceError::InvalidState(format!("{} {} was changed concurrently", what, id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::Fixture;
    use encore_core::types::Actor;
    use std::time::{Duration, Instant};

    fn one_second_timeout() -> FinanceConfig {
        let mut config = FinanceConfig::default();
        config.database.operation_timeout_secs = 1;
        config
    }

    #[tokio::test]
    async fn test_bounded_reports_persistence_error_on_expiry() {
        let fx = Fixture::with_config(one_second_timeout()).await;

        let err = fx
            .ctx
            .bounded("slow operation", async {
                tokio::time::sleep(Duration::from_secs(3)).await;
                Ok(())
            })
            .await
            .unwrap_err();

        assert!(matches!(err, FinanceError::Persistence(ref msg) if msg == "slow operation timed out after 1s"));
    }

    #[tokio::test]
    async fn test_timed_out_operation_commits_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let fx = Fixture::on_file(&dir.path().join("finance.db"), one_second_timeout()).await;
        let booking = fx.booking("Standard", 100000).await;

        // Another writer holds the lock past the operation's limit.
        let blocker = fx.db.begin().await.unwrap();
        let started = Instant::now();
        let err = fx.invoices().create_proforma(booking, Actor::System).await.unwrap_err();
        assert!(started.elapsed() >= Duration::from_millis(900));
        assert!(matches!(err, FinanceError::Persistence(ref msg) if msg.contains("timed out")));
        blocker.rollback().await.unwrap();

        assert_eq!(fx.db.sequences().current("PRO", "2026").await.unwrap(), None);
        assert!(fx.db.invoices().list_for_booking(booking).await.unwrap().is_empty());
        assert_eq!(fx.db.audit().count().await.unwrap(), 0);
    }
}
