//! Shared setup for the service tests: an in-memory database, default
//! configuration, a frozen clock and seeding helpers for the booking
//! platform's records.

use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use encore_core::booking::{BookingStatus, ContractType, UserProfile};
use encore_core::{FinancialDocument, Money};
use encore_db::{Database, DbConfig, NewBooking};

use crate::config::FinanceConfig;
use crate::dispatcher::BookingLifecycleDispatcher;
use crate::engine::FinanceEngine;
use crate::error::{FinanceError, FinanceResult};
use crate::ports::{Clock, FixedRateConverter, PdfRenderer, RenderError, SqliteStores, UserStore};
use crate::render::RenderService;
use crate::services::{
    AuditLog, DocumentLinkageGraph, InvoiceService, PayoutService, ReceiptService,
    ServiceContext, TransactionLedger,
};

/// 2026-03-15 12:00:00 UTC.
pub(crate) fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap()
}

pub(crate) struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

pub(crate) struct Fixture {
    pub db: Database,
    pub ctx: ServiceContext,
    pub stores: Arc<SqliteStores>,
}

impl Fixture {
    pub async fn new() -> Self {
        Self::with_config(FinanceConfig::default()).await
    }

    pub async fn with_config(config: FinanceConfig) -> Self {
        Self::on(DbConfig::in_memory(), config).await
    }

    /// File-backed database, for tests that need concurrent connections.
    pub async fn on_file(path: &Path, config: FinanceConfig) -> Self {
        let db_config = DbConfig::new(path)
            .max_connections(4)
            .busy_timeout(Duration::from_secs(5));
        Self::on(db_config, config).await
    }

    async fn on(db_config: DbConfig, config: FinanceConfig) -> Self {
        let db = Database::new(db_config).await.unwrap();
        let ctx = ServiceContext::new(db.clone(), Arc::new(config))
            .with_clock(Arc::new(FixedClock(fixed_now())));
        let stores = Arc::new(SqliteStores::new(db.reference()));
        Fixture { db, ctx, stores }
    }

    // -------------------------------------------------------------------------
    // Seeding
    // -------------------------------------------------------------------------

    pub async fn user(&self, name: &str) -> i64 {
        self.db.reference().insert_user(name, None).await.unwrap()
    }

    /// A pending "Spring Gala" booking made by "Ada Lovelace".
    pub async fn booking(&self, event_type: &str, budget_cents: i64) -> i64 {
        let booker = self.user("Ada Lovelace").await;
        self.db
            .reference()
            .insert_booking(&NewBooking {
                booker_user_id: Some(booker),
                guest_name: None,
                event_name: "Spring Gala".to_string(),
                event_type: event_type.to_string(),
                event_date: Some(fixed_now()),
                venue_address: Some("1 Harbour Rd".to_string()),
                total_budget: Money::from_cents(budget_cents),
                status: BookingStatus::Pending,
            })
            .await
            .unwrap()
    }

    pub async fn assign(&self, booking_id: i64, user_id: i64) {
        self.db
            .reference()
            .add_assignment(booking_id, user_id, Some("performer"), true)
            .await
            .unwrap();
    }

    pub async fn payment(&self, booking_id: i64, cents: i64) -> i64 {
        self.db
            .reference()
            .insert_payment(booking_id, Money::from_cents(cents), "USD", Some(fixed_now()))
            .await
            .unwrap()
    }

    pub async fn contract(
        &self,
        booking_id: i64,
        performer: Option<i64>,
        content: serde_json::Value,
    ) -> i64 {
        self.db
            .reference()
            .insert_contract(booking_id, ContractType::PerformanceAgreement, performer, &content)
            .await
            .unwrap()
    }

    // -------------------------------------------------------------------------
    // Services
    // -------------------------------------------------------------------------

    pub fn invoices(&self) -> InvoiceService {
        InvoiceService::new(
            self.ctx.clone(),
            self.stores.clone(),
            self.stores.clone(),
            self.stores.clone(),
        )
    }

    pub fn payouts(&self) -> PayoutService {
        self.payouts_with_users(self.stores.clone())
    }

    pub fn payouts_with_users(&self, users: Arc<dyn UserStore>) -> PayoutService {
        PayoutService::new(self.ctx.clone(), self.stores.clone(), users)
    }

    pub fn ledger(&self) -> TransactionLedger {
        TransactionLedger::new(
            self.ctx.clone(),
            Arc::new(FixedRateConverter::new(&self.ctx.config.currency)),
        )
    }

    pub fn receipts(&self) -> ReceiptService {
        ReceiptService::new(
            self.ctx.clone(),
            self.stores.clone(),
            self.stores.clone(),
            self.stores.clone(),
            self.stores.clone(),
        )
    }

    pub fn graph(&self) -> DocumentLinkageGraph {
        DocumentLinkageGraph::new(self.ctx.clone())
    }

    pub fn audit(&self) -> AuditLog {
        AuditLog::new(self.db.audit())
    }

    pub fn dispatcher(&self) -> BookingLifecycleDispatcher {
        BookingLifecycleDispatcher::new(
            self.ctx.clone(),
            self.stores.clone(),
            self.invoices(),
            self.payouts(),
        )
    }

    pub fn renders(&self, renderer: Arc<dyn PdfRenderer>) -> RenderService {
        RenderService::new(self.ctx.clone(), renderer)
    }

    pub fn engine(&self) -> FinanceEngine {
        FinanceEngine::new(
            self.ctx.clone(),
            self.stores.clone(),
            Arc::new(FixedRateConverter::new(&self.ctx.config.currency)),
        )
    }
}

// =============================================================================
// Test Doubles
// =============================================================================

/// Renderer that fails a fixed number of times before succeeding.
pub(crate) struct StubRenderer {
    failures_left: AtomicU32,
    permanent: bool,
    calls: AtomicU32,
}

impl StubRenderer {
    pub fn ok() -> Arc<Self> {
        Self::failing(0, false)
    }

    pub fn failing(times: u32, permanent: bool) -> Arc<Self> {
        Arc::new(StubRenderer {
            failures_left: AtomicU32::new(times),
            permanent,
            calls: AtomicU32::new(0),
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PdfRenderer for StubRenderer {
    async fn render(&self, document: &FinancialDocument) -> Result<String, RenderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures_left.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_left.store(remaining - 1, Ordering::SeqCst);
            return Err(if self.permanent {
                RenderError::permanent("template missing")
            } else {
                RenderError::transient("renderer busy")
            });
        }
        Ok(format!(
            "https://docs.test/{}.pdf",
            document.number().unwrap_or("unnumbered")
        ))
    }
}

/// User store that is down for one user id.
pub(crate) struct FlakyUsers {
    pub inner: Arc<SqliteStores>,
    pub unavailable: i64,
}

#[async_trait]
impl UserStore for FlakyUsers {
    async fn get_user(&self, user_id: i64) -> FinanceResult<UserProfile> {
        if user_id == self.unavailable {
            return Err(FinanceError::Persistence("user service unavailable".to_string()));
        }
        self.inner.get_user(user_id).await
    }
}
