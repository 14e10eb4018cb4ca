//! # Consumed Ports
//!
//! Everything the finance engine reads or calls but does not own.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Ports                                           │
//! │                                                                         │
//! │   BookingStore ──┐                                                      │
//! │   UserStore ─────┤  SqliteStores (reference tables in encore-db)       │
//! │   PaymentStore ──┤                                                      │
//! │   ContractStore ─┘                                                      │
//! │                                                                         │
//! │   PdfRenderer ───── HttpPdfRenderer lives in the render-worker binary  │
//! │   CurrencyConverter ── FixedRateConverter ([currency] config table)    │
//! │   Clock ──────────── SystemClock                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Store lookups return [`FinanceError::NotFound`] for absent records.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

use encore_core::booking::{BookingSnapshot, ContractRecord, PaymentRecord, UserProfile};
use encore_core::validation::validate_currency;
use encore_core::{FinancialDocument, Money};
use encore_db::ReferenceRepository;

use crate::config::CurrencySettings;
use crate::error::{FinanceError, FinanceResult};

// =============================================================================
// Stores
// =============================================================================

#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn get_booking(&self, booking_id: i64) -> FinanceResult<BookingSnapshot>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_user(&self, user_id: i64) -> FinanceResult<UserProfile>;
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn get_payment(&self, payment_id: i64) -> FinanceResult<PaymentRecord>;
}

#[async_trait]
pub trait ContractStore: Send + Sync {
    async fn get_contract(&self, contract_id: i64) -> FinanceResult<ContractRecord>;
}

/// Store adapter over the reference tables of the finance database.
#[derive(Debug, Clone)]
pub struct SqliteStores {
    reference: ReferenceRepository,
}

impl SqliteStores {
    pub fn new(reference: ReferenceRepository) -> Self {
        SqliteStores { reference }
    }
}

#[async_trait]
impl BookingStore for SqliteStores {
    async fn get_booking(&self, booking_id: i64) -> FinanceResult<BookingSnapshot> {
        self.reference
            .get_booking(booking_id)
            .await?
            .ok_or_else(|| FinanceError::not_found("Booking", booking_id))
    }
}

#[async_trait]
impl UserStore for SqliteStores {
    async fn get_user(&self, user_id: i64) -> FinanceResult<UserProfile> {
        self.reference
            .get_user(user_id)
            .await?
            .ok_or_else(|| FinanceError::not_found("User", user_id))
    }
}

#[async_trait]
impl PaymentStore for SqliteStores {
    async fn get_payment(&self, payment_id: i64) -> FinanceResult<PaymentRecord> {
        self.reference
            .get_payment(payment_id)
            .await?
            .ok_or_else(|| FinanceError::not_found("Payment", payment_id))
    }
}

#[async_trait]
impl ContractStore for SqliteStores {
    async fn get_contract(&self, contract_id: i64) -> FinanceResult<ContractRecord> {
        self.reference
            .get_contract(contract_id)
            .await?
            .ok_or_else(|| FinanceError::not_found("Contract", contract_id))
    }
}

// =============================================================================
// PDF Renderer
// =============================================================================

/// Failure reported by a [`PdfRenderer`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct RenderError {
    pub message: String,
    /// Whether retrying the same document may succeed.
    pub retryable: bool,
}

impl RenderError {
    pub fn transient(message: impl Into<String>) -> Self {
        RenderError {
            message: message.into(),
            retryable: true,
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        RenderError {
            message: message.into(),
            retryable: false,
        }
    }
}

/// Turns a document into a PDF and returns where it can be fetched.
#[async_trait]
pub trait PdfRenderer: Send + Sync {
    async fn render(&self, document: &FinancialDocument) -> Result<String, RenderError>;
}

// =============================================================================
// Currency Converter
// =============================================================================

#[async_trait]
pub trait CurrencyConverter: Send + Sync {
    async fn to_usd(&self, amount: Money, currency: &str) -> FinanceResult<Money>;
}

/// Converts with the static `[currency.usd_rates]` table.
#[derive(Debug, Clone, Default)]
pub struct FixedRateConverter {
    usd_rates: HashMap<String, f64>,
}

impl FixedRateConverter {
    pub fn new(settings: &CurrencySettings) -> Self {
        FixedRateConverter {
            usd_rates: settings.usd_rates.clone(),
        }
    }
}

#[async_trait]
impl CurrencyConverter for FixedRateConverter {
    async fn to_usd(&self, amount: Money, currency: &str) -> FinanceResult<Money> {
        validate_currency(currency)?;
        if currency == "USD" {
            return Ok(amount);
        }
        let rate = self.usd_rates.get(currency).ok_or_else(|| {
            FinanceError::Validation(format!("No USD rate configured for {}", currency))
        })?;
        let cents = (amount.cents() as f64 * rate).round();
        if !cents.is_finite() || cents.abs() >= i64::MAX as f64 {
            return Err(FinanceError::Validation(format!(
                "USD equivalent of {} {} is out of range",
                amount, currency
            )));
        }
        Ok(Money::from_cents(cents as i64))
    }
}

// =============================================================================
// Clock
// =============================================================================

/// Source of "now" for due dates, numbering years and audit timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
