//! # Finance Configuration
//!
//! Issuer identity, rates, render settings and storage bounds for the
//! finance engine. Built once at startup and injected as
//! `Arc<FinanceConfig>`.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     ENCORE_DATABASE_PATH=/var/lib/encore/finance.db                    │
//! │     ENCORE_TAX_BPS=800                                                 │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/encore-finance/finance.toml (Linux)                      │
//! │     ~/Library/Application Support/com.encore.finance/finance.toml      │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     8% tax, 15% share, 15% commission, 5% + 2.9% fees                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # finance.toml
//! [database]
//! path = "finance.db"
//! operation_timeout_secs = 30
//!
//! [issuer]
//! name = "Wai'tuMusic"
//! address = "123 Music Lane, Sound City, SC 12345"
//! tax_id = "TAX-123456789"
//!
//! [rates]
//! tax_bps = 800
//! payout_share_bps = 1500
//! commission_bps = 1500
//! platform_fee_bps = 500
//! gateway_fee_bps = 290
//!
//! [render]
//! endpoint = "http://localhost:8090/render"
//! sweep_interval_secs = 60
//! max_attempts = 5
//!
//! [currency.usd_rates]
//! EUR = 1.08
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use encore_core::invoice::InvoicePolicy;
use encore_core::payout::PayoutPolicy;
use encore_core::transaction::FeeSchedule;
use encore_core::validation::{validate_bps, validate_currency};
use encore_core::{Party, Rate};

use crate::error::ConfigError;

// =============================================================================
// Database Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file path.
    #[serde(default = "default_database_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Upper bound on the storage work of one service operation.
    #[serde(default = "default_operation_timeout")]
    pub operation_timeout_secs: u64,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("finance.db")
}
fn default_max_connections() -> u32 {
    5
}
fn default_operation_timeout() -> u64 {
    30
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_database_path(),
            max_connections: default_max_connections(),
            operation_timeout_secs: default_operation_timeout(),
        }
    }
}

// =============================================================================
// Issuer
// =============================================================================

/// The business printed as issuer on booking invoices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuerSettings {
    #[serde(default = "default_issuer_name")]
    pub name: String,

    #[serde(default = "default_issuer_address")]
    pub address: String,

    #[serde(default = "default_issuer_tax_id")]
    pub tax_id: Option<String>,
}

fn default_issuer_name() -> String {
    "Wai'tuMusic".to_string()
}
fn default_issuer_address() -> String {
    "123 Music Lane, Sound City, SC 12345".to_string()
}
fn default_issuer_tax_id() -> Option<String> {
    Some("TAX-123456789".to_string())
}

impl Default for IssuerSettings {
    fn default() -> Self {
        IssuerSettings {
            name: default_issuer_name(),
            address: default_issuer_address(),
            tax_id: default_issuer_tax_id(),
        }
    }
}

// =============================================================================
// Rates
// =============================================================================

/// All percentages, in basis points.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateSettings {
    #[serde(default = "default_tax_bps")]
    pub tax_bps: u32,

    /// Share of the booking total a performer's payout is based on.
    #[serde(default = "default_payout_share_bps")]
    pub payout_share_bps: u32,

    /// Commission retained from the payout base.
    #[serde(default = "default_commission_bps")]
    pub commission_bps: u32,

    #[serde(default = "default_platform_fee_bps")]
    pub platform_fee_bps: u32,

    #[serde(default = "default_gateway_fee_bps")]
    pub gateway_fee_bps: u32,
}

fn default_tax_bps() -> u32 {
    800
}
fn default_payout_share_bps() -> u32 {
    1500
}
fn default_commission_bps() -> u32 {
    1500
}
fn default_platform_fee_bps() -> u32 {
    500
}
fn default_gateway_fee_bps() -> u32 {
    290
}

impl Default for RateSettings {
    fn default() -> Self {
        RateSettings {
            tax_bps: default_tax_bps(),
            payout_share_bps: default_payout_share_bps(),
            commission_bps: default_commission_bps(),
            platform_fee_bps: default_platform_fee_bps(),
            gateway_fee_bps: default_gateway_fee_bps(),
        }
    }
}

// =============================================================================
// Payout Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutSettings {
    #[serde(default = "default_currency")]
    pub currency: String,

    #[serde(default = "default_payment_method")]
    pub payment_method: String,
}

fn default_currency() -> String {
    "USD".to_string()
}
fn default_payment_method() -> String {
    "bank_transfer".to_string()
}

impl Default for PayoutSettings {
    fn default() -> Self {
        PayoutSettings {
            currency: default_currency(),
            payment_method: default_payment_method(),
        }
    }
}

// =============================================================================
// Render Settings
// =============================================================================

/// Background PDF rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderSettings {
    /// URL of the external PDF rendering service.
    #[serde(default = "default_render_endpoint")]
    pub endpoint: String,

    /// Capacity of the render request channel.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// How often the worker re-enqueues unrendered documents.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Failed attempts after which a document leaves the sweep.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,

    /// Total time one render attempt may spend retrying.
    #[serde(default = "default_max_elapsed")]
    pub max_elapsed_ms: u64,
}

fn default_render_endpoint() -> String {
    "http://localhost:8090/render".to_string()
}
fn default_queue_capacity() -> usize {
    256
}
fn default_sweep_interval() -> u64 {
    60
}
fn default_max_attempts() -> u32 {
    5
}
fn default_initial_backoff() -> u64 {
    500
}
fn default_max_backoff() -> u64 {
    10_000
}
fn default_max_elapsed() -> u64 {
    30_000
}

impl Default for RenderSettings {
    fn default() -> Self {
        RenderSettings {
            endpoint: default_render_endpoint(),
            queue_capacity: default_queue_capacity(),
            sweep_interval_secs: default_sweep_interval(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
            max_elapsed_ms: default_max_elapsed(),
        }
    }
}

impl RenderSettings {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

// =============================================================================
// Currency Settings
// =============================================================================

/// Static conversion table used by the fixed-rate converter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CurrencySettings {
    /// USD value of one unit of each currency. USD itself is implicit.
    #[serde(default)]
    pub usd_rates: HashMap<String, f64>,
}

// =============================================================================
// Main Finance Configuration
// =============================================================================

/// Complete finance engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FinanceConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub issuer: IssuerSettings,

    #[serde(default)]
    pub rates: RateSettings,

    #[serde(default)]
    pub payout: PayoutSettings,

    #[serde(default)]
    pub render: RenderSettings,

    #[serde(default)]
    pub currency: CurrencySettings,
}

impl FinanceConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (finance.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading finance config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load finance config: {}. Using defaults.", e);
            Self::default()
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |e: encore_core::ValidationError| ConfigError::Invalid(e.to_string());

        validate_bps("rates.tax_bps", self.rates.tax_bps).map_err(invalid)?;
        validate_bps("rates.payout_share_bps", self.rates.payout_share_bps).map_err(invalid)?;
        validate_bps("rates.commission_bps", self.rates.commission_bps).map_err(invalid)?;
        validate_bps("rates.platform_fee_bps", self.rates.platform_fee_bps).map_err(invalid)?;
        validate_bps("rates.gateway_fee_bps", self.rates.gateway_fee_bps).map_err(invalid)?;

        if self.rates.platform_fee_bps + self.rates.gateway_fee_bps > 10_000 {
            return Err(ConfigError::Invalid(
                "platform and gateway fees together exceed 100%".into(),
            ));
        }

        validate_currency(&self.payout.currency).map_err(invalid)?;

        if self.issuer.name.trim().is_empty() {
            return Err(ConfigError::Invalid("issuer.name must not be empty".into()));
        }

        if self.database.operation_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "database.operation_timeout_secs must be greater than 0".into(),
            ));
        }

        if self.render.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "render.queue_capacity must be greater than 0".into(),
            ));
        }

        if !self.render.endpoint.starts_with("http://") && !self.render.endpoint.starts_with("https://") {
            return Err(ConfigError::Invalid(format!(
                "render.endpoint must start with http:// or https://, got: {}",
                self.render.endpoint
            )));
        }

        for (code, rate) in &self.currency.usd_rates {
            validate_currency(code).map_err(invalid)?;
            if !rate.is_finite() || *rate <= 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "currency.usd_rates.{} must be a positive number",
                    code
                )));
            }
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("ENCORE_DATABASE_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Ok(timeout) = std::env::var("ENCORE_OPERATION_TIMEOUT_SECS") {
            if let Ok(t) = timeout.parse::<u64>() {
                self.database.operation_timeout_secs = t;
            }
        }

        if let Ok(name) = std::env::var("ENCORE_ISSUER_NAME") {
            self.issuer.name = name;
        }

        let rate_overrides: [(&str, &mut u32); 5] = [
            ("ENCORE_TAX_BPS", &mut self.rates.tax_bps),
            ("ENCORE_PAYOUT_SHARE_BPS", &mut self.rates.payout_share_bps),
            ("ENCORE_COMMISSION_BPS", &mut self.rates.commission_bps),
            ("ENCORE_PLATFORM_FEE_BPS", &mut self.rates.platform_fee_bps),
            ("ENCORE_GATEWAY_FEE_BPS", &mut self.rates.gateway_fee_bps),
        ];
        for (var, slot) in rate_overrides {
            if let Ok(value) = std::env::var(var) {
                match value.parse::<u32>() {
                    Ok(bps) => {
                        debug!(var, bps, "Overriding rate from environment");
                        *slot = bps;
                    }
                    Err(_) => warn!(var, value = %value, "Ignoring non-numeric rate in environment"),
                }
            }
        }

        if let Ok(endpoint) = std::env::var("ENCORE_RENDER_ENDPOINT") {
            debug!(endpoint = %endpoint, "Overriding render endpoint from environment");
            self.render.endpoint = endpoint;
        }
    }

    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "encore", "finance").map(|dirs| {
            let config_dir = dirs.config_dir();
            config_dir.join("finance.toml")
        })
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    pub fn issuer(&self) -> Party {
        Party::new(self.issuer.name.clone(), Some(self.issuer.address.clone()))
            .with_tax_id(self.issuer.tax_id.clone())
    }

    pub fn invoice_policy(&self) -> InvoicePolicy {
        InvoicePolicy {
            issuer: self.issuer(),
            tax_rate: Rate::from_bps(self.rates.tax_bps),
        }
    }

    pub fn payout_policy(&self) -> PayoutPolicy {
        PayoutPolicy {
            share: Rate::from_bps(self.rates.payout_share_bps),
            commission: Rate::from_bps(self.rates.commission_bps),
            currency: self.payout.currency.clone(),
            payment_method: self.payout.payment_method.clone(),
        }
    }

    pub fn fee_schedule(&self) -> FeeSchedule {
        FeeSchedule {
            platform: Rate::from_bps(self.rates.platform_fee_bps),
            gateway: Rate::from_bps(self.rates.gateway_fee_bps),
        }
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.database.operation_timeout_secs)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
