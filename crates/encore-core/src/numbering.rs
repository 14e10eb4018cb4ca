//! # Document Numbering Formats
//!
//! The pure half of the numbering authority: which counter a document
//! draws from and how the counter value renders. The atomic increment
//! itself lives in `encore-db` (`document_sequences`).
//!
//! ## Series
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Series            Counter key (series, scope)     Rendered             │
//! │  ───────────────   ─────────────────────────────   ──────────────────── │
//! │  Proforma          ("PRO",    "2026")              PRO-2026-000001      │
//! │  Invoice           ("INV",    "2026")              INV-2026-000042      │
//! │  Payout            ("PAYOUT", "2026")              PAYOUT-2026-000003   │
//! │  Receipt           ("REC",    "2026")              REC-2026-000010      │
//! │  PerformerInvoice  ("INV-P",  "17-42")             INV-17-42-00001      │
//! │                                                                         │
//! │  Global series restart at 1 each calendar year (the year is part of    │
//! │  the rendered number, so numbers never repeat). Performer series are   │
//! │  scoped to one (performer, booking) pair.                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};

/// A numbering series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "series", rename_all = "snake_case")]
pub enum NumberSeries {
    Proforma,
    Invoice,
    Payout,
    Receipt,
    PerformerInvoice { performer_id: i64, booking_id: i64 },
}

impl NumberSeries {
    /// Counter name stored in the sequence table.
    pub fn key(&self) -> &'static str {
        match self {
            NumberSeries::Proforma => "PRO",
            NumberSeries::Invoice => "INV",
            NumberSeries::Payout => "PAYOUT",
            NumberSeries::Receipt => "REC",
            NumberSeries::PerformerInvoice { .. } => "INV-P",
        }
    }

    /// Counter scope for the given calendar year.
    pub fn scope(&self, year: i32) -> String {
        match self {
            NumberSeries::PerformerInvoice {
                performer_id,
                booking_id,
            } => format!("{}-{}", performer_id, booking_id),
            _ => year.to_string(),
        }
    }

    /// Renders a counter value.
    ///
    /// ## Example
    /// ```rust
    /// use encore_core::numbering::NumberSeries;
    ///
    /// assert_eq!(NumberSeries::Invoice.format(2026, 42), "INV-2026-000042");
    /// let scoped = NumberSeries::PerformerInvoice { performer_id: 17, booking_id: 42 };
    /// assert_eq!(scoped.format(2026, 1), "INV-17-42-00001");
    /// ```
    pub fn format(&self, year: i32, value: i64) -> String {
        match self {
            NumberSeries::PerformerInvoice {
                performer_id,
                booking_id,
            } => format!("INV-{}-{}-{:05}", performer_id, booking_id, value),
            global => format!("{}-{}-{:06}", global.key(), year, value),
        }
    }
}

impl std::fmt::Display for NumberSeries {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NumberSeries::PerformerInvoice {
                performer_id,
                booking_id,
            } => write!(f, "INV-{}-{}", performer_id, booking_id),
            global => f.write_str(global.key()),
        }
    }
}
