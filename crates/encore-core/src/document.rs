//! # Financial Documents
//!
//! A closed union over every document kind the engine owns. Renderers,
//! audit snapshots and the financial summary work on this type instead of
//! untyped key/value bags.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  FinancialDocument                                                      │
//! │  ├── Invoice(Invoice)                 number: INV-… / PRO-…  renderable │
//! │  ├── PayoutRequest(PayoutRequest)     number: PAYOUT-…                  │
//! │  ├── Transaction(PaymentTransaction)  number: none                      │
//! │  └── Receipt(Receipt)                 number: REC-…          renderable │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};

use crate::invoice::Invoice;
use crate::payout::PayoutRequest;
use crate::receipt::Receipt;
use crate::transaction::PaymentTransaction;
use crate::types::{DocumentRef, RenderStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "document", rename_all = "snake_case")]
pub enum FinancialDocument {
    Invoice(Invoice),
    PayoutRequest(PayoutRequest),
    Transaction(PaymentTransaction),
    Receipt(Receipt),
}

impl FinancialDocument {
    pub fn reference(&self) -> DocumentRef {
        match self {
            FinancialDocument::Invoice(i) => DocumentRef::invoice(i.id),
            FinancialDocument::PayoutRequest(p) => DocumentRef::payout_request(p.id),
            FinancialDocument::Transaction(t) => DocumentRef::transaction(t.id),
            FinancialDocument::Receipt(r) => DocumentRef::receipt(r.id),
        }
    }

    /// Human-readable document number, if the kind carries one.
    pub fn number(&self) -> Option<&str> {
        match self {
            FinancialDocument::Invoice(i) => Some(&i.invoice_number),
            FinancialDocument::PayoutRequest(p) => Some(&p.request_number),
            FinancialDocument::Transaction(_) => None,
            FinancialDocument::Receipt(r) => Some(&r.receipt_number),
        }
    }

    pub fn render_status(&self) -> Option<RenderStatus> {
        match self {
            FinancialDocument::Invoice(i) => Some(i.render_status),
            FinancialDocument::Receipt(r) => Some(r.render_status),
            _ => None,
        }
    }

    /// JSON snapshot of the document's fields, as stored in audit entries.
    pub fn snapshot(&self) -> serde_json::Value {
        let value = match self {
            FinancialDocument::Invoice(i) => serde_json::to_value(i),
            FinancialDocument::PayoutRequest(p) => serde_json::to_value(p),
            FinancialDocument::Transaction(t) => serde_json::to_value(t),
            FinancialDocument::Receipt(r) => serde_json::to_value(r),
        };
        value.unwrap_or(serde_json::Value::Null)
    }
}

impl From<Invoice> for FinancialDocument {
    fn from(i: Invoice) -> Self {
        FinancialDocument::Invoice(i)
    }
}

impl From<PayoutRequest> for FinancialDocument {
    fn from(p: PayoutRequest) -> Self {
        FinancialDocument::PayoutRequest(p)
    }
}

impl From<PaymentTransaction> for FinancialDocument {
    fn from(t: PaymentTransaction) -> Self {
        FinancialDocument::Transaction(t)
    }
}

impl From<Receipt> for FinancialDocument {
    fn from(r: Receipt) -> Self {
        FinancialDocument::Receipt(r)
    }
}

/// A document the render worker can produce a PDF for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum RenderTarget {
    Invoice(i64),
    Receipt(i64),
}

impl RenderTarget {
    pub fn reference(&self) -> DocumentRef {
        match self {
            RenderTarget::Invoice(id) => DocumentRef::invoice(*id),
            RenderTarget::Receipt(id) => DocumentRef::receipt(*id),
        }
    }
}

impl std::fmt::Display for RenderTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.reference().fmt(f)
    }
}
