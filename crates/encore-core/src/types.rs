//! # Shared Domain Types
//!
//! Identity and classification types used across every document kind.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Shared Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │     Actor       │   │  DocumentRef    │   │  LinkageType    │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  User(id)       │   │  document_type  │   │  generates      │       │
//! │  │  System         │   │  id (i64)       │   │  fulfills       │       │
//! │  └─────────────────┘   └─────────────────┘   │  references     │       │
//! │                                              │  supersedes     │       │
//! │  ┌─────────────────┐   ┌─────────────────┐   │  cancels        │       │
//! │  │  TriggeredBy    │   │  AuditAction    │   └─────────────────┘       │
//! │  │  ─────────────  │   │  ─────────────  │                              │
//! │  │  manual         │   │  created        │   ┌─────────────────┐       │
//! │  │  booking_accept │   │  updated        │   │  RenderStatus   │       │
//! │  │  proforma_accept│   │  converted      │   │  pending        │       │
//! │  │  contract_sign  │   │  status_changed │   │  rendered       │       │
//! │  │  booking_compl  │   │  linked         │   │  failed         │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Identity
//! Every persisted document has an integer `id` (row identity, never
//! reused, never changed) and, where applicable, a human-readable number
//! (`INV-2026-000042`). Numbers may change exactly once: when a proforma
//! becomes final.

use serde::{Deserialize, Serialize};

// =============================================================================
// Actor
// =============================================================================

/// Who performed a mutating operation.
///
/// Carried by every mutating call for audit attribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "user_id", rename_all = "snake_case")]
pub enum Actor {
    /// An authenticated user.
    User(i64),
    /// An automated step (webhooks, the render worker, the dispatcher).
    System,
}

impl Actor {
    /// Returns the acting user's id, if any.
    pub fn user_id(&self) -> Option<i64> {
        match self {
            Actor::User(id) => Some(*id),
            Actor::System => None,
        }
    }

    /// Returns true for automated actions.
    pub fn is_system(&self) -> bool {
        matches!(self, Actor::System)
    }

    /// Rebuilds an actor from its stored columns.
    pub fn from_columns(user_id: Option<i64>, is_system: bool) -> Self {
        match (user_id, is_system) {
            (Some(id), false) => Actor::User(id),
            _ => Actor::System,
        }
    }
}

impl std::fmt::Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Actor::User(id) => write!(f, "user:{}", id),
            Actor::System => write!(f, "system"),
        }
    }
}

// =============================================================================
// Document Type
// =============================================================================

/// Kinds of entity that appear in the linkage graph and the audit ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Booking,
    Contract,
    Invoice,
    PayoutRequest,
    PaymentTransaction,
    Receipt,
    Payment,
    DocumentLinkage,
}

text_enum!(DocumentType {
    Booking => "booking",
    Contract => "contract",
    Invoice => "invoice",
    PayoutRequest => "payout_request",
    PaymentTransaction => "payment_transaction",
    Receipt => "receipt",
    Payment => "payment",
    DocumentLinkage => "document_linkage",
});

/// A typed pointer to one entity: `(document_type, id)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentRef {
    pub document_type: DocumentType,
    pub id: i64,
}

impl DocumentRef {
    pub const fn new(document_type: DocumentType, id: i64) -> Self {
        DocumentRef { document_type, id }
    }

    pub const fn booking(id: i64) -> Self {
        Self::new(DocumentType::Booking, id)
    }

    pub const fn contract(id: i64) -> Self {
        Self::new(DocumentType::Contract, id)
    }

    pub const fn invoice(id: i64) -> Self {
        Self::new(DocumentType::Invoice, id)
    }

    pub const fn payout_request(id: i64) -> Self {
        Self::new(DocumentType::PayoutRequest, id)
    }

    pub const fn transaction(id: i64) -> Self {
        Self::new(DocumentType::PaymentTransaction, id)
    }

    pub const fn receipt(id: i64) -> Self {
        Self::new(DocumentType::Receipt, id)
    }
}

impl std::fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.document_type, self.id)
    }
}

// =============================================================================
// Linkage Type
// =============================================================================

/// Label on a directed edge of the document linkage graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum LinkageType {
    /// Source caused the linked document to exist (booking → invoice).
    Generates,
    /// Source settles an obligation of the linked document (receipt → contract).
    Fulfills,
    /// Informational reference (booking → transaction).
    References,
    /// Source replaces the linked document.
    Supersedes,
    /// Source voids the linked document.
    Cancels,
}

text_enum!(LinkageType {
    Generates => "generates",
    Fulfills => "fulfills",
    References => "references",
    Supersedes => "supersedes",
    Cancels => "cancels",
});

// =============================================================================
// Audit Action
// =============================================================================

/// What kind of mutation an audit entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Created,
    Updated,
    Converted,
    StatusChanged,
    Linked,
}

text_enum!(AuditAction {
    Created => "created",
    Updated => "updated",
    Converted => "converted",
    StatusChanged => "status_changed",
    Linked => "linked",
});

// =============================================================================
// Triggered By
// =============================================================================

/// The event that caused a document to be generated or last reshaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum TriggeredBy {
    Manual,
    BookingAcceptance,
    ProformaAcceptance,
    ContractSignature,
    BookingCompletion,
}

text_enum!(TriggeredBy {
    Manual => "manual",
    BookingAcceptance => "booking_acceptance",
    ProformaAcceptance => "proforma_acceptance",
    ContractSignature => "contract_signature",
    BookingCompletion => "booking_completion",
});

// =============================================================================
// Render Status
// =============================================================================

/// Progress of the external PDF render for a renderable document.
///
/// A document is valid and payable in every render state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum RenderStatus {
    #[default]
    Pending,
    Rendered,
    Failed,
}

text_enum!(RenderStatus {
    Pending => "pending",
    Rendered => "rendered",
    Failed => "failed",
});

// =============================================================================
// Party
// =============================================================================

/// Name and address block of an issuer or recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    pub name: String,
    pub address: Option<String>,
    pub tax_id: Option<String>,
}

impl Party {
    pub fn new(name: impl Into<String>, address: Option<String>) -> Self {
        Party {
            name: name.into(),
            address,
            tax_id: None,
        }
    }

    pub fn with_tax_id(mut self, tax_id: Option<String>) -> Self {
        self.tax_id = tax_id;
        self
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_actor_columns_round_trip() {
        assert_eq!(Actor::from_columns(Some(7), false), Actor::User(7));
        assert_eq!(Actor::from_columns(None, true), Actor::System);
        assert_eq!(Actor::User(7).user_id(), Some(7));
        assert!(Actor::System.is_system());
    }

    #[test]
    fn test_text_enums_parse_their_own_output() {
        for ty in DocumentType::ALL {
            assert_eq!(ty.as_str().parse::<DocumentType>().unwrap(), *ty);
        }
        assert_eq!("status_changed".parse::<AuditAction>().unwrap(), AuditAction::StatusChanged);
        assert!("deleted".parse::<AuditAction>().is_err());
    }

    #[test]
    fn test_text_matches_serde_representation() {
        let json = serde_json::to_string(&DocumentType::PayoutRequest).unwrap();
        assert_eq!(json, format!("\"{}\"", DocumentType::PayoutRequest.as_str()));
        let json = serde_json::to_string(&TriggeredBy::ProformaAcceptance).unwrap();
        assert_eq!(json, "\"proforma_acceptance\"");
    }

    #[test]
    fn test_document_ref_display() {
        assert_eq!(DocumentRef::invoice(42).to_string(), "invoice#42");
        assert_eq!(DocumentRef::payout_request(3).to_string(), "payout_request#3");
    }
}
