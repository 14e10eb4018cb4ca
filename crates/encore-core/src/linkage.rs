//! # Document Linkage
//!
//! Directed, labelled edges between documents. The graph is a general
//! multigraph: cycles are allowed and edges are never updated or removed.
//!
//! ```text
//!   booking ──generates──► invoice ◄──fulfills── transaction
//!      │                                             ▲
//!      ├──generates──► payout_request ◄──fulfills────┤
//!      ├──references─────────────────────────────────┘
//!      └──generates──► receipt ──fulfills──► contract ──generates──► invoice
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Actor, DocumentRef, LinkageType};

/// An edge that has not been written yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLinkage {
    pub source: DocumentRef,
    pub linked: DocumentRef,
    pub linkage_type: LinkageType,
    pub description: Option<String>,
    pub created_by: Actor,
}

impl NewLinkage {
    pub fn new(
        source: DocumentRef,
        linkage_type: LinkageType,
        linked: DocumentRef,
        created_by: Actor,
    ) -> Self {
        NewLinkage {
            source,
            linked,
            linkage_type,
            description: None,
            created_by,
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A written edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentLinkage {
    pub id: i64,
    pub source: DocumentRef,
    pub linked: DocumentRef,
    pub linkage_type: LinkageType,
    pub description: Option<String>,
    pub created_by: Actor,
    pub created_at: DateTime<Utc>,
}
