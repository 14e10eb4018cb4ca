//! # Audit Entries
//!
//! The append-only ledger record. Entries are built with [`AuditRecord`]
//! and written in the same unit of work as the mutation they describe.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Actor, AuditAction, DocumentRef, DocumentType};

/// An audit entry that has not been written yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub entity: DocumentRef,
    pub action: AuditAction,
    pub description: String,
    pub actor: Actor,
    pub previous_values: Option<serde_json::Value>,
    pub new_values: Option<serde_json::Value>,
}

impl AuditRecord {
    pub fn new(
        entity: DocumentRef,
        action: AuditAction,
        actor: Actor,
        description: impl Into<String>,
    ) -> Self {
        AuditRecord {
            entity,
            action,
            description: description.into(),
            actor,
            previous_values: None,
            new_values: None,
        }
    }

    pub fn previous(mut self, values: serde_json::Value) -> Self {
        self.previous_values = Some(values);
        self
    }

    pub fn new_values(mut self, values: serde_json::Value) -> Self {
        self.new_values = Some(values);
        self
    }
}

/// A written audit entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: i64,
    pub entity_type: DocumentType,
    pub entity_id: i64,
    pub action: AuditAction,
    pub description: String,
    pub actor: Actor,
    pub previous_values: Option<serde_json::Value>,
    pub new_values: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl AuditLogEntry {
    pub fn entity(&self) -> DocumentRef {
        DocumentRef::new(self.entity_type, self.entity_id)
    }
}
