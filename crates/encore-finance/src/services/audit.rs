//! # Audit Log
//!
//! Writes go through [`AuditLog::record`] on the unit of work of the
//! operation being audited. If the entry can't be written the whole
//! operation fails and rolls back.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use encore_core::audit::{AuditLogEntry, AuditRecord};
use encore_core::types::DocumentRef;
use encore_db::repository::audit;
use encore_db::AuditRepository;

use crate::error::{FinanceError, FinanceResult};

#[derive(Debug, Clone)]
pub struct AuditLog {
    repo: AuditRepository,
}

impl AuditLog {
    pub fn new(repo: AuditRepository) -> Self {
        AuditLog { repo }
    }

    pub async fn record(
        conn: &mut SqliteConnection,
        record: &AuditRecord,
        now: DateTime<Utc>,
    ) -> FinanceResult<AuditLogEntry> {
        Ok(audit::append(conn, record, now).await?)
    }

    /// Full history of one entity, oldest first.
    pub async fn for_entity(&self, entity: DocumentRef) -> FinanceResult<Vec<AuditLogEntry>> {
        Ok(self.repo.for_entity(entity).await?)
    }

    /// Every entry written in `[from, to]`, oldest first.
    pub async fn between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> FinanceResult<Vec<AuditLogEntry>> {
        if from > to {
            return Err(FinanceError::Validation(format!(
                "audit range starts ({}) after it ends ({})",
                from, to
            )));
        }
        Ok(self.repo.between(from, to).await?)
    }
}
