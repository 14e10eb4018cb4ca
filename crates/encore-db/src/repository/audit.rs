//! # Audit Repository
//!
//! The append-only ledger. [`append`] runs inside the unit of work of the
//! mutation it describes, so an entry exists exactly when its change does.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use encore_core::audit::{AuditLogEntry, AuditRecord};
use encore_core::types::{Actor, AuditAction, DocumentRef, DocumentType};

const SELECT_AUDIT: &str = r#"
    SELECT id, entity_type, entity_id, action_type, description,
           performed_by_user_id, performed_by_system,
           previous_values, new_values, created_at
    FROM audit_log
"#;

#[derive(Debug, FromRow)]
struct AuditRow {
    id: i64,
    entity_type: DocumentType,
    entity_id: i64,
    action_type: AuditAction,
    description: String,
    performed_by_user_id: Option<i64>,
    performed_by_system: bool,
    previous_values: Option<String>,
    new_values: Option<String>,
    created_at: DateTime<Utc>,
}

fn parse_snapshot(column: &'static str, raw: Option<String>) -> DbResult<Option<serde_json::Value>> {
    raw.map(|s| serde_json::from_str(&s).map_err(|e| DbError::decode(column, e)))
        .transpose()
}

impl TryFrom<AuditRow> for AuditLogEntry {
    type Error = DbError;

    fn try_from(row: AuditRow) -> DbResult<Self> {
        Ok(AuditLogEntry {
            id: row.id,
            entity_type: row.entity_type,
            entity_id: row.entity_id,
            action: row.action_type,
            description: row.description,
            actor: Actor::from_columns(row.performed_by_user_id, row.performed_by_system),
            previous_values: parse_snapshot("previous_values", row.previous_values)?,
            new_values: parse_snapshot("new_values", row.new_values)?,
            created_at: row.created_at,
        })
    }
}

/// Appends one entry.
pub async fn append(
    conn: &mut SqliteConnection,
    record: &AuditRecord,
    now: DateTime<Utc>,
) -> DbResult<AuditLogEntry> {
    debug!(
        entity = %record.entity,
        action = %record.action,
        actor = %record.actor,
        "Appending audit entry"
    );

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO audit_log (
            entity_type, entity_id, action_type, description,
            performed_by_user_id, performed_by_system,
            previous_values, new_values, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        RETURNING id
        "#,
    )
    .bind(record.entity.document_type)
    .bind(record.entity.id)
    .bind(record.action)
    .bind(&record.description)
    .bind(record.actor.user_id())
    .bind(record.actor.is_system())
    .bind(record.previous_values.as_ref().map(|v| v.to_string()))
    .bind(record.new_values.as_ref().map(|v| v.to_string()))
    .bind(now)
    .fetch_one(&mut *conn)
    .await?;

    Ok(AuditLogEntry {
        id,
        entity_type: record.entity.document_type,
        entity_id: record.entity.id,
        action: record.action,
        description: record.description.clone(),
        actor: record.actor,
        previous_values: record.previous_values.clone(),
        new_values: record.new_values.clone(),
        created_at: now,
    })
}

/// Read access to the ledger.
#[derive(Debug, Clone)]
pub struct AuditRepository {
    pool: SqlitePool,
}

impl AuditRepository {
    pub fn new(pool: SqlitePool) -> Self {
        AuditRepository { pool }
    }

    /// History of one entity, oldest first.
    pub async fn for_entity(&self, entity: DocumentRef) -> DbResult<Vec<AuditLogEntry>> {
        let sql = format!(
            "{} WHERE entity_type = ?1 AND entity_id = ?2 ORDER BY created_at, id",
            SELECT_AUDIT
        );
        let rows: Vec<AuditRow> = sqlx::query_as(&sql)
            .bind(entity.document_type)
            .bind(entity.id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(AuditLogEntry::try_from).collect()
    }

    /// Entries with `from <= created_at <= to`.
    pub async fn between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> DbResult<Vec<AuditLogEntry>> {
        let sql = format!(
            "{} WHERE created_at >= ?1 AND created_at <= ?2 ORDER BY created_at, id",
            SELECT_AUDIT
        );
        let rows: Vec<AuditRow> = sqlx::query_as(&sql)
            .bind(from)
            .bind(to)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(AuditLogEntry::try_from).collect()
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM audit_log")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
