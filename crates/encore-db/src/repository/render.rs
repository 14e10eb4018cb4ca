//! # Render Queue
//!
//! Invoices and receipts carry their own render bookkeeping
//! (`render_status`, `render_attempts`, `render_error`). The queue is a view
//! over those columns: anything not yet rendered with attempts left.
//!
//! ```text
//!   pending ──render ok──► rendered
//!      │
//!      └──render failed──► failed (attempts + 1) ──sweep retries while
//!                                                  attempts < max_attempts
//! ```

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::{debug, warn};

use crate::error::DbResult;
use encore_core::document::RenderTarget;
use encore_core::types::RenderStatus;

fn table_for(target: RenderTarget) -> (&'static str, i64) {
    match target {
        RenderTarget::Invoice(id) => ("invoices", id),
        RenderTarget::Receipt(id) => ("receipts", id),
    }
}

/// Records a successful render. Returns `false` if the row is gone.
pub async fn mark_rendered(
    conn: &mut SqliteConnection,
    target: RenderTarget,
    document_url: &str,
    now: DateTime<Utc>,
) -> DbResult<bool> {
    let (table, id) = table_for(target);
    let sql = format!(
        "UPDATE {} SET document_url = ?2, render_status = ?3, render_error = NULL, updated_at = ?4 WHERE id = ?1",
        table
    );
    let result = sqlx::query(&sql)
        .bind(id)
        .bind(document_url)
        .bind(RenderStatus::Rendered)
        .bind(now)
        .execute(&mut *conn)
        .await?;

    debug!(%target, document_url, "Marked document rendered");
    Ok(result.rows_affected() == 1)
}

#[derive(Debug, FromRow)]
struct PendingRow {
    kind: String,
    id: i64,
}

/// Queue reads and failure bookkeeping.
#[derive(Debug, Clone)]
pub struct RenderQueueRepository {
    pool: SqlitePool,
}

impl RenderQueueRepository {
    pub fn new(pool: SqlitePool) -> Self {
        RenderQueueRepository { pool }
    }

    /// Documents still waiting for a PDF, oldest first.
    pub async fn pending_targets(&self, max_attempts: u32, limit: u32) -> DbResult<Vec<RenderTarget>> {
        let rows: Vec<PendingRow> = sqlx::query_as(
            r#"
            SELECT kind, id FROM (
                SELECT 'invoice' AS kind, id, updated_at FROM invoices
                WHERE render_status != 'rendered' AND render_attempts < ?1
                UNION ALL
                SELECT 'receipt' AS kind, id, updated_at FROM receipts
                WHERE render_status != 'rendered' AND render_attempts < ?1
            )
            ORDER BY updated_at, kind, id
            LIMIT ?2
            "#,
        )
        .bind(i64::from(max_attempts))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| match row.kind.as_str() {
                "receipt" => RenderTarget::Receipt(row.id),
                _ => RenderTarget::Invoice(row.id),
            })
            .collect())
    }

    /// Records a failed attempt. The business document is left untouched.
    pub async fn mark_failed(
        &self,
        target: RenderTarget,
        error: &str,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        let (table, id) = table_for(target);
        let sql = format!(
            "UPDATE {} SET render_status = ?2, render_attempts = render_attempts + 1, render_error = ?3, updated_at = ?4 WHERE id = ?1",
            table
        );
        sqlx::query(&sql)
            .bind(id)
            .bind(RenderStatus::Failed)
            .bind(error)
            .bind(now)
            .execute(&self.pool)
            .await?;

        warn!(%target, error, "Document render failed");
        Ok(())
    }

    /// `(attempts, last_error)` for one document.
    pub async fn attempts(&self, target: RenderTarget) -> DbResult<Option<(i64, Option<String>)>> {
        let (table, id) = table_for(target);
        let sql = format!("SELECT render_attempts, render_error FROM {} WHERE id = ?1", table);
        let row: Option<(i64, Option<String>)> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::repository::receipt;
    use encore_core::receipt::ReceiptDraft;
    use encore_core::Money;

    fn draft() -> ReceiptDraft {
        ReceiptDraft {
            booking_id: 1,
            payment_id: 1,
            recipient_name: "Client".into(),
            items: vec![],
            subtotal: Money::from_cents(100),
            tax: Money::zero(),
            total: Money::from_cents(100),
            currency: "USD".into(),
        }
    }

    #[tokio::test]
    async fn test_failed_renders_leave_the_queue_after_max_attempts() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut uow = db.begin().await.unwrap();
        let rec = receipt::insert(uow.conn(), &draft(), "REC-2026-000001", Utc::now())
            .await
            .unwrap();
        uow.commit().await.unwrap();

        let queue = db.render_queue();
        let target = RenderTarget::Receipt(rec.id);
        assert_eq!(queue.pending_targets(2, 10).await.unwrap(), vec![target]);

        queue.mark_failed(target, "renderer unavailable", Utc::now()).await.unwrap();
        assert_eq!(queue.pending_targets(2, 10).await.unwrap(), vec![target]);

        queue.mark_failed(target, "renderer unavailable", Utc::now()).await.unwrap();
        assert!(queue.pending_targets(2, 10).await.unwrap().is_empty());
        assert_eq!(
            queue.attempts(target).await.unwrap(),
            Some((2, Some("renderer unavailable".to_string())))
        );

        let loaded = db.receipts().get_by_id(rec.id).await.unwrap().unwrap();
        assert_eq!(loaded.render_status, RenderStatus::Failed);
        assert_eq!(loaded.total, rec.total);
    }

    #[tokio::test]
    async fn test_rendered_documents_leave_the_queue() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut uow = db.begin().await.unwrap();
        let rec = receipt::insert(uow.conn(), &draft(), "REC-2026-000001", Utc::now())
            .await
            .unwrap();
        let target = RenderTarget::Receipt(rec.id);
        assert!(mark_rendered(uow.conn(), target, "https://docs.example/rec-1.pdf", Utc::now())
            .await
            .unwrap());
        assert!(!mark_rendered(uow.conn(), RenderTarget::Invoice(99), "x", Utc::now())
            .await
            .unwrap());
        uow.commit().await.unwrap();

        assert!(db.render_queue().pending_targets(3, 10).await.unwrap().is_empty());
        let loaded = db.receipts().get_by_id(rec.id).await.unwrap().unwrap();
        assert_eq!(loaded.document_url.as_deref(), Some("https://docs.example/rec-1.pdf"));
    }
}
