//! # Document Sequences
//!
//! Atomic per-scope counters backing every document number.
//!
//! ```text
//! INSERT INTO document_sequences (series, scope, last_value) VALUES ('INV', '2026', 1)
//! ON CONFLICT (series, scope) DO UPDATE SET last_value = last_value + 1
//! RETURNING last_value
//! ```
//!
//! One statement, run inside the caller's unit of work: the row is created
//! on first use and incremented under the write lock afterwards, so two
//! callers never observe the same value. A rolled-back unit of work takes
//! its increment with it.

use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;

/// Advances the counter for `(series, scope)` and returns the new value.
pub async fn next_value(conn: &mut SqliteConnection, series: &str, scope: &str) -> DbResult<i64> {
    let value: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO document_sequences (series, scope, last_value)
        VALUES (?1, ?2, 1)
        ON CONFLICT (series, scope) DO UPDATE SET last_value = last_value + 1
        RETURNING last_value
        "#,
    )
    .bind(series)
    .bind(scope)
    .fetch_one(&mut *conn)
    .await?;

    debug!(series, scope, value, "Advanced document sequence");
    Ok(value)
}

/// Read access to counter state.
#[derive(Debug, Clone)]
pub struct SequenceRepository {
    pool: SqlitePool,
}

impl SequenceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SequenceRepository { pool }
    }

    /// Last issued value, or `None` if the scope has never been used.
    pub async fn current(&self, series: &str, scope: &str) -> DbResult<Option<i64>> {
        let value = sqlx::query_scalar(
            "SELECT last_value FROM document_sequences WHERE series = ?1 AND scope = ?2",
        )
        .bind(series)
        .bind(scope)
        .fetch_optional(&self.pool)
        .await?;

        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    #[tokio::test]
    async fn test_scopes_count_independently() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut uow = db.begin().await.unwrap();

        assert_eq!(next_value(uow.conn(), "INV", "2026").await.unwrap(), 1);
        assert_eq!(next_value(uow.conn(), "INV", "2026").await.unwrap(), 2);
        assert_eq!(next_value(uow.conn(), "INV", "2027").await.unwrap(), 1);
        assert_eq!(next_value(uow.conn(), "PRO", "2026").await.unwrap(), 1);
        uow.commit().await.unwrap();

        assert_eq!(db.sequences().current("INV", "2026").await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_concurrent_writers_never_share_a_value() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(DbConfig::new(dir.path().join("seq.db")).max_connections(4))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let db = db.clone();
            handles.push(tokio::spawn(async move {
                let mut values = Vec::new();
                for _ in 0..5 {
                    let mut uow = db.begin().await.unwrap();
                    values.push(next_value(uow.conn(), "PAYOUT", "2026").await.unwrap());
                    uow.commit().await.unwrap();
                }
                values
            }));
        }

        let mut all = Vec::new();
        for handle in handles {
            all.extend(handle.await.unwrap());
        }
        all.sort_unstable();
        assert_eq!(all, (1..=40).collect::<Vec<i64>>());
    }
}
