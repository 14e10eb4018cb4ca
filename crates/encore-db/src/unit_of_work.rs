//! # Unit of Work
//!
//! One SQLite transaction spanning every write of a service operation.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  db.begin()                                                             │
//! │     │  BEGIN + claim write lock                                         │
//! │     ▼                                                                   │
//! │  sequence::next_value   ── number issued                                │
//! │  invoice::insert        ── document row                                 │
//! │  linkage::insert        ── booking → generates → invoice                │
//! │  audit::append          ── "created"                                    │
//! │     │                                                                   │
//! │     ├── commit()  → all four visible together                           │
//! │     └── drop      → none of them happened, the number is released      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The write lock is taken on begin rather than at the first write. A
//! deferred SQLite transaction that reads and then writes can fail with
//! `SQLITE_BUSY_SNAPSHOT` under WAL when another writer committed in
//! between; claiming the lock up front makes concurrent units of work
//! queue on `busy_timeout` instead.

use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use tracing::debug;

use crate::error::{DbError, DbResult};

/// An open database transaction. Dropping it without [`commit`] rolls back.
///
/// [`commit`]: UnitOfWork::commit
pub struct UnitOfWork {
    tx: Transaction<'static, Sqlite>,
}

impl UnitOfWork {
    pub(crate) async fn begin(pool: &SqlitePool) -> DbResult<Self> {
        let mut tx = pool
            .begin()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        // A no-op write upgrades the transaction to hold the RESERVED lock.
        sqlx::query("UPDATE document_sequences SET last_value = last_value WHERE 0 = 1")
            .execute(&mut *tx)
            .await?;

        debug!("Unit of work started");
        Ok(UnitOfWork { tx })
    }

    /// The connection to run statements on.
    pub fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.tx
    }

    pub async fn commit(self) -> DbResult<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;
        debug!("Unit of work committed");
        Ok(())
    }

    pub async fn rollback(self) -> DbResult<()> {
        self.tx
            .rollback()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))
    }
}
