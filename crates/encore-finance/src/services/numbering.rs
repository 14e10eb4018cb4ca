//! # Numbering Authority
//!
//! Issues document numbers from the atomic sequence table.
//!
//! ```text
//!   PRO-2026-000001   INV-2026-000001   PAYOUT-2026-000001   REC-2026-000001
//!   └─ global series: one counter per (series, year)
//!
//!   INV-17-42-00001
//!   └─ performer series: one counter per (performer, booking)
//! ```
//!
//! A number is taken inside the unit of work of the document that carries
//! it: a rolled-back operation releases its number, and concurrent callers
//! serialize on the counter row.

use chrono::{DateTime, Datelike, Utc};
use sqlx::SqliteConnection;
use tracing::{debug, error};

use encore_core::numbering::NumberSeries;
use encore_db::repository::sequence;
use encore_db::SequenceRepository;

use crate::error::{FinanceError, FinanceResult};

#[derive(Debug, Clone)]
pub struct NumberingAuthority {
    sequences: SequenceRepository,
}

impl NumberingAuthority {
    pub fn new(sequences: SequenceRepository) -> Self {
        NumberingAuthority { sequences }
    }

    /// Takes the next number of `series` for the calendar year of `at`.
    ///
    /// ## Errors
    /// [`FinanceError::NumberGeneration`] if the counter can't be advanced.
    /// No number is ever derived any other way.
    pub async fn issue(
        conn: &mut SqliteConnection,
        series: NumberSeries,
        at: DateTime<Utc>,
    ) -> FinanceResult<String> {
        let year = at.year();
        let scope = series.scope(year);

        let value = sequence::next_value(conn, series.key(), &scope)
            .await
            .map_err(|e| {
                error!(%series, scope = %scope, error = %e, "Failed to advance document sequence");
                FinanceError::NumberGeneration(format!("{} ({}): {}", series, scope, e))
            })?;

        let number = series.format(year, value);
        debug!(%series, number = %number, "Issued document number");
        Ok(number)
    }

    /// The most recently issued number of `series` for `year`, if any.
    pub async fn last_issued(
        &self,
        series: NumberSeries,
        year: i32,
    ) -> FinanceResult<Option<String>> {
        let scope = series.scope(year);
        let current = self.sequences.current(series.key(), &scope).await?;
        Ok(current.map(|value| series.format(year, value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use encore_db::{Database, DbConfig};
    use std::collections::HashSet;

    fn march_2026() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_series_are_independent() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let at = march_2026();

        let mut uow = db.begin().await.unwrap();
        let conn = uow.conn();
        assert_eq!(NumberingAuthority::issue(conn, NumberSeries::Proforma, at).await.unwrap(), "PRO-2026-000001");
        assert_eq!(NumberingAuthority::issue(conn, NumberSeries::Proforma, at).await.unwrap(), "PRO-2026-000002");
        assert_eq!(NumberingAuthority::issue(conn, NumberSeries::Invoice, at).await.unwrap(), "INV-2026-000001");

        let performer = NumberSeries::PerformerInvoice { performer_id: 17, booking_id: 42 };
        assert_eq!(NumberingAuthority::issue(conn, performer, at).await.unwrap(), "INV-17-42-00001");
        let other_booking = NumberSeries::PerformerInvoice { performer_id: 17, booking_id: 43 };
        assert_eq!(NumberingAuthority::issue(conn, other_booking, at).await.unwrap(), "INV-17-43-00001");
        uow.commit().await.unwrap();

        let authority = NumberingAuthority::new(db.sequences());
        assert_eq!(
            authority.last_issued(NumberSeries::Proforma, 2026).await.unwrap().as_deref(),
            Some("PRO-2026-000002")
        );
        assert_eq!(authority.last_issued(NumberSeries::Receipt, 2026).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_new_year_restarts_the_global_series() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let next_year = Utc.with_ymd_and_hms(2027, 1, 1, 0, 0, 0).unwrap();

        let mut uow = db.begin().await.unwrap();
        NumberingAuthority::issue(uow.conn(), NumberSeries::Receipt, march_2026()).await.unwrap();
        let number = NumberingAuthority::issue(uow.conn(), NumberSeries::Receipt, next_year)
            .await
            .unwrap();
        assert_eq!(number, "REC-2027-000001");
    }

    #[tokio::test]
    async fn test_concurrent_callers_never_share_a_number() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(DbConfig::new(dir.path().join("numbers.db")).max_connections(4))
            .await
            .unwrap();

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let db = db.clone();
            tasks.push(tokio::spawn(async move {
                let mut uow = db.begin().await.unwrap();
                let number = NumberingAuthority::issue(uow.conn(), NumberSeries::Invoice, march_2026())
                    .await
                    .unwrap();
                uow.commit().await.unwrap();
                number
            }));
        }

        let mut issued = HashSet::new();
        for task in tasks {
            assert!(issued.insert(task.await.unwrap()));
        }
        assert_eq!(issued.len(), 16);
        assert!(issued.contains("INV-2026-000001"));
        assert!(issued.contains("INV-2026-000016"));
    }
}
