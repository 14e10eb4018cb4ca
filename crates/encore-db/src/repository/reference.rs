//! # Reference Repository
//!
//! Read access to the booking platform's records: bookings with their
//! active assignments, users, payments and contracts. The insert helpers
//! exist for seeding and tests.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use encore_core::booking::{
    Assignment, BookingSnapshot, BookingStatus, ContractRecord, ContractType, PaymentRecord,
    UserProfile,
};
use encore_core::Money;

// =============================================================================
// Rows
// =============================================================================

#[derive(Debug, FromRow)]
struct BookingRow {
    id: i64,
    booker_user_id: Option<i64>,
    guest_name: Option<String>,
    event_name: String,
    event_type: String,
    event_date: Option<DateTime<Utc>>,
    venue_address: Option<String>,
    total_budget_cents: i64,
    final_price_cents: Option<i64>,
    status: BookingStatus,
}

#[derive(Debug, FromRow)]
struct AssignmentRow {
    user_id: i64,
    role: Option<String>,
}

#[derive(Debug, FromRow)]
struct UserRow {
    id: i64,
    full_name: String,
    address: Option<String>,
}

#[derive(Debug, FromRow)]
struct PaymentRow {
    id: i64,
    booking_id: i64,
    amount_cents: i64,
    currency: String,
    paid_at: Option<DateTime<Utc>>,
}

#[derive(Debug, FromRow)]
struct ContractRow {
    id: i64,
    booking_id: i64,
    contract_type: ContractType,
    assigned_to_user_id: Option<i64>,
    content: String,
}

// =============================================================================
// Seed Inputs
// =============================================================================

/// Fields for seeding a booking row.
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub booker_user_id: Option<i64>,
    pub guest_name: Option<String>,
    pub event_name: String,
    pub event_type: String,
    pub event_date: Option<DateTime<Utc>>,
    pub venue_address: Option<String>,
    pub total_budget: Money,
    pub status: BookingStatus,
}

// =============================================================================
// Repository
// =============================================================================

/// Repository over the reference tables.
#[derive(Debug, Clone)]
pub struct ReferenceRepository {
    pool: SqlitePool,
}

impl ReferenceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ReferenceRepository { pool }
    }

    /// Gets a booking with only its active assignments.
    pub async fn get_booking(&self, id: i64) -> DbResult<Option<BookingSnapshot>> {
        let row: Option<BookingRow> = sqlx::query_as(
            r#"
            SELECT id, booker_user_id, guest_name, event_name, event_type, event_date,
                   venue_address, total_budget_cents, final_price_cents, status
            FROM bookings
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let assignments: Vec<AssignmentRow> = sqlx::query_as(
            r#"
            SELECT user_id, role
            FROM booking_assignments
            WHERE booking_id = ?1 AND is_active = 1
            ORDER BY id
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(BookingSnapshot {
            id: row.id,
            booker_user_id: row.booker_user_id,
            guest_name: row.guest_name,
            event_name: row.event_name,
            event_type: row.event_type,
            event_date: row.event_date,
            venue_address: row.venue_address,
            total_budget: Money::from_cents(row.total_budget_cents),
            final_price: row.final_price_cents.map(Money::from_cents),
            status: row.status,
            active_assignments: assignments
                .into_iter()
                .map(|a| Assignment {
                    user_id: a.user_id,
                    role: a.role,
                })
                .collect(),
        }))
    }

    pub async fn get_user(&self, id: i64) -> DbResult<Option<UserProfile>> {
        let row: Option<UserRow> =
            sqlx::query_as("SELECT id, full_name, address FROM users WHERE id = ?1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|r| UserProfile {
            id: r.id,
            full_name: r.full_name,
            address: r.address,
        }))
    }

    pub async fn get_payment(&self, id: i64) -> DbResult<Option<PaymentRecord>> {
        let row: Option<PaymentRow> = sqlx::query_as(
            "SELECT id, booking_id, amount_cents, currency, paid_at FROM payments WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| PaymentRecord {
            id: r.id,
            booking_id: r.booking_id,
            amount: Money::from_cents(r.amount_cents),
            currency: r.currency,
            paid_at: r.paid_at,
        }))
    }

    pub async fn get_contract(&self, id: i64) -> DbResult<Option<ContractRecord>> {
        let row: Option<ContractRow> = sqlx::query_as(
            r#"
            SELECT id, booking_id, contract_type, assigned_to_user_id, content
            FROM contracts
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| {
            let content =
                serde_json::from_str(&r.content).map_err(|e| DbError::decode("content", e))?;
            Ok(ContractRecord {
                id: r.id,
                booking_id: r.booking_id,
                contract_type: r.contract_type,
                assigned_to_user_id: r.assigned_to_user_id,
                content,
            })
        })
        .transpose()
    }

    // -------------------------------------------------------------------------
    // Seeding
    // -------------------------------------------------------------------------

    pub async fn insert_user(&self, full_name: &str, address: Option<&str>) -> DbResult<i64> {
        let id = sqlx::query_scalar("INSERT INTO users (full_name, address) VALUES (?1, ?2) RETURNING id")
            .bind(full_name)
            .bind(address)
            .fetch_one(&self.pool)
            .await?;
        debug!(id, full_name, "Inserted user");
        Ok(id)
    }

    pub async fn insert_booking(&self, booking: &NewBooking) -> DbResult<i64> {
        let id = sqlx::query_scalar(
            r#"
            INSERT INTO bookings (
                booker_user_id, guest_name, event_name, event_type, event_date,
                venue_address, total_budget_cents, status
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            RETURNING id
            "#,
        )
        .bind(booking.booker_user_id)
        .bind(&booking.guest_name)
        .bind(&booking.event_name)
        .bind(&booking.event_type)
        .bind(booking.event_date)
        .bind(&booking.venue_address)
        .bind(booking.total_budget.cents())
        .bind(booking.status)
        .fetch_one(&self.pool)
        .await?;
        debug!(id, event = %booking.event_name, "Inserted booking");
        Ok(id)
    }

    pub async fn set_booking_status(&self, booking_id: i64, status: BookingStatus) -> DbResult<()> {
        let result = sqlx::query("UPDATE bookings SET status = ?2 WHERE id = ?1")
            .bind(booking_id)
            .bind(status)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Booking", booking_id));
        }
        Ok(())
    }

    pub async fn add_assignment(
        &self,
        booking_id: i64,
        user_id: i64,
        role: Option<&str>,
        is_active: bool,
    ) -> DbResult<i64> {
        let id = sqlx::query_scalar(
            r#"
            INSERT INTO booking_assignments (booking_id, user_id, role, is_active)
            VALUES (?1, ?2, ?3, ?4)
            RETURNING id
            "#,
        )
        .bind(booking_id)
        .bind(user_id)
        .bind(role)
        .bind(is_active)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn insert_payment(
        &self,
        booking_id: i64,
        amount: Money,
        currency: &str,
        paid_at: Option<DateTime<Utc>>,
    ) -> DbResult<i64> {
        let id = sqlx::query_scalar(
            r#"
            INSERT INTO payments (booking_id, amount_cents, currency, paid_at)
            VALUES (?1, ?2, ?3, ?4)
            RETURNING id
            "#,
        )
        .bind(booking_id)
        .bind(amount.cents())
        .bind(currency)
        .bind(paid_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn insert_contract(
        &self,
        booking_id: i64,
        contract_type: ContractType,
        assigned_to_user_id: Option<i64>,
        content: &serde_json::Value,
    ) -> DbResult<i64> {
        let id = sqlx::query_scalar(
            r#"
            INSERT INTO contracts (booking_id, contract_type, assigned_to_user_id, content)
            VALUES (?1, ?2, ?3, ?4)
            RETURNING id
            "#,
        )
        .bind(booking_id)
        .bind(contract_type)
        .bind(assigned_to_user_id)
        .bind(content.to_string())
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use serde_json::json;

    #[tokio::test]
    async fn test_booking_snapshot_only_has_active_assignments() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let refs = db.reference();

        let booker = refs.insert_user("Ada Booker", None).await.unwrap();
        let p1 = refs.insert_user("Performer One", None).await.unwrap();
        let p2 = refs.insert_user("Performer Two", None).await.unwrap();
        let booking_id = refs
            .insert_booking(&NewBooking {
                booker_user_id: Some(booker),
                guest_name: None,
                event_name: "Gala".into(),
                event_type: "corporate".into(),
                event_date: None,
                venue_address: Some("1 Hall Rd".into()),
                total_budget: Money::from_cents(500000),
                status: BookingStatus::Pending,
            })
            .await
            .unwrap();
        refs.add_assignment(booking_id, p1, Some("lead"), true).await.unwrap();
        refs.add_assignment(booking_id, p2, None, false).await.unwrap();

        let booking = refs.get_booking(booking_id).await.unwrap().unwrap();
        assert_eq!(booking.total_budget.cents(), 500000);
        assert_eq!(booking.status, BookingStatus::Pending);
        assert_eq!(booking.active_assignments.len(), 1);
        assert_eq!(booking.active_assignments[0].user_id, p1);

        assert!(refs.get_booking(999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_contract_content_round_trips() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let refs = db.reference();
        let performer = refs.insert_user("Performer", Some("2 Side St")).await.unwrap();
        let booking_id = refs
            .insert_booking(&NewBooking {
                booker_user_id: None,
                guest_name: Some("Guest".into()),
                event_name: "Wedding".into(),
                event_type: "private".into(),
                event_date: None,
                venue_address: None,
                total_budget: Money::from_cents(100000),
                status: BookingStatus::Accepted,
            })
            .await
            .unwrap();

        let content = json!({ "individualPricing": { performer.to_string(): 750 } });
        let id = refs
            .insert_contract(booking_id, ContractType::PerformanceAgreement, Some(performer), &content)
            .await
            .unwrap();

        let contract = refs.get_contract(id).await.unwrap().unwrap();
        assert_eq!(contract.performer_fee().unwrap(), (performer, Money::from_cents(75000)));
    }
}
