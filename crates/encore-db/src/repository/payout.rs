//! # Payout Request Repository

use chrono::{DateTime, Utc};
use sqlx::{Executor, FromRow, Sqlite, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use encore_core::payout::{PayoutDraft, PayoutRequest, PayoutRequestType, PayoutStatus};
use encore_core::types::TriggeredBy;
use encore_core::{Money, Rate};

const SELECT_PAYOUT: &str = r#"
    SELECT id, booking_id, performer_user_id, request_number, request_type,
           base_amount_cents, commission_bps, commission_amount_cents, net_payout_cents,
           currency, payment_method, status, triggered_by, triggered_by_user_id,
           approved_by_user_id, approved_at, processed_at, paid_at, decline_reason,
           notes, created_at, updated_at
    FROM payout_requests
"#;

#[derive(Debug, FromRow)]
struct PayoutRow {
    id: i64,
    booking_id: i64,
    performer_user_id: i64,
    request_number: String,
    request_type: PayoutRequestType,
    base_amount_cents: i64,
    commission_bps: i64,
    commission_amount_cents: i64,
    net_payout_cents: i64,
    currency: String,
    payment_method: String,
    status: PayoutStatus,
    triggered_by: TriggeredBy,
    triggered_by_user_id: Option<i64>,
    approved_by_user_id: Option<i64>,
    approved_at: Option<DateTime<Utc>>,
    processed_at: Option<DateTime<Utc>>,
    paid_at: Option<DateTime<Utc>>,
    decline_reason: Option<String>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PayoutRow> for PayoutRequest {
    type Error = DbError;

    fn try_from(row: PayoutRow) -> DbResult<Self> {
        let commission_bps =
            u32::try_from(row.commission_bps).map_err(|e| DbError::decode("commission_bps", e))?;

        Ok(PayoutRequest {
            id: row.id,
            booking_id: row.booking_id,
            performer_user_id: row.performer_user_id,
            request_number: row.request_number,
            request_type: row.request_type,
            base_amount: Money::from_cents(row.base_amount_cents),
            commission_rate: Rate::from_bps(commission_bps),
            commission_amount: Money::from_cents(row.commission_amount_cents),
            net_payout_amount: Money::from_cents(row.net_payout_cents),
            currency: row.currency,
            payment_method: row.payment_method,
            status: row.status,
            triggered_by: row.triggered_by,
            triggered_by_user_id: row.triggered_by_user_id,
            approved_by_user_id: row.approved_by_user_id,
            approved_at: row.approved_at,
            processed_at: row.processed_at,
            paid_at: row.paid_at,
            decline_reason: row.decline_reason,
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

pub async fn fetch_by_id<'e, E>(executor: E, id: i64) -> DbResult<Option<PayoutRequest>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!("{} WHERE id = ?1", SELECT_PAYOUT);
    let row: Option<PayoutRow> = sqlx::query_as(&sql)
        .bind(id)
        .fetch_optional(executor)
        .await?;
    row.map(PayoutRequest::try_from).transpose()
}

/// Repository for payout request reads.
#[derive(Debug, Clone)]
pub struct PayoutRepository {
    pool: SqlitePool,
}

impl PayoutRepository {
    pub fn new(pool: SqlitePool) -> Self {
        PayoutRepository { pool }
    }

    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<PayoutRequest>> {
        fetch_by_id(&self.pool, id).await
    }

    pub async fn list_for_booking(&self, booking_id: i64) -> DbResult<Vec<PayoutRequest>> {
        let sql = format!("{} WHERE booking_id = ?1 ORDER BY id", SELECT_PAYOUT);
        let rows: Vec<PayoutRow> = sqlx::query_as(&sql)
            .bind(booking_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(PayoutRequest::try_from).collect()
    }
}

/// Inserts a drafted payout request under its issued number.
pub async fn insert(
    conn: &mut SqliteConnection,
    draft: &PayoutDraft,
    request_number: &str,
    now: DateTime<Utc>,
) -> DbResult<PayoutRequest> {
    debug!(
        booking_id = draft.booking_id,
        performer_user_id = draft.performer_user_id,
        request_number,
        "Inserting payout request"
    );

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO payout_requests (
            booking_id, performer_user_id, request_number, request_type,
            base_amount_cents, commission_bps, commission_amount_cents, net_payout_cents,
            currency, payment_method, status, triggered_by, triggered_by_user_id,
            notes, created_at, updated_at
        ) VALUES (
            ?1, ?2, ?3, ?4,
            ?5, ?6, ?7, ?8,
            ?9, ?10, ?11, ?12, ?13,
            ?14, ?15, ?15
        )
        RETURNING id
        "#,
    )
    .bind(draft.booking_id)
    .bind(draft.performer_user_id)
    .bind(request_number)
    .bind(draft.request_type)
    .bind(draft.split.base.cents())
    .bind(i64::from(draft.split.commission_rate.bps()))
    .bind(draft.split.commission.cents())
    .bind(draft.split.net.cents())
    .bind(&draft.currency)
    .bind(&draft.payment_method)
    .bind(PayoutStatus::Pending)
    .bind(draft.triggered_by)
    .bind(draft.triggered_by_user_id)
    .bind(&draft.notes)
    .bind(now)
    .fetch_one(&mut *conn)
    .await?;

    Ok(PayoutRequest {
        id,
        booking_id: draft.booking_id,
        performer_user_id: draft.performer_user_id,
        request_number: request_number.to_string(),
        request_type: draft.request_type,
        base_amount: draft.split.base,
        commission_rate: draft.split.commission_rate,
        commission_amount: draft.split.commission,
        net_payout_amount: draft.split.net,
        currency: draft.currency.clone(),
        payment_method: draft.payment_method.clone(),
        status: PayoutStatus::Pending,
        triggered_by: draft.triggered_by,
        triggered_by_user_id: draft.triggered_by_user_id,
        approved_by_user_id: None,
        approved_at: None,
        processed_at: None,
        paid_at: None,
        decline_reason: None,
        notes: Some(draft.notes.clone()),
        created_at: now,
        updated_at: now,
    })
}

/// Persists a status transition if the row still has status `expected`.
pub async fn update_status(
    conn: &mut SqliteConnection,
    payout: &PayoutRequest,
    expected: PayoutStatus,
) -> DbResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE payout_requests SET
            status = ?2,
            approved_by_user_id = ?3,
            approved_at = ?4,
            processed_at = ?5,
            paid_at = ?6,
            decline_reason = ?7,
            updated_at = ?8
        WHERE id = ?1 AND status = ?9
        "#,
    )
    .bind(payout.id)
    .bind(payout.status)
    .bind(payout.approved_by_user_id)
    .bind(payout.approved_at)
    .bind(payout.processed_at)
    .bind(payout.paid_at)
    .bind(&payout.decline_reason)
    .bind(payout.updated_at)
    .bind(expected)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}
