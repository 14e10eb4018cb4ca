//! # Receipt Repository

use chrono::{DateTime, Utc};
use sqlx::{Executor, FromRow, Sqlite, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use encore_core::receipt::{Receipt, ReceiptDraft, ReceiptItem};
use encore_core::types::RenderStatus;
use encore_core::Money;

const SELECT_RECEIPT: &str = r#"
    SELECT id, booking_id, payment_id, receipt_number, recipient_name, items,
           subtotal_cents, tax_cents, total_cents, currency,
           document_url, render_status, created_at, updated_at
    FROM receipts
"#;

#[derive(Debug, FromRow)]
struct ReceiptRow {
    id: i64,
    booking_id: i64,
    payment_id: i64,
    receipt_number: String,
    recipient_name: String,
    items: String,
    subtotal_cents: i64,
    tax_cents: i64,
    total_cents: i64,
    currency: String,
    document_url: Option<String>,
    render_status: RenderStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ReceiptRow> for Receipt {
    type Error = DbError;

    fn try_from(row: ReceiptRow) -> DbResult<Self> {
        let items: Vec<ReceiptItem> =
            serde_json::from_str(&row.items).map_err(|e| DbError::decode("items", e))?;

        Ok(Receipt {
            id: row.id,
            booking_id: row.booking_id,
            payment_id: row.payment_id,
            receipt_number: row.receipt_number,
            recipient_name: row.recipient_name,
            items,
            subtotal: Money::from_cents(row.subtotal_cents),
            tax: Money::from_cents(row.tax_cents),
            total: Money::from_cents(row.total_cents),
            currency: row.currency,
            document_url: row.document_url,
            render_status: row.render_status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

pub async fn fetch_by_id<'e, E>(executor: E, id: i64) -> DbResult<Option<Receipt>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!("{} WHERE id = ?1", SELECT_RECEIPT);
    let row: Option<ReceiptRow> = sqlx::query_as(&sql)
        .bind(id)
        .fetch_optional(executor)
        .await?;
    row.map(Receipt::try_from).transpose()
}

#[derive(Debug, Clone)]
pub struct ReceiptRepository {
    pool: SqlitePool,
}

impl ReceiptRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ReceiptRepository { pool }
    }

    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<Receipt>> {
        fetch_by_id(&self.pool, id).await
    }

    pub async fn list_for_booking(&self, booking_id: i64) -> DbResult<Vec<Receipt>> {
        let sql = format!("{} WHERE booking_id = ?1 ORDER BY id", SELECT_RECEIPT);
        let rows: Vec<ReceiptRow> = sqlx::query_as(&sql)
            .bind(booking_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Receipt::try_from).collect()
    }
}

pub async fn insert(
    conn: &mut SqliteConnection,
    draft: &ReceiptDraft,
    receipt_number: &str,
    now: DateTime<Utc>,
) -> DbResult<Receipt> {
    debug!(booking_id = draft.booking_id, payment_id = draft.payment_id, receipt_number, "Inserting receipt");

    let items = serde_json::to_string(&draft.items).map_err(|e| DbError::decode("items", e))?;

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO receipts (
            booking_id, payment_id, receipt_number, recipient_name, items,
            subtotal_cents, tax_cents, total_cents, currency,
            render_status, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)
        RETURNING id
        "#,
    )
    .bind(draft.booking_id)
    .bind(draft.payment_id)
    .bind(receipt_number)
    .bind(&draft.recipient_name)
    .bind(items)
    .bind(draft.subtotal.cents())
    .bind(draft.tax.cents())
    .bind(draft.total.cents())
    .bind(&draft.currency)
    .bind(RenderStatus::Pending)
    .bind(now)
    .fetch_one(&mut *conn)
    .await?;

    Ok(Receipt {
        id,
        booking_id: draft.booking_id,
        payment_id: draft.payment_id,
        receipt_number: receipt_number.to_string(),
        recipient_name: draft.recipient_name.clone(),
        items: draft.items.clone(),
        subtotal: draft.subtotal,
        tax: draft.tax,
        total: draft.total,
        currency: draft.currency.clone(),
        document_url: None,
        render_status: RenderStatus::Pending,
        created_at: now,
        updated_at: now,
    })
}
