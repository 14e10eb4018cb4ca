//! # Payment Transaction Repository

use chrono::{DateTime, Utc};
use sqlx::{Executor, FromRow, Sqlite, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use encore_core::transaction::{
    PaymentTransaction, TransactionDraft, TransactionStatus, TransactionType,
};
use encore_core::Money;

const SELECT_TRANSACTION: &str = r#"
    SELECT id, booking_id, invoice_id, payout_request_id, transaction_type,
           amount_cents, currency, usd_equivalent_cents, payment_method,
           gateway_transaction_id, gateway_fee_cents, platform_fee_cents, net_amount_cents,
           status, processed_at, refunded_at, disputed_at, notes, metadata,
           created_at, updated_at
    FROM payment_transactions
"#;

#[derive(Debug, FromRow)]
struct TransactionRow {
    id: i64,
    booking_id: i64,
    invoice_id: Option<i64>,
    payout_request_id: Option<i64>,
    transaction_type: TransactionType,
    amount_cents: i64,
    currency: String,
    usd_equivalent_cents: i64,
    payment_method: String,
    gateway_transaction_id: Option<String>,
    gateway_fee_cents: i64,
    platform_fee_cents: i64,
    net_amount_cents: i64,
    status: TransactionStatus,
    processed_at: Option<DateTime<Utc>>,
    refunded_at: Option<DateTime<Utc>>,
    disputed_at: Option<DateTime<Utc>>,
    notes: Option<String>,
    metadata: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for PaymentTransaction {
    type Error = DbError;

    fn try_from(row: TransactionRow) -> DbResult<Self> {
        let metadata =
            serde_json::from_str(&row.metadata).map_err(|e| DbError::decode("metadata", e))?;

        Ok(PaymentTransaction {
            id: row.id,
            booking_id: row.booking_id,
            invoice_id: row.invoice_id,
            payout_request_id: row.payout_request_id,
            transaction_type: row.transaction_type,
            amount: Money::from_cents(row.amount_cents),
            currency: row.currency,
            usd_equivalent: Money::from_cents(row.usd_equivalent_cents),
            payment_method: row.payment_method,
            gateway_transaction_id: row.gateway_transaction_id,
            gateway_fee: Money::from_cents(row.gateway_fee_cents),
            platform_fee: Money::from_cents(row.platform_fee_cents),
            net_amount: Money::from_cents(row.net_amount_cents),
            status: row.status,
            processed_at: row.processed_at,
            refunded_at: row.refunded_at,
            disputed_at: row.disputed_at,
            notes: row.notes,
            metadata,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

pub async fn fetch_by_id<'e, E>(executor: E, id: i64) -> DbResult<Option<PaymentTransaction>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!("{} WHERE id = ?1", SELECT_TRANSACTION);
    let row: Option<TransactionRow> = sqlx::query_as(&sql)
        .bind(id)
        .fetch_optional(executor)
        .await?;
    row.map(PaymentTransaction::try_from).transpose()
}

/// Repository for payment transaction reads.
#[derive(Debug, Clone)]
pub struct TransactionRepository {
    pool: SqlitePool,
}

impl TransactionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        TransactionRepository { pool }
    }

    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<PaymentTransaction>> {
        fetch_by_id(&self.pool, id).await
    }

    pub async fn list_for_booking(&self, booking_id: i64) -> DbResult<Vec<PaymentTransaction>> {
        let sql = format!("{} WHERE booking_id = ?1 ORDER BY id", SELECT_TRANSACTION);
        let rows: Vec<TransactionRow> = sqlx::query_as(&sql)
            .bind(booking_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(PaymentTransaction::try_from).collect()
    }
}

/// Inserts a transaction in `pending` status.
pub async fn insert(
    conn: &mut SqliteConnection,
    draft: &TransactionDraft,
    now: DateTime<Utc>,
) -> DbResult<PaymentTransaction> {
    let request = &draft.request;
    debug!(
        booking_id = request.booking_id,
        transaction_type = %request.transaction_type,
        amount = %request.amount,
        "Inserting payment transaction"
    );

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO payment_transactions (
            booking_id, invoice_id, payout_request_id, transaction_type,
            amount_cents, currency, usd_equivalent_cents, payment_method,
            gateway_transaction_id, gateway_fee_cents, platform_fee_cents, net_amount_cents,
            status, notes, metadata, created_at, updated_at
        ) VALUES (
            ?1, ?2, ?3, ?4,
            ?5, ?6, ?7, ?8,
            ?9, ?10, ?11, ?12,
            ?13, ?14, ?15, ?16, ?16
        )
        RETURNING id
        "#,
    )
    .bind(request.booking_id)
    .bind(request.invoice_id)
    .bind(request.payout_request_id)
    .bind(request.transaction_type)
    .bind(request.amount.cents())
    .bind(&request.currency)
    .bind(draft.usd_equivalent.cents())
    .bind(&request.payment_method)
    .bind(&request.gateway_transaction_id)
    .bind(draft.fees.gateway_fee.cents())
    .bind(draft.fees.platform_fee.cents())
    .bind(draft.fees.net.cents())
    .bind(TransactionStatus::Pending)
    .bind(&draft.notes)
    .bind(draft.metadata.to_string())
    .bind(now)
    .fetch_one(&mut *conn)
    .await?;

    Ok(PaymentTransaction {
        id,
        booking_id: request.booking_id,
        invoice_id: request.invoice_id,
        payout_request_id: request.payout_request_id,
        transaction_type: request.transaction_type,
        amount: request.amount,
        currency: request.currency.clone(),
        usd_equivalent: draft.usd_equivalent,
        payment_method: request.payment_method.clone(),
        gateway_transaction_id: request.gateway_transaction_id.clone(),
        gateway_fee: draft.fees.gateway_fee,
        platform_fee: draft.fees.platform_fee,
        net_amount: draft.fees.net,
        status: TransactionStatus::Pending,
        processed_at: None,
        refunded_at: None,
        disputed_at: None,
        notes: Some(draft.notes.clone()),
        metadata: draft.metadata.clone(),
        created_at: now,
        updated_at: now,
    })
}

/// Persists a status transition if the row still has status `expected`.
pub async fn update_status(
    conn: &mut SqliteConnection,
    transaction: &PaymentTransaction,
    expected: TransactionStatus,
) -> DbResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE payment_transactions SET
            status = ?2,
            processed_at = ?3,
            refunded_at = ?4,
            disputed_at = ?5,
            updated_at = ?6
        WHERE id = ?1 AND status = ?7
        "#,
    )
    .bind(transaction.id)
    .bind(transaction.status)
    .bind(transaction.processed_at)
    .bind(transaction.refunded_at)
    .bind(transaction.disputed_at)
    .bind(transaction.updated_at)
    .bind(expected)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use encore_core::transaction::{FeeSchedule, TransactionRequest};
    use encore_core::Rate;

    fn draft(invoice_id: Option<i64>) -> TransactionDraft {
        TransactionDraft::new(
            TransactionRequest {
                booking_id: 1,
                transaction_type: TransactionType::PaymentReceived,
                amount: Money::from_cents(100000),
                currency: "USD".into(),
                payment_method: "card".into(),
                invoice_id,
                payout_request_id: None,
                gateway_transaction_id: Some("ch_123".into()),
            },
            FeeSchedule {
                platform: Rate::from_bps(500),
                gateway: Rate::from_bps(290),
            },
            Money::from_cents(100000),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_read_back() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut uow = db.begin().await.unwrap();
        let tx = insert(uow.conn(), &draft(None), Utc::now()).await.unwrap();
        uow.commit().await.unwrap();

        let loaded = db.transactions().get_by_id(tx.id).await.unwrap().unwrap();
        assert_eq!(loaded, tx);
        assert_eq!(loaded.platform_fee.cents(), 5000);
        assert_eq!(loaded.gateway_fee.cents(), 2900);
        assert_eq!(loaded.net_amount.cents(), 92100);
        assert_eq!(loaded.metadata["gatewayFeeBps"], 290);
    }

    #[tokio::test]
    async fn test_unknown_invoice_violates_foreign_key() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut uow = db.begin().await.unwrap();
        let err = insert(uow.conn(), &draft(Some(404)), Utc::now()).await.unwrap_err();
        assert!(matches!(err, DbError::ForeignKeyViolation { .. }));
    }
}
