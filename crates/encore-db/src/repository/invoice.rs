//! # Invoice Repository
//!
//! Storage for invoices. Reads go through [`InvoiceRepository`]; writes are
//! free functions taking the connection of an open unit of work.
//!
//! ## Guarded Writes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  convert_to_final   UPDATE … WHERE id = ? AND invoice_type = 'proforma' │
//! │                                  AND status IN ('draft', 'pending')     │
//! │  update_status      UPDATE … WHERE id = ? AND status = <expected>       │
//! │                                                                         │
//! │  Zero rows affected → the caller's view was stale (already converted,  │
//! │  already paid, cancelled meanwhile). Returned as `false`.              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{Executor, FromRow, Sqlite, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use encore_core::invoice::{
    Invoice, InvoiceDraft, InvoiceStage, InvoiceStatus, InvoiceType, LineItem, PaymentTerms,
};
use encore_core::types::{Party, RenderStatus, TriggeredBy};
use encore_core::Money;

const SELECT_INVOICE: &str = r#"
    SELECT id, booking_id, invoice_number, invoice_type, status,
           issuer_name, issuer_address, issuer_tax_id,
           recipient_name, recipient_address, line_items,
           subtotal_cents, tax_cents, total_cents,
           due_date, payment_terms, triggered_by, triggered_by_user_id,
           converted_at, paid_at, document_url, render_status,
           created_at, updated_at
    FROM invoices
"#;

#[derive(Debug, FromRow)]
struct InvoiceRow {
    id: i64,
    booking_id: i64,
    invoice_number: String,
    invoice_type: InvoiceType,
    status: InvoiceStatus,
    issuer_name: String,
    issuer_address: Option<String>,
    issuer_tax_id: Option<String>,
    recipient_name: String,
    recipient_address: Option<String>,
    line_items: String,
    subtotal_cents: i64,
    tax_cents: i64,
    total_cents: i64,
    due_date: DateTime<Utc>,
    payment_terms: String,
    triggered_by: TriggeredBy,
    triggered_by_user_id: Option<i64>,
    converted_at: Option<DateTime<Utc>>,
    paid_at: Option<DateTime<Utc>>,
    document_url: Option<String>,
    render_status: RenderStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<InvoiceRow> for Invoice {
    type Error = DbError;

    fn try_from(row: InvoiceRow) -> DbResult<Self> {
        let line_items: Vec<LineItem> =
            serde_json::from_str(&row.line_items).map_err(|e| DbError::decode("line_items", e))?;
        let payment_terms: PaymentTerms = row
            .payment_terms
            .parse()
            .map_err(|e| DbError::decode("payment_terms", e))?;

        Ok(Invoice {
            id: row.id,
            booking_id: row.booking_id,
            invoice_number: row.invoice_number,
            stage: InvoiceStage::from_columns(row.invoice_type, row.converted_at),
            status: row.status,
            issuer: Party::new(row.issuer_name, row.issuer_address).with_tax_id(row.issuer_tax_id),
            recipient: Party::new(row.recipient_name, row.recipient_address),
            line_items,
            subtotal: Money::from_cents(row.subtotal_cents),
            tax: Money::from_cents(row.tax_cents),
            total: Money::from_cents(row.total_cents),
            due_date: row.due_date,
            payment_terms,
            triggered_by: row.triggered_by,
            triggered_by_user_id: row.triggered_by_user_id,
            document_url: row.document_url,
            render_status: row.render_status,
            paid_at: row.paid_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

// =============================================================================
// Reads
// =============================================================================

/// Gets an invoice by id on any executor (pool or open unit of work).
pub async fn fetch_by_id<'e, E>(executor: E, id: i64) -> DbResult<Option<Invoice>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!("{} WHERE id = ?1", SELECT_INVOICE);
    let row: Option<InvoiceRow> = sqlx::query_as(&sql)
        .bind(id)
        .fetch_optional(executor)
        .await?;
    row.map(Invoice::try_from).transpose()
}

/// Repository for invoice reads.
#[derive(Debug, Clone)]
pub struct InvoiceRepository {
    pool: SqlitePool,
}

impl InvoiceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        InvoiceRepository { pool }
    }

    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<Invoice>> {
        fetch_by_id(&self.pool, id).await
    }

    pub async fn get_by_number(&self, number: &str) -> DbResult<Option<Invoice>> {
        let sql = format!("{} WHERE invoice_number = ?1", SELECT_INVOICE);
        let row: Option<InvoiceRow> = sqlx::query_as(&sql)
            .bind(number)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Invoice::try_from).transpose()
    }

    pub async fn list_for_booking(&self, booking_id: i64) -> DbResult<Vec<Invoice>> {
        let sql = format!("{} WHERE booking_id = ?1 ORDER BY id", SELECT_INVOICE);
        let rows: Vec<InvoiceRow> = sqlx::query_as(&sql)
            .bind(booking_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Invoice::try_from).collect()
    }
}

// =============================================================================
// Writes (inside a unit of work)
// =============================================================================

/// Inserts a drafted invoice under its issued number.
pub async fn insert(
    conn: &mut SqliteConnection,
    draft: &InvoiceDraft,
    invoice_number: &str,
    now: DateTime<Utc>,
) -> DbResult<Invoice> {
    debug!(booking_id = draft.booking_id, invoice_number, "Inserting invoice");

    let line_items =
        serde_json::to_string(&draft.line_items).map_err(|e| DbError::decode("line_items", e))?;

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO invoices (
            booking_id, invoice_number, invoice_type, status,
            issuer_name, issuer_address, issuer_tax_id,
            recipient_name, recipient_address, line_items,
            subtotal_cents, tax_cents, total_cents,
            due_date, payment_terms, triggered_by, triggered_by_user_id,
            converted_at, render_status, created_at, updated_at
        ) VALUES (
            ?1, ?2, ?3, ?4,
            ?5, ?6, ?7,
            ?8, ?9, ?10,
            ?11, ?12, ?13,
            ?14, ?15, ?16, ?17,
            ?18, ?19, ?20, ?20
        )
        RETURNING id
        "#,
    )
    .bind(draft.booking_id)
    .bind(invoice_number)
    .bind(draft.stage.invoice_type())
    .bind(draft.status)
    .bind(&draft.issuer.name)
    .bind(&draft.issuer.address)
    .bind(&draft.issuer.tax_id)
    .bind(&draft.recipient.name)
    .bind(&draft.recipient.address)
    .bind(line_items)
    .bind(draft.totals.subtotal.cents())
    .bind(draft.totals.tax.cents())
    .bind(draft.totals.total.cents())
    .bind(draft.due_date)
    .bind(draft.payment_terms.as_str())
    .bind(draft.triggered_by)
    .bind(draft.triggered_by_user_id)
    .bind(draft.stage.converted_at())
    .bind(RenderStatus::Pending)
    .bind(now)
    .fetch_one(&mut *conn)
    .await?;

    Ok(Invoice {
        id,
        booking_id: draft.booking_id,
        invoice_number: invoice_number.to_string(),
        stage: draft.stage,
        status: draft.status,
        issuer: draft.issuer.clone(),
        recipient: draft.recipient.clone(),
        line_items: draft.line_items.clone(),
        subtotal: draft.totals.subtotal,
        tax: draft.totals.tax,
        total: draft.totals.total,
        due_date: draft.due_date,
        payment_terms: draft.payment_terms,
        triggered_by: draft.triggered_by,
        triggered_by_user_id: draft.triggered_by_user_id,
        document_url: None,
        render_status: RenderStatus::Pending,
        paid_at: None,
        created_at: now,
        updated_at: now,
    })
}

/// Persists a proforma → final conversion. Returns `false` if the row is no
/// longer an open proforma.
pub async fn convert_to_final(conn: &mut SqliteConnection, converted: &Invoice) -> DbResult<bool> {
    debug!(id = converted.id, number = %converted.invoice_number, "Converting invoice to final");

    let result = sqlx::query(
        r#"
        UPDATE invoices SET
            invoice_number = ?2,
            invoice_type = ?3,
            status = ?4,
            triggered_by = ?5,
            triggered_by_user_id = ?6,
            converted_at = ?7,
            render_status = 'pending',
            render_attempts = 0,
            render_error = NULL,
            updated_at = ?8
        WHERE id = ?1
          AND invoice_type = 'proforma'
          AND status IN ('draft', 'pending')
        "#,
    )
    .bind(converted.id)
    .bind(&converted.invoice_number)
    .bind(converted.invoice_type())
    .bind(converted.status)
    .bind(converted.triggered_by)
    .bind(converted.triggered_by_user_id)
    .bind(converted.converted_at())
    .bind(converted.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Persists a status change if the row still has status `expected`.
pub async fn update_status(
    conn: &mut SqliteConnection,
    invoice: &Invoice,
    expected: InvoiceStatus,
) -> DbResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE invoices SET status = ?2, paid_at = ?3, updated_at = ?4
        WHERE id = ?1 AND status = ?5
        "#,
    )
    .bind(invoice.id)
    .bind(invoice.status)
    .bind(invoice.paid_at)
    .bind(invoice.updated_at)
    .bind(expected)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use encore_core::invoice::InvoiceTotals;
    use encore_core::Rate;

    fn draft(stage: InvoiceStage) -> InvoiceDraft {
        let now = Utc::now();
        InvoiceDraft {
            booking_id: 7,
            stage,
            status: InvoiceStatus::Pending,
            issuer: Party::new("Issuer", Some("1 Main St".into())).with_tax_id(Some("TAX-1".into())),
            recipient: Party::new("Client", Some("Client Address".into())),
            line_items: vec![LineItem::single("standard Performance - Gala", Money::from_cents(100000))],
            totals: InvoiceTotals::compute(Money::from_cents(100000), Rate::from_bps(800)).unwrap(),
            due_date: now,
            payment_terms: PaymentTerms::DueOnReceipt,
            triggered_by: TriggeredBy::Manual,
            triggered_by_user_id: Some(1),
        }
    }

    #[tokio::test]
    async fn test_insert_and_read_back() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut uow = db.begin().await.unwrap();
        let inserted = insert(uow.conn(), &draft(InvoiceStage::Proforma), "PRO-2026-000001", Utc::now())
            .await
            .unwrap();
        uow.commit().await.unwrap();

        let loaded = db.invoices().get_by_id(inserted.id).await.unwrap().unwrap();
        assert_eq!(loaded, inserted);
        assert_eq!(loaded.total.cents(), 108000);
        assert_eq!(loaded.invoice_type(), InvoiceType::Proforma);
        assert_eq!(loaded.issuer.tax_id.as_deref(), Some("TAX-1"));
        assert_eq!(db.invoices().list_for_booking(7).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_number_is_rejected() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut uow = db.begin().await.unwrap();
        insert(uow.conn(), &draft(InvoiceStage::BookingDeposit), "INV-2026-000001", Utc::now())
            .await
            .unwrap();
        let err = insert(uow.conn(), &draft(InvoiceStage::BookingDeposit), "INV-2026-000001", Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn test_conversion_guard_only_matches_once() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut uow = db.begin().await.unwrap();
        let proforma = insert(uow.conn(), &draft(InvoiceStage::Proforma), "PRO-2026-000001", Utc::now())
            .await
            .unwrap();

        let converted = proforma
            .convert_to_final("INV-2026-000001".into(), encore_core::Actor::System, Utc::now())
            .unwrap();
        assert!(convert_to_final(uow.conn(), &converted).await.unwrap());
        assert!(!convert_to_final(uow.conn(), &converted).await.unwrap());
        uow.commit().await.unwrap();

        let loaded = db.invoices().get_by_number("INV-2026-000001").await.unwrap().unwrap();
        assert_eq!(loaded.id, proforma.id);
        assert_eq!(loaded.invoice_type(), InvoiceType::Final);
        assert!(loaded.converted_at().is_some());
    }
}
