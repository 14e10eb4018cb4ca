//! # Linkage Repository
//!
//! Edges are written once and never changed. Triggers on
//! `document_linkages` abort any UPDATE or DELETE, which surfaces as
//! [`DbError::ConstraintViolation`](crate::DbError::ConstraintViolation).

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use encore_core::linkage::{DocumentLinkage, NewLinkage};
use encore_core::types::{Actor, DocumentRef, DocumentType, LinkageType};

#[derive(Debug, FromRow)]
struct LinkageRow {
    id: i64,
    source_type: DocumentType,
    source_id: i64,
    linked_type: DocumentType,
    linked_id: i64,
    linkage_type: LinkageType,
    description: Option<String>,
    created_by_user_id: Option<i64>,
    created_by_system: bool,
    created_at: DateTime<Utc>,
}

impl From<LinkageRow> for DocumentLinkage {
    fn from(row: LinkageRow) -> Self {
        DocumentLinkage {
            id: row.id,
            source: DocumentRef::new(row.source_type, row.source_id),
            linked: DocumentRef::new(row.linked_type, row.linked_id),
            linkage_type: row.linkage_type,
            description: row.description,
            created_by: Actor::from_columns(row.created_by_user_id, row.created_by_system),
            created_at: row.created_at,
        }
    }
}

/// Writes one edge.
pub async fn insert(
    conn: &mut SqliteConnection,
    link: &NewLinkage,
    now: DateTime<Utc>,
) -> DbResult<DocumentLinkage> {
    debug!(
        source = %link.source,
        linked = %link.linked,
        linkage_type = %link.linkage_type,
        "Writing document linkage"
    );

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO document_linkages (
            source_type, source_id, linked_type, linked_id, linkage_type,
            description, created_by_user_id, created_by_system, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        RETURNING id
        "#,
    )
    .bind(link.source.document_type)
    .bind(link.source.id)
    .bind(link.linked.document_type)
    .bind(link.linked.id)
    .bind(link.linkage_type)
    .bind(&link.description)
    .bind(link.created_by.user_id())
    .bind(link.created_by.is_system())
    .bind(now)
    .fetch_one(&mut *conn)
    .await?;

    Ok(DocumentLinkage {
        id,
        source: link.source,
        linked: link.linked,
        linkage_type: link.linkage_type,
        description: link.description.clone(),
        created_by: link.created_by,
        created_at: now,
    })
}

/// Graph queries over the linkage table.
#[derive(Debug, Clone)]
pub struct LinkageRepository {
    pool: SqlitePool,
}

impl LinkageRepository {
    pub fn new(pool: SqlitePool) -> Self {
        LinkageRepository { pool }
    }

    /// Outgoing edges of `source`, oldest first.
    pub async fn find_from(
        &self,
        source: DocumentRef,
        linkage_type: Option<LinkageType>,
    ) -> DbResult<Vec<DocumentLinkage>> {
        let rows: Vec<LinkageRow> = sqlx::query_as(
            r#"
            SELECT id, source_type, source_id, linked_type, linked_id, linkage_type,
                   description, created_by_user_id, created_by_system, created_at
            FROM document_linkages
            WHERE source_type = ?1 AND source_id = ?2
              AND (?3 IS NULL OR linkage_type = ?3)
            ORDER BY id
            "#,
        )
        .bind(source.document_type)
        .bind(source.id)
        .bind(linkage_type)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(DocumentLinkage::from).collect())
    }

    /// Incoming edges of `target`, oldest first.
    pub async fn find_to(
        &self,
        target: DocumentRef,
        linkage_type: Option<LinkageType>,
    ) -> DbResult<Vec<DocumentLinkage>> {
        let rows: Vec<LinkageRow> = sqlx::query_as(
            r#"
            SELECT id, source_type, source_id, linked_type, linked_id, linkage_type,
                   description, created_by_user_id, created_by_system, created_at
            FROM document_linkages
            WHERE linked_type = ?1 AND linked_id = ?2
              AND (?3 IS NULL OR linkage_type = ?3)
            ORDER BY id
            "#,
        )
        .bind(target.document_type)
        .bind(target.id)
        .bind(linkage_type)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(DocumentLinkage::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use crate::pool::{Database, DbConfig};

    #[tokio::test]
    async fn test_edges_are_queryable_both_ways() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let now = Utc::now();

        let mut uow = db.begin().await.unwrap();
        insert(
            uow.conn(),
            &NewLinkage::new(DocumentRef::booking(1), LinkageType::Generates, DocumentRef::invoice(10), Actor::System),
            now,
        )
        .await
        .unwrap();
        insert(
            uow.conn(),
            &NewLinkage::new(DocumentRef::booking(1), LinkageType::References, DocumentRef::transaction(4), Actor::User(3))
                .describe("Payment recorded"),
            now,
        )
        .await
        .unwrap();
        insert(
            uow.conn(),
            &NewLinkage::new(DocumentRef::transaction(4), LinkageType::Fulfills, DocumentRef::invoice(10), Actor::System),
            now,
        )
        .await
        .unwrap();
        uow.commit().await.unwrap();

        let links = db.linkages();
        assert_eq!(links.find_from(DocumentRef::booking(1), None).await.unwrap().len(), 2);

        let generated = links
            .find_from(DocumentRef::booking(1), Some(LinkageType::Generates))
            .await
            .unwrap();
        assert_eq!(generated.len(), 1);
        assert_eq!(generated[0].linked, DocumentRef::invoice(10));
        assert_eq!(generated[0].created_by, Actor::System);

        let incoming = links.find_to(DocumentRef::invoice(10), None).await.unwrap();
        assert_eq!(incoming.len(), 2);

        let referenced = links
            .find_to(DocumentRef::transaction(4), Some(LinkageType::References))
            .await
            .unwrap();
        assert_eq!(referenced[0].created_by, Actor::User(3));
        assert_eq!(referenced[0].description.as_deref(), Some("Payment recorded"));
    }

    #[tokio::test]
    async fn test_edges_cannot_be_deleted() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut uow = db.begin().await.unwrap();
        insert(
            uow.conn(),
            &NewLinkage::new(DocumentRef::receipt(1), LinkageType::Fulfills, DocumentRef::contract(2), Actor::System),
            Utc::now(),
        )
        .await
        .unwrap();

        let err: DbError = sqlx::query("DELETE FROM document_linkages")
            .execute(&mut *uow.conn())
            .await
            .unwrap_err()
            .into();
        assert!(matches!(err, DbError::ConstraintViolation(_)));
    }
}
