//! # Document Linkage Graph
//!
//! A labeled directed multigraph over bookings, contracts and financial
//! documents. Cycles, self-loops included, are allowed. Edges are immutable
//! once written.
//!
//! ```text
//!   booking#7 ──generates──► invoice#42 ◄──fulfills── transaction#9
//!       │                                                  ▲
//!       ├──generates──► receipt#3 ──fulfills──► contract#5  │
//!       └──references───────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::info;

use encore_core::audit::AuditRecord;
use encore_core::linkage::{DocumentLinkage, NewLinkage};
use encore_core::types::{AuditAction, DocumentRef, DocumentType, LinkageType};
use encore_db::repository::linkage;

use crate::error::FinanceResult;
use crate::services::{snapshot, AuditLog, ServiceContext};

#[derive(Clone)]
pub struct DocumentLinkageGraph {
    ctx: ServiceContext,
}

impl DocumentLinkageGraph {
    pub fn new(ctx: ServiceContext) -> Self {
        DocumentLinkageGraph { ctx }
    }

    /// Writes an edge as part of a larger operation. Not audited on its own.
    pub(crate) async fn link_in(
        conn: &mut SqliteConnection,
        link: &NewLinkage,
        now: DateTime<Utc>,
    ) -> FinanceResult<DocumentLinkage> {
        Ok(linkage::insert(conn, link, now).await?)
    }

    /// Writes an edge together with its own `linked` audit entry.
    pub(crate) async fn link_audited(
        conn: &mut SqliteConnection,
        link: &NewLinkage,
        now: DateTime<Utc>,
    ) -> FinanceResult<DocumentLinkage> {
        let edge = Self::link_in(conn, link, now).await?;
        AuditLog::record(
            conn,
            &AuditRecord::new(
                DocumentRef::new(DocumentType::DocumentLinkage, edge.id),
                AuditAction::Linked,
                link.created_by,
                format!("Linked {} {} {}", edge.source, edge.linkage_type, edge.linked),
            )
            .new_values(snapshot(&edge)),
            now,
        )
        .await?;
        Ok(edge)
    }

    /// Records a standalone edge between two existing entities.
    pub async fn link(&self, link: NewLinkage) -> FinanceResult<DocumentLinkage> {
        self.ctx
            .bounded("link documents", async {
                let now = self.ctx.now();
                let mut uow = self.ctx.db.begin().await?;
                let edge = Self::link_audited(uow.conn(), &link, now).await?;
                uow.commit().await?;

                info!(
                    id = edge.id,
                    source = %edge.source,
                    linked = %edge.linked,
                    linkage_type = %edge.linkage_type,
                    "Documents linked"
                );
                Ok(edge)
            })
            .await
    }

    /// Outgoing edges of `source`, optionally of one type.
    pub async fn find_linked(
        &self,
        source: DocumentRef,
        linkage_type: Option<LinkageType>,
    ) -> FinanceResult<Vec<DocumentLinkage>> {
        Ok(self.ctx.db.linkages().find_from(source, linkage_type).await?)
    }

    /// Incoming edges of `target`, optionally of one type.
    pub async fn find_linking(
        &self,
        target: DocumentRef,
        linkage_type: Option<LinkageType>,
    ) -> FinanceResult<Vec<DocumentLinkage>> {
        Ok(self.ctx.db.linkages().find_to(target, linkage_type).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::Fixture;
    use encore_core::types::Actor;

    #[tokio::test]
    async fn test_standalone_link_is_audited() {
        let fx = Fixture::new().await;
        let graph = fx.graph();

        let edge = graph
            .link(
                NewLinkage::new(
                    DocumentRef::invoice(2),
                    LinkageType::Supersedes,
                    DocumentRef::invoice(1),
                    Actor::User(9),
                )
                .describe("Reissued with corrected address"),
            )
            .await
            .unwrap();

        let outgoing = graph.find_linked(DocumentRef::invoice(2), None).await.unwrap();
        assert_eq!(outgoing, vec![edge.clone()]);
        let incoming = graph
            .find_linking(DocumentRef::invoice(1), Some(LinkageType::Supersedes))
            .await
            .unwrap();
        assert_eq!(incoming.len(), 1);
        assert!(graph
            .find_linking(DocumentRef::invoice(1), Some(LinkageType::Cancels))
            .await
            .unwrap()
            .is_empty());

        let history = fx
            .audit()
            .for_entity(DocumentRef::new(DocumentType::DocumentLinkage, edge.id))
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].action, AuditAction::Linked);
        assert_eq!(history[0].actor, Actor::User(9));
    }

    #[tokio::test]
    async fn test_cycles_and_self_loops_are_stored() {
        let fx = Fixture::new().await;
        let graph = fx.graph();

        graph
            .link(NewLinkage::new(DocumentRef::receipt(1), LinkageType::Fulfills, DocumentRef::contract(1), Actor::System))
            .await
            .unwrap();
        graph
            .link(NewLinkage::new(DocumentRef::contract(1), LinkageType::References, DocumentRef::booking(1), Actor::System))
            .await
            .unwrap();
        graph
            .link(NewLinkage::new(DocumentRef::booking(1), LinkageType::Generates, DocumentRef::receipt(1), Actor::System))
            .await
            .unwrap();

        let self_edge = graph
            .link(NewLinkage::new(DocumentRef::booking(1), LinkageType::References, DocumentRef::booking(1), Actor::System))
            .await
            .unwrap();
        assert_eq!(self_edge.source, self_edge.linked);

        let outgoing = graph.find_linked(DocumentRef::booking(1), Some(LinkageType::References)).await.unwrap();
        assert_eq!(outgoing, vec![self_edge.clone()]);
        let incoming = graph.find_linking(DocumentRef::booking(1), None).await.unwrap();
        assert_eq!(incoming.len(), 2);
        assert!(incoming.contains(&self_edge));
    }
}
