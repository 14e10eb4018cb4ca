//! # Render Worker
//!
//! Produces PDFs for invoices and receipts off the request path.
//!
//! ## Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  service commits ──► RenderHandle::request(target) ──try_send──┐        │
//! │                        (full/closed: logged, left for sweep)  │        │
//! │                                                                ▼        │
//! │  ┌──────────────────────────── RenderWorker::run ─────────────────────┐ │
//! │  │  select!                                                           │ │
//! │  │    request_rx.recv()  ──► render_queued(target)                    │ │
//! │  │    interval.tick()    ──► sweep(): pending/failed, attempts < max  │ │
//! │  │    shutdown_rx.recv() ──► stop                                     │ │
//! │  └────────────────────────────────────────────────────────────────────┘ │
//! │                                                                         │
//! │  render_now(target):                                                    │
//! │    PdfRenderer::render ── transient error ──► ExponentialBackoff retry  │
//! │      ok   ──► document_url, rendered, one `updated` audit (system)      │
//! │      fail ──► failed, attempts + 1, render_error                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, info, warn};

use encore_core::audit::AuditRecord;
use encore_core::types::{Actor, AuditAction, RenderStatus};
use encore_core::{FinancialDocument, RenderTarget};
use encore_db::repository::render;

use crate::config::RenderSettings;
use crate::error::{FinanceError, FinanceResult};
use crate::ports::{PdfRenderer, RenderError};
use crate::services::{AuditLog, ServiceContext};

// =============================================================================
// Render Service
// =============================================================================

/// Renders one document at a time and records the result.
#[derive(Clone)]
pub struct RenderService {
    ctx: ServiceContext,
    renderer: Arc<dyn PdfRenderer>,
}

impl RenderService {
    pub fn new(ctx: ServiceContext, renderer: Arc<dyn PdfRenderer>) -> Self {
        RenderService { ctx, renderer }
    }

    async fn load(&self, target: RenderTarget) -> FinanceResult<FinancialDocument> {
        let document = match target {
            RenderTarget::Invoice(id) => self
                .ctx
                .db
                .invoices()
                .get_by_id(id)
                .await?
                .map(FinancialDocument::from),
            RenderTarget::Receipt(id) => self
                .ctx
                .db
                .receipts()
                .get_by_id(id)
                .await?
                .map(FinancialDocument::from),
        };
        document.ok_or_else(|| {
            let reference = target.reference();
            FinanceError::not_found(reference.document_type.to_string(), reference.id)
        })
    }

    fn backoff(&self) -> ExponentialBackoff {
        let settings = &self.ctx.config.render;
        ExponentialBackoff {
            initial_interval: Duration::from_millis(settings.initial_backoff_ms),
            max_interval: Duration::from_millis(settings.max_backoff_ms),
            multiplier: 2.0,
            max_elapsed_time: Some(Duration::from_millis(settings.max_elapsed_ms)),
            ..Default::default()
        }
    }

    /// Renders `target` now and returns the document URL.
    ///
    /// ## Errors
    /// - [`FinanceError::NotFound`] if the document does not exist
    /// - [`FinanceError::Render`] once retries are exhausted or the renderer
    ///   reports a permanent failure. The failure is recorded on the document.
    pub async fn render_now(&self, target: RenderTarget) -> FinanceResult<String> {
        let document = self.load(target).await?;
        let mut backoff = self.backoff();
        let mut attempt = 0u32;

        let url = loop {
            attempt += 1;
            match self.renderer.render(&document).await {
                Ok(url) => break url,
                Err(e) if e.retryable => match backoff.next_backoff() {
                    Some(wait) => {
                        debug!(%target, attempt, ?wait, error = %e.message, "Render failed, retrying");
                        tokio::time::sleep(wait).await;
                    }
                    None => return Err(self.record_failure(target, e).await),
                },
                Err(e) => return Err(self.record_failure(target, e).await),
            }
        };

        self.record_success(target, &url).await?;
        info!(%target, url = %url, attempt, "Document rendered");
        Ok(url)
    }

    /// Renders a queued target unless it has been rendered in the meantime.
    pub async fn render_queued(&self, target: RenderTarget) -> FinanceResult<Option<String>> {
        let document = self.load(target).await?;
        if document.render_status() == Some(RenderStatus::Rendered) {
            debug!(%target, "Already rendered, skipping");
            return Ok(None);
        }
        self.render_now(target).await.map(Some)
    }

    /// Documents waiting for a render, oldest first.
    pub async fn sweep(&self) -> FinanceResult<Vec<RenderTarget>> {
        let settings = &self.ctx.config.render;
        let limit = u32::try_from(settings.queue_capacity).unwrap_or(u32::MAX);
        Ok(self
            .ctx
            .db
            .render_queue()
            .pending_targets(settings.max_attempts, limit)
            .await?)
    }

    async fn record_success(&self, target: RenderTarget, url: &str) -> FinanceResult<()> {
        self.ctx
            .bounded("record render", async {
                let now = self.ctx.now();
                let mut uow = self.ctx.db.begin().await?;
                if !render::mark_rendered(uow.conn(), target, url, now).await? {
                    let reference = target.reference();
                    return Err(FinanceError::not_found(
                        reference.document_type.to_string(),
                        reference.id,
                    ));
                }
                AuditLog::record(
                    uow.conn(),
                    &AuditRecord::new(
                        target.reference(),
                        AuditAction::Updated,
                        Actor::System,
                        format!("Rendered {} to PDF", target),
                    )
                    .new_values(json!({ "documentUrl": url })),
                    now,
                )
                .await?;
                uow.commit().await?;
                Ok(())
            })
            .await
    }

    /// Stores the failure on the document and returns the error to report.
    async fn record_failure(&self, target: RenderTarget, failure: RenderError) -> FinanceError {
        let now = self.ctx.now();
        // Render bookkeeping only: the document itself is unchanged, so no audit entry.
        if let Err(e) = self
            .ctx
            .db
            .render_queue()
            .mark_failed(target, &failure.message, now)
            .await
        {
            error!(%target, error = %e, "Failed to record render failure");
        }
        FinanceError::Render {
            target,
            reason: failure.message,
        }
    }
}

// =============================================================================
// Worker
// =============================================================================

/// Background task draining render requests and sweeping for stragglers.
pub struct RenderWorker {
    service: RenderService,
    settings: RenderSettings,
    request_rx: mpsc::Receiver<RenderTarget>,
    shutdown_rx: mpsc::Receiver<()>,
}

/// Handle for queueing renders and stopping the worker.
#[derive(Debug, Clone)]
pub struct RenderHandle {
    request_tx: mpsc::Sender<RenderTarget>,
    shutdown_tx: mpsc::Sender<()>,
}

impl RenderHandle {
    /// Queues a render without waiting. Returns `false` if the request was
    /// dropped; the sweep picks the document up later.
    pub fn request(&self, target: RenderTarget) -> bool {
        match self.request_tx.try_send(target) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(%target, "Render queue full, leaving document for the next sweep");
                false
            }
            Err(TrySendError::Closed(_)) => {
                warn!(%target, "Render worker stopped, leaving document for the next sweep");
                false
            }
        }
    }

    /// Triggers graceful shutdown.
    pub async fn shutdown(&self) -> FinanceResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| FinanceError::InvalidState("Render worker already stopped".into()))
    }
}

impl RenderWorker {
    pub fn new(service: RenderService, settings: RenderSettings) -> (Self, RenderHandle) {
        let (request_tx, request_rx) = mpsc::channel(settings.queue_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let worker = RenderWorker {
            service,
            settings,
            request_rx,
            shutdown_rx,
        };
        (worker, RenderHandle { request_tx, shutdown_tx })
    }

    /// Runs until shutdown. Spawn as a background task.
    pub async fn run(mut self) {
        info!(
            sweep_secs = self.settings.sweep_interval_secs,
            max_attempts = self.settings.max_attempts,
            "Render worker starting"
        );

        let mut interval = tokio::time::interval(self.settings.sweep_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.sweep().await;
                }

                Some(target) = self.request_rx.recv() => {
                    self.render(target).await;
                }

                _ = self.shutdown_rx.recv() => {
                    info!("Render worker shutting down");
                    break;
                }
            }
        }

        info!("Render worker stopped");
    }

    async fn sweep(&self) {
        let targets = match self.service.sweep().await {
            Ok(targets) => targets,
            Err(e) => {
                error!(error = %e, "Render sweep failed");
                return;
            }
        };
        if !targets.is_empty() {
            debug!(count = targets.len(), "Sweeping unrendered documents");
        }
        for target in targets {
            self.render(target).await;
        }
    }

    async fn render(&self, target: RenderTarget) {
        if let Err(e) = self.service.render_queued(target).await {
            warn!(%target, error = %e, "Render failed");
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FinanceConfig;
    use crate::fixtures::{Fixture, StubRenderer};
    use crate::services::InvoiceService;

    fn fast_retries() -> FinanceConfig {
        let mut config = FinanceConfig::default();
        config.render.initial_backoff_ms = 1;
        config.render.max_backoff_ms = 2;
        config.render.max_elapsed_ms = 2_000;
        config.render.max_attempts = 2;
        config
    }

    #[tokio::test]
    async fn test_render_stores_url_and_audits() {
        let fx = Fixture::new().await;
        let booking = fx.booking("Standard", 100000).await;
        let invoice = fx.invoices().create_proforma(booking, Actor::System).await.unwrap();
        let renderer = StubRenderer::ok();

        let url = fx.renders(renderer.clone()).render_now(RenderTarget::Invoice(invoice.id)).await.unwrap();

        assert_eq!(url, "https://docs.test/PRO-2026-000001.pdf");
        let stored = fx.invoices().get(invoice.id).await.unwrap();
        assert_eq!(stored.document_url.as_deref(), Some(url.as_str()));
        assert_eq!(stored.render_status, RenderStatus::Rendered);

        let history = fx.audit().for_entity(invoice_ref(invoice.id)).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].action, AuditAction::Updated);
        assert_eq!(history[1].actor, Actor::System);
        assert_eq!(history[1].new_values.as_ref().unwrap()["documentUrl"], url.as_str());
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let fx = Fixture::with_config(fast_retries()).await;
        let booking = fx.booking("Standard", 100000).await;
        let payment = fx.payment(booking, 1000).await;
        let receipt = fx.receipts().issue(booking, payment, &[], Actor::System).await.unwrap();
        let renderer = StubRenderer::failing(2, false);

        fx.renders(renderer.clone()).render_now(RenderTarget::Receipt(receipt.id)).await.unwrap();

        assert_eq!(renderer.calls(), 3);
        assert_eq!(fx.receipts().get(receipt.id).await.unwrap().render_status, RenderStatus::Rendered);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_recorded_without_audit() {
        let fx = Fixture::with_config(fast_retries()).await;
        let booking = fx.booking("Standard", 100000).await;
        let invoice = fx.invoices().create_proforma(booking, Actor::System).await.unwrap();
        let target = RenderTarget::Invoice(invoice.id);
        let service = fx.renders(StubRenderer::failing(10, true));

        let err = service.render_now(target).await.unwrap_err();
        assert!(matches!(err, FinanceError::Render { .. }));

        let stored = fx.invoices().get(invoice.id).await.unwrap();
        assert_eq!(stored.render_status, RenderStatus::Failed);
        assert_eq!(stored.document_url, None);
        assert_eq!(
            fx.db.render_queue().attempts(target).await.unwrap(),
            Some((1, Some("template missing".to_string())))
        );
        assert_eq!(fx.audit().for_entity(invoice_ref(invoice.id)).await.unwrap().len(), 1);

        // Still swept until it runs out of attempts.
        assert_eq!(service.sweep().await.unwrap(), vec![target]);
        service.render_now(target).await.unwrap_err();
        assert!(service.sweep().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_document() {
        let fx = Fixture::new().await;
        let err = fx.renders(StubRenderer::ok()).render_now(RenderTarget::Receipt(9)).await.unwrap_err();
        assert!(matches!(err, FinanceError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_worker_renders_requested_documents() {
        let mut config = FinanceConfig::default();
        config.render.sweep_interval_secs = 3600;
        let fx = Fixture::with_config(config).await;
        let booking = fx.booking("Standard", 100000).await;

        let renderer = StubRenderer::ok();
        let (worker, handle) = RenderWorker::new(fx.renders(renderer.clone()), fx.ctx.config.render.clone());
        let task = tokio::spawn(worker.run());

        let ctx = fx.ctx.clone().with_render_handle(handle.clone());
        let invoices = InvoiceService::new(ctx, fx.stores.clone(), fx.stores.clone(), fx.stores.clone());
        let invoice = invoices.create_proforma(booking, Actor::System).await.unwrap();

        let mut rendered = false;
        for _ in 0..100 {
            if invoices.get(invoice.id).await.unwrap().render_status == RenderStatus::Rendered {
                rendered = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(rendered);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
        assert!(!handle.request(RenderTarget::Invoice(invoice.id)));
        assert_eq!(renderer.calls(), 1);
    }

    fn invoice_ref(id: i64) -> encore_core::DocumentRef {
        RenderTarget::Invoice(id).reference()
    }
}
