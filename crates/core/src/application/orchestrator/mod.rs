// Processing Orchestrator - invoice lifecycle driver
//
// One orchestrator serves single invoices and package invoices; the optional
// package id decides whether package counters move along with the invoice.

mod jobs;
mod pipeline;
mod queries;
mod review;
pub mod storage_path;

#[cfg(test)]
mod test_support;

pub use jobs::{
    InvoiceTarget, JOB_PROCESS_INVOICE, JOB_PROCESS_PACKAGE_INVOICE, JOB_REEVALUATE_INVOICE,
};
pub use queries::{ExportedInvoice, InvoiceExport, PackageExport};
pub use review::PackageReevaluation;

use super::queue::JobQueue;
use crate::domain::timestamp::to_rfc3339;
use crate::domain::{CounterDelta, DomainError, Invoice, InvoicePatch, InvoiceStatus, Package};
use crate::error::{AppError, Result};
use crate::port::{
    IdProvider, InvoiceRepository, ObjectStore, PackageRepository, ParseService, StatusNotifier,
    ThumbnailRenderer, TimeProvider,
};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Signed URL lifetime for record reads (1h)
pub const DEFAULT_SIGNED_URL_TTL: Duration = Duration::from_secs(60 * 60);

/// File received from a client
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

impl UploadedFile {
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: impl Into<Bytes>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes: bytes.into(),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.file_name.trim().is_empty() {
            return Err(AppError::Validation("File name cannot be empty".to_string()));
        }
        if self.bytes.is_empty() {
            return Err(AppError::Validation(format!(
                "Uploaded file is empty: {}",
                self.file_name
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorConfig {
    pub signed_url_ttl: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            signed_url_ttl: DEFAULT_SIGNED_URL_TTL,
        }
    }
}

/// Collaborators injected into the orchestrator
#[derive(Clone)]
pub struct OrchestratorDeps {
    pub invoices: Arc<dyn InvoiceRepository>,
    pub packages: Arc<dyn PackageRepository>,
    pub store: Arc<dyn ObjectStore>,
    pub parser: Arc<dyn ParseService>,
    /// No thumbnail is stored when absent
    pub thumbnails: Option<Arc<dyn ThumbnailRenderer>>,
    pub notifier: Arc<dyn StatusNotifier>,
    pub time_provider: Arc<dyn TimeProvider>,
    pub id_provider: Arc<dyn IdProvider>,
}

pub struct ProcessingOrchestrator {
    invoices: Arc<dyn InvoiceRepository>,
    packages: Arc<dyn PackageRepository>,
    store: Arc<dyn ObjectStore>,
    parser: Arc<dyn ParseService>,
    thumbnails: Option<Arc<dyn ThumbnailRenderer>>,
    notifier: Arc<dyn StatusNotifier>,
    time_provider: Arc<dyn TimeProvider>,
    id_provider: Arc<dyn IdProvider>,
    queue: JobQueue,
    config: OrchestratorConfig,
}

impl ProcessingOrchestrator {
    pub fn new(deps: OrchestratorDeps, queue: JobQueue, config: OrchestratorConfig) -> Self {
        Self {
            invoices: deps.invoices,
            packages: deps.packages,
            store: deps.store,
            parser: deps.parser,
            thumbnails: deps.thumbnails,
            notifier: deps.notifier,
            time_provider: deps.time_provider,
            id_provider: deps.id_provider,
            queue,
            config,
        }
    }

    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    fn now(&self) -> i64 {
        self.time_provider.now_millis()
    }

    fn stamp(&self, label: &str, now: i64) -> String {
        format!("{}: {}", label, to_rfc3339(now))
    }

    /// Owner-scoped point read; a package id, when given, must match the record
    async fn load_invoice(
        &self,
        owner_id: &str,
        invoice_id: &str,
        package_id: Option<&str>,
    ) -> Result<Invoice> {
        let invoice = self
            .invoices
            .find(owner_id, invoice_id)
            .await?
            .filter(|inv| package_id.is_none() || inv.package_id.as_deref() == package_id)
            .ok_or_else(|| AppError::NotFound(format!("Invoice not found: {}", invoice_id)))?;
        Ok(invoice)
    }

    async fn load_package(&self, owner_id: &str, package_id: &str) -> Result<Package> {
        self.packages
            .find(owner_id, package_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Package not found: {}", package_id)))
    }

    /// Persist a patch; when the status changes, notify and move package counters
    ///
    /// The write is guarded by the status `invoice` was read in. Only the caller
    /// whose write lands moves the counters; a caller that lost the race to the
    /// same target status gets the stored record back.
    async fn advance(&self, invoice: &Invoice, patch: InvoicePatch) -> Result<Invoice> {
        let from = invoice.status;
        let to = patch.status.unwrap_or(from);
        if to != from {
            invoice.check_transition(to)?;
        }

        let patch = patch.expecting(from);
        let updated = match self
            .invoices
            .update(&invoice.owner_id, &invoice.id, &patch)
            .await
        {
            Ok(updated) => updated,
            Err(AppError::Conflict(reason)) => {
                let current = self
                    .invoices
                    .find(&invoice.owner_id, &invoice.id)
                    .await?
                    .ok_or_else(|| AppError::NotFound(format!("Invoice not found: {}", invoice.id)))?;
                if to != from && current.status == to {
                    debug!(invoice_id = %invoice.id, status = %to, "Status already changed by a concurrent request");
                    return Ok(current);
                }
                return Err(AppError::Conflict(reason));
            }
            Err(e) => return Err(e),
        };

        if to != from {
            info!(
                invoice_id = %invoice.id,
                owner_id = %invoice.owner_id,
                from = %from,
                to = %to,
                "Invoice status changed"
            );
            self.notifier.invoice_status(
                &invoice.owner_id,
                &invoice.id,
                to,
                invoice.package_id.as_deref(),
            );
            if let Some(package_id) = invoice.package_id.as_deref() {
                self.apply_package_delta(&invoice.owner_id, package_id, CounterDelta::between(from, to))
                    .await?;
            }
        }

        Ok(updated)
    }

    /// Atomic counter increment, then recompute and publish the package status
    ///
    /// The status write is conditional on the counters this increment returned.
    /// When a later increment has moved them, that writer owns the status.
    async fn apply_package_delta(
        &self,
        owner_id: &str,
        package_id: &str,
        delta: CounterDelta,
    ) -> Result<()> {
        if delta.is_zero() {
            return Ok(());
        }
        let now = self.now();
        let package = self
            .packages
            .increment_counters(owner_id, package_id, delta, now)
            .await?;

        let next = package.next_status();
        if next == package.status {
            return Ok(());
        }
        if !self
            .packages
            .set_status_if_unchanged(&package, next, now)
            .await?
        {
            debug!(package_id = %package_id, skipped = %next, "Package counters moved on, status left to the latest writer");
            return Ok(());
        }

        info!(
            package_id = %package_id,
            from = %package.status,
            to = %next,
            processed = package.processed_invoices,
            errors = package.error_count,
            total = package.total_invoices,
            "Package status changed"
        );
        self.notifier.package_status(owner_id, package_id, next);
        Ok(())
    }
}

fn invalid_transition(from: InvoiceStatus, to: InvoiceStatus) -> AppError {
    AppError::Domain(DomainError::InvalidStatusTransition {
        from: from.to_string(),
        to: to.to_string(),
    })
}
