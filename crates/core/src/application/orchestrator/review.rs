// Review actions: approve / revoke / reject / manual edit / reevaluate

use super::jobs::{reevaluate_invoice_job, InvoiceTarget};
use super::{invalid_transition, ProcessingOrchestrator};
use crate::domain::{
    structured, ErrorCode, Invoice, InvoiceError, InvoicePatch, InvoiceStatus, PackageStatus,
};
use crate::error::{AppError, Result};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Result of a package reevaluation request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageReevaluation {
    pub package_id: String,
    pub total_invoices: usize,
    pub queued: usize,
    pub status: PackageStatus,
}

/// Patch fields clearing approval bookkeeping
fn cleared_approval(patch: InvoicePatch) -> InvoicePatch {
    InvoicePatch {
        is_approved: Some(false),
        approved_at: Some(None),
        approved_by: Some(None),
        ..patch
    }
}

impl ProcessingOrchestrator {
    pub async fn approve(
        &self,
        owner_id: &str,
        invoice_id: &str,
        package_id: Option<&str>,
    ) -> Result<Invoice> {
        let invoice = self.load_invoice(owner_id, invoice_id, package_id).await?;
        if invoice.status == InvoiceStatus::Approved {
            return Ok(invoice);
        }
        invoice.check_transition(InvoiceStatus::Approved)?;

        let now = self.now();
        let patch = InvoicePatch {
            is_approved: Some(true),
            approved_at: Some(Some(now)),
            approved_by: Some(Some(owner_id.to_string())),
            ..InvoicePatch::at(now)
        }
        .status(InvoiceStatus::Approved)
        .log(self.stamp("approved", now));
        self.advance(&invoice, patch).await
    }

    /// approved -> processed
    pub async fn revoke_approval(
        &self,
        owner_id: &str,
        invoice_id: &str,
        package_id: Option<&str>,
    ) -> Result<Invoice> {
        let invoice = self.load_invoice(owner_id, invoice_id, package_id).await?;
        match invoice.status {
            InvoiceStatus::Approved => {}
            InvoiceStatus::Processed => return Ok(invoice),
            other => return Err(invalid_transition(other, InvoiceStatus::Processed)),
        }

        let now = self.now();
        let patch = cleared_approval(InvoicePatch::at(now))
            .status(InvoiceStatus::Processed)
            .log(self.stamp("approvalRevoked", now));
        self.advance(&invoice, patch).await
    }

    pub async fn reject(
        &self,
        owner_id: &str,
        invoice_id: &str,
        package_id: Option<&str>,
    ) -> Result<Invoice> {
        let invoice = self.load_invoice(owner_id, invoice_id, package_id).await?;
        if invoice.status == InvoiceStatus::Rejected {
            return Ok(invoice);
        }
        invoice.check_transition(InvoiceStatus::Rejected)?;

        let now = self.now();
        let patch = cleared_approval(InvoicePatch::at(now))
            .status(InvoiceStatus::Rejected)
            .log(self.stamp("rejected", now));
        self.advance(&invoice, patch).await
    }

    /// Manual edit of the extracted fields; status is unchanged
    pub async fn update_structured(
        &self,
        owner_id: &str,
        invoice_id: &str,
        package_id: Option<&str>,
        fields: serde_json::Value,
    ) -> Result<Invoice> {
        if !fields.is_object() {
            return Err(AppError::Validation(
                "structured must be a JSON object".to_string(),
            ));
        }
        let invoice = self.load_invoice(owner_id, invoice_id, package_id).await?;
        if invoice.status.is_in_flight() || invoice.status == InvoiceStatus::Reevaluating {
            return Err(AppError::Conflict(format!(
                "Invoice {} is still being processed ({})",
                invoice.id, invoice.status
            )));
        }

        let now = self.now();
        let patch = InvoicePatch {
            structured: Some(structured::merge_over_template(&fields)),
            is_manually_edited: Some(true),
            ..InvoicePatch::at(now)
        }
        .log(self.stamp("manualUpdate", now));
        let updated = self.advance(&invoice, patch).await?;
        info!(invoice_id = %invoice.id, owner_id = %owner_id, "Structured data edited");
        Ok(updated)
    }

    /// Move one invoice to `reevaluating` and queue a re-parse of its stored file
    pub async fn reevaluate_invoice(
        self: &Arc<Self>,
        owner_id: &str,
        invoice_id: &str,
        package_id: Option<&str>,
    ) -> Result<Invoice> {
        let invoice = self.load_invoice(owner_id, invoice_id, package_id).await?;
        if invoice.status == InvoiceStatus::Reevaluating {
            return Ok(invoice);
        }
        if invoice.storage_path.is_none() {
            return Err(AppError::Validation(format!(
                "Invoice {} has no stored file to reevaluate",
                invoice.id
            )));
        }
        self.queue_reevaluation(&invoice).await
    }

    /// Queue a reevaluation for every invoice of the package that has a stored file
    pub async fn reevaluate_package(
        self: &Arc<Self>,
        owner_id: &str,
        package_id: &str,
    ) -> Result<PackageReevaluation> {
        let package = self.load_package(owner_id, package_id).await?;
        let invoices = self.invoices.list_by_package(owner_id, package_id).await?;
        let eligible: Vec<&Invoice> = invoices
            .iter()
            .filter(|inv| {
                inv.storage_path.is_some()
                    && inv.status.can_transition_to(InvoiceStatus::Reevaluating)
            })
            .collect();

        if eligible.is_empty() {
            info!(package_id = %package_id, "Nothing to reevaluate in package");
            return Ok(PackageReevaluation {
                package_id: package_id.to_string(),
                total_invoices: invoices.len(),
                queued: 0,
                status: package.status,
            });
        }

        let now = self.now();
        self.packages
            .mark_reevaluating(owner_id, package_id, now)
            .await?;
        self.notifier
            .package_status(owner_id, package_id, PackageStatus::Reevaluating);
        info!(package_id = %package_id, invoices = eligible.len(), "Package reevaluation started");

        for invoice in &eligible {
            self.queue_reevaluation(invoice).await?;
        }

        Ok(PackageReevaluation {
            package_id: package_id.to_string(),
            total_invoices: invoices.len(),
            queued: eligible.len(),
            status: PackageStatus::Reevaluating,
        })
    }

    async fn queue_reevaluation(self: &Arc<Self>, invoice: &Invoice) -> Result<Invoice> {
        invoice.check_transition(InvoiceStatus::Reevaluating)?;

        let now = self.now();
        let patch = cleared_approval(InvoicePatch {
            last_reevaluation_at: Some(now),
            ..InvoicePatch::at(now)
        })
        .status(InvoiceStatus::Reevaluating)
        .log(self.stamp("reevaluationQueued", now));
        let updated = self.advance(invoice, patch).await?;

        let target = InvoiceTarget {
            owner_id: invoice.owner_id.clone(),
            invoice_id: invoice.id.clone(),
            package_id: invoice.package_id.clone(),
        };
        self.queue.enqueue(reevaluate_invoice_job(self, &target));
        Ok(updated)
    }

    pub(super) async fn run_reevaluation_guarded(&self, target: &InvoiceTarget) -> Result<Invoice> {
        match self.run_reevaluation(target).await {
            Ok(invoice) => Ok(invoice),
            Err(e) => {
                self.record_uncaught(target, &e).await;
                Err(e)
            }
        }
    }

    async fn run_reevaluation(&self, target: &InvoiceTarget) -> Result<Invoice> {
        let invoice = self
            .load_invoice(&target.owner_id, &target.invoice_id, target.package_id())
            .await?;
        if invoice.status != InvoiceStatus::Reevaluating {
            info!(invoice_id = %invoice.id, status = %invoice.status, "Reevaluation no longer pending, skipped");
            return Ok(invoice);
        }

        let started = self.now();
        let fetched = match invoice.storage_path.as_deref() {
            Some(path) => self.store.get(path).await.map_err(|e| e.to_string()),
            None => Err("no stored file".to_string()),
        };
        let bytes = match fetched {
            Ok(bytes) => bytes,
            Err(message) => {
                warn!(invoice_id = %invoice.id, error = %message, "Stored file unavailable for reevaluation");
                let now = self.now();
                let patch = InvoicePatch::at(now)
                    .status(InvoiceStatus::Failed)
                    .error(InvoiceError::new(
                        ErrorCode::ReevaluationFailed,
                        message.clone(),
                        now,
                    ))
                    .log(format!("reevaluationError: {}", message));
                return self.advance(&invoice, patch).await;
            }
        };

        let result = self
            .parser
            .parse(&bytes, &invoice.file_name, &invoice.content_type)
            .await;
        let patch = self.parse_outcome(&invoice, result, started, ErrorCode::ReevaluationFailed);
        self.advance(&invoice, patch).await
    }
}
