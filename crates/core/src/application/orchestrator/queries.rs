// Read side: records, stats and JSON exports

use super::storage_path;
use super::ProcessingOrchestrator;
use crate::domain::timestamp::to_rfc3339;
use crate::domain::{Invoice, InvoiceStats, InvoiceStatus, Package};
use crate::error::Result;
use serde::Serialize;
use tracing::warn;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedInvoice {
    pub id: String,
    pub original_name: String,
    pub status: InvoiceStatus,
    pub uploaded_at: String,
    pub last_processed_at: Option<String>,
    pub processing_ms: Option<i64>,
    pub file_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub structured: serde_json::Value,
}

impl From<&Invoice> for ExportedInvoice {
    fn from(invoice: &Invoice) -> Self {
        Self {
            id: invoice.id.clone(),
            original_name: invoice.file_name.clone(),
            status: invoice.status,
            uploaded_at: to_rfc3339(invoice.uploaded_at),
            last_processed_at: invoice.last_processed_at.map(to_rfc3339),
            processing_ms: invoice.processing_ms,
            file_url: invoice.file_url.clone(),
            thumbnail_url: invoice.thumbnail_url.clone(),
            structured: invoice.structured.clone(),
        }
    }
}

/// All invoices of one owner
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceExport {
    pub user_id: String,
    pub exported_at: String,
    pub invoice_count: usize,
    pub invoices: Vec<ExportedInvoice>,
}

/// One package with its invoices
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageExport {
    pub package_id: String,
    pub name: String,
    pub created_at: String,
    pub total_invoices: i64,
    pub processed_invoices: i64,
    pub error_count: i64,
    pub approved_invoices: i64,
    pub exported_at: String,
    pub invoices: Vec<ExportedInvoice>,
}

impl ProcessingOrchestrator {
    /// Point read with freshly signed file and thumbnail URLs
    ///
    /// Signing failures keep the stored URLs.
    pub async fn get_invoice(
        &self,
        owner_id: &str,
        invoice_id: &str,
        package_id: Option<&str>,
    ) -> Result<Invoice> {
        let mut invoice = self.load_invoice(owner_id, invoice_id, package_id).await?;
        let Some(path) = invoice.storage_path.clone() else {
            return Ok(invoice);
        };

        let ttl = self.config.signed_url_ttl;
        match self.store.signed_url(&path, ttl).await {
            Ok(url) => invoice.file_url = Some(url),
            Err(e) => warn!(invoice_id = %invoice.id, error = %e, "Could not sign file URL"),
        }

        if invoice.thumbnail_url.is_some() {
            let thumb = storage_path::thumbnail_path(storage_path::parent_folder(&path));
            match self.store.signed_url(&thumb, ttl).await {
                Ok(url) => invoice.thumbnail_url = Some(url),
                Err(e) => {
                    warn!(invoice_id = %invoice.id, error = %e, "Could not sign thumbnail URL")
                }
            }
        }

        Ok(invoice)
    }

    /// Newest first
    pub async fn list_invoices(&self, owner_id: &str) -> Result<Vec<Invoice>> {
        self.invoices.list_by_owner(owner_id).await
    }

    pub async fn get_package(&self, owner_id: &str, package_id: &str) -> Result<Package> {
        self.load_package(owner_id, package_id).await
    }

    /// Newest first
    pub async fn list_packages(&self, owner_id: &str) -> Result<Vec<Package>> {
        self.packages.list_by_owner(owner_id).await
    }

    pub async fn list_package_invoices(
        &self,
        owner_id: &str,
        package_id: &str,
    ) -> Result<Vec<Invoice>> {
        self.load_package(owner_id, package_id).await?;
        self.invoices.list_by_package(owner_id, package_id).await
    }

    pub async fn invoice_stats(&self, owner_id: &str) -> Result<InvoiceStats> {
        let invoices = self.invoices.list_by_owner(owner_id).await?;
        Ok(InvoiceStats::tally(&invoices))
    }

    pub async fn export_invoices(&self, owner_id: &str) -> Result<InvoiceExport> {
        let invoices = self.invoices.list_by_owner(owner_id).await?;
        Ok(InvoiceExport {
            user_id: owner_id.to_string(),
            exported_at: to_rfc3339(self.now()),
            invoice_count: invoices.len(),
            invoices: invoices.iter().map(ExportedInvoice::from).collect(),
        })
    }

    pub async fn export_package(&self, owner_id: &str, package_id: &str) -> Result<PackageExport> {
        let package = self.load_package(owner_id, package_id).await?;
        let invoices = self.invoices.list_by_package(owner_id, package_id).await?;
        Ok(PackageExport {
            package_id: package.id,
            name: package.name,
            created_at: to_rfc3339(package.created_at),
            total_invoices: package.total_invoices,
            processed_invoices: package.processed_invoices,
            error_count: package.error_count,
            approved_invoices: package.approved_invoices,
            exported_at: to_rfc3339(self.now()),
            invoices: invoices.iter().map(ExportedInvoice::from).collect(),
        })
    }
}
