//! Request / response bodies

use fatura_core::application::orchestrator::PackageReevaluation;
use fatura_core::domain::{Invoice, InvoiceStats, InvoiceStatus, Package, PackageStatus};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub message: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct InvoiceResponse {
    pub invoice: Invoice,
}

#[derive(Debug, Serialize)]
pub struct InvoiceListResponse {
    pub invoices: Vec<Invoice>,
}

/// Outcome of a synchronous scan or a review action
#[derive(Debug, Serialize)]
pub struct InvoiceActionResponse {
    pub message: String,
    pub invoice: Invoice,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackgroundScanResponse {
    pub message: String,
    pub invoice_id: String,
    pub status: InvoiceStatus,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub success: bool,
    pub stats: InvoiceStats,
}

/// `PUT` body for an invoice
///
/// `isApproved: true` approves, `false` revokes an approval.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateInvoiceRequest {
    pub structured: Option<serde_json::Value>,
    pub is_approved: Option<bool>,
}

/// `PUT .../invoices/:invoiceId/structured` body
#[derive(Debug, Deserialize)]
pub struct StructuredUpdateRequest {
    pub structured: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct PackageResponse {
    pub package: Package,
}

#[derive(Debug, Serialize)]
pub struct PackageListResponse {
    pub packages: Vec<Package>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageCreatedResponse {
    pub message: String,
    pub package_id: String,
    pub status: PackageStatus,
    pub total: usize,
    pub invoice_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ReevaluationResponse {
    pub success: bool,
    pub message: String,
    pub data: PackageReevaluation,
}
