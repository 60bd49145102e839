// Invoice Domain Model

use super::error::{DomainError, Result};
use super::structured;
use super::timestamp::to_rfc3339;
use serde::{Deserialize, Serialize};

/// Invoice ID (UUID v4)
pub type InvoiceId = String;

/// Authenticated user identity that owns records and connections
pub type OwnerId = String;

/// Invoice lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Uploading,
    Queued,
    Processing,
    Processed,
    Uploaded,
    Approved,
    Rejected,
    Reevaluating,
    Failed,
}

/// How a status counts towards package progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// Still moving through the pipeline
    Pending,
    /// Stored and parsed (or soft-degraded), counted as processed
    Settled,
    /// Counted as an error
    Errored,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Uploading => "uploading",
            InvoiceStatus::Queued => "queued",
            InvoiceStatus::Processing => "processing",
            InvoiceStatus::Processed => "processed",
            InvoiceStatus::Uploaded => "uploaded",
            InvoiceStatus::Approved => "approved",
            InvoiceStatus::Rejected => "rejected",
            InvoiceStatus::Reevaluating => "reevaluating",
            InvoiceStatus::Failed => "failed",
        }
    }

    /// Statuses a background job may still drive forward
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            InvoiceStatus::Uploading | InvoiceStatus::Queued | InvoiceStatus::Processing
        )
    }

    pub fn progress(&self) -> Progress {
        match self {
            InvoiceStatus::Processed
            | InvoiceStatus::Uploaded
            | InvoiceStatus::Approved
            | InvoiceStatus::Rejected => Progress::Settled,
            InvoiceStatus::Failed => Progress::Errored,
            InvoiceStatus::Uploading
            | InvoiceStatus::Queued
            | InvoiceStatus::Processing
            | InvoiceStatus::Reevaluating => Progress::Pending,
        }
    }

    /// Transition graph
    ///
    /// ```text
    /// uploading -> queued -> processing -> processed | uploaded | failed
    /// uploading | queued -> failed                      (object store write failed)
    /// processed | uploaded | rejected -> approved       (approve)
    /// approved -> processed                             (revoke approval)
    /// processed | uploaded | approved -> rejected       (reject)
    /// processed | uploaded | approved | rejected | failed -> reevaluating
    /// reevaluating -> processed | uploaded | failed
    /// ```
    pub fn can_transition_to(&self, next: InvoiceStatus) -> bool {
        use InvoiceStatus::*;
        matches!(
            (*self, next),
            (Uploading, Queued)
                | (Uploading, Failed)
                | (Queued, Processing)
                | (Queued, Failed)
                | (Processing, Processed)
                | (Processing, Uploaded)
                | (Processing, Failed)
                | (Processed | Uploaded | Rejected, Approved)
                | (Approved, Processed)
                | (Processed | Uploaded | Approved, Rejected)
                | (Processed | Uploaded | Approved | Rejected | Failed, Reevaluating)
                | (Reevaluating, Processed)
                | (Reevaluating, Uploaded)
                | (Reevaluating, Failed)
        )
    }
}

impl std::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for InvoiceStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "uploading" => Ok(InvoiceStatus::Uploading),
            "queued" => Ok(InvoiceStatus::Queued),
            "processing" => Ok(InvoiceStatus::Processing),
            "processed" => Ok(InvoiceStatus::Processed),
            "uploaded" => Ok(InvoiceStatus::Uploaded),
            "approved" => Ok(InvoiceStatus::Approved),
            "rejected" => Ok(InvoiceStatus::Rejected),
            "reevaluating" => Ok(InvoiceStatus::Reevaluating),
            "failed" => Ok(InvoiceStatus::Failed),
            other => Err(DomainError::UnknownStatus(other.to_string())),
        }
    }
}

/// Machine-readable error codes recorded on invoices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    StorageUploadFailed,
    ParserFailed,
    ReevaluationFailed,
    Uncaught,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCode::StorageUploadFailed => write!(f, "STORAGE_UPLOAD_FAILED"),
            ErrorCode::ParserFailed => write!(f, "PARSER_FAILED"),
            ErrorCode::ReevaluationFailed => write!(f, "REEVALUATION_FAILED"),
            ErrorCode::Uncaught => write!(f, "UNCAUGHT"),
        }
    }
}

/// Error entry persisted on an invoice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceError {
    pub code: ErrorCode,
    pub message: String,
    pub timestamp: String,
}

impl InvoiceError {
    pub fn new(code: ErrorCode, message: impl Into<String>, now_millis: i64) -> Self {
        Self {
            code,
            message: message.into(),
            timestamp: to_rfc3339(now_millis),
        }
    }
}

/// Invoice record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub id: InvoiceId,
    #[serde(rename = "userId")]
    pub owner_id: OwnerId,
    pub package_id: Option<String>,

    pub file_name: String,
    pub content_type: String,
    pub storage_path: Option<String>,

    pub status: InvoiceStatus,
    pub file_url: Option<String>,
    pub thumbnail_url: Option<String>,

    pub structured: serde_json::Value,
    pub ocr_text: Option<String>,
    pub processing_ms: Option<i64>,

    pub is_approved: bool,
    pub approved_at: Option<i64>,
    pub approved_by: Option<String>,
    pub is_manually_edited: bool,

    pub errors: Vec<InvoiceError>,
    pub internal_logs: Vec<String>,

    pub uploaded_at: i64, // epoch ms
    pub last_processed_at: Option<i64>,
    pub last_updated_at: i64,
    pub last_reevaluation_at: Option<i64>,
}

impl Invoice {
    /// Create a new record in `uploading` state
    ///
    /// # Arguments
    ///
    /// * `id` - Unique invoice ID (injected, not generated)
    /// * `owner_id` - Owner of the record
    /// * `package_id` - Parent package, if any
    /// * `file_name` - Original file name as uploaded
    /// * `content_type` - MIME type of the upload
    /// * `now_millis` - Creation timestamp (injected, not system time)
    pub fn new(
        id: impl Into<String>,
        owner_id: impl Into<String>,
        package_id: Option<String>,
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        now_millis: i64,
    ) -> Self {
        Self {
            id: id.into(),
            owner_id: owner_id.into(),
            package_id,
            file_name: file_name.into(),
            content_type: content_type.into(),
            storage_path: None,
            status: InvoiceStatus::Uploading,
            file_url: None,
            thumbnail_url: None,
            structured: structured::empty_object(),
            ocr_text: None,
            processing_ms: None,
            is_approved: false,
            approved_at: None,
            approved_by: None,
            is_manually_edited: false,
            errors: Vec::new(),
            internal_logs: vec![format!("created: {}", to_rfc3339(now_millis))],
            uploaded_at: now_millis,
            last_processed_at: None,
            last_updated_at: now_millis,
            last_reevaluation_at: None,
        }
    }

    /// Check a transition against the status graph
    pub fn check_transition(&self, next: InvoiceStatus) -> Result<()> {
        if self.status.can_transition_to(next) {
            Ok(())
        } else {
            Err(DomainError::InvalidStatusTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            })
        }
    }

    pub fn latest_error(&self) -> Option<&InvoiceError> {
        self.errors.last()
    }
}

/// Partial update of an invoice record
///
/// `None` leaves a field untouched. Optional columns that may be cleared use a
/// nested `Option` (`Some(None)` clears). Errors and log lines are appended.
///
/// With `expected_status` set the patch only applies while the stored record is
/// still in that status.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InvoicePatch {
    pub expected_status: Option<InvoiceStatus>,
    pub status: Option<InvoiceStatus>,
    pub storage_path: Option<String>,
    pub file_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub structured: Option<serde_json::Value>,
    pub ocr_text: Option<Option<String>>,
    pub processing_ms: Option<i64>,
    pub is_approved: Option<bool>,
    pub approved_at: Option<Option<i64>>,
    pub approved_by: Option<Option<String>>,
    pub is_manually_edited: Option<bool>,
    pub last_processed_at: Option<i64>,
    pub last_reevaluation_at: Option<i64>,
    pub append_error: Option<InvoiceError>,
    pub append_logs: Vec<String>,
    pub updated_at: i64,
}

impl InvoicePatch {
    pub fn at(now_millis: i64) -> Self {
        Self {
            updated_at: now_millis,
            ..Default::default()
        }
    }

    pub fn status(mut self, status: InvoiceStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn expecting(mut self, status: InvoiceStatus) -> Self {
        self.expected_status = Some(status);
        self
    }

    /// False when the record has moved away from `expected_status`
    pub fn matches(&self, invoice: &Invoice) -> bool {
        self.expected_status
            .map_or(true, |expected| invoice.status == expected)
    }

    pub fn log(mut self, line: impl Into<String>) -> Self {
        self.append_logs.push(line.into());
        self
    }

    pub fn error(mut self, error: InvoiceError) -> Self {
        self.append_error = Some(error);
        self
    }

    /// Apply the patch to an in-memory record
    pub fn apply(&self, invoice: &mut Invoice) {
        if let Some(status) = self.status {
            invoice.status = status;
        }
        if let Some(path) = &self.storage_path {
            invoice.storage_path = Some(path.clone());
        }
        if let Some(url) = &self.file_url {
            invoice.file_url = Some(url.clone());
        }
        if let Some(url) = &self.thumbnail_url {
            invoice.thumbnail_url = Some(url.clone());
        }
        if let Some(structured) = &self.structured {
            invoice.structured = structured.clone();
        }
        if let Some(ocr_text) = &self.ocr_text {
            invoice.ocr_text = ocr_text.clone();
        }
        if let Some(ms) = self.processing_ms {
            invoice.processing_ms = Some(ms);
        }
        if let Some(approved) = self.is_approved {
            invoice.is_approved = approved;
        }
        if let Some(at) = self.approved_at {
            invoice.approved_at = at;
        }
        if let Some(by) = &self.approved_by {
            invoice.approved_by = by.clone();
        }
        if let Some(edited) = self.is_manually_edited {
            invoice.is_manually_edited = edited;
        }
        if let Some(at) = self.last_processed_at {
            invoice.last_processed_at = Some(at);
        }
        if let Some(at) = self.last_reevaluation_at {
            invoice.last_reevaluation_at = Some(at);
        }
        if let Some(error) = &self.append_error {
            invoice.errors.push(error.clone());
        }
        invoice.internal_logs.extend(self.append_logs.iter().cloned());
        invoice.last_updated_at = self.updated_at;
    }
}

/// Per-owner tallies over all invoices
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceStats {
    pub processed: u64,
    pub approved: u64,
    pub pending: u64,
    pub failed: u64,
}

impl InvoiceStats {
    pub fn tally<'a>(invoices: impl IntoIterator<Item = &'a Invoice>) -> Self {
        let mut stats = Self::default();
        for invoice in invoices {
            match invoice.status {
                InvoiceStatus::Processed if !invoice.is_approved => stats.processed += 1,
                InvoiceStatus::Processed | InvoiceStatus::Approved => stats.approved += 1,
                InvoiceStatus::Uploading
                | InvoiceStatus::Queued
                | InvoiceStatus::Processing
                | InvoiceStatus::Reevaluating => stats.pending += 1,
                InvoiceStatus::Failed => stats.failed += 1,
                InvoiceStatus::Uploaded | InvoiceStatus::Rejected => {}
            }
        }
        stats
    }
}
