// Upload -> queue -> parse pipeline

use super::jobs::{process_invoice_job, InvoiceTarget};
use super::storage_path;
use super::{ProcessingOrchestrator, UploadedFile};
use crate::domain::timestamp::to_rfc3339;
use crate::domain::{
    structured, ErrorCode, Invoice, InvoiceError, InvoicePatch, InvoiceStatus, Package,
};
use crate::error::{AppError, Result};
use crate::port::{ObjectMetadata, ParseError, ParsedDocument, StorageError};
use std::sync::Arc;
use tracing::{error, info, warn};

/// OCR text stored when the parse service cannot be reached
pub const PARSER_UNAVAILABLE_TEXT: &str =
    "Parse service unavailable. The file was stored without analysis.";

impl ProcessingOrchestrator {
    /// Create an `uploading` record and process it in the background
    pub async fn submit_invoice(
        self: &Arc<Self>,
        owner_id: &str,
        file: UploadedFile,
    ) -> Result<Invoice> {
        file.validate()?;
        let invoice = self.create_record(owner_id, None, &file).await?;
        let target = InvoiceTarget {
            owner_id: owner_id.to_string(),
            invoice_id: invoice.id.clone(),
            package_id: None,
        };
        self.queue.enqueue(process_invoice_job(self, &target, file));
        info!(invoice_id = %invoice.id, owner_id = %owner_id, "Invoice submitted for background processing");
        Ok(invoice)
    }

    /// Run the whole pipeline inline and return the final record
    pub async fn process_invoice_now(&self, owner_id: &str, file: UploadedFile) -> Result<Invoice> {
        file.validate()?;
        let invoice = self.create_record(owner_id, None, &file).await?;
        let target = InvoiceTarget {
            owner_id: owner_id.to_string(),
            invoice_id: invoice.id,
            package_id: None,
        };
        self.run_pipeline_guarded(&target, &file).await
    }

    /// Create a package with one background job per file
    pub async fn create_package(
        self: &Arc<Self>,
        owner_id: &str,
        name: Option<String>,
        files: Vec<UploadedFile>,
    ) -> Result<(Package, Vec<Invoice>)> {
        if files.is_empty() {
            return Err(AppError::Validation("No files uploaded".to_string()));
        }
        for file in &files {
            file.validate()?;
        }

        let now = self.now();
        let name = name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| format!("Paket {}", to_rfc3339(now)));
        let package = Package::new(
            self.id_provider.generate_id(),
            owner_id,
            name,
            files.len() as i64,
            now,
        );
        self.packages.insert(&package).await?;
        info!(package_id = %package.id, owner_id = %owner_id, total = package.total_invoices, "Package created");

        let mut invoices = Vec::with_capacity(files.len());
        for file in files {
            let invoice = self
                .create_record(owner_id, Some(package.id.clone()), &file)
                .await?;
            let target = InvoiceTarget {
                owner_id: owner_id.to_string(),
                invoice_id: invoice.id.clone(),
                package_id: Some(package.id.clone()),
            };
            self.queue.enqueue(process_invoice_job(self, &target, file));
            invoices.push(invoice);
        }

        Ok((package, invoices))
    }

    async fn create_record(
        &self,
        owner_id: &str,
        package_id: Option<String>,
        file: &UploadedFile,
    ) -> Result<Invoice> {
        let invoice = Invoice::new(
            self.id_provider.generate_id(),
            owner_id,
            package_id,
            file.file_name.clone(),
            file.content_type.clone(),
            self.now(),
        );
        self.invoices.insert(&invoice).await?;
        Ok(invoice)
    }

    /// Run the pipeline; an unexpected error is recorded as `UNCAUGHT` and returned
    pub(super) async fn run_pipeline_guarded(
        &self,
        target: &InvoiceTarget,
        file: &UploadedFile,
    ) -> Result<Invoice> {
        match self.run_pipeline(target, file).await {
            Ok(invoice) => Ok(invoice),
            Err(e) => {
                self.record_uncaught(target, &e).await;
                Err(e)
            }
        }
    }

    /// Drive the record from its current in-flight stage to a settled status
    ///
    /// A record that is no longer in flight is returned untouched, so a retried
    /// job resumes where the previous attempt stopped.
    async fn run_pipeline(&self, target: &InvoiceTarget, file: &UploadedFile) -> Result<Invoice> {
        let mut invoice = self
            .load_invoice(&target.owner_id, &target.invoice_id, target.package_id())
            .await?;

        loop {
            invoice = match invoice.status {
                InvoiceStatus::Uploading => self.store_file(&invoice, file).await?,
                InvoiceStatus::Queued => self.begin_processing(&invoice).await?,
                InvoiceStatus::Processing => self.parse_file(&invoice, file).await?,
                _ => return Ok(invoice),
            };
        }
    }

    async fn store_file(&self, invoice: &Invoice, file: &UploadedFile) -> Result<Invoice> {
        let folder = storage_path::invoice_folder(
            &invoice.owner_id,
            invoice.package_id.as_deref(),
            &invoice.id,
        );
        let path = storage_path::file_path(&folder, &file.file_name);

        match self.upload(invoice, &folder, &path, file).await {
            Ok((file_url, thumbnail_url)) => {
                let now = self.now();
                let patch = InvoicePatch {
                    storage_path: Some(path),
                    file_url: Some(file_url),
                    thumbnail_url,
                    ..InvoicePatch::at(now)
                }
                .status(InvoiceStatus::Queued)
                .log(self.stamp("fileUploaded", now));
                self.advance(invoice, patch).await
            }
            Err(e) => {
                warn!(invoice_id = %invoice.id, error = %e, "Object store upload failed");
                let now = self.now();
                let patch = InvoicePatch::at(now)
                    .status(InvoiceStatus::Failed)
                    .error(InvoiceError::new(
                        ErrorCode::StorageUploadFailed,
                        e.to_string(),
                        now,
                    ))
                    .log(format!("uploadError: {}", e));
                self.advance(invoice, patch).await
            }
        }
    }

    /// Store the file and (optionally) its thumbnail; returns both URLs
    async fn upload(
        &self,
        invoice: &Invoice,
        folder: &str,
        path: &str,
        file: &UploadedFile,
    ) -> std::result::Result<(String, Option<String>), StorageError> {
        let mut metadata = ObjectMetadata::new();
        metadata.insert("originalName".to_string(), file.file_name.clone());
        metadata.insert("uploadedBy".to_string(), invoice.owner_id.clone());
        metadata.insert("uploadedAt".to_string(), to_rfc3339(invoice.uploaded_at));
        metadata.insert("invoiceId".to_string(), invoice.id.clone());

        let file_url = self
            .store
            .put(path, &file.bytes, &file.content_type, &metadata)
            .await?;

        let thumbnail_url = match &self.thumbnails {
            Some(renderer) => {
                let jpeg = renderer.render(&file.bytes, &file.content_type).await?;
                let thumb_path = storage_path::thumbnail_path(folder);
                self.store
                    .put(
                        &thumb_path,
                        &jpeg,
                        storage_path::THUMBNAIL_CONTENT_TYPE,
                        &metadata,
                    )
                    .await?;
                Some(
                    self.store
                        .signed_url(&thumb_path, self.config.signed_url_ttl)
                        .await?,
                )
            }
            None => None,
        };

        Ok((file_url, thumbnail_url))
    }

    async fn begin_processing(&self, invoice: &Invoice) -> Result<Invoice> {
        let now = self.now();
        let patch = InvoicePatch::at(now)
            .status(InvoiceStatus::Processing)
            .log(self.stamp("processingStart", now));
        self.advance(invoice, patch).await
    }

    async fn parse_file(&self, invoice: &Invoice, file: &UploadedFile) -> Result<Invoice> {
        let started = self.now();
        let result = self
            .parser
            .parse(&file.bytes, &file.file_name, &file.content_type)
            .await;
        let patch = self.parse_outcome(invoice, result, started, ErrorCode::ParserFailed);
        self.advance(invoice, patch).await
    }

    /// Map a parse result onto the settling patch
    ///
    /// success -> processed, unreachable -> uploaded (template only), other -> failed
    pub(super) fn parse_outcome(
        &self,
        invoice: &Invoice,
        result: std::result::Result<ParsedDocument, ParseError>,
        started: i64,
        failure_code: ErrorCode,
    ) -> InvoicePatch {
        let now = self.now();
        let elapsed = (now - started).max(0);

        match result {
            Ok(doc) => {
                info!(invoice_id = %invoice.id, processing_ms = elapsed, "Invoice parsed");
                InvoicePatch {
                    structured: Some(structured::merge_over_template(&doc.structured)),
                    ocr_text: Some(doc.raw_text),
                    processing_ms: Some(elapsed),
                    last_processed_at: Some(now),
                    ..InvoicePatch::at(now)
                }
                .status(InvoiceStatus::Processed)
                .log(self.stamp("processingEnd", now))
                .log(format!("processingMs: {}", elapsed))
            }
            Err(e) if e.is_unreachable() => {
                warn!(invoice_id = %invoice.id, error = %e, "Parse service unreachable, keeping upload only");
                InvoicePatch {
                    structured: Some(structured::template()),
                    ocr_text: Some(Some(PARSER_UNAVAILABLE_TEXT.to_string())),
                    processing_ms: Some(elapsed),
                    last_processed_at: Some(now),
                    ..InvoicePatch::at(now)
                }
                .status(InvoiceStatus::Uploaded)
                .log(format!("parserUnavailable: {}", e))
            }
            Err(e) => {
                warn!(invoice_id = %invoice.id, code = %failure_code, error = %e, "Parse failed");
                let label = match failure_code {
                    ErrorCode::ReevaluationFailed => "reevaluationError",
                    _ => "parserError",
                };
                InvoicePatch {
                    processing_ms: Some(elapsed),
                    ..InvoicePatch::at(now)
                }
                .status(InvoiceStatus::Failed)
                .error(InvoiceError::new(failure_code, e.to_string(), now))
                .log(format!("{}: {}", label, e))
            }
        }
    }

    /// Best effort: mark the record `failed` with `UNCAUGHT`
    pub(super) async fn record_uncaught(&self, target: &InvoiceTarget, cause: &AppError) {
        if let Err(e) = self.try_record_uncaught(target, cause).await {
            error!(
                invoice_id = %target.invoice_id,
                cause = %cause,
                error = %e,
                "Failed to record uncaught error"
            );
        }
    }

    async fn try_record_uncaught(&self, target: &InvoiceTarget, cause: &AppError) -> Result<()> {
        let invoice = self
            .load_invoice(&target.owner_id, &target.invoice_id, target.package_id())
            .await?;
        if !invoice.status.can_transition_to(InvoiceStatus::Failed) {
            return Ok(());
        }

        error!(invoice_id = %invoice.id, status = %invoice.status, error = %cause, "Uncaught processing error");
        let now = self.now();
        let patch = InvoicePatch::at(now)
            .status(InvoiceStatus::Failed)
            .error(InvoiceError::new(ErrorCode::Uncaught, cause.to_string(), now))
            .log(format!("uncaughtError: {}", cause));
        self.advance(&invoice, patch).await.map(|_| ())
    }
}
