// SQLite InvoiceRepository Implementation

use crate::error::map_sqlx_error;
use async_trait::async_trait;
use fatura_core::domain::{Invoice, InvoiceError, InvoicePatch, InvoiceStatus};
use fatura_core::error::{AppError, Result};
use fatura_core::port::InvoiceRepository;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

pub struct SqliteInvoiceRepository {
    pool: SqlitePool,
}

impl SqliteInvoiceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn fetch_list(&self, query: &str, binds: &[&str]) -> Result<Vec<Invoice>> {
        let mut q = sqlx::query_as::<_, InvoiceRow>(query);
        for value in binds {
            q = q.bind(*value);
        }
        let rows = q.fetch_all(&self.pool).await.map_err(map_sqlx_error)?;
        rows.into_iter().map(InvoiceRow::into_invoice).collect()
    }
}

/// Build the `UPDATE ... RETURNING *` statement for a patch
///
/// Error entries and log lines are appended with `json_insert` in the same
/// statement, so concurrent appends are never lost. An expected status becomes
/// part of the `WHERE` clause.
fn build_update<'a>(
    owner_id: &'a str,
    invoice_id: &'a str,
    patch: &'a InvoicePatch,
) -> Result<QueryBuilder<'a, Sqlite>> {
    let mut qb = QueryBuilder::new("UPDATE invoices SET last_updated_at = ");
    qb.push_bind(patch.updated_at);

    if let Some(status) = patch.status {
        qb.push(", status = ").push_bind(status.as_str());
    }
    if let Some(path) = &patch.storage_path {
        qb.push(", storage_path = ").push_bind(path.as_str());
    }
    if let Some(url) = &patch.file_url {
        qb.push(", file_url = ").push_bind(url.as_str());
    }
    if let Some(url) = &patch.thumbnail_url {
        qb.push(", thumbnail_url = ").push_bind(url.as_str());
    }
    if let Some(structured) = &patch.structured {
        qb.push(", structured = ").push_bind(structured.to_string());
    }
    if let Some(ocr_text) = &patch.ocr_text {
        qb.push(", ocr_text = ").push_bind(ocr_text.as_deref());
    }
    if let Some(ms) = patch.processing_ms {
        qb.push(", processing_ms = ").push_bind(ms);
    }
    if let Some(approved) = patch.is_approved {
        qb.push(", is_approved = ").push_bind(approved);
    }
    if let Some(at) = patch.approved_at {
        qb.push(", approved_at = ").push_bind(at);
    }
    if let Some(by) = &patch.approved_by {
        qb.push(", approved_by = ").push_bind(by.as_deref());
    }
    if let Some(edited) = patch.is_manually_edited {
        qb.push(", is_manually_edited = ").push_bind(edited);
    }
    if let Some(at) = patch.last_processed_at {
        qb.push(", last_processed_at = ").push_bind(at);
    }
    if let Some(at) = patch.last_reevaluation_at {
        qb.push(", last_reevaluation_at = ").push_bind(at);
    }
    if let Some(error) = &patch.append_error {
        qb.push(", errors = json_insert(errors, '$[#]', json(")
            .push_bind(serde_json::to_string(error)?)
            .push("))");
    }
    if !patch.append_logs.is_empty() {
        qb.push(", internal_logs = ");
        for _ in &patch.append_logs {
            qb.push("json_insert(");
        }
        qb.push("internal_logs");
        for line in &patch.append_logs {
            qb.push(", '$[#]', ").push_bind(line.as_str()).push(")");
        }
    }

    qb.push(" WHERE owner_id = ").push_bind(owner_id);
    qb.push(" AND id = ").push_bind(invoice_id);
    if let Some(expected) = patch.expected_status {
        qb.push(" AND status = ").push_bind(expected.as_str());
    }
    qb.push(" RETURNING *");
    Ok(qb)
}

#[async_trait]
impl InvoiceRepository for SqliteInvoiceRepository {
    async fn insert(&self, invoice: &Invoice) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO invoices (
                id, owner_id, package_id, file_name, content_type, storage_path,
                status, file_url, thumbnail_url, structured, ocr_text, processing_ms,
                is_approved, approved_at, approved_by, is_manually_edited,
                errors, internal_logs,
                uploaded_at, last_processed_at, last_updated_at, last_reevaluation_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&invoice.id)
        .bind(&invoice.owner_id)
        .bind(&invoice.package_id)
        .bind(&invoice.file_name)
        .bind(&invoice.content_type)
        .bind(&invoice.storage_path)
        .bind(invoice.status.as_str())
        .bind(&invoice.file_url)
        .bind(&invoice.thumbnail_url)
        .bind(invoice.structured.to_string())
        .bind(&invoice.ocr_text)
        .bind(invoice.processing_ms)
        .bind(invoice.is_approved)
        .bind(invoice.approved_at)
        .bind(&invoice.approved_by)
        .bind(invoice.is_manually_edited)
        .bind(serde_json::to_string(&invoice.errors)?)
        .bind(serde_json::to_string(&invoice.internal_logs)?)
        .bind(invoice.uploaded_at)
        .bind(invoice.last_processed_at)
        .bind(invoice.last_updated_at)
        .bind(invoice.last_reevaluation_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn find(&self, owner_id: &str, invoice_id: &str) -> Result<Option<Invoice>> {
        let row = sqlx::query_as::<_, InvoiceRow>(
            "SELECT * FROM invoices WHERE owner_id = ? AND id = ?",
        )
        .bind(owner_id)
        .bind(invoice_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(InvoiceRow::into_invoice).transpose()
    }

    async fn update(
        &self,
        owner_id: &str,
        invoice_id: &str,
        patch: &InvoicePatch,
    ) -> Result<Invoice> {
        let mut qb = build_update(owner_id, invoice_id, patch)?;
        let row = qb
            .build_query_as::<InvoiceRow>()
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        if let Some(row) = row {
            return row.into_invoice();
        }

        // Nothing matched: tell a lost status race from a missing record
        match self.find(owner_id, invoice_id).await? {
            Some(current) if patch.expected_status.is_some() => Err(AppError::Conflict(format!(
                "Invoice {} changed concurrently (now {})",
                current.id, current.status
            ))),
            _ => Err(AppError::NotFound(format!(
                "Invoice not found: {}",
                invoice_id
            ))),
        }
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Invoice>> {
        self.fetch_list(
            "SELECT * FROM invoices WHERE owner_id = ? ORDER BY uploaded_at DESC, id DESC",
            &[owner_id],
        )
        .await
    }

    async fn list_by_package(&self, owner_id: &str, package_id: &str) -> Result<Vec<Invoice>> {
        self.fetch_list(
            r#"
            SELECT * FROM invoices
            WHERE owner_id = ? AND package_id = ?
            ORDER BY uploaded_at DESC, id DESC
            "#,
            &[owner_id, package_id],
        )
        .await
    }
}

/// SQLite row representation
#[derive(Debug, sqlx::FromRow)]
struct InvoiceRow {
    id: String,
    owner_id: String,
    package_id: Option<String>,
    file_name: String,
    content_type: String,
    storage_path: Option<String>,
    status: String,
    file_url: Option<String>,
    thumbnail_url: Option<String>,
    structured: String, // JSON object
    ocr_text: Option<String>,
    processing_ms: Option<i64>,
    is_approved: bool,
    approved_at: Option<i64>,
    approved_by: Option<String>,
    is_manually_edited: bool,
    errors: String,        // JSON array
    internal_logs: String, // JSON array
    uploaded_at: i64,
    last_processed_at: Option<i64>,
    last_updated_at: i64,
    last_reevaluation_at: Option<i64>,
}

impl InvoiceRow {
    fn into_invoice(self) -> Result<Invoice> {
        let status: InvoiceStatus = self.status.parse()?;
        let errors: Vec<InvoiceError> = serde_json::from_str(&self.errors)?;
        let internal_logs: Vec<String> = serde_json::from_str(&self.internal_logs)?;

        Ok(Invoice {
            id: self.id,
            owner_id: self.owner_id,
            package_id: self.package_id,
            file_name: self.file_name,
            content_type: self.content_type,
            storage_path: self.storage_path,
            status,
            file_url: self.file_url,
            thumbnail_url: self.thumbnail_url,
            structured: serde_json::from_str(&self.structured)?,
            ocr_text: self.ocr_text,
            processing_ms: self.processing_ms,
            is_approved: self.is_approved,
            approved_at: self.approved_at,
            approved_by: self.approved_by,
            is_manually_edited: self.is_manually_edited,
            errors,
            internal_logs,
            uploaded_at: self.uploaded_at,
            last_processed_at: self.last_processed_at,
            last_updated_at: self.last_updated_at,
            last_reevaluation_at: self.last_reevaluation_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations, SqlitePackageRepository};
    use fatura_core::domain::{ErrorCode, Package};
    use fatura_core::port::PackageRepository;
    use serde_json::json;

    async fn setup_test_db() -> SqlitePool {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        pool
    }

    fn invoice(id: &str, uploaded_at: i64) -> Invoice {
        Invoice::new(id, "user-1", None, "A.pdf", "application/pdf", uploaded_at)
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let repo = SqliteInvoiceRepository::new(setup_test_db().await);
        let inv = invoice("inv-1", 1_000);
        repo.insert(&inv).await.unwrap();

        let found = repo.find("user-1", "inv-1").await.unwrap().unwrap();
        assert_eq!(found, inv);
        assert_eq!(found.status, InvoiceStatus::Uploading);
        assert_eq!(found.internal_logs.len(), 1);
    }

    #[tokio::test]
    async fn test_other_owner_reads_nothing() {
        let repo = SqliteInvoiceRepository::new(setup_test_db().await);
        repo.insert(&invoice("inv-1", 1_000)).await.unwrap();

        assert!(repo.find("user-2", "inv-1").await.unwrap().is_none());
        assert!(repo.list_by_owner("user-2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_insert_conflicts() {
        let repo = SqliteInvoiceRepository::new(setup_test_db().await);
        repo.insert(&invoice("inv-1", 1_000)).await.unwrap();

        let err = repo.insert(&invoice("inv-1", 2_000)).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_patch_updates_and_appends() {
        let repo = SqliteInvoiceRepository::new(setup_test_db().await);
        repo.insert(&invoice("inv-1", 1_000)).await.unwrap();

        let patch = InvoicePatch {
            storage_path: Some("app_users/user-1/invoices/inv-1/A.pdf".into()),
            structured: Some(json!({"ettn": "E-1"})),
            ocr_text: Some(Some("text".into())),
            ..InvoicePatch::at(2_000)
        }
        .status(InvoiceStatus::Failed)
        .error(InvoiceError::new(ErrorCode::ParserFailed, "boom", 2_000))
        .log("one")
        .log("two");

        let updated = repo.update("user-1", "inv-1", &patch).await.unwrap();
        assert_eq!(updated.status, InvoiceStatus::Failed);
        assert_eq!(updated.structured["ettn"], "E-1");
        assert_eq!(updated.ocr_text.as_deref(), Some("text"));
        assert_eq!(updated.last_updated_at, 2_000);
        assert_eq!(updated.errors.len(), 1);
        assert_eq!(updated.errors[0].code, ErrorCode::ParserFailed);
        assert_eq!(&updated.internal_logs[1..], ["one", "two"]);

        // Matches the in-memory application of the same patch
        let mut expected = invoice("inv-1", 1_000);
        patch.apply(&mut expected);
        assert_eq!(updated, expected);
    }

    #[tokio::test]
    async fn test_patch_clears_nullable_columns() {
        let repo = SqliteInvoiceRepository::new(setup_test_db().await);
        repo.insert(&invoice("inv-1", 1_000)).await.unwrap();

        let approve = InvoicePatch {
            is_approved: Some(true),
            approved_at: Some(Some(1_500)),
            approved_by: Some(Some("user-1".into())),
            ..InvoicePatch::at(1_500)
        };
        let approved = repo.update("user-1", "inv-1", &approve).await.unwrap();
        assert!(approved.is_approved);
        assert_eq!(approved.approved_by.as_deref(), Some("user-1"));

        let clear = InvoicePatch {
            is_approved: Some(false),
            approved_at: Some(None),
            approved_by: Some(None),
            ..InvoicePatch::at(1_600)
        };
        let cleared = repo.update("user-1", "inv-1", &clear).await.unwrap();
        assert!(!cleared.is_approved);
        assert_eq!(cleared.approved_at, None);
        assert_eq!(cleared.approved_by, None);
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let repo = SqliteInvoiceRepository::new(setup_test_db().await);
        let err = repo
            .update("user-1", "missing", &InvoicePatch::at(1))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_guarded_update_conflicts_after_status_moved() {
        let repo = SqliteInvoiceRepository::new(setup_test_db().await);
        repo.insert(&invoice("inv-1", 1_000)).await.unwrap();

        let to_queued = InvoicePatch::at(2_000)
            .expecting(InvoiceStatus::Uploading)
            .status(InvoiceStatus::Queued)
            .log("fileUploaded");
        let queued = repo.update("user-1", "inv-1", &to_queued).await.unwrap();
        assert_eq!(queued.status, InvoiceStatus::Queued);

        // Same guard again: the record is no longer uploading
        let err = repo.update("user-1", "inv-1", &to_queued).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let current = repo.find("user-1", "inv-1").await.unwrap().unwrap();
        assert_eq!(current.internal_logs.len(), 2);

        let err = repo
            .update("user-1", "missing", &to_queued)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_lists_are_newest_first() {
        let pool = setup_test_db().await;
        let packages = SqlitePackageRepository::new(pool.clone());
        packages
            .insert(&Package::new("pkg-1", "user-1", "Paket", 2, 500))
            .await
            .unwrap();

        let repo = SqliteInvoiceRepository::new(pool);
        repo.insert(&invoice("old", 1_000)).await.unwrap();
        for (id, at) in [("p-old", 2_000), ("p-new", 3_000)] {
            let mut inv = invoice(id, at);
            inv.package_id = Some("pkg-1".into());
            repo.insert(&inv).await.unwrap();
        }

        let all: Vec<String> = repo
            .list_by_owner("user-1")
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(all, ["p-new", "p-old", "old"]);

        let in_package = repo.list_by_package("user-1", "pkg-1").await.unwrap();
        assert_eq!(in_package.len(), 2);
        assert_eq!(in_package[0].id, "p-new");
    }
}
