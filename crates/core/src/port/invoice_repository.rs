// Invoice Repository Port
// Persistence abstraction for invoice records

use crate::domain::{Invoice, InvoicePatch};
use crate::error::Result;
use async_trait::async_trait;

/// Invoice Repository trait
///
/// Every lookup is scoped by owner: a record belonging to another owner reads as
/// missing.
#[async_trait]
pub trait InvoiceRepository: Send + Sync {
    /// Insert a new record
    async fn insert(&self, invoice: &Invoice) -> Result<()>;

    /// Point read, `None` if the owner has no such record
    async fn find(&self, owner_id: &str, invoice_id: &str) -> Result<Option<Invoice>>;

    /// Apply a partial update and return the updated record
    ///
    /// The status guard (`InvoicePatch::expected_status`) and the write happen
    /// in one step.
    ///
    /// # Errors
    /// - AppError::NotFound if the record does not exist
    /// - AppError::Conflict if the record is no longer in the expected status
    async fn update(&self, owner_id: &str, invoice_id: &str, patch: &InvoicePatch)
        -> Result<Invoice>;

    /// All records of an owner, newest first
    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Invoice>>;

    /// Records of one package, newest first
    async fn list_by_package(&self, owner_id: &str, package_id: &str) -> Result<Vec<Invoice>>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// In-memory invoice repository with failure injection
    #[derive(Default)]
    pub struct InMemoryInvoiceRepository {
        records: Mutex<Vec<Invoice>>,
        failing_updates: AtomicUsize,
    }

    impl InMemoryInvoiceRepository {
        pub fn new() -> Self {
            Self::default()
        }

        /// Make the next `n` updates fail with a database error
        pub fn fail_next_updates(&self, n: usize) {
            self.failing_updates.store(n, Ordering::SeqCst);
        }

        pub fn len(&self) -> usize {
            self.records.lock().unwrap().len()
        }

        pub fn is_empty(&self) -> bool {
            self.len() == 0
        }

        fn take_failure(&self) -> bool {
            self.failing_updates
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        }
    }

    fn status_changed(record: &Invoice) -> AppError {
        AppError::Conflict(format!(
            "Invoice {} changed concurrently (now {})",
            record.id, record.status
        ))
    }

    fn newest_first(mut invoices: Vec<Invoice>) -> Vec<Invoice> {
        invoices.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        invoices
    }

    #[async_trait]
    impl InvoiceRepository for InMemoryInvoiceRepository {
        async fn insert(&self, invoice: &Invoice) -> Result<()> {
            let mut records = self.records.lock().unwrap();
            if records.iter().any(|r| r.id == invoice.id) {
                return Err(AppError::Database(format!(
                    "Duplicate invoice id: {}",
                    invoice.id
                )));
            }
            records.push(invoice.clone());
            Ok(())
        }

        async fn find(&self, owner_id: &str, invoice_id: &str) -> Result<Option<Invoice>> {
            Ok(self
                .records
                .lock()
                .unwrap()
                .iter()
                .find(|r| r.id == invoice_id && r.owner_id == owner_id)
                .cloned())
        }

        async fn update(
            &self,
            owner_id: &str,
            invoice_id: &str,
            patch: &InvoicePatch,
        ) -> Result<Invoice> {
            if self.take_failure() {
                return Err(AppError::Database("injected update failure".to_string()));
            }
            let mut records = self.records.lock().unwrap();
            let record = records
                .iter_mut()
                .find(|r| r.id == invoice_id && r.owner_id == owner_id)
                .ok_or_else(|| AppError::NotFound(format!("Invoice not found: {}", invoice_id)))?;
            if !patch.matches(record) {
                return Err(status_changed(record));
            }
            patch.apply(record);
            Ok(record.clone())
        }

        async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Invoice>> {
            let records = self.records.lock().unwrap();
            Ok(newest_first(
                records
                    .iter()
                    .filter(|r| r.owner_id == owner_id)
                    .cloned()
                    .collect(),
            ))
        }

        async fn list_by_package(&self, owner_id: &str, package_id: &str) -> Result<Vec<Invoice>> {
            let records = self.records.lock().unwrap();
            Ok(newest_first(
                records
                    .iter()
                    .filter(|r| {
                        r.owner_id == owner_id && r.package_id.as_deref() == Some(package_id)
                    })
                    .cloned()
                    .collect(),
            ))
        }
    }
}
