// Package Repository Port

use crate::domain::{CounterDelta, Package, PackageStatus};
use crate::error::Result;
use async_trait::async_trait;

/// Package Repository trait
///
/// Counters are only ever changed through `increment_counters`, which must apply
/// the whole delta atomically.
#[async_trait]
pub trait PackageRepository: Send + Sync {
    async fn insert(&self, package: &Package) -> Result<()>;

    async fn find(&self, owner_id: &str, package_id: &str) -> Result<Option<Package>>;

    /// All packages of an owner, newest first
    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Package>>;

    /// Atomically add `delta` to the counters and return the updated package
    ///
    /// # Errors
    /// - AppError::NotFound if the package does not exist
    async fn increment_counters(
        &self,
        owner_id: &str,
        package_id: &str,
        delta: CounterDelta,
        now_millis: i64,
    ) -> Result<Package>;

    /// Persist a status derived from `observed`
    ///
    /// Writes only while the stored status, `processed_invoices` and
    /// `error_count` still equal the observed ones. Returns whether it wrote.
    ///
    /// # Errors
    /// - AppError::NotFound if the package does not exist
    async fn set_status_if_unchanged(
        &self,
        observed: &Package,
        status: PackageStatus,
        now_millis: i64,
    ) -> Result<bool>;

    /// Set `reevaluating` and stamp `last_reevaluation_at`
    async fn mark_reevaluating(&self, owner_id: &str, package_id: &str, now_millis: i64)
        -> Result<()>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::sync::Mutex;

    /// In-memory package repository
    #[derive(Default)]
    pub struct InMemoryPackageRepository {
        records: Mutex<Vec<Package>>,
    }

    impl InMemoryPackageRepository {
        pub fn new() -> Self {
            Self::default()
        }

        fn with_package<T>(
            &self,
            owner_id: &str,
            package_id: &str,
            f: impl FnOnce(&mut Package) -> T,
        ) -> Result<T> {
            let mut records = self.records.lock().unwrap();
            let package = records
                .iter_mut()
                .find(|p| p.id == package_id && p.owner_id == owner_id)
                .ok_or_else(|| AppError::NotFound(format!("Package not found: {}", package_id)))?;
            Ok(f(package))
        }
    }

    #[async_trait]
    impl PackageRepository for InMemoryPackageRepository {
        async fn insert(&self, package: &Package) -> Result<()> {
            self.records.lock().unwrap().push(package.clone());
            Ok(())
        }

        async fn find(&self, owner_id: &str, package_id: &str) -> Result<Option<Package>> {
            Ok(self
                .records
                .lock()
                .unwrap()
                .iter()
                .find(|p| p.id == package_id && p.owner_id == owner_id)
                .cloned())
        }

        async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Package>> {
            let mut packages: Vec<Package> = self
                .records
                .lock()
                .unwrap()
                .iter()
                .filter(|p| p.owner_id == owner_id)
                .cloned()
                .collect();
            packages.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(packages)
        }

        async fn increment_counters(
            &self,
            owner_id: &str,
            package_id: &str,
            delta: CounterDelta,
            now_millis: i64,
        ) -> Result<Package> {
            self.with_package(owner_id, package_id, |p| {
                p.processed_invoices += delta.processed;
                p.error_count += delta.errors;
                p.approved_invoices += delta.approved;
                p.last_updated_at = now_millis;
                p.clone()
            })
        }

        async fn set_status_if_unchanged(
            &self,
            observed: &Package,
            status: PackageStatus,
            now_millis: i64,
        ) -> Result<bool> {
            self.with_package(&observed.owner_id, &observed.id, |p| {
                let unchanged = p.status == observed.status
                    && p.processed_invoices == observed.processed_invoices
                    && p.error_count == observed.error_count;
                if unchanged {
                    p.status = status;
                    p.last_updated_at = now_millis;
                }
                unchanged
            })
        }

        async fn mark_reevaluating(
            &self,
            owner_id: &str,
            package_id: &str,
            now_millis: i64,
        ) -> Result<()> {
            self.with_package(owner_id, package_id, |p| {
                p.status = PackageStatus::Reevaluating;
                p.last_reevaluation_at = Some(now_millis);
                p.last_updated_at = now_millis;
            })
        }
    }
}
