// SQLite PackageRepository Implementation

use crate::error::map_sqlx_error;
use async_trait::async_trait;
use fatura_core::domain::{CounterDelta, Package, PackageStatus};
use fatura_core::error::{AppError, Result};
use fatura_core::port::PackageRepository;
use sqlx::SqlitePool;

pub struct SqlitePackageRepository {
    pool: SqlitePool,
}

impl SqlitePackageRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// A single-row UPDATE that matched nothing means the package is missing
fn expect_updated(package_id: &str, rows_affected: u64) -> Result<()> {
    if rows_affected == 0 {
        return Err(AppError::NotFound(format!(
            "Package not found: {}",
            package_id
        )));
    }
    Ok(())
}

#[async_trait]
impl PackageRepository for SqlitePackageRepository {
    async fn insert(&self, package: &Package) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO packages (
                id, owner_id, name, status,
                total_invoices, processed_invoices, error_count, approved_invoices,
                created_at, last_updated_at, last_reevaluation_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&package.id)
        .bind(&package.owner_id)
        .bind(&package.name)
        .bind(package.status.as_str())
        .bind(package.total_invoices)
        .bind(package.processed_invoices)
        .bind(package.error_count)
        .bind(package.approved_invoices)
        .bind(package.created_at)
        .bind(package.last_updated_at)
        .bind(package.last_reevaluation_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn find(&self, owner_id: &str, package_id: &str) -> Result<Option<Package>> {
        let row = sqlx::query_as::<_, PackageRow>(
            "SELECT * FROM packages WHERE owner_id = ? AND id = ?",
        )
        .bind(owner_id)
        .bind(package_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(PackageRow::into_package).transpose()
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Package>> {
        let rows: Vec<PackageRow> = sqlx::query_as(
            r#"
            SELECT * FROM packages
            WHERE owner_id = ?
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(PackageRow::into_package).collect()
    }

    async fn increment_counters(
        &self,
        owner_id: &str,
        package_id: &str,
        delta: CounterDelta,
        now_millis: i64,
    ) -> Result<Package> {
        // Atomic increment without reading
        let row = sqlx::query_as::<_, PackageRow>(
            r#"
            UPDATE packages
            SET processed_invoices = processed_invoices + ?,
                error_count = error_count + ?,
                approved_invoices = approved_invoices + ?,
                last_updated_at = ?
            WHERE owner_id = ? AND id = ?
            RETURNING *
            "#,
        )
        .bind(delta.processed)
        .bind(delta.errors)
        .bind(delta.approved)
        .bind(now_millis)
        .bind(owner_id)
        .bind(package_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        match row {
            Some(row) => row.into_package(),
            None => Err(AppError::NotFound(format!(
                "Package not found: {}",
                package_id
            ))),
        }
    }

    async fn set_status_if_unchanged(
        &self,
        observed: &Package,
        status: PackageStatus,
        now_millis: i64,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE packages
            SET status = ?, last_updated_at = ?
            WHERE owner_id = ? AND id = ?
              AND status = ? AND processed_invoices = ? AND error_count = ?
            "#,
        )
        .bind(status.as_str())
        .bind(now_millis)
        .bind(&observed.owner_id)
        .bind(&observed.id)
        .bind(observed.status.as_str())
        .bind(observed.processed_invoices)
        .bind(observed.error_count)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }
        match self.find(&observed.owner_id, &observed.id).await? {
            Some(_) => Ok(false),
            None => Err(AppError::NotFound(format!(
                "Package not found: {}",
                observed.id
            ))),
        }
    }

    async fn mark_reevaluating(
        &self,
        owner_id: &str,
        package_id: &str,
        now_millis: i64,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE packages
            SET status = ?, last_reevaluation_at = ?, last_updated_at = ?
            WHERE owner_id = ? AND id = ?
            "#,
        )
        .bind(PackageStatus::Reevaluating.as_str())
        .bind(now_millis)
        .bind(now_millis)
        .bind(owner_id)
        .bind(package_id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        expect_updated(package_id, result.rows_affected())
    }
}

/// SQLite row representation
#[derive(Debug, sqlx::FromRow)]
struct PackageRow {
    id: String,
    owner_id: String,
    name: String,
    status: String,
    total_invoices: i64,
    processed_invoices: i64,
    error_count: i64,
    approved_invoices: i64,
    created_at: i64,
    last_updated_at: i64,
    last_reevaluation_at: Option<i64>,
}

impl PackageRow {
    fn into_package(self) -> Result<Package> {
        Ok(Package {
            id: self.id,
            owner_id: self.owner_id,
            name: self.name,
            status: self.status.parse()?,
            total_invoices: self.total_invoices,
            processed_invoices: self.processed_invoices,
            error_count: self.error_count,
            approved_invoices: self.approved_invoices,
            created_at: self.created_at,
            last_updated_at: self.last_updated_at,
            last_reevaluation_at: self.last_reevaluation_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations};
    use std::sync::Arc;

    async fn setup_repo() -> SqlitePackageRepository {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        SqlitePackageRepository::new(pool)
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let repo = setup_repo().await;
        let pkg = Package::new("pkg-1", "user-1", "Paket", 3, 1_000);
        repo.insert(&pkg).await.unwrap();

        assert_eq!(repo.find("user-1", "pkg-1").await.unwrap(), Some(pkg));
        assert_eq!(repo.find("user-2", "pkg-1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_increment_returns_updated_counters() {
        let repo = setup_repo().await;
        repo.insert(&Package::new("pkg-1", "user-1", "Paket", 3, 1_000))
            .await
            .unwrap();

        let delta = CounterDelta {
            processed: 1,
            errors: 0,
            approved: 1,
        };
        let pkg = repo
            .increment_counters("user-1", "pkg-1", delta, 2_000)
            .await
            .unwrap();
        assert_eq!(pkg.processed_invoices, 1);
        assert_eq!(pkg.approved_invoices, 1);
        assert_eq!(pkg.last_updated_at, 2_000);

        let back = CounterDelta {
            processed: -1,
            errors: 1,
            approved: -1,
        };
        let pkg = repo
            .increment_counters("user-1", "pkg-1", back, 3_000)
            .await
            .unwrap();
        assert_eq!(pkg.processed_invoices, 0);
        assert_eq!(pkg.error_count, 1);
        assert_eq!(pkg.approved_invoices, 0);
    }

    #[tokio::test]
    async fn test_concurrent_increments_are_not_lost() {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        let repo = Arc::new(SqlitePackageRepository::new(pool));
        repo.insert(&Package::new("pkg-1", "user-1", "Paket", 50, 0))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for i in 0..50 {
            let repo = Arc::clone(&repo);
            handles.push(tokio::spawn(async move {
                let delta = CounterDelta {
                    processed: 1,
                    ..Default::default()
                };
                repo.increment_counters("user-1", "pkg-1", delta, i)
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let pkg = repo.find("user-1", "pkg-1").await.unwrap().unwrap();
        assert_eq!(pkg.processed_invoices, 50);
    }

    #[tokio::test]
    async fn test_status_updates() {
        let repo = setup_repo().await;
        let pkg = Package::new("pkg-1", "user-1", "Paket", 1, 1_000);
        repo.insert(&pkg).await.unwrap();

        assert!(repo
            .set_status_if_unchanged(&pkg, PackageStatus::Completed, 2_000)
            .await
            .unwrap());
        repo.mark_reevaluating("user-1", "pkg-1", 3_000).await.unwrap();

        let stored = repo.find("user-1", "pkg-1").await.unwrap().unwrap();
        assert_eq!(stored.status, PackageStatus::Reevaluating);
        assert_eq!(stored.last_reevaluation_at, Some(3_000));

        let missing = Package::new("missing", "user-1", "Paket", 1, 1_000);
        let err = repo
            .set_status_if_unchanged(&missing, PackageStatus::Failed, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_stale_status_write_is_skipped() {
        let repo = setup_repo().await;
        repo.insert(&Package::new("pkg-1", "user-1", "Paket", 3, 1_000))
            .await
            .unwrap();
        let settle = CounterDelta {
            processed: 1,
            ..Default::default()
        };

        // An earlier writer saw 2/3, a later one saw 3/3
        repo.increment_counters("user-1", "pkg-1", settle, 1_100)
            .await
            .unwrap();
        let stale = repo
            .increment_counters("user-1", "pkg-1", settle, 1_200)
            .await
            .unwrap();
        let latest = repo
            .increment_counters("user-1", "pkg-1", settle, 1_300)
            .await
            .unwrap();
        assert_eq!(latest.next_status(), PackageStatus::Completed);

        assert!(repo
            .set_status_if_unchanged(&latest, PackageStatus::Completed, 1_400)
            .await
            .unwrap());
        assert!(!repo
            .set_status_if_unchanged(&stale, PackageStatus::Processing, 1_500)
            .await
            .unwrap());

        let stored = repo.find("user-1", "pkg-1").await.unwrap().unwrap();
        assert_eq!(stored.status, PackageStatus::Completed);
        assert_eq!(stored.last_updated_at, 1_400);
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let repo = setup_repo().await;
        for (id, at) in [("a", 1_000), ("b", 3_000), ("c", 2_000)] {
            repo.insert(&Package::new(id, "user-1", id, 1, at))
                .await
                .unwrap();
        }
        let ids: Vec<String> = repo
            .list_by_owner("user-1")
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(ids, ["b", "c", "a"]);
    }
}
