// Fatura Infrastructure - SQLite Adapter
// Implements: InvoiceRepository, PackageRepository

mod connection;
mod error;
mod invoice_repository;
mod migration;
mod package_repository;

pub use connection::create_pool;
pub use invoice_repository::SqliteInvoiceRepository;
pub use migration::run_migrations;
pub use package_repository::SqlitePackageRepository;

// sqlx::Error cannot implement Into<AppError> here (orphan rule); see error::map_sqlx_error
