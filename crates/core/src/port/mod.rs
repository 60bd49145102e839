// Port Layer - Interfaces for external dependencies

pub mod credential_verifier;
pub mod id_provider; // For deterministic testing
pub mod invoice_repository;
pub mod notifier;
pub mod object_store;
pub mod package_repository;
pub mod parse_service;
pub mod time_provider;

// Re-exports
pub use credential_verifier::{AuthError, Claims, CredentialVerifier};
pub use id_provider::IdProvider;
pub use invoice_repository::InvoiceRepository;
pub use notifier::StatusNotifier;
pub use object_store::{ObjectMetadata, ObjectStore, StorageError, ThumbnailRenderer};
pub use package_repository::PackageRepository;
pub use parse_service::{ParseError, ParseService, ParsedDocument};
pub use time_provider::TimeProvider;
