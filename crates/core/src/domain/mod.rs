// Domain Layer - Pure business logic and entities

pub mod error;
pub mod event;
pub mod invoice;
pub mod package;
pub mod structured;
pub mod timestamp;

// Re-exports
pub use error::DomainError;
pub use event::{ClientMessage, ServerMessage};
pub use invoice::{
    ErrorCode, Invoice, InvoiceError, InvoiceId, InvoicePatch, InvoiceStats, InvoiceStatus,
    OwnerId, Progress,
};
pub use package::{CounterDelta, Package, PackageId, PackageStatus};
