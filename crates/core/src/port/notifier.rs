// Status Notifier Port
// Outbound status-change events; delivery is best-effort

use crate::domain::{InvoiceStatus, PackageStatus};

pub trait StatusNotifier: Send + Sync {
    fn invoice_status(
        &self,
        owner_id: &str,
        invoice_id: &str,
        status: InvoiceStatus,
        package_id: Option<&str>,
    );

    fn package_status(&self, owner_id: &str, package_id: &str, status: PackageStatus);
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::Mutex;

    /// One recorded notification
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Notification {
        Invoice {
            owner_id: String,
            invoice_id: String,
            status: InvoiceStatus,
            package_id: Option<String>,
        },
        Package {
            owner_id: String,
            package_id: String,
            status: PackageStatus,
        },
    }

    /// Notifier that records every event in call order
    #[derive(Default)]
    pub struct RecordingNotifier {
        events: Mutex<Vec<Notification>>,
    }

    impl RecordingNotifier {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn events(&self) -> Vec<Notification> {
            self.events.lock().unwrap().clone()
        }

        pub fn clear(&self) {
            self.events.lock().unwrap().clear();
        }

        /// Invoice statuses emitted for one invoice, in order
        pub fn invoice_statuses(&self, invoice_id: &str) -> Vec<InvoiceStatus> {
            self.events()
                .into_iter()
                .filter_map(|e| match e {
                    Notification::Invoice {
                        invoice_id: id,
                        status,
                        ..
                    } if id == invoice_id => Some(status),
                    _ => None,
                })
                .collect()
        }

        /// Package statuses emitted for one package, in order
        pub fn package_statuses(&self, package_id: &str) -> Vec<PackageStatus> {
            self.events()
                .into_iter()
                .filter_map(|e| match e {
                    Notification::Package {
                        package_id: id,
                        status,
                        ..
                    } if id == package_id => Some(status),
                    _ => None,
                })
                .collect()
        }
    }

    impl StatusNotifier for RecordingNotifier {
        fn invoice_status(
            &self,
            owner_id: &str,
            invoice_id: &str,
            status: InvoiceStatus,
            package_id: Option<&str>,
        ) {
            self.events.lock().unwrap().push(Notification::Invoice {
                owner_id: owner_id.to_string(),
                invoice_id: invoice_id.to_string(),
                status,
                package_id: package_id.map(str::to_string),
            });
        }

        fn package_status(&self, owner_id: &str, package_id: &str, status: PackageStatus) {
            self.events.lock().unwrap().push(Notification::Package {
                owner_id: owner_id.to_string(),
                package_id: package_id.to_string(),
                status,
            });
        }
    }
}
