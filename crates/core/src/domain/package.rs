// Package Domain Model

use super::error::{DomainError, Result};
use super::invoice::{InvoiceStatus, OwnerId, Progress};
use serde::{Deserialize, Serialize};

/// Package ID (UUID v4)
pub type PackageId = String;

/// Package status, derived from counters (except `Reevaluating`, set explicitly)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageStatus {
    Uploading,
    Processing,
    Reevaluating,
    Completed,
    Failed,
    Partial,
}

impl PackageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PackageStatus::Uploading => "uploading",
            PackageStatus::Processing => "processing",
            PackageStatus::Reevaluating => "reevaluating",
            PackageStatus::Completed => "completed",
            PackageStatus::Failed => "failed",
            PackageStatus::Partial => "partial",
        }
    }

    /// Derive the status from counters
    ///
    /// ```text
    /// processed + errors >= total:  errors == 0    -> completed
    ///                               processed == 0 -> failed
    ///                               otherwise      -> partial
    /// some progress                                -> processing
    /// nothing yet                                  -> uploading
    /// ```
    pub fn derive(total: i64, processed: i64, errors: i64) -> Self {
        if processed + errors >= total {
            if errors == 0 {
                PackageStatus::Completed
            } else if processed == 0 {
                PackageStatus::Failed
            } else {
                PackageStatus::Partial
            }
        } else if processed > 0 || errors > 0 {
            PackageStatus::Processing
        } else {
            PackageStatus::Uploading
        }
    }
}

impl std::fmt::Display for PackageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PackageStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "uploading" => Ok(PackageStatus::Uploading),
            "processing" => Ok(PackageStatus::Processing),
            "reevaluating" => Ok(PackageStatus::Reevaluating),
            "completed" => Ok(PackageStatus::Completed),
            "failed" => Ok(PackageStatus::Failed),
            "partial" => Ok(PackageStatus::Partial),
            other => Err(DomainError::UnknownStatus(other.to_string())),
        }
    }
}

/// Package of invoices uploaded together
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Package {
    pub id: PackageId,
    #[serde(rename = "userId")]
    pub owner_id: OwnerId,
    pub name: String,
    pub status: PackageStatus,

    pub total_invoices: i64,
    pub processed_invoices: i64,
    pub error_count: i64,
    pub approved_invoices: i64,

    pub created_at: i64, // epoch ms
    pub last_updated_at: i64,
    pub last_reevaluation_at: Option<i64>,
}

impl Package {
    pub fn new(
        id: impl Into<String>,
        owner_id: impl Into<String>,
        name: impl Into<String>,
        total_invoices: i64,
        now_millis: i64,
    ) -> Self {
        Self {
            id: id.into(),
            owner_id: owner_id.into(),
            name: name.into(),
            status: PackageStatus::Uploading,
            total_invoices,
            processed_invoices: 0,
            error_count: 0,
            approved_invoices: 0,
            created_at: now_millis,
            last_updated_at: now_millis,
            last_reevaluation_at: None,
        }
    }

    pub fn derived_status(&self) -> PackageStatus {
        PackageStatus::derive(
            self.total_invoices,
            self.processed_invoices,
            self.error_count,
        )
    }

    /// Status to persist after a counter change
    ///
    /// `reevaluating` holds until the counters settle again.
    pub fn next_status(&self) -> PackageStatus {
        match (self.status, self.derived_status()) {
            (PackageStatus::Reevaluating, PackageStatus::Uploading | PackageStatus::Processing) => {
                PackageStatus::Reevaluating
            }
            (_, derived) => derived,
        }
    }
}

/// Counter increments applied atomically to a package
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterDelta {
    pub processed: i64,
    pub errors: i64,
    pub approved: i64,
}

impl CounterDelta {
    /// Delta caused by one invoice moving from `from` to `to`
    pub fn between(from: InvoiceStatus, to: InvoiceStatus) -> Self {
        fn weights(status: InvoiceStatus) -> (i64, i64, i64) {
            let (processed, errors) = match status.progress() {
                Progress::Settled => (1, 0),
                Progress::Errored => (0, 1),
                Progress::Pending => (0, 0),
            };
            let approved = i64::from(status == InvoiceStatus::Approved);
            (processed, errors, approved)
        }

        let (p0, e0, a0) = weights(from);
        let (p1, e1, a1) = weights(to);
        Self {
            processed: p1 - p0,
            errors: e1 - e0,
            approved: a1 - a0,
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_status() {
        assert_eq!(PackageStatus::derive(3, 0, 0), PackageStatus::Uploading);
        assert_eq!(PackageStatus::derive(3, 1, 0), PackageStatus::Processing);
        assert_eq!(PackageStatus::derive(3, 0, 1), PackageStatus::Processing);
        assert_eq!(PackageStatus::derive(3, 3, 0), PackageStatus::Completed);
        assert_eq!(PackageStatus::derive(3, 2, 1), PackageStatus::Partial);
        assert_eq!(PackageStatus::derive(3, 0, 3), PackageStatus::Failed);
    }

    #[test]
    fn test_reevaluating_holds_until_settled() {
        let mut pkg = Package::new("pkg-1", "user-1", "Paket", 2, 0);
        pkg.status = PackageStatus::Reevaluating;
        pkg.processed_invoices = 1;
        assert_eq!(pkg.next_status(), PackageStatus::Reevaluating);

        pkg.processed_invoices = 2;
        assert_eq!(pkg.next_status(), PackageStatus::Completed);

        pkg.status = PackageStatus::Uploading;
        pkg.processed_invoices = 1;
        assert_eq!(pkg.next_status(), PackageStatus::Processing);
    }

    #[test]
    fn test_delta_for_pipeline_outcomes() {
        use InvoiceStatus::*;
        assert!(CounterDelta::between(Uploading, Queued).is_zero());
        assert!(CounterDelta::between(Queued, Processing).is_zero());
        assert_eq!(
            CounterDelta::between(Processing, Processed),
            CounterDelta {
                processed: 1,
                errors: 0,
                approved: 0
            }
        );
        assert_eq!(CounterDelta::between(Processing, Uploaded).processed, 1);
        assert_eq!(CounterDelta::between(Uploading, Failed).errors, 1);
    }

    #[test]
    fn test_delta_for_review_actions() {
        use InvoiceStatus::*;
        let approve = CounterDelta::between(Processed, Approved);
        assert_eq!(approve.approved, 1);
        assert_eq!(approve.processed, 0);

        let reject = CounterDelta::between(Approved, Rejected);
        assert_eq!(reject.approved, -1);

        let reapprove = CounterDelta::between(Rejected, Approved);
        assert_eq!(approve.approved + reject.approved + reapprove.approved, 1);
    }

    #[test]
    fn test_delta_for_reevaluation() {
        use InvoiceStatus::*;
        let start = CounterDelta::between(Approved, Reevaluating);
        assert_eq!(start.processed, -1);
        assert_eq!(start.approved, -1);

        let fail = CounterDelta::between(Reevaluating, Failed);
        assert_eq!(fail.errors, 1);

        let retry = CounterDelta::between(Failed, Reevaluating);
        assert_eq!(retry.errors, -1);
    }

    #[test]
    fn test_status_wire_format() {
        assert_eq!(
            serde_json::to_value(PackageStatus::Partial).unwrap(),
            "partial"
        );
        assert_eq!(
            "completed".parse::<PackageStatus>().unwrap(),
            PackageStatus::Completed
        );
    }
}
