// Background job handlers driven by the queue

use super::{ProcessingOrchestrator, UploadedFile};
use crate::application::queue::{Job, JobHandler, JobPayload};
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const JOB_PROCESS_INVOICE: &str = "process-invoice";
pub const JOB_PROCESS_PACKAGE_INVOICE: &str = "process-invoice-in-package";
pub const JOB_REEVALUATE_INVOICE: &str = "reevaluate-invoice";

/// Job payload: which record a job works on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceTarget {
    #[serde(rename = "userId")]
    pub owner_id: String,
    pub invoice_id: String,
    pub package_id: Option<String>,
}

impl InvoiceTarget {
    pub fn package_id(&self) -> Option<&str> {
        self.package_id.as_deref()
    }

    fn decode(payload: &JobPayload) -> Result<Self> {
        Ok(serde_json::from_value(payload.clone())?)
    }

    fn encode(&self) -> JobPayload {
        serde_json::json!({
            "userId": self.owner_id,
            "invoiceId": self.invoice_id,
            "packageId": self.package_id,
        })
    }
}

/// Upload + parse pipeline; the file travels with the handler, not the payload
struct ProcessInvoiceJob {
    orchestrator: Arc<ProcessingOrchestrator>,
    file: UploadedFile,
}

#[async_trait]
impl JobHandler for ProcessInvoiceJob {
    async fn run(&self, payload: &JobPayload) -> Result<()> {
        let target = InvoiceTarget::decode(payload)?;
        self.orchestrator
            .run_pipeline_guarded(&target, &self.file)
            .await
            .map(|_| ())
    }
}

/// Re-parse a stored file
struct ReevaluateInvoiceJob {
    orchestrator: Arc<ProcessingOrchestrator>,
}

#[async_trait]
impl JobHandler for ReevaluateInvoiceJob {
    async fn run(&self, payload: &JobPayload) -> Result<()> {
        let target = InvoiceTarget::decode(payload)?;
        self.orchestrator
            .run_reevaluation_guarded(&target)
            .await
            .map(|_| ())
    }
}

pub(super) fn process_invoice_job(
    orchestrator: &Arc<ProcessingOrchestrator>,
    target: &InvoiceTarget,
    file: UploadedFile,
) -> Job {
    let name = if target.package_id.is_some() {
        JOB_PROCESS_PACKAGE_INVOICE
    } else {
        JOB_PROCESS_INVOICE
    };
    Job::new(
        name,
        target.encode(),
        Arc::new(ProcessInvoiceJob {
            orchestrator: Arc::clone(orchestrator),
            file,
        }),
    )
}

pub(super) fn reevaluate_invoice_job(
    orchestrator: &Arc<ProcessingOrchestrator>,
    target: &InvoiceTarget,
) -> Job {
    Job::new(
        JOB_REEVALUATE_INVOICE,
        target.encode(),
        Arc::new(ReevaluateInvoiceJob {
            orchestrator: Arc::clone(orchestrator),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_wire_shape() {
        let target = InvoiceTarget {
            owner_id: "user-1".into(),
            invoice_id: "inv-1".into(),
            package_id: Some("pkg-1".into()),
        };
        let payload = target.encode();
        assert_eq!(payload["userId"], "user-1");
        assert_eq!(payload["invoiceId"], "inv-1");
        assert_eq!(payload["packageId"], "pkg-1");
        assert_eq!(InvoiceTarget::decode(&payload).unwrap(), target);
    }

    #[test]
    fn test_malformed_payload_is_an_error() {
        assert!(InvoiceTarget::decode(&serde_json::json!({"invoiceId": 3})).is_err());
    }
}
