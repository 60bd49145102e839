// Shared fixture for orchestrator tests

use super::{OrchestratorConfig, OrchestratorDeps, ProcessingOrchestrator, UploadedFile};
use crate::application::queue::{JobQueue, QueueConfig};
use crate::port::id_provider::mocks::SequentialIdProvider;
use crate::port::invoice_repository::mocks::InMemoryInvoiceRepository;
use crate::port::notifier::mocks::RecordingNotifier;
use crate::port::object_store::mocks::{InMemoryObjectStore, StaticThumbnailRenderer};
use crate::port::package_repository::mocks::InMemoryPackageRepository;
use crate::port::parse_service::mocks::MockParseService;
use crate::port::time_provider::mocks::SteppingClock;
use crate::port::{ParseService, ThumbnailRenderer};
use std::sync::Arc;
use std::time::Duration;

pub const OWNER: &str = "user-1";

pub struct Fixture {
    pub orchestrator: Arc<ProcessingOrchestrator>,
    pub invoices: Arc<InMemoryInvoiceRepository>,
    pub packages: Arc<InMemoryPackageRepository>,
    pub store: Arc<InMemoryObjectStore>,
    pub parser: Arc<MockParseService>,
    pub notifier: Arc<RecordingNotifier>,
    pub queue: JobQueue,
}

impl Fixture {
    pub fn new() -> Self {
        Self::build(InMemoryObjectStore::new(), MockParseService::new_success(), true)
    }

    pub fn with_parser(parser: MockParseService) -> Self {
        Self::build(InMemoryObjectStore::new(), parser, true)
    }

    pub fn with_store(store: InMemoryObjectStore) -> Self {
        Self::build(store, MockParseService::new_success(), true)
    }

    pub fn without_thumbnails() -> Self {
        Self::build(InMemoryObjectStore::new(), MockParseService::new_success(), false)
    }

    fn build(store: InMemoryObjectStore, parser: MockParseService, thumbnails: bool) -> Self {
        let invoices = Arc::new(InMemoryInvoiceRepository::new());
        let packages = Arc::new(InMemoryPackageRepository::new());
        let store = Arc::new(store);
        let parser = Arc::new(parser);
        let notifier = Arc::new(RecordingNotifier::new());
        let queue = JobQueue::new(QueueConfig {
            max_retries: 1,
            backoff: Duration::from_millis(5),
        });
        let renderer: Option<Arc<dyn ThumbnailRenderer>> = if thumbnails {
            Some(Arc::new(StaticThumbnailRenderer::new()))
        } else {
            None
        };

        let deps = OrchestratorDeps {
            invoices: invoices.clone(),
            packages: packages.clone(),
            store: store.clone(),
            parser: parser.clone() as Arc<dyn ParseService>,
            thumbnails: renderer,
            notifier: notifier.clone(),
            time_provider: Arc::new(SteppingClock::new(1_700_000_000_000, 10)),
            id_provider: Arc::new(SequentialIdProvider::new("id")),
        };
        let orchestrator = Arc::new(ProcessingOrchestrator::new(
            deps,
            queue.clone(),
            OrchestratorConfig::default(),
        ));

        Self {
            orchestrator,
            invoices,
            packages,
            store,
            parser,
            notifier,
            queue,
        }
    }
}

pub fn pdf(name: &str) -> UploadedFile {
    UploadedFile::new(name, "application/pdf", b"%PDF-1.4 test".to_vec())
}
