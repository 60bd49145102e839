//! Shared handler state

use crate::rate_limiter::OwnerRateLimiter;
use fatura_core::application::{ConnectionRegistry, NotificationDispatcher, ProcessingOrchestrator};
use fatura_core::port::{CredentialVerifier, TimeProvider};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    orchestrator: Arc<ProcessingOrchestrator>,
    /// Push fan-out; also owns the connection registry
    dispatcher: Arc<NotificationDispatcher>,
    /// Bearer tokens on `/api` routes
    verifier: Arc<dyn CredentialVerifier>,
    upload_limiter: OwnerRateLimiter,
    time_provider: Arc<dyn TimeProvider>,
}

impl AppState {
    pub fn new(
        orchestrator: Arc<ProcessingOrchestrator>,
        dispatcher: Arc<NotificationDispatcher>,
        verifier: Arc<dyn CredentialVerifier>,
        upload_limiter: OwnerRateLimiter,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                orchestrator,
                dispatcher,
                verifier,
                upload_limiter,
                time_provider,
            }),
        }
    }

    pub fn orchestrator(&self) -> &Arc<ProcessingOrchestrator> {
        &self.inner.orchestrator
    }

    pub fn dispatcher(&self) -> &NotificationDispatcher {
        &self.inner.dispatcher
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        self.inner.dispatcher.registry()
    }

    pub fn verifier(&self) -> &dyn CredentialVerifier {
        self.inner.verifier.as_ref()
    }

    pub fn upload_limiter(&self) -> &OwnerRateLimiter {
        &self.inner.upload_limiter
    }

    pub fn now_millis(&self) -> i64 {
        self.inner.time_provider.now_millis()
    }
}
