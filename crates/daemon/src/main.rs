//! Fatura Server - Main Entry Point

mod settings;
mod telemetry;

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{error, info, warn};

use settings::AppConfig;
use fatura_api_http::rate_limiter::OwnerRateLimiter;
use fatura_api_http::{ApiServer, AppState};
use fatura_core::application::queue::constants::SHUTDOWN_DRAIN_TIMEOUT;
use fatura_core::application::{
    shutdown_channel, ConnectionRegistry, JobQueue, NotificationDispatcher, OrchestratorConfig,
    OrchestratorDeps, ProcessingOrchestrator,
};
use fatura_core::port::id_provider::UuidProvider;
use fatura_core::port::time_provider::SystemTimeProvider;
use fatura_core::port::{CredentialVerifier, TimeProvider};
use fatura_infra_services::{HttpParseService, JwtCredentialVerifier, LocalObjectStore};
use fatura_infra_sqlite::{
    create_pool, run_migrations, SqliteInvoiceRepository, SqlitePackageRepository,
};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Logging (+ optional OpenTelemetry)
    telemetry::init_tracing()?;
    info!("Fatura server v{} starting...", VERSION);

    // 2. Configuration
    let config = AppConfig::load()?;

    // 3. Database
    let db_path = config.db_path();
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Cannot create {}", parent.display()))?;
    }
    info!(db_path = %db_path.display(), "Initializing database...");
    let pool = create_pool(&db_path.to_string_lossy())
        .await
        .map_err(|e| anyhow::anyhow!("DB pool creation failed: {}", e))?;
    run_migrations(&pool)
        .await
        .map_err(|e| anyhow::anyhow!("Migration failed: {}", e))?;

    // 4. DI wiring
    let time_provider: Arc<dyn TimeProvider> = Arc::new(SystemTimeProvider);
    let verifier: Arc<dyn CredentialVerifier> = Arc::new(JwtCredentialVerifier::new(
        &config.jwt_secret,
        time_provider.clone(),
    ));
    let registry = Arc::new(ConnectionRegistry::new(verifier.clone()));
    let dispatcher = Arc::new(NotificationDispatcher::new(registry, time_provider.clone()));

    let store = LocalObjectStore::new(config.store_config(), time_provider.clone());
    info!(root = %store.root().display(), "Object store ready");
    let parser = HttpParseService::new(config.parser_config())
        .map_err(|e| anyhow::anyhow!("Parse service client failed: {}", e))?;

    let queue = JobQueue::new(config.queue_config());
    let deps = OrchestratorDeps {
        invoices: Arc::new(SqliteInvoiceRepository::new(pool.clone())),
        packages: Arc::new(SqlitePackageRepository::new(pool.clone())),
        store: Arc::new(store),
        parser: Arc::new(parser),
        thumbnails: None,
        notifier: dispatcher.clone(),
        time_provider: time_provider.clone(),
        id_provider: Arc::new(UuidProvider),
    };
    let orchestrator = Arc::new(ProcessingOrchestrator::new(
        deps,
        queue.clone(),
        OrchestratorConfig::default(),
    ));

    let state = AppState::new(
        orchestrator,
        dispatcher,
        verifier,
        OwnerRateLimiter::new(config.rate_limit_burst, config.rate_limit_per_sec),
        time_provider,
    );

    // 5. HTTP + WebSocket server
    let server = ApiServer::new(config.server_config(), state);
    let listener = server
        .bind()
        .await
        .map_err(|e| anyhow::anyhow!("HTTP bind failed: {}", e))?;
    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    let mut server_handle = tokio::spawn(server.serve(listener, shutdown_rx));

    info!("System ready. Press Ctrl+C to shutdown");

    // 6. Wait for Ctrl-C (or an early server exit)
    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("Shutdown signal received. Exiting gracefully...");
        }
        result = &mut server_handle => {
            error!(result = ?result, "HTTP server exited unexpectedly");
        }
    }

    // 7. Graceful shutdown: stop accepting, then drain background jobs
    shutdown_tx.shutdown();
    if !server_handle.is_finished() {
        match server_handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "HTTP server failed"),
            Err(e) => error!(error = %e, "HTTP server task panicked"),
        }
    }

    if !queue.drain(SHUTDOWN_DRAIN_TIMEOUT).await {
        warn!(pending = queue.pending_len(), "Exiting with unfinished jobs");
    }
    pool.close().await;

    info!("Shutdown complete.");
    Ok(())
}
