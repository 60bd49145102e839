//! HTTP Server
//!
//! Builds the router and serves it until the shutdown token fires.

use crate::routes;
use crate::state::AppState;
use crate::types::HealthResponse;
use crate::ws;
use axum::extract::{Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use fatura_core::application::ShutdownToken;
use fatura_core::domain::timestamp::to_rfc3339;
use fatura_core::error::{AppError, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// 250 MiB
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 250 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_upload_bytes: usize,
    /// Empty allows any origin
    pub allowed_origins: Vec<String>,
    /// Served under `/files` when set (local object store root)
    pub static_dir: Option<PathBuf>,
    /// Paths under `/files` ending in one of these answer 404
    pub hidden_static_suffixes: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            allowed_origins: Vec::new(),
            static_dir: None,
            hidden_static_suffixes: Vec::new(),
        }
    }
}

pub struct ApiServer {
    config: ServerConfig,
    state: AppState,
}

impl ApiServer {
    pub fn new(config: ServerConfig, state: AppState) -> Self {
        Self { config, state }
    }

    pub fn router(&self) -> Router {
        let mut router = Router::new()
            .route("/health", get(health_check))
            .route("/ws", get(ws::ws_handler))
            .nest("/api", routes::api_routes(self.config.max_upload_bytes));

        if let Some(dir) = &self.config.static_dir {
            let hidden = Arc::new(self.config.hidden_static_suffixes.clone());
            let files: Router<AppState> = Router::new()
                .nest_service("/files", ServeDir::new(dir))
                .layer(middleware::from_fn_with_state(hidden, hide_static_files));
            router = router.merge(files);
        }

        router
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http())
            .layer(self.cors())
    }

    fn cors(&self) -> CorsLayer {
        let origins: Vec<HeaderValue> = self
            .config
            .allowed_origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(origin = %origin, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();

        let allow_origin = if origins.is_empty() {
            AllowOrigin::from(Any)
        } else {
            AllowOrigin::list(origins)
        };

        CorsLayer::new()
            .allow_origin(allow_origin)
            .allow_methods(Any)
            .allow_headers(Any)
    }

    pub async fn bind(&self) -> Result<TcpListener> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .map_err(|e| AppError::Config(format!("Invalid listen address: {}", e)))?;
        Ok(TcpListener::bind(addr).await?)
    }

    /// Serve on an already bound listener until shutdown
    pub async fn serve(self, listener: TcpListener, shutdown: ShutdownToken) -> Result<()> {
        let router = self.router();
        let addr = listener.local_addr()?;
        info!(addr = %addr, "HTTP server listening");

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown.cancelled())
            .await?;

        info!("HTTP server stopped");
        Ok(())
    }
}

/// 404 for static paths the object store keeps private
async fn hide_static_files(
    State(hidden): State<Arc<Vec<String>>>,
    request: Request,
    next: Next,
) -> Response {
    // Match what the file service will open, not the escaped form
    let hidden_path = match urlencoding::decode(request.uri().path()) {
        Ok(path) => hidden.iter().any(|suffix| path.ends_with(suffix.as_str())),
        Err(_) => true,
    };
    if hidden_path {
        return StatusCode::NOT_FOUND.into_response();
    }
    next.run(request).await
}

/// GET /health
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK",
        message: "Fatura server is running".to_string(),
        timestamp: to_rfc3339(state.now_millis()),
    })
}
