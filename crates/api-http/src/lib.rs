//! HTTP API Layer
//!
//! REST endpoints under `/api` plus the `/ws` push channel.

pub mod auth;
pub mod error;
pub mod rate_limiter;
pub mod routes;
pub mod server;
pub mod state;
pub mod types;
pub mod ws;

pub use server::{ApiServer, ServerConfig};
pub use state::AppState;
