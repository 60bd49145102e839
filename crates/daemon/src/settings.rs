//! Server configuration
//!
//! Built-in defaults overridden by `FATURA_*` environment variables.

use anyhow::{bail, Context, Result};
use config::{Config, Environment};
use fatura_api_http::rate_limiter::{DEFAULT_BURST, DEFAULT_REFILL_PER_SEC};
use fatura_api_http::server::DEFAULT_MAX_UPLOAD_BYTES;
use fatura_api_http::ServerConfig;
use fatura_core::application::queue::constants::{DEFAULT_MAX_RETRIES, DEFAULT_RETRY_BACKOFF};
use fatura_core::application::QueueConfig;
use fatura_infra_services::http_parse_service::{DEFAULT_PARSER_TIMEOUT, DEFAULT_PARSER_URL};
use fatura_infra_services::{LocalStoreConfig, ParserConfig, METADATA_SUFFIX};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

pub const ENV_PREFIX: &str = "FATURA";

const DEFAULT_DB_PATH: &str = "~/.fatura/fatura.db";
const DEFAULT_STORAGE_ROOT: &str = "~/.fatura/storage";
const DEFAULT_PUBLIC_BASE_URL: &str = "http://localhost:3000/files";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub http_host: String,
    pub http_port: u16,
    pub db_path: String,
    pub storage_root: String,
    pub public_base_url: String,
    pub parser_url: String,
    pub parser_timeout_secs: u64,
    pub jwt_secret: String,
    pub queue_max_retries: u32,
    pub queue_backoff_ms: u64,
    pub max_upload_bytes: u64,
    pub rate_limit_burst: u32,
    pub rate_limit_per_sec: u32,
    /// Comma separated; empty allows any origin
    pub allowed_origins: String,
}

impl AppConfig {
    /// Defaults plus the process environment
    pub fn load() -> Result<Self> {
        Self::from_env(Environment::with_prefix(ENV_PREFIX))
    }

    /// Defaults plus an explicit variable map
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self> {
        Self::from_env(Environment::with_prefix(ENV_PREFIX).source(Some(vars)))
    }

    fn from_env(env: Environment) -> Result<Self> {
        let config: AppConfig = Config::builder()
            .set_default("http_host", "0.0.0.0")?
            .set_default("http_port", 3000_i64)?
            .set_default("db_path", DEFAULT_DB_PATH)?
            .set_default("storage_root", DEFAULT_STORAGE_ROOT)?
            .set_default("public_base_url", DEFAULT_PUBLIC_BASE_URL)?
            .set_default("parser_url", DEFAULT_PARSER_URL)?
            .set_default("parser_timeout_secs", DEFAULT_PARSER_TIMEOUT.as_secs())?
            .set_default("queue_max_retries", DEFAULT_MAX_RETRIES as u64)?
            .set_default("queue_backoff_ms", DEFAULT_RETRY_BACKOFF.as_millis() as u64)?
            .set_default("max_upload_bytes", DEFAULT_MAX_UPLOAD_BYTES as u64)?
            .set_default("rate_limit_burst", DEFAULT_BURST as u64)?
            .set_default("rate_limit_per_sec", DEFAULT_REFILL_PER_SEC as u64)?
            .set_default("allowed_origins", "")?
            .add_source(env.try_parsing(true))
            .build()?
            .try_deserialize()
            .context("Invalid configuration (is FATURA_JWT_SECRET set?)")?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.jwt_secret.trim().is_empty() {
            bail!("FATURA_JWT_SECRET must not be empty");
        }
        if self.parser_timeout_secs == 0 {
            bail!("FATURA_PARSER_TIMEOUT_SECS must be positive");
        }
        if self.rate_limit_burst == 0 {
            bail!("FATURA_RATE_LIMIT_BURST must be positive");
        }
        Ok(())
    }

    pub fn db_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.db_path).into_owned())
    }

    pub fn storage_root(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.storage_root).into_owned())
    }

    pub fn allowed_origins(&self) -> Vec<String> {
        self.allowed_origins
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty() && *origin != "*")
            .map(str::to_string)
            .collect()
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            host: self.http_host.clone(),
            port: self.http_port,
            max_upload_bytes: self.max_upload_bytes as usize,
            allowed_origins: self.allowed_origins(),
            static_dir: Some(self.storage_root()),
            hidden_static_suffixes: vec![METADATA_SUFFIX.to_string()],
        }
    }

    pub fn store_config(&self) -> LocalStoreConfig {
        LocalStoreConfig {
            root: self.storage_root(),
            public_base_url: self.public_base_url.clone(),
        }
    }

    pub fn parser_config(&self) -> ParserConfig {
        ParserConfig {
            url: self.parser_url.clone(),
            timeout: Duration::from_secs(self.parser_timeout_secs),
        }
    }

    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig {
            max_retries: self.queue_max_retries,
            backoff: Duration::from_millis(self.queue_backoff_ms),
        }
    }
}
