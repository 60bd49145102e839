// HTTP client for the invoice parse service
// Posts the file as multipart field `file` and reads a JSON answer
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

use fatura_core::domain::structured;
use fatura_core::error::AppError;
use fatura_core::port::{ParseError, ParseService, ParsedDocument};

/// Parser endpoint used when none is configured
pub const DEFAULT_PARSER_URL: &str = "http://localhost:5001/parse_invoice";

/// Hard deadline for one parse call
pub const DEFAULT_PARSER_TIMEOUT: Duration = Duration::from_secs(60);

/// Keys the parser may use for the OCR text
const RAW_TEXT_KEYS: &[&str] = &["ocrText", "ocr_text", "raw_text"];

#[derive(Debug, Clone)]
pub struct ParserConfig {
    pub url: String,
    pub timeout: Duration,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_PARSER_URL.to_string(),
            timeout: DEFAULT_PARSER_TIMEOUT,
        }
    }
}

pub struct HttpParseService {
    client: Client,
    config: ParserConfig,
}

impl HttpParseService {
    pub fn new(config: ParserConfig) -> fatura_core::Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AppError::Config(format!("Cannot build parser HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    fn map_send_error(&self, err: reqwest::Error) -> ParseError {
        if err.is_timeout() {
            ParseError::Timeout(self.config.timeout.as_millis() as u64)
        } else if err.is_connect() {
            ParseError::Unreachable(err.to_string())
        } else {
            ParseError::InvalidResponse(err.to_string())
        }
    }
}

/// Split a parser answer into fields and OCR text
fn into_document(body: serde_json::Value) -> Result<ParsedDocument, ParseError> {
    if !body.is_object() {
        return Err(ParseError::InvalidResponse(
            "expected a JSON object".to_string(),
        ));
    }
    let raw_text = RAW_TEXT_KEYS
        .iter()
        .find_map(|key| body.get(*key).and_then(|v| v.as_str()))
        .map(str::to_string);
    Ok(ParsedDocument {
        structured: structured::extract_fields(&body),
        raw_text,
    })
}

#[async_trait]
impl ParseService for HttpParseService {
    async fn parse(
        &self,
        bytes: &[u8],
        file_name: &str,
        content_type: &str,
    ) -> Result<ParsedDocument, ParseError> {
        let part = Part::bytes(bytes.to_vec()).file_name(file_name.to_string());
        let part = match part.mime_str(content_type) {
            Ok(part) => part,
            Err(e) => {
                warn!(content_type = %content_type, error = %e, "Unusable content type, sending without it");
                Part::bytes(bytes.to_vec()).file_name(file_name.to_string())
            }
        };
        let form = Form::new().part("file", part);

        debug!(url = %self.config.url, file_name = %file_name, "Forwarding file to parse service");
        let response = self
            .client
            .post(&self.config.url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ParseError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let body: serde_json::Value = response.json().await.map_err(|e| {
            if e.is_timeout() {
                ParseError::Timeout(self.config.timeout.as_millis() as u64)
            } else {
                ParseError::InvalidResponse(e.to_string())
            }
        })?;
        into_document(body)
    }
}
