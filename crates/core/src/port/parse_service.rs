// Parse Service Port
// External OCR / data-extraction service

use async_trait::async_trait;
use thiserror::Error;

/// Output of a successful parse
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDocument {
    /// Extracted fields (JSON object)
    pub structured: serde_json::Value,
    /// Raw OCR text, if the service returned one
    pub raw_text: Option<String>,
}

/// Parse errors
///
/// `Unreachable` is the soft-failure signal: the file stays stored and the invoice
/// ends in `uploaded`. Every other variant is a hard parser failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Parse service unreachable: {0}")]
    Unreachable(String),

    #[error("Parse timed out after {0}ms")]
    Timeout(u64),

    #[error("Parse service rejected the document ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Invalid parse response: {0}")]
    InvalidResponse(String),
}

impl ParseError {
    pub fn is_unreachable(&self) -> bool {
        matches!(self, ParseError::Unreachable(_))
    }
}

/// Parse Service trait
///
/// Implementations:
/// - HttpParseService: multipart POST to the parser over HTTP
#[async_trait]
pub trait ParseService: Send + Sync {
    /// Extract structured data from a document
    ///
    /// # Errors
    /// - ParseError::Unreachable if the service cannot be contacted
    /// - ParseError::Timeout if the call exceeds its deadline
    /// - ParseError::Rejected / InvalidResponse on a bad answer
    async fn parse(
        &self,
        bytes: &[u8],
        file_name: &str,
        content_type: &str,
    ) -> Result<ParsedDocument, ParseError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Mock parser behavior
    #[derive(Debug, Clone)]
    pub enum MockParseBehavior {
        /// Return these structured fields
        Success(serde_json::Value),
        /// Service cannot be contacted
        Unreachable,
        /// Service answers with an error
        Fail(String),
        /// Call times out
        Timeout,
        /// Succeed for every file except this one
        FailOn { file_name: String, message: String },
    }

    /// Mock Parse Service for testing
    pub struct MockParseService {
        behavior: Arc<Mutex<MockParseBehavior>>,
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl MockParseService {
        pub fn new(behavior: MockParseBehavior) -> Self {
            Self {
                behavior: Arc::new(Mutex::new(behavior)),
                calls: Arc::new(Mutex::new(Vec::new())),
            }
        }

        pub fn new_success() -> Self {
            Self::new(MockParseBehavior::Success(serde_json::json!({
                "fatura_numarasi": "FTR-2024-001",
                "genel_toplam": "118.00"
            })))
        }

        pub fn new_unreachable() -> Self {
            Self::new(MockParseBehavior::Unreachable)
        }

        pub fn new_fail(message: impl Into<String>) -> Self {
            Self::new(MockParseBehavior::Fail(message.into()))
        }

        pub fn set_behavior(&self, behavior: MockParseBehavior) {
            *self.behavior.lock().unwrap() = behavior;
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        /// File names passed to `parse`, in call order
        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ParseService for MockParseService {
        async fn parse(
            &self,
            _bytes: &[u8],
            file_name: &str,
            _content_type: &str,
        ) -> Result<ParsedDocument, ParseError> {
            self.calls.lock().unwrap().push(file_name.to_string());

            let behavior = self.behavior.lock().unwrap().clone();
            match behavior {
                MockParseBehavior::Success(structured) => Ok(ParsedDocument {
                    structured,
                    raw_text: Some(format!("ocr text of {}", file_name)),
                }),
                MockParseBehavior::Unreachable => {
                    Err(ParseError::Unreachable("connection refused".to_string()))
                }
                MockParseBehavior::Fail(msg) => Err(ParseError::Rejected {
                    status: 500,
                    body: msg,
                }),
                MockParseBehavior::Timeout => Err(ParseError::Timeout(60_000)),
                MockParseBehavior::FailOn {
                    file_name: failing,
                    message,
                } => {
                    if failing == file_name {
                        Err(ParseError::Rejected {
                            status: 422,
                            body: message,
                        })
                    } else {
                        Ok(ParsedDocument {
                            structured: serde_json::json!({"fatura_numarasi": file_name}),
                            raw_text: None,
                        })
                    }
                }
            }
        }
    }
}
