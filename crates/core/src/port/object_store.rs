// Object Store Port
// Abstraction over the document storage backend (bucket, filesystem, ...)

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// Free-form metadata stored next to an object
pub type ObjectMetadata = BTreeMap<String, String>;

/// Storage errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("Write failed for {path}: {message}")]
    WriteFailed { path: String, message: String },

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Signing failed: {0}")]
    SigningFailed(String),

    #[error("Thumbnail rendering failed: {0}")]
    RenderFailed(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Object Store trait
///
/// Implementations:
/// - LocalObjectStore: files under a root directory, served by URL prefix
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store an object and return its URL
    ///
    /// # Errors
    /// - StorageError::WriteFailed if the object cannot be written
    async fn put(
        &self,
        path: &str,
        bytes: &[u8],
        content_type: &str,
        metadata: &ObjectMetadata,
    ) -> Result<String, StorageError>;

    /// Read an object back
    async fn get(&self, path: &str) -> Result<Vec<u8>, StorageError>;

    /// Create a time-limited read URL
    async fn signed_url(&self, path: &str, ttl: Duration) -> Result<String, StorageError>;
}

/// Thumbnail rendering collaborator (optional)
#[async_trait]
pub trait ThumbnailRenderer: Send + Sync {
    /// Render a small JPEG preview of the document
    async fn render(&self, bytes: &[u8], content_type: &str) -> Result<Vec<u8>, StorageError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// In-memory object store
    #[derive(Default)]
    pub struct InMemoryObjectStore {
        objects: Mutex<HashMap<String, (Vec<u8>, String)>>,
        fail_puts: AtomicBool,
        put_count: AtomicUsize,
    }

    impl InMemoryObjectStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// Store that rejects every write
        pub fn new_failing() -> Self {
            let store = Self::default();
            store.set_fail_puts(true);
            store
        }

        pub fn set_fail_puts(&self, fail: bool) {
            self.fail_puts.store(fail, Ordering::SeqCst);
        }

        pub fn put_count(&self) -> usize {
            self.put_count.load(Ordering::SeqCst)
        }

        pub fn contains(&self, path: &str) -> bool {
            self.objects.lock().unwrap().contains_key(path)
        }

        pub fn paths(&self) -> Vec<String> {
            let mut paths: Vec<String> = self.objects.lock().unwrap().keys().cloned().collect();
            paths.sort();
            paths
        }
    }

    #[async_trait]
    impl ObjectStore for InMemoryObjectStore {
        async fn put(
            &self,
            path: &str,
            bytes: &[u8],
            content_type: &str,
            _metadata: &ObjectMetadata,
        ) -> Result<String, StorageError> {
            self.put_count.fetch_add(1, Ordering::SeqCst);
            if self.fail_puts.load(Ordering::SeqCst) {
                return Err(StorageError::WriteFailed {
                    path: path.to_string(),
                    message: "bucket unavailable".to_string(),
                });
            }
            self.objects
                .lock()
                .unwrap()
                .insert(path.to_string(), (bytes.to_vec(), content_type.to_string()));
            Ok(format!("memory://{}", path))
        }

        async fn get(&self, path: &str) -> Result<Vec<u8>, StorageError> {
            self.objects
                .lock()
                .unwrap()
                .get(path)
                .map(|(bytes, _)| bytes.clone())
                .ok_or_else(|| StorageError::NotFound(path.to_string()))
        }

        async fn signed_url(&self, path: &str, ttl: Duration) -> Result<String, StorageError> {
            if !self.contains(path) {
                return Err(StorageError::NotFound(path.to_string()));
            }
            Ok(format!("memory://{}?expires_in={}", path, ttl.as_secs()))
        }
    }

    /// Renderer that returns a fixed preview, or fails
    pub struct StaticThumbnailRenderer {
        fail: bool,
    }

    impl StaticThumbnailRenderer {
        pub fn new() -> Self {
            Self { fail: false }
        }

        pub fn new_failing() -> Self {
            Self { fail: true }
        }
    }

    impl Default for StaticThumbnailRenderer {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl ThumbnailRenderer for StaticThumbnailRenderer {
        async fn render(&self, _bytes: &[u8], content_type: &str) -> Result<Vec<u8>, StorageError> {
            if self.fail {
                return Err(StorageError::RenderFailed(format!(
                    "cannot render {}",
                    content_type
                )));
            }
            Ok(vec![0xFF, 0xD8, 0xFF, 0xD9])
        }
    }
}
