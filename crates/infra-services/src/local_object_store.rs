// Filesystem object store
// Objects live under a root directory and are served by a URL prefix
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use fatura_core::port::{ObjectMetadata, ObjectStore, StorageError, TimeProvider};

/// Sidecar suffix holding content type and metadata; never served publicly
pub const METADATA_SUFFIX: &str = ".meta.json";

#[derive(Debug, Clone)]
pub struct LocalStoreConfig {
    /// Directory objects are written under
    pub root: PathBuf,
    /// URL prefix the root is served at (no trailing slash)
    pub public_base_url: String,
}

pub struct LocalObjectStore {
    config: LocalStoreConfig,
    time_provider: Arc<dyn TimeProvider>,
}

impl LocalObjectStore {
    pub fn new(config: LocalStoreConfig, time_provider: Arc<dyn TimeProvider>) -> Self {
        let public_base_url = config.public_base_url.trim_end_matches('/').to_string();
        Self {
            config: LocalStoreConfig {
                public_base_url,
                ..config
            },
            time_provider,
        }
    }

    pub fn root(&self) -> &Path {
        &self.config.root
    }

    /// Resolve an object path under the root
    ///
    /// Absolute paths and `..` segments are rejected.
    fn resolve(&self, path: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(path);
        let is_plain = !path.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !is_plain {
            return Err(StorageError::WriteFailed {
                path: path.to_string(),
                message: "object path must be relative without '..'".to_string(),
            });
        }
        Ok(self.config.root.join(relative))
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}/{}", self.config.public_base_url, path)
    }
}

fn sidecar(file: &Path) -> PathBuf {
    let mut name = file.as_os_str().to_os_string();
    name.push(METADATA_SUFFIX);
    PathBuf::from(name)
}

fn write_failed(path: &str, err: impl std::fmt::Display) -> StorageError {
    StorageError::WriteFailed {
        path: path.to_string(),
        message: err.to_string(),
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(
        &self,
        path: &str,
        bytes: &[u8],
        content_type: &str,
        metadata: &ObjectMetadata,
    ) -> Result<String, StorageError> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| write_failed(path, e))?;
        }

        tokio::fs::write(&target, bytes)
            .await
            .map_err(|e| write_failed(path, e))?;

        let sidecar_body = serde_json::json!({
            "contentType": content_type,
            "metadata": metadata,
        });
        tokio::fs::write(sidecar(&target), sidecar_body.to_string())
            .await
            .map_err(|e| write_failed(path, e))?;

        debug!(path = %path, size = bytes.len(), "Object stored");
        Ok(self.public_url(path))
    }

    async fn get(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        let target = self
            .resolve(path)
            .map_err(|_| StorageError::NotFound(path.to_string()))?;
        tokio::fs::read(&target).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => StorageError::NotFound(path.to_string()),
            _ => StorageError::Unavailable(format!("{}: {}", path, e)),
        })
    }

    /// Public URL with an `expires` hint
    ///
    /// There is no signing key here: the hint is advisory and the static file
    /// route does not enforce it.
    async fn signed_url(&self, path: &str, ttl: Duration) -> Result<String, StorageError> {
        let target = self
            .resolve(path)
            .map_err(|e| StorageError::SigningFailed(e.to_string()))?;
        match tokio::fs::try_exists(&target).await {
            Ok(true) => {}
            Ok(false) => return Err(StorageError::NotFound(path.to_string())),
            Err(e) => return Err(StorageError::SigningFailed(e.to_string())),
        }

        let expires = self.time_provider.now_millis() / 1000 + ttl.as_secs() as i64;
        Ok(format!("{}?expires={}", self.public_url(path), expires))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fatura_core::port::time_provider::mocks::SteppingClock;

    fn store(root: &Path) -> LocalObjectStore {
        LocalObjectStore::new(
            LocalStoreConfig {
                root: root.to_path_buf(),
                public_base_url: "http://localhost:3000/files/".to_string(),
            },
            Arc::new(SteppingClock::new(1_700_000_000_000, 0)),
        )
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let mut metadata = ObjectMetadata::new();
        metadata.insert("originalName".into(), "A.pdf".into());

        let url = store
            .put("app_users/u/invoices/i/A.pdf", b"%PDF", "application/pdf", &metadata)
            .await
            .unwrap();
        assert_eq!(url, "http://localhost:3000/files/app_users/u/invoices/i/A.pdf");
        assert_eq!(
            store.get("app_users/u/invoices/i/A.pdf").await.unwrap(),
            b"%PDF"
        );

        let sidecar_path = dir.path().join("app_users/u/invoices/i/A.pdf.meta.json");
        let sidecar: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(sidecar_path).unwrap()).unwrap();
        assert_eq!(sidecar["contentType"], "application/pdf");
        assert_eq!(sidecar["metadata"]["originalName"], "A.pdf");
    }

    #[tokio::test]
    async fn test_missing_object() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        assert_eq!(
            store.get("nope.pdf").await.unwrap_err(),
            StorageError::NotFound("nope.pdf".into())
        );
        assert!(matches!(
            store.signed_url("nope.pdf", Duration::from_secs(60)).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_signed_url_carries_expiry() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store
            .put("a/b.pdf", b"x", "application/pdf", &ObjectMetadata::new())
            .await
            .unwrap();

        let url = store
            .signed_url("a/b.pdf", Duration::from_secs(3600))
            .await
            .unwrap();
        assert_eq!(url, "http://localhost:3000/files/a/b.pdf?expires=1700003600");
    }

    #[tokio::test]
    async fn test_escaping_paths_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        for path in ["../evil.pdf", "/etc/passwd", "a/../../b", ""] {
            let err = store
                .put(path, b"x", "application/pdf", &ObjectMetadata::new())
                .await
                .unwrap_err();
            assert!(matches!(err, StorageError::WriteFailed { .. }), "{}", path);
        }
    }
}
