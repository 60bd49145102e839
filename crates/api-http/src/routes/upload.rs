//! Multipart upload reading

use crate::error::{code, ApiError, ApiResult};
use axum::extract::multipart::MultipartError;
use axum::extract::Multipart;
use fatura_core::application::UploadedFile;
use tracing::debug;

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Files (and the optional `name` text field) of one multipart request
#[derive(Debug, Default)]
pub struct MultipartUpload {
    pub files: Vec<UploadedFile>,
    pub name: Option<String>,
}

impl MultipartUpload {
    /// Exactly the first file, for single-invoice scans
    pub fn single_file(self) -> ApiResult<UploadedFile> {
        self.files
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::validation("No file uploaded"))
    }
}

fn multipart_error(e: MultipartError) -> ApiError {
    ApiError::new(e.status(), code::VALIDATION_ERROR, e.body_text())
}

/// Collect every file sent under `file_field`
pub async fn read_upload(mut multipart: Multipart, file_field: &str) -> ApiResult<MultipartUpload> {
    let mut upload = MultipartUpload::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or("").to_string();

        if name == "name" {
            upload.name = Some(field.text().await.map_err(multipart_error)?);
            continue;
        }
        if name != file_field {
            debug!(field = %name, "Ignoring multipart field");
            continue;
        }

        let file_name = field.file_name().unwrap_or("").to_string();
        let content_type = field
            .content_type()
            .unwrap_or(FALLBACK_CONTENT_TYPE)
            .to_string();
        let bytes = field.bytes().await.map_err(multipart_error)?;
        debug!(file_name = %file_name, size = bytes.len(), "Received upload");
        upload
            .files
            .push(UploadedFile::new(file_name, content_type, bytes));
    }

    Ok(upload)
}
