// Object store layout
//
//   app_users/{owner}/invoices/{invoice}/{file}
//   app_users/{owner}/packages/{package}/invoices/{invoice}/{file}
//   .../{invoice}/thumbnail.jpg

pub const THUMBNAIL_FILE: &str = "thumbnail.jpg";
pub const THUMBNAIL_CONTENT_TYPE: &str = "image/jpeg";

/// Folder holding everything stored for one invoice
pub fn invoice_folder(owner_id: &str, package_id: Option<&str>, invoice_id: &str) -> String {
    match package_id {
        Some(package_id) => format!(
            "app_users/{}/packages/{}/invoices/{}",
            segment(owner_id),
            segment(package_id),
            segment(invoice_id)
        ),
        None => format!(
            "app_users/{}/invoices/{}",
            segment(owner_id),
            segment(invoice_id)
        ),
    }
}

pub fn file_path(folder: &str, file_name: &str) -> String {
    format!("{}/{}", folder, segment(file_name))
}

pub fn thumbnail_path(folder: &str) -> String {
    format!("{}/{}", folder, THUMBNAIL_FILE)
}

/// Folder of a stored object path
pub fn parent_folder(path: &str) -> &str {
    path.rsplit_once('/').map(|(folder, _)| folder).unwrap_or("")
}

/// One path segment; separators and dot-only names cannot escape the folder
fn segment(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| if c == '/' || c == '\\' || c.is_control() { '_' } else { c })
        .collect();
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        "file".to_string()
    } else {
        cleaned
    }
}
