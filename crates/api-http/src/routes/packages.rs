//! Package endpoints and per-invoice review actions inside a package

use super::invoices::apply_update;
use super::upload::read_upload;
use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::types::{
    InvoiceActionResponse, InvoiceListResponse, InvoiceResponse, PackageCreatedResponse,
    PackageListResponse, PackageResponse, ReevaluationResponse, StructuredUpdateRequest,
    UpdateInvoiceRequest,
};
use axum::extract::{Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;

/// Multipart field carrying package files (repeated)
pub const FILES_FIELD: &str = "files";

/// POST /api/packages - one background job per file
pub async fn create_package(
    State(state): State<AppState>,
    user: AuthUser,
    multipart: Multipart,
) -> ApiResult<(StatusCode, Json<PackageCreatedResponse>)> {
    if !state.upload_limiter().check(&user.owner_id) {
        return Err(ApiError::rate_limited());
    }
    let upload = read_upload(multipart, FILES_FIELD).await?;

    let (package, invoices) = state
        .orchestrator()
        .create_package(&user.owner_id, upload.name, upload.files)
        .await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(PackageCreatedResponse {
            message: "Package created".to_string(),
            package_id: package.id,
            status: package.status,
            total: invoices.len(),
            invoice_ids: invoices.into_iter().map(|inv| inv.id).collect(),
        }),
    ))
}

pub async fn list_packages(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<PackageListResponse>> {
    let packages = state.orchestrator().list_packages(&user.owner_id).await?;
    Ok(Json(PackageListResponse { packages }))
}

pub async fn get_package(
    State(state): State<AppState>,
    user: AuthUser,
    Path(package_id): Path<String>,
) -> ApiResult<Json<PackageResponse>> {
    let package = state
        .orchestrator()
        .get_package(&user.owner_id, &package_id)
        .await?;
    Ok(Json(PackageResponse { package }))
}

pub async fn list_invoices(
    State(state): State<AppState>,
    user: AuthUser,
    Path(package_id): Path<String>,
) -> ApiResult<Json<InvoiceListResponse>> {
    let invoices = state
        .orchestrator()
        .list_package_invoices(&user.owner_id, &package_id)
        .await?;
    Ok(Json(InvoiceListResponse { invoices }))
}

pub async fn export(
    State(state): State<AppState>,
    user: AuthUser,
    Path(package_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let export = state
        .orchestrator()
        .export_package(&user.owner_id, &package_id)
        .await?;
    let disposition = format!("attachment; filename=\"package-{}.json\"", package_id);
    Ok(([(header::CONTENT_DISPOSITION, disposition)], Json(export)))
}

pub async fn reevaluate_package(
    State(state): State<AppState>,
    user: AuthUser,
    Path(package_id): Path<String>,
) -> ApiResult<(StatusCode, Json<ReevaluationResponse>)> {
    let data = state
        .orchestrator()
        .reevaluate_package(&user.owner_id, &package_id)
        .await?;
    let message = if data.queued == 0 {
        "Nothing to reevaluate in package"
    } else {
        "Package reevaluation started"
    };
    Ok((
        StatusCode::ACCEPTED,
        Json(ReevaluationResponse {
            success: true,
            message: message.to_string(),
            data,
        }),
    ))
}

pub async fn get_invoice(
    State(state): State<AppState>,
    user: AuthUser,
    Path((package_id, invoice_id)): Path<(String, String)>,
) -> ApiResult<Json<InvoiceResponse>> {
    let invoice = state
        .orchestrator()
        .get_invoice(&user.owner_id, &invoice_id, Some(&package_id))
        .await?;
    Ok(Json(InvoiceResponse { invoice }))
}

pub async fn update_invoice(
    State(state): State<AppState>,
    user: AuthUser,
    Path((package_id, invoice_id)): Path<(String, String)>,
    Json(request): Json<UpdateInvoiceRequest>,
) -> ApiResult<Json<InvoiceActionResponse>> {
    let invoice = apply_update(
        &state,
        &user.owner_id,
        &invoice_id,
        Some(&package_id),
        request,
    )
    .await?;
    Ok(Json(InvoiceActionResponse {
        message: "Invoice updated".to_string(),
        invoice,
    }))
}

/// PUT .../invoices/:invoice_id/structured - manual edit only
pub async fn update_structured(
    State(state): State<AppState>,
    user: AuthUser,
    path: Path<(String, String)>,
    Json(request): Json<StructuredUpdateRequest>,
) -> ApiResult<Json<InvoiceActionResponse>> {
    let request = UpdateInvoiceRequest {
        structured: Some(request.structured),
        is_approved: None,
    };
    update_invoice(State(state), user, path, Json(request)).await
}

pub async fn approve(
    State(state): State<AppState>,
    user: AuthUser,
    Path((package_id, invoice_id)): Path<(String, String)>,
) -> ApiResult<Json<InvoiceActionResponse>> {
    let invoice = state
        .orchestrator()
        .approve(&user.owner_id, &invoice_id, Some(&package_id))
        .await?;
    Ok(Json(InvoiceActionResponse {
        message: "Invoice approved".to_string(),
        invoice,
    }))
}

pub async fn reject(
    State(state): State<AppState>,
    user: AuthUser,
    Path((package_id, invoice_id)): Path<(String, String)>,
) -> ApiResult<Json<InvoiceActionResponse>> {
    let invoice = state
        .orchestrator()
        .reject(&user.owner_id, &invoice_id, Some(&package_id))
        .await?;
    Ok(Json(InvoiceActionResponse {
        message: "Invoice rejected".to_string(),
        invoice,
    }))
}

pub async fn revoke(
    State(state): State<AppState>,
    user: AuthUser,
    Path((package_id, invoice_id)): Path<(String, String)>,
) -> ApiResult<Json<InvoiceActionResponse>> {
    let invoice = state
        .orchestrator()
        .revoke_approval(&user.owner_id, &invoice_id, Some(&package_id))
        .await?;
    Ok(Json(InvoiceActionResponse {
        message: "Approval revoked".to_string(),
        invoice,
    }))
}

pub async fn reevaluate_invoice(
    State(state): State<AppState>,
    user: AuthUser,
    Path((package_id, invoice_id)): Path<(String, String)>,
) -> ApiResult<(StatusCode, Json<InvoiceActionResponse>)> {
    let invoice = state
        .orchestrator()
        .reevaluate_invoice(&user.owner_id, &invoice_id, Some(&package_id))
        .await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(InvoiceActionResponse {
            message: "Invoice reevaluation started".to_string(),
            invoice,
        }),
    ))
}
