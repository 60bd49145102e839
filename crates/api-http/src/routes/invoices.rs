//! Single invoice endpoints

use super::upload::read_upload;
use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::types::{
    BackgroundScanResponse, InvoiceActionResponse, InvoiceListResponse, InvoiceResponse,
    StatsResponse, UpdateInvoiceRequest,
};
use axum::extract::{Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use fatura_core::domain::Invoice;
use tracing::info;

/// Multipart field carrying a single invoice
pub const INVOICE_FIELD: &str = "invoice";

fn check_upload_rate(state: &AppState, owner_id: &str) -> ApiResult<()> {
    if state.upload_limiter().check(owner_id) {
        Ok(())
    } else {
        Err(ApiError::rate_limited())
    }
}

/// POST /api/invoice/scan - upload, store and parse inline
pub async fn scan(
    State(state): State<AppState>,
    user: AuthUser,
    multipart: Multipart,
) -> ApiResult<Json<InvoiceActionResponse>> {
    check_upload_rate(&state, &user.owner_id)?;
    let file = read_upload(multipart, INVOICE_FIELD).await?.single_file()?;

    let invoice = state
        .orchestrator()
        .process_invoice_now(&user.owner_id, file)
        .await?;
    Ok(Json(InvoiceActionResponse {
        message: "Invoice processed".to_string(),
        invoice,
    }))
}

/// POST /api/invoice/scan-background - accept and process in the queue
pub async fn scan_background(
    State(state): State<AppState>,
    user: AuthUser,
    multipart: Multipart,
) -> ApiResult<(StatusCode, Json<BackgroundScanResponse>)> {
    check_upload_rate(&state, &user.owner_id)?;
    let file = read_upload(multipart, INVOICE_FIELD).await?.single_file()?;

    let invoice = state
        .orchestrator()
        .submit_invoice(&user.owner_id, file)
        .await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(BackgroundScanResponse {
            message: "Invoice processing started in background.".to_string(),
            invoice_id: invoice.id,
            status: invoice.status,
        }),
    ))
}

pub async fn list_invoices(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<InvoiceListResponse>> {
    let invoices = state.orchestrator().list_invoices(&user.owner_id).await?;
    Ok(Json(InvoiceListResponse { invoices }))
}

pub async fn stats(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<StatsResponse>> {
    let stats = state.orchestrator().invoice_stats(&user.owner_id).await?;
    Ok(Json(StatsResponse {
        success: true,
        stats,
    }))
}

/// GET /api/invoice/export.json - download every invoice of the owner
pub async fn export(State(state): State<AppState>, user: AuthUser) -> ApiResult<impl IntoResponse> {
    let export = state.orchestrator().export_invoices(&user.owner_id).await?;
    let disposition = format!("attachment; filename=\"invoices-{}.json\"", user.owner_id);
    Ok(([(header::CONTENT_DISPOSITION, disposition)], Json(export)))
}

pub async fn get_invoice(
    State(state): State<AppState>,
    user: AuthUser,
    Path(invoice_id): Path<String>,
) -> ApiResult<Json<InvoiceResponse>> {
    let invoice = state
        .orchestrator()
        .get_invoice(&user.owner_id, &invoice_id, None)
        .await?;
    Ok(Json(InvoiceResponse { invoice }))
}

pub async fn update_invoice(
    State(state): State<AppState>,
    user: AuthUser,
    Path(invoice_id): Path<String>,
    Json(request): Json<UpdateInvoiceRequest>,
) -> ApiResult<Json<InvoiceActionResponse>> {
    let invoice = apply_update(&state, &user.owner_id, &invoice_id, None, request).await?;
    Ok(Json(InvoiceActionResponse {
        message: "Invoice updated".to_string(),
        invoice,
    }))
}

/// POST /api/invoice/:invoice_id/reevaluate
pub async fn reevaluate(
    State(state): State<AppState>,
    user: AuthUser,
    Path(invoice_id): Path<String>,
) -> ApiResult<(StatusCode, Json<InvoiceActionResponse>)> {
    let invoice = state
        .orchestrator()
        .reevaluate_invoice(&user.owner_id, &invoice_id, None)
        .await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(InvoiceActionResponse {
            message: "Invoice reevaluation started".to_string(),
            invoice,
        }),
    ))
}

/// Manual edit first, then the approval flag
pub(crate) async fn apply_update(
    state: &AppState,
    owner_id: &str,
    invoice_id: &str,
    package_id: Option<&str>,
    request: UpdateInvoiceRequest,
) -> ApiResult<Invoice> {
    if request.structured.is_none() && request.is_approved.is_none() {
        return Err(ApiError::validation(
            "Nothing to update: send structured and/or isApproved",
        ));
    }

    let orchestrator = state.orchestrator();
    let mut updated = None;
    if let Some(fields) = request.structured {
        updated = Some(
            orchestrator
                .update_structured(owner_id, invoice_id, package_id, fields)
                .await?,
        );
    }

    if let Some(approved) = request.is_approved {
        let invoice = if approved {
            orchestrator.approve(owner_id, invoice_id, package_id).await?
        } else {
            orchestrator
                .revoke_approval(owner_id, invoice_id, package_id)
                .await?
        };
        info!(invoice_id = %invoice_id, approved, "Approval flag updated");
        updated = Some(invoice);
    }

    updated.ok_or_else(|| ApiError::validation("Nothing to update"))
}
