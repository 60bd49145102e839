//! API routes (mounted under `/api`)

pub mod invoices;
pub mod packages;
pub mod upload;

use crate::state::AppState;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Router,
};

pub fn api_routes(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        // Single invoices
        .route("/invoice", get(invoices::list_invoices))
        .route(
            "/invoice/scan",
            post(invoices::scan).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route(
            "/invoice/scan-background",
            post(invoices::scan_background).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/invoice/stats", get(invoices::stats))
        .route("/invoice/export.json", get(invoices::export))
        .route(
            "/invoice/:invoice_id",
            get(invoices::get_invoice).put(invoices::update_invoice),
        )
        .route("/invoice/:invoice_id/reevaluate", post(invoices::reevaluate))
        // Packages
        .route(
            "/packages",
            get(packages::list_packages)
                .post(packages::create_package)
                .layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/packages/:package_id", get(packages::get_package))
        .route("/packages/:package_id/invoices", get(packages::list_invoices))
        .route("/packages/:package_id/export.json", get(packages::export))
        .route("/packages/:package_id/reevaluate", post(packages::reevaluate_package))
        .route(
            "/packages/:package_id/invoices/:invoice_id",
            get(packages::get_invoice).put(packages::update_invoice),
        )
        .route(
            "/packages/:package_id/invoices/:invoice_id/structured",
            put(packages::update_structured),
        )
        .route(
            "/packages/:package_id/invoices/:invoice_id/approve",
            post(packages::approve),
        )
        .route(
            "/packages/:package_id/invoices/:invoice_id/reject",
            post(packages::reject),
        )
        .route(
            "/packages/:package_id/invoices/:invoice_id/revoke",
            post(packages::revoke),
        )
        .route(
            "/packages/:package_id/invoices/:invoice_id/reevaluate",
            post(packages::reevaluate_invoice),
        )
}
