//! Manual pass triggers for operators.
//!
//! Mounted only when `ADMIN_ROUTES_ENABLED` is set. A triggered pass waits
//! for any scheduled pass of the same kind to finish first.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};

use crate::app_state::AppState;
use crate::service::{MailerReport, ScanReport};

/// `POST /admin/scan`: Run one scanner pass now.
#[utoipa::path(
    post,
    path = "/admin/scan",
    tag = "Admin",
    summary = "Run a scanner pass",
    description = "Runs one notification scanner pass immediately and returns its report.",
    responses(
        (status = 200, description = "Pass finished", body = ScanReport),
    )
)]
pub async fn scan_handler(State(state): State<AppState>) -> Json<ScanReport> {
    tracing::info!("scanner pass triggered manually");
    Json(state.scanner.scan().await)
}

/// `POST /admin/mailer`: Run one mailer pass now.
#[utoipa::path(
    post,
    path = "/admin/mailer",
    tag = "Admin",
    summary = "Run a mailer pass",
    description = "Sends all currently unsent notifications and returns the pass report.",
    responses(
        (status = 200, description = "Pass finished", body = MailerReport),
    )
)]
pub async fn mailer_handler(State(state): State<AppState>) -> Json<MailerReport> {
    tracing::info!("mailer pass triggered manually");
    Json(state.mailer.run().await)
}

/// Admin routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/admin/scan", post(scan_handler))
        .route("/admin/mailer", post(mailer_handler))
}
