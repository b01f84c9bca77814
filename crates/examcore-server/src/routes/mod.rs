pub mod admin;
pub mod auth;
pub mod health;
pub mod ip;
pub mod middleware;
pub mod ready;
pub mod student;
pub mod upload;

#[cfg(test)]
pub mod test_helpers;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// Assembles the full route table and layers the per-IP rate limiter ahead
/// of every handler. `TraceLayer` is applied by the binary entrypoint rather
/// than here, so tests that build a router directly don't pay for span
/// instrumentation they never assert on.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(ready::ready))
        .route("/auth/staff/login", post(auth::staff_login))
        .route("/auth/staff/logout", post(auth::staff_logout))
        .route("/auth/student/login", post(auth::student_login))
        .route("/auth/student/logout", post(auth::student_logout))
        .route("/upload/single", post(upload::upload_single))
        .route("/upload/bulk", post(upload::upload_bulk))
        .route("/upload/all", get(upload::list_all))
        .route("/upload/auto-processed", get(upload::list_auto_processed))
        .route("/extract/scan-upload", post(upload::scan_upload))
        .route("/student/dashboard", get(student::dashboard))
        .route("/student/paper/:id/view", get(student::view_paper))
        .route("/student/submit/:id", post(student::submit))
        .route("/admin/mappings", get(admin::list_mappings).post(admin::upsert_mapping))
        .route("/admin/audit", get(admin::list_audit_log))
        .route("/admin/unassigned", get(admin::list_unassigned))
        .route("/admin/artifacts/:id", axum::routing::delete(admin::delete_artifact))
        .route("/admin/purge-all", post(admin::purge_all))
        .layer(axum::middleware::from_fn_with_state(state.clone(), middleware::general_rate_limit))
        .with_state(state)
}
