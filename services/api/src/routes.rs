use crate::infra::AppState;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Extension;
use axum::Json;
use formflux::error::AppError;
use formflux::workflows::intake::{
    intake_router, AlertChannel, Dispatcher, IntakeService, SessionRepository,
};
use formflux::workflows::ledger::{BugReport, BugSeverity, SubmissionLog};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

pub(crate) const ADMIN_PASS_HEADER: &str = "x-admin-pass";

#[derive(Debug, Deserialize)]
pub(crate) struct BugRequest {
    #[serde(default)]
    pub(crate) user: Option<String>,
    #[serde(default)]
    pub(crate) severity: BugSeverity,
    pub(crate) description: String,
}

pub(crate) fn with_portal_routes<R, D, A, L>(
    service: Arc<IntakeService<R, D, A, L>>,
) -> axum::Router
where
    R: SessionRepository + 'static,
    D: Dispatcher + 'static,
    A: AlertChannel + 'static,
    L: SubmissionLog + 'static,
{
    intake_router(service)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
        .route(
            "/api/v1/admin/submissions",
            axum::routing::get(admin_submissions_endpoint),
        )
        .route("/api/v1/bugs", axum::routing::post(bug_report_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

/// Submission log for staff, gated by the admin password header.
pub(crate) async fn admin_submissions_endpoint(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let supplied = headers
        .get(ADMIN_PASS_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if supplied != &*state.admin_pass {
        let payload = json!({ "error": "admin password required" });
        return Ok((StatusCode::UNAUTHORIZED, Json(payload)).into_response());
    }

    let entries = state.submissions.entries()?;
    Ok((StatusCode::OK, Json(entries)).into_response())
}

pub(crate) async fn bug_report_endpoint(
    Extension(state): Extension<AppState>,
    Json(request): Json<BugRequest>,
) -> Result<Response, AppError> {
    let description = request.description.trim();
    if description.is_empty() {
        let payload = json!({ "error": "description is required" });
        return Ok((StatusCode::UNPROCESSABLE_ENTITY, Json(payload)).into_response());
    }

    let user = request
        .user
        .as_deref()
        .map(str::trim)
        .filter(|user| !user.is_empty())
        .unwrap_or("User");
    let report = BugReport::new(user, request.severity, description);
    state.bugs.append(&report)?;
    Ok((StatusCode::CREATED, Json(report)).into_response())
}
