use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use base64::Engine as _;
use serde::Deserialize;
use serde_json::json;

use super::catalog::CatalogError;
use super::gateways::{AlertChannel, Dispatcher, RepositoryError, SessionId, SessionRepository};
use super::service::{Credential, IntakeService, ReviewDecision, ServiceError, SessionRequest};
use super::session::IntakeError;
use crate::workflows::ledger::SubmissionLog;

#[derive(Debug, Deserialize)]
pub(crate) struct CreateSessionRequest {
    access_code: String,
    #[serde(default)]
    forms: Vec<String>,
    #[serde(default)]
    language: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AnswerRequest {
    answer: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BiometricsRequest {
    selfie: String,
    government_id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReviewRequest {
    decision: ReviewDecision,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubmitRequest {
    signature: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LanguageRequest {
    language: String,
}

/// Router exposing the intake wizard over HTTP. Binary payloads are base64 in JSON.
pub fn intake_router<R, D, A, L>(service: Arc<IntakeService<R, D, A, L>>) -> Router
where
    R: SessionRepository + 'static,
    D: Dispatcher + 'static,
    A: AlertChannel + 'static,
    L: SubmissionLog + 'static,
{
    Router::new()
        .route("/api/v1/forms", get(forms_handler::<R, D, A, L>))
        .route("/api/v1/intake/sessions", post(open_handler::<R, D, A, L>))
        .route(
            "/api/v1/intake/sessions/:session_id",
            get(view_handler::<R, D, A, L>).delete(abandon_handler::<R, D, A, L>),
        )
        .route(
            "/api/v1/intake/sessions/:session_id/start",
            post(start_handler::<R, D, A, L>),
        )
        .route(
            "/api/v1/intake/sessions/:session_id/answer",
            post(answer_handler::<R, D, A, L>),
        )
        .route(
            "/api/v1/intake/sessions/:session_id/back",
            post(back_handler::<R, D, A, L>),
        )
        .route(
            "/api/v1/intake/sessions/:session_id/language",
            post(language_handler::<R, D, A, L>),
        )
        .route(
            "/api/v1/intake/sessions/:session_id/biometrics",
            post(biometrics_handler::<R, D, A, L>),
        )
        .route(
            "/api/v1/intake/sessions/:session_id/review",
            post(review_handler::<R, D, A, L>),
        )
        .route(
            "/api/v1/intake/sessions/:session_id/submit",
            post(submit_handler::<R, D, A, L>),
        )
        .route(
            "/api/v1/intake/sessions/:session_id/retry",
            post(retry_handler::<R, D, A, L>),
        )
        .with_state(service)
}

type Shared<R, D, A, L> = State<Arc<IntakeService<R, D, A, L>>>;

pub(crate) async fn forms_handler<R, D, A, L>(State(service): Shared<R, D, A, L>) -> Response
where
    R: SessionRepository + 'static,
    D: Dispatcher + 'static,
    A: AlertChannel + 'static,
    L: SubmissionLog + 'static,
{
    (StatusCode::OK, axum::Json(service.forms())).into_response()
}

pub(crate) async fn open_handler<R, D, A, L>(
    State(service): Shared<R, D, A, L>,
    axum::Json(request): axum::Json<CreateSessionRequest>,
) -> Response
where
    R: SessionRepository + 'static,
    D: Dispatcher + 'static,
    A: AlertChannel + 'static,
    L: SubmissionLog + 'static,
{
    let request = SessionRequest {
        credential: Credential::AccessCode(request.access_code),
        forms: request.forms,
        language: request.language,
    };
    respond(
        StatusCode::CREATED,
        run(move || service.open(request)).await,
    )
}

pub(crate) async fn view_handler<R, D, A, L>(
    State(service): Shared<R, D, A, L>,
    Path(session_id): Path<String>,
) -> Response
where
    R: SessionRepository + 'static,
    D: Dispatcher + 'static,
    A: AlertChannel + 'static,
    L: SubmissionLog + 'static,
{
    let id = SessionId(session_id);
    respond(StatusCode::OK, run(move || service.view(&id)).await)
}

pub(crate) async fn abandon_handler<R, D, A, L>(
    State(service): Shared<R, D, A, L>,
    Path(session_id): Path<String>,
) -> Response
where
    R: SessionRepository + 'static,
    D: Dispatcher + 'static,
    A: AlertChannel + 'static,
    L: SubmissionLog + 'static,
{
    let id = SessionId(session_id);
    match run(move || service.abandon(&id)).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn start_handler<R, D, A, L>(
    State(service): Shared<R, D, A, L>,
    Path(session_id): Path<String>,
) -> Response
where
    R: SessionRepository + 'static,
    D: Dispatcher + 'static,
    A: AlertChannel + 'static,
    L: SubmissionLog + 'static,
{
    let id = SessionId(session_id);
    respond(StatusCode::OK, run(move || service.start(&id)).await)
}

pub(crate) async fn answer_handler<R, D, A, L>(
    State(service): Shared<R, D, A, L>,
    Path(session_id): Path<String>,
    axum::Json(request): axum::Json<AnswerRequest>,
) -> Response
where
    R: SessionRepository + 'static,
    D: Dispatcher + 'static,
    A: AlertChannel + 'static,
    L: SubmissionLog + 'static,
{
    let id = SessionId(session_id);
    respond(
        StatusCode::OK,
        run(move || service.answer(&id, &request.answer)).await,
    )
}

pub(crate) async fn back_handler<R, D, A, L>(
    State(service): Shared<R, D, A, L>,
    Path(session_id): Path<String>,
) -> Response
where
    R: SessionRepository + 'static,
    D: Dispatcher + 'static,
    A: AlertChannel + 'static,
    L: SubmissionLog + 'static,
{
    let id = SessionId(session_id);
    respond(StatusCode::OK, run(move || service.back(&id)).await)
}

pub(crate) async fn language_handler<R, D, A, L>(
    State(service): Shared<R, D, A, L>,
    Path(session_id): Path<String>,
    axum::Json(request): axum::Json<LanguageRequest>,
) -> Response
where
    R: SessionRepository + 'static,
    D: Dispatcher + 'static,
    A: AlertChannel + 'static,
    L: SubmissionLog + 'static,
{
    let id = SessionId(session_id);
    respond(
        StatusCode::OK,
        run(move || service.set_language(&id, &request.language)).await,
    )
}

pub(crate) async fn biometrics_handler<R, D, A, L>(
    State(service): Shared<R, D, A, L>,
    Path(session_id): Path<String>,
    axum::Json(request): axum::Json<BiometricsRequest>,
) -> Response
where
    R: SessionRepository + 'static,
    D: Dispatcher + 'static,
    A: AlertChannel + 'static,
    L: SubmissionLog + 'static,
{
    let (selfie, government_id) = match (
        decode_payload("selfie", &request.selfie),
        decode_payload("government_id", &request.government_id),
    ) {
        (Ok(selfie), Ok(government_id)) => (selfie, government_id),
        (Err(response), _) | (_, Err(response)) => return response,
    };
    let id = SessionId(session_id);
    respond(
        StatusCode::OK,
        run(move || service.biometrics(&id, selfie, government_id)).await,
    )
}

pub(crate) async fn review_handler<R, D, A, L>(
    State(service): Shared<R, D, A, L>,
    Path(session_id): Path<String>,
    axum::Json(request): axum::Json<ReviewRequest>,
) -> Response
where
    R: SessionRepository + 'static,
    D: Dispatcher + 'static,
    A: AlertChannel + 'static,
    L: SubmissionLog + 'static,
{
    let id = SessionId(session_id);
    respond(
        StatusCode::OK,
        run(move || service.review(&id, request.decision)).await,
    )
}

pub(crate) async fn submit_handler<R, D, A, L>(
    State(service): Shared<R, D, A, L>,
    Path(session_id): Path<String>,
    axum::Json(request): axum::Json<SubmitRequest>,
) -> Response
where
    R: SessionRepository + 'static,
    D: Dispatcher + 'static,
    A: AlertChannel + 'static,
    L: SubmissionLog + 'static,
{
    let signature = match decode_payload("signature", &request.signature) {
        Ok(signature) => signature,
        Err(response) => return response,
    };
    let id = SessionId(session_id);
    respond(
        StatusCode::OK,
        run(move || service.submit(&id, signature)).await,
    )
}

pub(crate) async fn retry_handler<R, D, A, L>(
    State(service): Shared<R, D, A, L>,
    Path(session_id): Path<String>,
) -> Response
where
    R: SessionRepository + 'static,
    D: Dispatcher + 'static,
    A: AlertChannel + 'static,
    L: SubmissionLog + 'static,
{
    let id = SessionId(session_id);
    respond(StatusCode::OK, run(move || service.retry(&id)).await)
}

/// Service calls block on file IO and outbound HTTP, so they run off the async workers.
async fn run<T, F>(work: F) -> Result<T, ServiceError>
where
    F: FnOnce() -> Result<T, ServiceError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| ServiceError::Worker(err.to_string()))?
}

fn respond<T: serde::Serialize>(status: StatusCode, result: Result<T, ServiceError>) -> Response {
    match result {
        Ok(body) => (status, axum::Json(body)).into_response(),
        Err(err) => error_response(err),
    }
}

fn decode_payload(field: &str, encoded: &str) -> Result<Vec<u8>, Response> {
    base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|err| {
            let payload = json!({
                "error": format!("{field} is not valid base64: {err}"),
            });
            (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(payload)).into_response()
        })
}

pub(crate) fn error_response(err: ServiceError) -> Response {
    let status = match &err {
        ServiceError::Intake(IntakeError::Unauthenticated) => StatusCode::UNAUTHORIZED,
        ServiceError::Intake(IntakeError::Validation(_))
        | ServiceError::Intake(IntakeError::InvalidStage { .. })
        | ServiceError::Intake(IntakeError::EmptyQueue)
        | ServiceError::Intake(IntakeError::Catalog(CatalogError::FormNotFound(_))) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        ServiceError::Repository(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
        ServiceError::Repository(RepositoryError::Conflict) => StatusCode::CONFLICT,
        ServiceError::Repository(RepositoryError::Unavailable(_)) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        ServiceError::Dispatch(report) => {
            let payload = json!({
                "error": err.to_string(),
                "report": report,
            });
            return (StatusCode::BAD_GATEWAY, axum::Json(payload)).into_response();
        }
        ServiceError::Intake(_) | ServiceError::Ledger(_) | ServiceError::Worker(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    let payload = json!({
        "error": err.to_string(),
    });
    (status, axum::Json(payload)).into_response()
}
