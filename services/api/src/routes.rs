use crate::infra::{AppState, EngineService};
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Path};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use casework::config::UploadLimits;
use casework::workflows::case_study::router::{actor_from_headers, error_response};
use casework::workflows::case_study::{case_study_router, ArtifactSlot, CaseStudyId, UploadedFile};
use serde_json::json;
use std::sync::Arc;

pub(crate) const FILE_NAME_HEADER: &str = "x-file-name";

/// Engine routes plus the raw upload route, whose body limit follows the configured file limits
/// so the upload policy sees every file it could accept.
pub(crate) fn with_case_study_routes(
    service: Arc<EngineService>,
    limits: UploadLimits,
) -> axum::Router {
    case_study_router(service.clone())
        .route(
            "/api/v1/case-studies/:case_study_id/files/:slot",
            axum::routing::post(upload_endpoint)
                .layer(DefaultBodyLimit::max(limits.largest_file_bytes())),
        )
        .layer(Extension(service))
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
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

/// Raw-bytes upload. The content type header wins; without one the file name decides.
pub(crate) async fn upload_endpoint(
    Extension(service): Extension<Arc<EngineService>>,
    headers: HeaderMap,
    Path((case_study_id, slot)): Path<(String, ArtifactSlot)>,
    body: Bytes,
) -> Response {
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };

    let file_name = headers
        .get(FILE_NAME_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or("upload")
        .to_string();
    let content_type = declared_content_type(&headers)
        .unwrap_or_else(|| mime_guess::from_path(&file_name).first_or_octet_stream().to_string());

    let file = UploadedFile {
        file_name,
        content_type,
        bytes: body.to_vec(),
    };

    match service.upload_file(&actor, &CaseStudyId(case_study_id), slot, file) {
        Ok(record) => (StatusCode::OK, Json(record.status_view())).into_response(),
        Err(error) => error_response(error),
    }
}

fn declared_content_type(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty() && *value != "application/octet-stream")
        .map(str::to_string)
}
