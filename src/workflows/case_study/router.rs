use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::domain::{
    Actor, CaseStudyId, CaseStudyStatus, CorrectionArtifacts, LegalArea, NewCaseStudyRequest,
    Role, UserId, VacationWindow,
};
use super::ledger::LedgerError;
use super::lifecycle::LifecycleError;
use super::repository::{BlobStorage, CaseStudyStore, NotificationSink, RepositoryError};
use super::service::{CaseStudyService, CaseStudyServiceError, FeedbackInput};
use super::uploads::UploadError;

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

#[derive(Debug, Deserialize)]
pub struct CreateCaseStudyBody {
    #[serde(default)]
    pub student_id: Option<UserId>,
    pub legal_area: LegalArea,
    #[serde(default)]
    pub sub_area: Option<String>,
    #[serde(default)]
    pub focus_area: Option<String>,
    #[serde(default)]
    pub federal_state: Option<String>,
    #[serde(default)]
    pub random_assignment: bool,
}

#[derive(Debug, Deserialize)]
pub struct UrlBody {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct UrlsBody {
    pub urls: Vec<String>,
}

/// Payload of the grade-save RPC.
#[derive(Debug, Deserialize)]
pub struct GradeBody {
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RatingBody {
    pub stars: u8,
    #[serde(default)]
    pub feedback: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusBody {
    pub status: CaseStudyStatus,
}

#[derive(Debug, Deserialize)]
pub struct AssigneeBody {
    pub instructor_id: UserId,
}

#[derive(Debug, Deserialize)]
pub struct VacationBody {
    pub enabled: bool,
    #[serde(default)]
    pub window: Option<VacationWindow>,
}

#[derive(Debug, Deserialize)]
pub struct CreditsBody {
    pub amount: i64,
}

#[derive(Debug, Deserialize)]
pub struct CalendarBody {
    pub today: NaiveDate,
}

#[derive(Debug, Serialize)]
struct ReassignmentView {
    case_study_id: CaseStudyId,
    from: UserId,
    to: UserId,
}

/// Router builder exposing the case study orchestrator over HTTP.
pub fn case_study_router<S, N, B>(service: Arc<CaseStudyService<S, N, B>>) -> Router
where
    S: CaseStudyStore + 'static,
    N: NotificationSink + 'static,
    B: BlobStorage + 'static,
{
    Router::new()
        .route("/api/v1/case-studies", post(create_handler::<S, N, B>))
        .route(
            "/api/v1/case-studies/:case_study_id",
            get(fetch_handler::<S, N, B>),
        )
        .route(
            "/api/v1/case-studies/:case_study_id/materials",
            post(materials_handler::<S, N, B>),
        )
        .route(
            "/api/v1/case-studies/:case_study_id/additional-materials",
            post(additional_materials_handler::<S, N, B>),
        )
        .route(
            "/api/v1/case-studies/:case_study_id/submission",
            post(submission_handler::<S, N, B>),
        )
        .route(
            "/api/v1/case-studies/:case_study_id/submission/download",
            post(download_handler::<S, N, B>),
        )
        .route(
            "/api/v1/case-studies/:case_study_id/correction",
            post(correction_handler::<S, N, B>),
        )
        .route(
            "/api/v1/case-studies/:case_study_id/access/:artifact",
            post(access_handler::<S, N, B>),
        )
        .route(
            "/api/v1/case-studies/:case_study_id/grade",
            get(grade_handler::<S, N, B>).put(save_grade_handler::<S, N, B>),
        )
        .route(
            "/api/v1/case-studies/:case_study_id/rating",
            put(rating_handler::<S, N, B>),
        )
        .route(
            "/api/v1/case-studies/:case_study_id/feedback",
            put(feedback_handler::<S, N, B>),
        )
        .route(
            "/api/v1/case-studies/:case_study_id/status",
            put(force_status_handler::<S, N, B>),
        )
        .route(
            "/api/v1/case-studies/:case_study_id/assignee",
            put(assignee_handler::<S, N, B>),
        )
        .route(
            "/api/v1/instructors/:user_id/vacation",
            post(vacation_handler::<S, N, B>),
        )
        .route(
            "/api/v1/vacations/calendar",
            post(calendar_handler::<S, N, B>),
        )
        .route(
            "/api/v1/students/:user_id/credits",
            post(credits_handler::<S, N, B>),
        )
        .route(
            "/api/v1/students/:user_id/overview",
            get(overview_handler::<S, N, B>),
        )
        .with_state(service)
}

type SharedService<S, N, B> = State<Arc<CaseStudyService<S, N, B>>>;

/// Read the caller identity forwarded by the authentication layer.
pub fn actor_from_headers(headers: &HeaderMap) -> Result<Actor, Response> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    };

    let unauthorized = |message: String| {
        (StatusCode::UNAUTHORIZED, Json(json!({ "error": message }))).into_response()
    };

    let id = header(ACTOR_ID_HEADER)
        .ok_or_else(|| unauthorized(format!("missing {ACTOR_ID_HEADER} header")))?;
    let role = header(ACTOR_ROLE_HEADER)
        .ok_or_else(|| unauthorized(format!("missing {ACTOR_ROLE_HEADER} header")))?
        .parse::<Role>()
        .map_err(|error| unauthorized(error.to_string()))?;

    Ok(Actor::new(id, role))
}

/// Map service errors onto HTTP statuses with a JSON error body.
pub fn error_response(error: CaseStudyServiceError) -> Response {
    let status = match &error {
        CaseStudyServiceError::InvalidRequestShape(_)
        | CaseStudyServiceError::InvalidRating(_)
        | CaseStudyServiceError::Grade(_)
        | CaseStudyServiceError::Ledger(LedgerError::InvalidAmount(_))
        | CaseStudyServiceError::Ledger(LedgerError::BalanceOverflow { .. })
        | CaseStudyServiceError::Lifecycle(LifecycleError::MissingArtifact(_))
        | CaseStudyServiceError::Upload(UploadError::Empty { .. })
        | CaseStudyServiceError::Upload(UploadError::InvalidVideoLink(_)) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        CaseStudyServiceError::Upload(UploadError::TooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
        CaseStudyServiceError::Upload(UploadError::WrongType { .. }) => {
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        }
        CaseStudyServiceError::Ledger(LedgerError::InsufficientCredits { .. }) => {
            StatusCode::PAYMENT_REQUIRED
        }
        CaseStudyServiceError::Lifecycle(LifecycleError::InvalidTransition { .. })
        | CaseStudyServiceError::Repository(RepositoryError::Conflict)
        | CaseStudyServiceError::Ledger(LedgerError::Repository(RepositoryError::Conflict)) => {
            StatusCode::CONFLICT
        }
        CaseStudyServiceError::Forbidden { .. } => StatusCode::FORBIDDEN,
        CaseStudyServiceError::CaseStudyNotFound(_)
        | CaseStudyServiceError::UserNotFound(_)
        | CaseStudyServiceError::Repository(RepositoryError::NotFound)
        | CaseStudyServiceError::Ledger(LedgerError::Repository(RepositoryError::NotFound)) => {
            StatusCode::NOT_FOUND
        }
        CaseStudyServiceError::Blob(_)
        | CaseStudyServiceError::Repository(RepositoryError::Unavailable(_))
        | CaseStudyServiceError::Ledger(LedgerError::Repository(RepositoryError::Unavailable(
            _,
        ))) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let payload = json!({ "error": error.to_string() });
    (status, Json(payload)).into_response()
}

fn respond<T: Serialize>(status: StatusCode, result: Result<T, CaseStudyServiceError>) -> Response {
    match result {
        Ok(body) => (status, Json(body)).into_response(),
        Err(error) => error_response(error),
    }
}

macro_rules! actor_or_return {
    ($headers:expr) => {
        match actor_from_headers(&$headers) {
            Ok(actor) => actor,
            Err(response) => return response,
        }
    };
}

pub(crate) async fn create_handler<S, N, B>(
    State(service): SharedService<S, N, B>,
    headers: HeaderMap,
    Json(body): Json<CreateCaseStudyBody>,
) -> Response
where
    S: CaseStudyStore + 'static,
    N: NotificationSink + 'static,
    B: BlobStorage + 'static,
{
    let actor = actor_or_return!(headers);
    let request = NewCaseStudyRequest {
        student_id: body.student_id.unwrap_or_else(|| actor.id.clone()),
        legal_area: body.legal_area,
        sub_area: body.sub_area,
        focus_area: body.focus_area,
        federal_state: body.federal_state,
        random_assignment: body.random_assignment,
    };
    respond(
        StatusCode::CREATED,
        service.create_request(&actor, request),
    )
}

pub(crate) async fn fetch_handler<S, N, B>(
    State(service): SharedService<S, N, B>,
    headers: HeaderMap,
    Path(case_study_id): Path<String>,
) -> Response
where
    S: CaseStudyStore + 'static,
    N: NotificationSink + 'static,
    B: BlobStorage + 'static,
{
    let actor = actor_or_return!(headers);
    respond(
        StatusCode::OK,
        service.get(&actor, &CaseStudyId(case_study_id)),
    )
}

pub(crate) async fn materials_handler<S, N, B>(
    State(service): SharedService<S, N, B>,
    headers: HeaderMap,
    Path(case_study_id): Path<String>,
    Json(body): Json<UrlBody>,
) -> Response
where
    S: CaseStudyStore + 'static,
    N: NotificationSink + 'static,
    B: BlobStorage + 'static,
{
    let actor = actor_or_return!(headers);
    let result = service
        .attach_case_material(&actor, &CaseStudyId(case_study_id), body.url)
        .map(|record| record.status_view());
    respond(StatusCode::OK, result)
}

pub(crate) async fn additional_materials_handler<S, N, B>(
    State(service): SharedService<S, N, B>,
    headers: HeaderMap,
    Path(case_study_id): Path<String>,
    Json(body): Json<UrlsBody>,
) -> Response
where
    S: CaseStudyStore + 'static,
    N: NotificationSink + 'static,
    B: BlobStorage + 'static,
{
    let actor = actor_or_return!(headers);
    let result = service
        .attach_additional_materials(&actor, &CaseStudyId(case_study_id), body.urls)
        .map(|record| record.status_view());
    respond(StatusCode::OK, result)
}

pub(crate) async fn submission_handler<S, N, B>(
    State(service): SharedService<S, N, B>,
    headers: HeaderMap,
    Path(case_study_id): Path<String>,
    Json(body): Json<UrlBody>,
) -> Response
where
    S: CaseStudyStore + 'static,
    N: NotificationSink + 'static,
    B: BlobStorage + 'static,
{
    let actor = actor_or_return!(headers);
    let result = service
        .submit_solution(&actor, &CaseStudyId(case_study_id), body.url)
        .map(|record| record.status_view());
    respond(StatusCode::OK, result)
}

pub(crate) async fn download_handler<S, N, B>(
    State(service): SharedService<S, N, B>,
    headers: HeaderMap,
    Path(case_study_id): Path<String>,
) -> Response
where
    S: CaseStudyStore + 'static,
    N: NotificationSink + 'static,
    B: BlobStorage + 'static,
{
    let actor = actor_or_return!(headers);
    let result = service
        .download_submission(&actor, &CaseStudyId(case_study_id))
        .map(|record| {
            json!({
                "case_study_id": record.id,
                "status": record.status,
                "submission_url": record.artifacts.submission_url,
                "submission_downloaded_at": record.access.submission_downloaded_at,
            })
        });
    respond(StatusCode::OK, result)
}

pub(crate) async fn correction_handler<S, N, B>(
    State(service): SharedService<S, N, B>,
    headers: HeaderMap,
    Path(case_study_id): Path<String>,
    Json(body): Json<CorrectionArtifacts>,
) -> Response
where
    S: CaseStudyStore + 'static,
    N: NotificationSink + 'static,
    B: BlobStorage + 'static,
{
    let actor = actor_or_return!(headers);
    let result = service
        .upload_correction(&actor, &CaseStudyId(case_study_id), body)
        .map(|record| record.status_view());
    respond(StatusCode::OK, result)
}

pub(crate) async fn access_handler<S, N, B>(
    State(service): SharedService<S, N, B>,
    headers: HeaderMap,
    Path((case_study_id, artifact)): Path<(String, String)>,
) -> Response
where
    S: CaseStudyStore + 'static,
    N: NotificationSink + 'static,
    B: BlobStorage + 'static,
{
    let actor = actor_or_return!(headers);
    let id = CaseStudyId(case_study_id);
    let result = match artifact.as_str() {
        "video" => service.mark_video_viewed(&actor, &id),
        "pdf" => service.mark_pdf_downloaded(&actor, &id),
        "correction" => service.mark_correction_viewed(&actor, &id),
        other => {
            let payload = json!({ "error": format!("unknown artifact '{other}'") });
            return (StatusCode::NOT_FOUND, Json(payload)).into_response();
        }
    };
    respond(StatusCode::OK, result.map(|record| record.access))
}

pub(crate) async fn grade_handler<S, N, B>(
    State(service): SharedService<S, N, B>,
    headers: HeaderMap,
    Path(case_study_id): Path<String>,
) -> Response
where
    S: CaseStudyStore + 'static,
    N: NotificationSink + 'static,
    B: BlobStorage + 'static,
{
    let actor = actor_or_return!(headers);
    let id = CaseStudyId(case_study_id);
    let result = service
        .get(&actor, &id)
        .and_then(|_| service.grade(&id));
    respond(StatusCode::OK, result)
}

pub(crate) async fn save_grade_handler<S, N, B>(
    State(service): SharedService<S, N, B>,
    headers: HeaderMap,
    Path(case_study_id): Path<String>,
    Json(body): Json<GradeBody>,
) -> Response
where
    S: CaseStudyStore + 'static,
    N: NotificationSink + 'static,
    B: BlobStorage + 'static,
{
    let actor = actor_or_return!(headers);
    respond(
        StatusCode::OK,
        service.save_grade(&actor, &CaseStudyId(case_study_id), body.value, body.text),
    )
}

pub(crate) async fn rating_handler<S, N, B>(
    State(service): SharedService<S, N, B>,
    headers: HeaderMap,
    Path(case_study_id): Path<String>,
    Json(body): Json<RatingBody>,
) -> Response
where
    S: CaseStudyStore + 'static,
    N: NotificationSink + 'static,
    B: BlobStorage + 'static,
{
    let actor = actor_or_return!(headers);
    respond(
        StatusCode::OK,
        service.rate(
            &actor,
            &CaseStudyId(case_study_id),
            body.stars,
            body.feedback,
        ),
    )
}

pub(crate) async fn feedback_handler<S, N, B>(
    State(service): SharedService<S, N, B>,
    headers: HeaderMap,
    Path(case_study_id): Path<String>,
    Json(body): Json<FeedbackInput>,
) -> Response
where
    S: CaseStudyStore + 'static,
    N: NotificationSink + 'static,
    B: BlobStorage + 'static,
{
    let actor = actor_or_return!(headers);
    respond(
        StatusCode::OK,
        service.give_feedback(&actor, &CaseStudyId(case_study_id), body),
    )
}

pub(crate) async fn force_status_handler<S, N, B>(
    State(service): SharedService<S, N, B>,
    headers: HeaderMap,
    Path(case_study_id): Path<String>,
    Json(body): Json<StatusBody>,
) -> Response
where
    S: CaseStudyStore + 'static,
    N: NotificationSink + 'static,
    B: BlobStorage + 'static,
{
    let actor = actor_or_return!(headers);
    let result = service
        .force_status(&actor, &CaseStudyId(case_study_id), body.status)
        .map(|record| record.status_view());
    respond(StatusCode::OK, result)
}

pub(crate) async fn assignee_handler<S, N, B>(
    State(service): SharedService<S, N, B>,
    headers: HeaderMap,
    Path(case_study_id): Path<String>,
    Json(body): Json<AssigneeBody>,
) -> Response
where
    S: CaseStudyStore + 'static,
    N: NotificationSink + 'static,
    B: BlobStorage + 'static,
{
    let actor = actor_or_return!(headers);
    let result = service
        .assign_instructor(&actor, &CaseStudyId(case_study_id), &body.instructor_id)
        .map(|record| record.status_view());
    respond(StatusCode::OK, result)
}

pub(crate) async fn vacation_handler<S, N, B>(
    State(service): SharedService<S, N, B>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
    Json(body): Json<VacationBody>,
) -> Response
where
    S: CaseStudyStore + 'static,
    N: NotificationSink + 'static,
    B: BlobStorage + 'static,
{
    let actor = actor_or_return!(headers);
    let result = service
        .toggle_vacation(&actor, &UserId(user_id), body.enabled, body.window)
        .map(|moved| {
            moved
                .into_iter()
                .map(|outcome| ReassignmentView {
                    case_study_id: outcome.request.id,
                    from: outcome.from,
                    to: outcome.to,
                })
                .collect::<Vec<_>>()
        });
    respond(StatusCode::OK, result)
}

pub(crate) async fn calendar_handler<S, N, B>(
    State(service): SharedService<S, N, B>,
    headers: HeaderMap,
    Json(body): Json<CalendarBody>,
) -> Response
where
    S: CaseStudyStore + 'static,
    N: NotificationSink + 'static,
    B: BlobStorage + 'static,
{
    let actor = actor_or_return!(headers);
    let result = service
        .apply_vacation_calendar(&actor, body.today)
        .map(|toggled| {
            toggled
                .into_iter()
                .map(|(user_id, on_duty)| json!({ "user_id": user_id, "on_duty": on_duty }))
                .collect::<Vec<_>>()
        });
    respond(StatusCode::OK, result)
}

pub(crate) async fn credits_handler<S, N, B>(
    State(service): SharedService<S, N, B>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
    Json(body): Json<CreditsBody>,
) -> Response
where
    S: CaseStudyStore + 'static,
    N: NotificationSink + 'static,
    B: BlobStorage + 'static,
{
    let actor = actor_or_return!(headers);
    let student = UserId(user_id);
    let result = service
        .grant_credits(&actor, &student, body.amount)
        .map(|balance| json!({ "student_id": student, "credit_balance": balance }));
    respond(StatusCode::OK, result)
}

pub(crate) async fn overview_handler<S, N, B>(
    State(service): SharedService<S, N, B>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> Response
where
    S: CaseStudyStore + 'static,
    N: NotificationSink + 'static,
    B: BlobStorage + 'static,
{
    let actor = actor_or_return!(headers);
    respond(
        StatusCode::OK,
        service.student_overview(&actor, &UserId(user_id)),
    )
}
