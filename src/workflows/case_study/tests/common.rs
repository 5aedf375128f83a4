use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{header, Method, Request};
use axum::response::Response;
use serde_json::Value;

use crate::config::EngineConfig;
use crate::workflows::case_study::domain::{
    Actor, CaseStudyId, CaseStudyRequest, CaseStudyStatus, CorrectionArtifacts, Grade, LegalArea,
    NewCaseStudyRequest, Rating, Role, StudentFeedback, User, UserId,
};
use crate::workflows::case_study::memory::InMemoryCaseStudyStore;
use crate::workflows::case_study::repository::{
    BlobError, BlobStorage, CaseStudyStore, CreditDebit, CreditGrant, Notification,
    NotificationError, NotificationKind, NotificationSink, RepositoryError,
};
use crate::workflows::case_study::router::{ACTOR_ID_HEADER, ACTOR_ROLE_HEADER};
use crate::workflows::case_study::uploads::UploadedFile;
use crate::workflows::case_study::{case_study_router, CaseStudyService};

pub(super) const STUDENT: &str = "stu-anna";
pub(super) const BROKE_STUDENT: &str = "stu-ben";
pub(super) const CIVIL_A: &str = "ins-civil-a";
pub(super) const CIVIL_B: &str = "ins-civil-b";
pub(super) const CIVIL_SPRINGER: &str = "spr-civil";
pub(super) const CRIMINAL: &str = "ins-crim-x";
pub(super) const CRIMINAL_SPRINGER: &str = "spr-crim-y";
pub(super) const PUBLIC: &str = "ins-public";
pub(super) const ADMIN: &str = "adm-root";

pub(super) fn users() -> Vec<User> {
    vec![
        User::student(STUDENT, 3),
        User::student(BROKE_STUDENT, 0),
        User::teaching(CIVIL_A, Role::Instructor, LegalArea::CivilLaw),
        User::teaching(CIVIL_B, Role::Instructor, LegalArea::CivilLaw),
        User::teaching(CIVIL_SPRINGER, Role::Springer, LegalArea::CivilLaw),
        User::teaching(CRIMINAL, Role::Instructor, LegalArea::CriminalLaw),
        User::teaching(CRIMINAL_SPRINGER, Role::Springer, LegalArea::CriminalLaw),
        User::teaching(PUBLIC, Role::Instructor, LegalArea::PublicLaw),
        User::admin(ADMIN),
    ]
}

pub(super) type MemoryService =
    CaseStudyService<InMemoryCaseStudyStore, MemoryNotifications, MemoryBlobs>;

pub(super) struct Harness {
    pub(super) service: Arc<MemoryService>,
    pub(super) store: Arc<InMemoryCaseStudyStore>,
    pub(super) notifications: Arc<MemoryNotifications>,
    pub(super) blobs: Arc<MemoryBlobs>,
}

pub(super) fn build_service() -> Harness {
    build_service_with(users())
}

pub(super) fn build_service_with(users: Vec<User>) -> Harness {
    let store = Arc::new(InMemoryCaseStudyStore::with_users(users));
    let notifications = Arc::new(MemoryNotifications::default());
    let blobs = Arc::new(MemoryBlobs::default());
    let service = Arc::new(CaseStudyService::new(
        store.clone(),
        notifications.clone(),
        blobs.clone(),
        EngineConfig::default(),
    ));
    Harness {
        service,
        store,
        notifications,
        blobs,
    }
}

pub(super) fn student() -> Actor {
    Actor::new(STUDENT, Role::Student)
}

pub(super) fn instructor(id: &str) -> Actor {
    Actor::new(id, Role::Instructor)
}

pub(super) fn springer(id: &str) -> Actor {
    Actor::new(id, Role::Springer)
}

pub(super) fn admin() -> Actor {
    Actor::new(ADMIN, Role::Admin)
}

pub(super) fn civil_request(student: &str) -> NewCaseStudyRequest {
    NewCaseStudyRequest {
        student_id: UserId(student.to_string()),
        legal_area: LegalArea::CivilLaw,
        sub_area: Some("Schuldrecht".to_string()),
        focus_area: Some("Kaufrecht".to_string()),
        federal_state: None,
        random_assignment: false,
    }
}

pub(super) fn criminal_request(student: &str) -> NewCaseStudyRequest {
    NewCaseStudyRequest {
        legal_area: LegalArea::CriminalLaw,
        sub_area: Some("Strafrecht AT".to_string()),
        focus_area: Some("Versuch".to_string()),
        ..civil_request(student)
    }
}

pub(super) fn public_request(student: &str, federal_state: Option<&str>) -> NewCaseStudyRequest {
    NewCaseStudyRequest {
        legal_area: LegalArea::PublicLaw,
        sub_area: Some("Verwaltungsrecht".to_string()),
        focus_area: Some("Polizeirecht".to_string()),
        federal_state: federal_state.map(str::to_string),
        ..civil_request(student)
    }
}

pub(super) fn written_correction() -> CorrectionArtifacts {
    CorrectionArtifacts {
        written_pdf_url: Some("memory://blobs/korrektur.pdf".to_string()),
        ..CorrectionArtifacts::default()
    }
}

pub(super) fn pdf(file_name: &str, size: usize) -> UploadedFile {
    UploadedFile {
        file_name: file_name.to_string(),
        content_type: "application/pdf".to_string(),
        bytes: vec![b'%'; size],
    }
}

/// Walk a fresh civil law request forward until it reaches `target`.
pub(super) fn request_in_status(harness: &Harness, target: CaseStudyStatus) -> CaseStudyRequest {
    let service = &harness.service;
    let mut record = service
        .create_request(&student(), civil_request(STUDENT))
        .expect("request created");
    let id = record.id.clone();
    let steps = [
        CaseStudyStatus::MaterialsReady,
        CaseStudyStatus::Submitted,
        CaseStudyStatus::UnderReview,
        CaseStudyStatus::Completed,
    ];
    for step in steps {
        if record.status == target {
            break;
        }
        record = match step {
            CaseStudyStatus::MaterialsReady => service
                .attach_case_material(&instructor(CIVIL_A), &id, "memory://blobs/sv.pdf".into())
                .expect("materials attached"),
            CaseStudyStatus::Submitted => service
                .submit_solution(&student(), &id, "memory://blobs/bearbeitung.pdf".into())
                .expect("solution submitted"),
            CaseStudyStatus::UnderReview => service
                .download_submission(&instructor(CIVIL_A), &id)
                .expect("submission downloaded"),
            _ => service
                .upload_correction(&instructor(CIVIL_A), &id, written_correction())
                .expect("correction uploaded"),
        };
    }
    assert_eq!(record.status, target);
    record
}

pub(super) fn stored(harness: &Harness, id: &CaseStudyId) -> CaseStudyRequest {
    harness
        .store
        .fetch_request(id)
        .expect("fetch succeeds")
        .expect("request present")
}

pub(super) fn balance(harness: &Harness, student: &str) -> u64 {
    harness
        .store
        .user(&UserId(student.to_string()))
        .expect("user lookup")
        .expect("user present")
        .credit_balance
}

#[derive(Default)]
pub(super) struct MemoryNotifications {
    events: Mutex<Vec<Notification>>,
}

impl MemoryNotifications {
    pub(super) fn events(&self) -> Vec<Notification> {
        self.events.lock().expect("notification mutex poisoned").clone()
    }

    pub(super) fn kinds_for(&self, user: &str) -> Vec<NotificationKind> {
        self.events()
            .into_iter()
            .filter(|event| event.user_id.0 == user)
            .map(|event| event.kind)
            .collect()
    }
}

impl NotificationSink for MemoryNotifications {
    fn notify(&self, notification: Notification) -> Result<(), NotificationError> {
        self.events
            .lock()
            .expect("notification mutex poisoned")
            .push(notification);
        Ok(())
    }
}

pub(super) struct FailingNotifications;

impl NotificationSink for FailingNotifications {
    fn notify(&self, _notification: Notification) -> Result<(), NotificationError> {
        Err(NotificationError::Transport("smtp relay offline".to_string()))
    }
}

#[derive(Default)]
pub(super) struct MemoryBlobs {
    uploads: AtomicUsize,
}

impl MemoryBlobs {
    pub(super) fn uploads(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }
}

impl BlobStorage for MemoryBlobs {
    fn upload(&self, _bytes: &[u8], content_type: &str) -> Result<String, BlobError> {
        let sequence = self.uploads.fetch_add(1, Ordering::SeqCst) + 1;
        let extension = if content_type == "application/pdf" {
            "pdf"
        } else {
            "bin"
        };
        Ok(format!("memory://blobs/{sequence:04}.{extension}"))
    }
}

/// Store that is reachable for reads of users but rejects every request insert.
pub(super) struct InsertConflictStore {
    pub(super) inner: InMemoryCaseStudyStore,
}

impl CaseStudyStore for InsertConflictStore {
    fn user(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        self.inner.user(id)
    }

    fn upsert_user(&self, user: User) -> Result<(), RepositoryError> {
        self.inner.upsert_user(user)
    }

    fn users_with_role(&self, role: Role) -> Result<Vec<User>, RepositoryError> {
        self.inner.users_with_role(role)
    }

    fn debit_credits(&self, id: &UserId, amount: u32) -> Result<CreditDebit, RepositoryError> {
        self.inner.debit_credits(id, amount)
    }

    fn add_credits(&self, id: &UserId, amount: u64) -> Result<CreditGrant, RepositoryError> {
        self.inner.add_credits(id, amount)
    }

    fn insert_request(
        &self,
        _record: CaseStudyRequest,
    ) -> Result<CaseStudyRequest, RepositoryError> {
        Err(RepositoryError::Conflict)
    }

    fn update_request(&self, record: CaseStudyRequest) -> Result<(), RepositoryError> {
        self.inner.update_request(record)
    }

    fn fetch_request(&self, id: &CaseStudyId) -> Result<Option<CaseStudyRequest>, RepositoryError> {
        self.inner.fetch_request(id)
    }

    fn requests_for_student(
        &self,
        student: &UserId,
    ) -> Result<Vec<CaseStudyRequest>, RepositoryError> {
        self.inner.requests_for_student(student)
    }

    fn requests_for_assignee(
        &self,
        assignee: &UserId,
        statuses: &[CaseStudyStatus],
    ) -> Result<Vec<CaseStudyRequest>, RepositoryError> {
        self.inner.requests_for_assignee(assignee, statuses)
    }

    fn requests_reassigned_from(
        &self,
        previous: &UserId,
    ) -> Result<Vec<CaseStudyRequest>, RepositoryError> {
        self.inner.requests_reassigned_from(previous)
    }

    fn grade(&self, id: &CaseStudyId) -> Result<Option<Grade>, RepositoryError> {
        self.inner.grade(id)
    }

    fn save_grade(&self, grade: Grade) -> Result<(), RepositoryError> {
        self.inner.save_grade(grade)
    }

    fn rating(
        &self,
        id: &CaseStudyId,
        student: &UserId,
    ) -> Result<Option<Rating>, RepositoryError> {
        self.inner.rating(id, student)
    }

    fn upsert_rating(&self, rating: Rating) -> Result<(), RepositoryError> {
        self.inner.upsert_rating(rating)
    }

    fn feedback(
        &self,
        id: &CaseStudyId,
        student: &UserId,
    ) -> Result<Option<StudentFeedback>, RepositoryError> {
        self.inner.feedback(id, student)
    }

    fn upsert_feedback(&self, feedback: StudentFeedback) -> Result<(), RepositoryError> {
        self.inner.upsert_feedback(feedback)
    }
}

pub(super) struct UnavailableStore;

fn offline<T>() -> Result<T, RepositoryError> {
    Err(RepositoryError::Unavailable("database offline".to_string()))
}

impl CaseStudyStore for UnavailableStore {
    fn user(&self, _id: &UserId) -> Result<Option<User>, RepositoryError> {
        offline()
    }

    fn upsert_user(&self, _user: User) -> Result<(), RepositoryError> {
        offline()
    }

    fn users_with_role(&self, _role: Role) -> Result<Vec<User>, RepositoryError> {
        offline()
    }

    fn debit_credits(&self, _id: &UserId, _amount: u32) -> Result<CreditDebit, RepositoryError> {
        offline()
    }

    fn add_credits(&self, _id: &UserId, _amount: u64) -> Result<CreditGrant, RepositoryError> {
        offline()
    }

    fn insert_request(
        &self,
        _record: CaseStudyRequest,
    ) -> Result<CaseStudyRequest, RepositoryError> {
        offline()
    }

    fn update_request(&self, _record: CaseStudyRequest) -> Result<(), RepositoryError> {
        offline()
    }

    fn fetch_request(
        &self,
        _id: &CaseStudyId,
    ) -> Result<Option<CaseStudyRequest>, RepositoryError> {
        offline()
    }

    fn requests_for_student(
        &self,
        _student: &UserId,
    ) -> Result<Vec<CaseStudyRequest>, RepositoryError> {
        offline()
    }

    fn requests_for_assignee(
        &self,
        _assignee: &UserId,
        _statuses: &[CaseStudyStatus],
    ) -> Result<Vec<CaseStudyRequest>, RepositoryError> {
        offline()
    }

    fn requests_reassigned_from(
        &self,
        _previous: &UserId,
    ) -> Result<Vec<CaseStudyRequest>, RepositoryError> {
        offline()
    }

    fn grade(&self, _id: &CaseStudyId) -> Result<Option<Grade>, RepositoryError> {
        offline()
    }

    fn save_grade(&self, _grade: Grade) -> Result<(), RepositoryError> {
        offline()
    }

    fn rating(
        &self,
        _id: &CaseStudyId,
        _student: &UserId,
    ) -> Result<Option<Rating>, RepositoryError> {
        offline()
    }

    fn upsert_rating(&self, _rating: Rating) -> Result<(), RepositoryError> {
        offline()
    }

    fn feedback(
        &self,
        _id: &CaseStudyId,
        _student: &UserId,
    ) -> Result<Option<StudentFeedback>, RepositoryError> {
        offline()
    }

    fn upsert_feedback(&self, _feedback: StudentFeedback) -> Result<(), RepositoryError> {
        offline()
    }
}

pub(super) fn router(harness: &Harness) -> axum::Router {
    case_study_router(harness.service.clone())
}

pub(super) fn actor_request(
    method: Method,
    uri: &str,
    actor: &Actor,
    body: Option<Value>,
) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(ACTOR_ID_HEADER, actor.id.0.as_str())
        .header(ACTOR_ROLE_HEADER, actor.role.label());
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                serde_json::to_vec(&body).expect("serialize body"),
            ))
            .expect("request builds"),
        None => builder.body(Body::empty()).expect("request builds"),
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
