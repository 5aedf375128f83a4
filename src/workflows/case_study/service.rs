use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, Utc};
use tracing::{info, warn};

use super::assignment::{AssignmentResolver, ReassignmentOutcome};
use super::domain::{
    Actor, CaseStudyArtifacts, CaseStudyId, CaseStudyRequest, CaseStudyStatus,
    CorrectionArtifacts, Grade, LegalArea, NewCaseStudyRequest, Rating, Role, StudentFeedback,
    StudentOverview, User, UserId, VacationWindow,
};
use super::grading::{self, GradeError};
use super::ledger::{CreditLedger, LedgerError};
use super::lifecycle::{self, LifecycleAction, LifecycleError, LifecycleEvent};
use super::repository::{
    BlobError, BlobStorage, CaseStudyStore, Notification, NotificationKind, NotificationSink,
    RepositoryError,
};
use super::uploads::{self, ArtifactSlot, UploadError, UploadPolicy, UploadedFile};
use crate::config::EngineConfig;

static REQUEST_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_case_study_id() -> CaseStudyId {
    let id = REQUEST_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    CaseStudyId(format!("csr-{id:06}"))
}

/// Self-reflection fields a student fills in after a correction.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct FeedbackInput {
    pub mistakes_learned: String,
    pub improvements_planned: String,
    #[serde(default)]
    pub review_date: Option<NaiveDate>,
    #[serde(default)]
    pub reminder_enabled: bool,
}

/// Entry point for student, instructor and admin actions on case studies.
///
/// Composes the credit ledger, the assignment resolver, the grade evaluator and the lifecycle
/// state machine over one store. Notifications are best-effort: delivery failures are logged and
/// never undo a completed transition.
pub struct CaseStudyService<S, N, B> {
    store: Arc<S>,
    notifications: Arc<N>,
    blobs: Arc<B>,
    ledger: CreditLedger<S>,
    resolver: AssignmentResolver<S>,
    uploads: UploadPolicy,
    credits_per_request: u32,
    student_locks: KeyedLocks<UserId>,
    request_locks: KeyedLocks<CaseStudyId>,
}

impl<S, N, B> CaseStudyService<S, N, B>
where
    S: CaseStudyStore + 'static,
    N: NotificationSink + 'static,
    B: BlobStorage + 'static,
{
    pub fn new(store: Arc<S>, notifications: Arc<N>, blobs: Arc<B>, config: EngineConfig) -> Self {
        Self {
            ledger: CreditLedger::new(store.clone()),
            resolver: AssignmentResolver::new(store.clone()),
            store,
            notifications,
            blobs,
            uploads: UploadPolicy::new(config.uploads),
            credits_per_request: config.credits_per_request,
            student_locks: KeyedLocks::default(),
            request_locks: KeyedLocks::default(),
        }
    }

    /// Debit credits and open a new request in `Requested`.
    ///
    /// The debit and the insert run under a per-student lock; a failed insert refunds the
    /// credits before the error is returned.
    pub fn create_request(
        &self,
        actor: &Actor,
        request: NewCaseStudyRequest,
    ) -> Result<CaseStudyRequest, CaseStudyServiceError> {
        if !(actor.role == Role::Admin
            || (actor.role == Role::Student && actor.id == request.student_id))
        {
            return Err(forbidden(actor, "create a case study request"));
        }

        let request = normalize_request_shape(request)?;
        let student = self.require_user(&request.student_id)?;
        if student.role != Role::Student {
            return Err(CaseStudyServiceError::InvalidRequestShape(format!(
                "{} is not a student",
                student.id
            )));
        }

        let slot = self.student_locks.slot(&student.id)?;
        let _serialized = slot.lock().map_err(|_| poisoned("student lock"))?;

        let amount = self.credits_per_request;
        let balance = self.ledger.debit(&student.id, amount)?;

        let created = match self.open_request(request) {
            Ok(created) => created,
            Err(error) => {
                self.refund(&student.id, amount);
                return Err(error);
            }
        };

        info!(
            case_study = %created.id,
            student = %created.student_id,
            case_number = created.case_number,
            balance,
            assignee = created.assigned_instructor_id.as_ref().map_or("unassigned", |id| id.0.as_str()),
            "case study requested"
        );

        let mut events = vec![LifecycleEvent {
            recipient: created.student_id.clone(),
            kind: NotificationKind::RequestCreated,
        }];
        if let Some(instructor) = &created.assigned_instructor_id {
            events.push(LifecycleEvent {
                recipient: instructor.clone(),
                kind: NotificationKind::RequestAssigned,
            });
        }
        self.emit(&created, &events);

        Ok(created)
    }

    /// Attach the case material; moves `Requested` to `MaterialsReady` and never regresses.
    pub fn attach_case_material(
        &self,
        actor: &Actor,
        id: &CaseStudyId,
        url: String,
    ) -> Result<CaseStudyRequest, CaseStudyServiceError> {
        require_staff(actor, "upload case material")?;
        self.transition(id, LifecycleAction::AttachCaseMaterial { url })
    }

    pub fn attach_additional_materials(
        &self,
        actor: &Actor,
        id: &CaseStudyId,
        urls: Vec<String>,
    ) -> Result<CaseStudyRequest, CaseStudyServiceError> {
        require_staff(actor, "upload additional materials")?;
        self.transition(id, LifecycleAction::AttachAdditionalMaterials { urls })
    }

    pub fn submit_solution(
        &self,
        actor: &Actor,
        id: &CaseStudyId,
        url: String,
    ) -> Result<CaseStudyRequest, CaseStudyServiceError> {
        let request = self.require_request(id)?;
        require_owner(actor, &request, "submit a solution")?;
        self.transition(id, LifecycleAction::SubmitSolution { url })
    }

    /// Hand the submission to an instructor, moving the request into review.
    pub fn download_submission(
        &self,
        actor: &Actor,
        id: &CaseStudyId,
    ) -> Result<CaseStudyRequest, CaseStudyServiceError> {
        require_staff(actor, "download submissions")?;
        self.transition(id, LifecycleAction::DownloadSubmission)
    }

    pub fn upload_correction(
        &self,
        actor: &Actor,
        id: &CaseStudyId,
        mut artifacts: CorrectionArtifacts,
    ) -> Result<CaseStudyRequest, CaseStudyServiceError> {
        require_staff(actor, "upload corrections")?;
        if let Some(video) = artifacts.video_url.take() {
            if !video.trim().is_empty() {
                artifacts.video_url = Some(uploads::validate_video_link(&video)?);
            }
        }
        self.transition(id, LifecycleAction::UploadCorrection(artifacts))
    }

    pub fn mark_video_viewed(
        &self,
        actor: &Actor,
        id: &CaseStudyId,
    ) -> Result<CaseStudyRequest, CaseStudyServiceError> {
        let request = self.require_request(id)?;
        require_owner(actor, &request, "view the video correction")?;
        self.transition(id, LifecycleAction::MarkVideoViewed)
    }

    pub fn mark_pdf_downloaded(
        &self,
        actor: &Actor,
        id: &CaseStudyId,
    ) -> Result<CaseStudyRequest, CaseStudyServiceError> {
        let request = self.require_request(id)?;
        require_owner(actor, &request, "download the written correction")?;
        self.transition(id, LifecycleAction::MarkPdfDownloaded)
    }

    pub fn mark_correction_viewed(
        &self,
        actor: &Actor,
        id: &CaseStudyId,
    ) -> Result<CaseStudyRequest, CaseStudyServiceError> {
        let request = self.require_request(id)?;
        require_owner(actor, &request, "view the correction")?;
        self.transition(id, LifecycleAction::MarkCorrectionViewed)
    }

    /// Validate a file, store it as a blob and attach the resulting URL to `slot`.
    ///
    /// The lifecycle is checked under the request lock before the blob is written, so a
    /// rejected upload stores nothing.
    pub fn upload_file(
        &self,
        actor: &Actor,
        id: &CaseStudyId,
        slot: ArtifactSlot,
        file: UploadedFile,
    ) -> Result<CaseStudyRequest, CaseStudyServiceError> {
        let request = self.require_request(id)?;
        match slot {
            ArtifactSlot::Submission => require_owner(actor, &request, "upload a submission")?,
            _ => require_staff(actor, "upload case study files")?,
        }

        let content_type = self.uploads.check(slot, &file)?;
        self.transition_with(id, |current| {
            // The url is only known once the blob exists; the status rules do not depend on it.
            lifecycle::check(current, &slot_action(slot, String::new()))?;
            let url = self.blobs.upload(&file.bytes, content_type.as_ref())?;
            info!(case_study = %id, slot = slot.label(), file = %file.file_name, "file stored");
            Ok(slot_action(slot, url))
        })
    }

    /// Idempotent grade write; `None` clears the grade.
    pub fn save_grade(
        &self,
        actor: &Actor,
        id: &CaseStudyId,
        value: Option<f64>,
        text: Option<String>,
    ) -> Result<Grade, CaseStudyServiceError> {
        require_staff(actor, "grade case studies")?;
        self.require_request(id)?;

        let grade = grading::evaluate(id, value, text.as_deref(), Utc::now())?;

        let slot = self.request_locks.slot(id)?;
        let _serialized = slot.lock().map_err(|_| poisoned("request lock"))?;
        self.store.save_grade(grade.clone())?;

        info!(
            case_study = %id,
            grader = %actor.id,
            value = ?grade.value,
            "grade saved"
        );
        Ok(grade)
    }

    pub fn grade(&self, id: &CaseStudyId) -> Result<Option<Grade>, CaseStudyServiceError> {
        Ok(self.store.grade(id)?)
    }

    pub fn rate(
        &self,
        actor: &Actor,
        id: &CaseStudyId,
        stars: u8,
        feedback: Option<String>,
    ) -> Result<Rating, CaseStudyServiceError> {
        let request = self.require_request(id)?;
        require_student_owner(actor, &request, "rate the case study")?;
        if !(1..=5).contains(&stars) {
            return Err(CaseStudyServiceError::InvalidRating(stars));
        }

        let rating = Rating {
            case_study_id: id.clone(),
            student_id: actor.id.clone(),
            stars,
            feedback: feedback.filter(|text| !text.trim().is_empty()),
        };
        self.store.upsert_rating(rating.clone())?;
        Ok(rating)
    }

    pub fn give_feedback(
        &self,
        actor: &Actor,
        id: &CaseStudyId,
        input: FeedbackInput,
    ) -> Result<StudentFeedback, CaseStudyServiceError> {
        let request = self.require_request(id)?;
        require_student_owner(actor, &request, "record feedback")?;

        let feedback = StudentFeedback {
            case_study_id: id.clone(),
            student_id: actor.id.clone(),
            mistakes_learned: input.mistakes_learned,
            improvements_planned: input.improvements_planned,
            review_date: input.review_date,
            reminder_enabled: input.reminder_enabled,
        };
        self.store.upsert_feedback(feedback.clone())?;
        Ok(feedback)
    }

    /// Switch an instructor's on-duty flag and move their open work accordingly.
    ///
    /// `enabled = false` starts a vacation and hands open requests to substitutes;
    /// `enabled = true` ends it and takes covered requests back.
    pub fn toggle_vacation(
        &self,
        actor: &Actor,
        instructor: &UserId,
        enabled: bool,
        window: Option<VacationWindow>,
    ) -> Result<Vec<ReassignmentOutcome>, CaseStudyServiceError> {
        if actor.role != Role::Admin && &actor.id != instructor {
            return Err(forbidden(actor, "change another instructor's vacation"));
        }

        let mut user = self.require_user(instructor)?;
        if !user.role.is_teaching_staff() {
            return Err(forbidden(actor, "set a vacation for non-teaching users"));
        }

        user.notifications_enabled = enabled;
        user.vacation_window = if enabled { None } else { window.or(user.vacation_window) };
        self.store.upsert_user(user)?;

        let now = Utc::now();
        let moved = if enabled {
            self.resolver.reassign_on_vacation_end(instructor, now)?
        } else {
            self.resolver.reassign_on_vacation_start(instructor, now)?
        };

        info!(instructor = %instructor, on_duty = enabled, moved = moved.len(), "vacation toggled");
        for outcome in &moved {
            self.emit(
                &outcome.request,
                &[LifecycleEvent {
                    recipient: outcome.to.clone(),
                    kind: NotificationKind::Reassigned,
                }],
            );
        }

        Ok(moved)
    }

    /// Start and end vacations whose stored window begins or has passed on `today`.
    pub fn apply_vacation_calendar(
        &self,
        actor: &Actor,
        today: NaiveDate,
    ) -> Result<Vec<(UserId, bool)>, CaseStudyServiceError> {
        require_admin(actor, "run the vacation calendar")?;

        let mut staff = self.store.users_with_role(Role::Instructor)?;
        staff.extend(self.store.users_with_role(Role::Springer)?);

        let mut toggled = Vec::new();
        for user in staff {
            let Some(window) = user.vacation_window else {
                continue;
            };
            let away = window.contains(today);
            if away && user.is_on_duty() {
                self.toggle_vacation(actor, &user.id, false, Some(window))?;
                toggled.push((user.id, false));
            } else if !user.is_on_duty() && window.end < today {
                self.toggle_vacation(actor, &user.id, true, None)?;
                toggled.push((user.id, true));
            }
        }

        Ok(toggled)
    }

    pub fn grant_credits(
        &self,
        actor: &Actor,
        student: &UserId,
        amount: i64,
    ) -> Result<u64, CaseStudyServiceError> {
        require_admin(actor, "grant credits")?;
        let balance = self.ledger.credit(student, amount)?;

        let kind = NotificationKind::CreditsGranted;
        let (title, message) = render_notification(kind, Subject::Credits { amount, balance });
        let notification = Notification {
            user_id: student.clone(),
            title,
            message,
            kind,
            related_request_id: None,
        };
        if let Err(error) = self.notifications.notify(notification) {
            warn!(student = %student, %error, "credit notification failed");
        }

        Ok(balance)
    }

    /// Admin escape hatch: set any status regardless of the default edges.
    pub fn force_status(
        &self,
        actor: &Actor,
        id: &CaseStudyId,
        status: CaseStudyStatus,
    ) -> Result<CaseStudyRequest, CaseStudyServiceError> {
        require_admin(actor, "override case study status")?;

        let slot = self.request_locks.slot(id)?;
        let _serialized = slot.lock().map_err(|_| poisoned("request lock"))?;

        let request = self.require_request(id)?;
        let transition = lifecycle::force_status(&request, status, Utc::now());
        self.store.update_request(transition.request.clone())?;

        warn!(
            case_study = %id,
            admin = %actor.id,
            from = ?request.status,
            to = ?status,
            "status overridden"
        );
        self.emit(&transition.request, &transition.events);
        Ok(transition.request)
    }

    /// Manually assign a request, typically one the resolver left unassigned.
    pub fn assign_instructor(
        &self,
        actor: &Actor,
        id: &CaseStudyId,
        instructor: &UserId,
    ) -> Result<CaseStudyRequest, CaseStudyServiceError> {
        require_admin(actor, "assign instructors")?;
        let assignee = self.require_user(instructor)?;
        if !assignee.role.is_teaching_staff() {
            return Err(CaseStudyServiceError::InvalidRequestShape(format!(
                "{} cannot be assigned case studies",
                assignee.id
            )));
        }

        let slot = self.request_locks.slot(id)?;
        let _serialized = slot.lock().map_err(|_| poisoned("request lock"))?;

        let mut request = self.require_request(id)?;
        request.assigned_instructor_id = Some(assignee.id.clone());
        request.reassignment = None;
        request.updated_at = Utc::now();
        self.store.update_request(request.clone())?;

        info!(case_study = %id, instructor = %assignee.id, "instructor assigned manually");
        self.emit(
            &request,
            &[LifecycleEvent {
                recipient: assignee.id,
                kind: NotificationKind::RequestAssigned,
            }],
        );
        Ok(request)
    }

    pub fn get(
        &self,
        actor: &Actor,
        id: &CaseStudyId,
    ) -> Result<CaseStudyRequest, CaseStudyServiceError> {
        let request = self.require_request(id)?;
        if !actor.role.is_teaching_staff() {
            require_owner(actor, &request, "view this case study")?;
        }
        Ok(request)
    }

    /// Aggregate a student's requests; legacy `Corrected` counts as done.
    pub fn student_overview(
        &self,
        actor: &Actor,
        student: &UserId,
    ) -> Result<StudentOverview, CaseStudyServiceError> {
        if actor.role != Role::Admin && &actor.id != student {
            return Err(forbidden(actor, "view another student's overview"));
        }

        let user = self.require_user(student)?;
        let requests = self.store.requests_for_student(student)?;

        let mut grades = Vec::new();
        for request in &requests {
            if let Some(value) = self.store.grade(&request.id)?.and_then(|grade| grade.value) {
                grades.push(value);
            }
        }

        let completed = requests
            .iter()
            .filter(|request| request.status.is_done())
            .count();
        let average_grade = if grades.is_empty() {
            None
        } else {
            Some(grades.iter().sum::<f64>() / grades.len() as f64)
        };

        Ok(StudentOverview {
            student_id: user.id,
            credit_balance: user.credit_balance,
            total_requests: requests.len(),
            open_requests: requests.len() - completed,
            completed_requests: completed,
            graded_requests: grades.len(),
            average_grade,
        })
    }

    fn open_request(
        &self,
        request: NewCaseStudyRequest,
    ) -> Result<CaseStudyRequest, CaseStudyServiceError> {
        let existing = self.store.requests_for_student(&request.student_id)?;
        let case_number = u32::try_from(existing.len())
            .unwrap_or(u32::MAX)
            .saturating_add(1);

        let assignee = match self
            .resolver
            .resolve(request.legal_area, request.federal_state.as_deref())
        {
            Ok(assignee) => assignee,
            Err(error) => {
                warn!(%error, "assignment lookup failed; request left for manual assignment");
                None
            }
        };

        let now = Utc::now();
        let record = CaseStudyRequest {
            id: next_case_study_id(),
            student_id: request.student_id,
            case_number,
            legal_area: request.legal_area,
            sub_area: request.sub_area,
            focus_area: request.focus_area,
            federal_state: request.federal_state,
            random_assignment: request.random_assignment,
            status: CaseStudyStatus::Requested,
            assigned_instructor_id: assignee,
            reassignment: None,
            artifacts: CaseStudyArtifacts::default(),
            access: Default::default(),
            created_at: now,
            updated_at: now,
        };

        Ok(self.store.insert_request(record)?)
    }

    fn refund(&self, student: &UserId, amount: u32) {
        match self.ledger.credit(student, i64::from(amount)) {
            Ok(balance) => warn!(student = %student, amount, balance, "request creation failed; credits refunded"),
            Err(error) => warn!(student = %student, amount, %error, "credit refund failed"),
        }
    }

    fn transition(
        &self,
        id: &CaseStudyId,
        action: LifecycleAction,
    ) -> Result<CaseStudyRequest, CaseStudyServiceError> {
        self.transition_with(id, |_| Ok(action))
    }

    /// Run `prepare` against the freshly read record while holding the request lock, then apply
    /// the action it returns.
    fn transition_with<F>(
        &self,
        id: &CaseStudyId,
        prepare: F,
    ) -> Result<CaseStudyRequest, CaseStudyServiceError>
    where
        F: FnOnce(&CaseStudyRequest) -> Result<LifecycleAction, CaseStudyServiceError>,
    {
        let slot = self.request_locks.slot(id)?;
        let _serialized = slot.lock().map_err(|_| poisoned("request lock"))?;

        let request = self.require_request(id)?;
        let action = prepare(&request)?;
        let action_name = action.name();
        let transition = lifecycle::apply(&request, action, Utc::now())?;
        self.store.update_request(transition.request.clone())?;

        info!(
            case_study = %id,
            action = action_name,
            from = ?request.status,
            to = ?transition.request.status,
            "case study transition applied"
        );
        self.emit(&transition.request, &transition.events);
        Ok(transition.request)
    }

    fn emit(&self, request: &CaseStudyRequest, events: &[LifecycleEvent]) {
        for event in events {
            let (title, message) = render_notification(event.kind, Subject::Request(request));
            let notification = Notification {
                user_id: event.recipient.clone(),
                title,
                message,
                kind: event.kind,
                related_request_id: Some(request.id.clone()),
            };
            if let Err(error) = self.notifications.notify(notification) {
                warn!(case_study = %request.id, recipient = %event.recipient, %error, "notification dropped");
            }
        }
    }

    fn require_request(&self, id: &CaseStudyId) -> Result<CaseStudyRequest, CaseStudyServiceError> {
        self.store
            .fetch_request(id)?
            .ok_or_else(|| CaseStudyServiceError::CaseStudyNotFound(id.clone()))
    }

    fn require_user(&self, id: &UserId) -> Result<User, CaseStudyServiceError> {
        self.store
            .user(id)?
            .ok_or_else(|| CaseStudyServiceError::UserNotFound(id.clone()))
    }
}

fn normalize_request_shape(
    mut request: NewCaseStudyRequest,
) -> Result<NewCaseStudyRequest, CaseStudyServiceError> {
    let clean = |value: Option<String>| {
        value
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
    };
    request.sub_area = clean(request.sub_area);
    request.focus_area = clean(request.focus_area);
    request.federal_state = clean(request.federal_state);

    if !request.random_assignment && (request.sub_area.is_none() || request.focus_area.is_none())
    {
        return Err(CaseStudyServiceError::InvalidRequestShape(
            "sub area and focus area are required unless random assignment is requested"
                .to_string(),
        ));
    }

    let needs_state = request.legal_area == LegalArea::PublicLaw && !request.random_assignment;
    match (needs_state, request.federal_state.is_some()) {
        (true, false) => Err(CaseStudyServiceError::InvalidRequestShape(
            "public law requests need a federal state".to_string(),
        )),
        (false, true) => Err(CaseStudyServiceError::InvalidRequestShape(
            "a federal state only applies to public law requests without random assignment"
                .to_string(),
        )),
        _ => Ok(request),
    }
}

fn slot_action(slot: ArtifactSlot, url: String) -> LifecycleAction {
    match slot {
        ArtifactSlot::CaseMaterial => LifecycleAction::AttachCaseMaterial { url },
        ArtifactSlot::AdditionalMaterial => LifecycleAction::AppendAdditionalMaterial { url },
        ArtifactSlot::Submission => LifecycleAction::SubmitSolution { url },
        ArtifactSlot::WrittenCorrection => LifecycleAction::UploadCorrection(CorrectionArtifacts {
            written_pdf_url: Some(url),
            ..CorrectionArtifacts::default()
        }),
        ArtifactSlot::ModelSolution => LifecycleAction::UploadCorrection(CorrectionArtifacts {
            solution_pdf_url: Some(url),
            ..CorrectionArtifacts::default()
        }),
        ArtifactSlot::ScoringSheet => LifecycleAction::UploadCorrection(CorrectionArtifacts {
            scoring_sheet_url: Some(url),
            ..CorrectionArtifacts::default()
        }),
    }
}

/// What a notification talks about.
enum Subject<'a> {
    Request(&'a CaseStudyRequest),
    Credits { amount: i64, balance: u64 },
}

fn render_notification(kind: NotificationKind, subject: Subject<'_>) -> (String, String) {
    // `detail` is the current status for requests and the new balance for credit grants.
    let (reference, detail) = match subject {
        Subject::Request(request) => (request.reference(), request.status.label().to_string()),
        Subject::Credits { amount, balance } => (format!("{amount} Credits"), balance.to_string()),
    };
    let (title, message) = match kind {
        NotificationKind::RequestCreated => (
            "Klausur angefordert",
            format!("{reference} wurde angefordert. Wir melden uns, sobald der Sachverhalt bereitsteht."),
        ),
        NotificationKind::RequestAssigned => (
            "Neue Klausur zugewiesen",
            format!("{reference} wurde dir zugewiesen."),
        ),
        NotificationKind::MaterialsReady => (
            "Sachverhalt verfügbar",
            format!("Der Sachverhalt für {reference} steht zum Download bereit."),
        ),
        NotificationKind::SolutionSubmitted => (
            "Bearbeitung eingereicht",
            format!("Für {reference} wurde eine Bearbeitung eingereicht."),
        ),
        NotificationKind::CorrectionAvailable => (
            "Korrektur verfügbar",
            format!("Die Korrektur für {reference} ist verfügbar."),
        ),
        NotificationKind::StatusChanged => (
            "Status geändert",
            format!("{reference} hat jetzt den Status \"{detail}\"."),
        ),
        NotificationKind::Reassigned => (
            "Klausur übernommen",
            format!("{reference} wurde dir als Vertretung zugewiesen."),
        ),
        NotificationKind::CreditsGranted => (
            "Guthaben aufgeladen",
            format!("Dir wurden {reference} gutgeschrieben. Neues Guthaben: {detail}."),
        ),
    };
    (title.to_string(), message)
}

fn forbidden(actor: &Actor, operation: &'static str) -> CaseStudyServiceError {
    CaseStudyServiceError::Forbidden {
        actor: actor.id.clone(),
        role: actor.role.label(),
        operation,
    }
}

fn require_staff(actor: &Actor, operation: &'static str) -> Result<(), CaseStudyServiceError> {
    if actor.role.is_teaching_staff() || actor.role == Role::Admin {
        Ok(())
    } else {
        Err(forbidden(actor, operation))
    }
}

fn require_admin(actor: &Actor, operation: &'static str) -> Result<(), CaseStudyServiceError> {
    if actor.role == Role::Admin {
        Ok(())
    } else {
        Err(forbidden(actor, operation))
    }
}

fn require_owner(
    actor: &Actor,
    request: &CaseStudyRequest,
    operation: &'static str,
) -> Result<(), CaseStudyServiceError> {
    if actor.role == Role::Admin {
        return Ok(());
    }
    require_student_owner(actor, request, operation)
}

fn require_student_owner(
    actor: &Actor,
    request: &CaseStudyRequest,
    operation: &'static str,
) -> Result<(), CaseStudyServiceError> {
    if actor.role == Role::Student && actor.id == request.student_id {
        Ok(())
    } else {
        Err(forbidden(actor, operation))
    }
}

fn poisoned(what: &str) -> CaseStudyServiceError {
    CaseStudyServiceError::Repository(RepositoryError::Unavailable(format!("{what} poisoned")))
}

/// One mutex per key, created on first use.
struct KeyedLocks<K> {
    slots: Mutex<HashMap<K, Arc<Mutex<()>>>>,
}

impl<K> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<K> KeyedLocks<K>
where
    K: Eq + Hash + Clone,
{
    fn slot(&self, key: &K) -> Result<Arc<Mutex<()>>, CaseStudyServiceError> {
        let mut slots = self.slots.lock().map_err(|_| poisoned("lock table"))?;
        Ok(slots
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone())
    }
}

/// Error raised by the case study service.
#[derive(Debug, thiserror::Error)]
pub enum CaseStudyServiceError {
    #[error("invalid request: {0}")]
    InvalidRequestShape(String),
    #[error("{actor} ({role}) may not {operation}")]
    Forbidden {
        actor: UserId,
        role: &'static str,
        operation: &'static str,
    },
    #[error("case study {0} not found")]
    CaseStudyNotFound(CaseStudyId),
    #[error("user {0} not found")]
    UserNotFound(UserId),
    #[error("rating must be between 1 and 5 stars, got {0}")]
    InvalidRating(u8),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Grade(#[from] GradeError),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error(transparent)]
    Blob(#[from] BlobError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl CaseStudyServiceError {
    pub fn is_insufficient_credits(&self) -> bool {
        matches!(
            self,
            CaseStudyServiceError::Ledger(LedgerError::InsufficientCredits { .. })
        )
    }
}
