use serde::{Deserialize, Serialize};

use super::domain::{
    CaseStudyId, CaseStudyRequest, CaseStudyStatus, Grade, Rating, Role, StudentFeedback, User,
    UserId,
};

/// Outcome of an atomic decrement-with-floor on a student's credit balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditDebit {
    Applied { balance: u64 },
    Insufficient { balance: u64 },
}

/// Outcome of adding credits. `Overflow` leaves the balance untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditGrant {
    Applied { balance: u64 },
    Overflow { balance: u64 },
}

/// Storage abstraction so the service module can be exercised in isolation.
///
/// Implementations must apply `debit_credits` atomically per user: the floor check and the
/// decrement happen in one step.
pub trait CaseStudyStore: Send + Sync {
    fn user(&self, id: &UserId) -> Result<Option<User>, RepositoryError>;
    fn upsert_user(&self, user: User) -> Result<(), RepositoryError>;
    /// Users holding `role`, in ascending id order.
    fn users_with_role(&self, role: Role) -> Result<Vec<User>, RepositoryError>;

    fn debit_credits(&self, id: &UserId, amount: u32) -> Result<CreditDebit, RepositoryError>;
    fn add_credits(&self, id: &UserId, amount: u64) -> Result<CreditGrant, RepositoryError>;

    fn insert_request(&self, record: CaseStudyRequest)
        -> Result<CaseStudyRequest, RepositoryError>;
    fn update_request(&self, record: CaseStudyRequest) -> Result<(), RepositoryError>;
    fn fetch_request(&self, id: &CaseStudyId) -> Result<Option<CaseStudyRequest>, RepositoryError>;
    fn requests_for_student(
        &self,
        student: &UserId,
    ) -> Result<Vec<CaseStudyRequest>, RepositoryError>;
    fn requests_for_assignee(
        &self,
        assignee: &UserId,
        statuses: &[CaseStudyStatus],
    ) -> Result<Vec<CaseStudyRequest>, RepositoryError>;
    /// Requests whose reassignment marker names `previous` as the original assignee.
    fn requests_reassigned_from(
        &self,
        previous: &UserId,
    ) -> Result<Vec<CaseStudyRequest>, RepositoryError>;

    fn grade(&self, id: &CaseStudyId) -> Result<Option<Grade>, RepositoryError>;
    fn save_grade(&self, grade: Grade) -> Result<(), RepositoryError>;

    fn rating(
        &self,
        id: &CaseStudyId,
        student: &UserId,
    ) -> Result<Option<Rating>, RepositoryError>;
    fn upsert_rating(&self, rating: Rating) -> Result<(), RepositoryError>;

    fn feedback(
        &self,
        id: &CaseStudyId,
        student: &UserId,
    ) -> Result<Option<StudentFeedback>, RepositoryError>;
    fn upsert_feedback(&self, feedback: StudentFeedback) -> Result<(), RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Category of a notification so sinks can pick templates and channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    RequestCreated,
    RequestAssigned,
    MaterialsReady,
    SolutionSubmitted,
    CorrectionAvailable,
    StatusChanged,
    Reassigned,
    CreditsGranted,
}

/// Payload handed to the notification collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub user_id: UserId,
    pub title: String,
    pub message: String,
    pub kind: NotificationKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_request_id: Option<CaseStudyId>,
}

/// Outbound notification hook (e-mail, push, in-app inbox).
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification) -> Result<(), NotificationError>;
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}

/// Blob storage collaborator returning a public URL for stored bytes.
pub trait BlobStorage: Send + Sync {
    fn upload(&self, bytes: &[u8], content_type: &str) -> Result<String, BlobError>;
}

#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("blob storage unavailable: {0}")]
    Unavailable(String),
}
