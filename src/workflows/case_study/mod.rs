//! Case study lifecycle: credit-gated requests, instructor assignment with vacation cover,
//! material and correction uploads, and grading on the 18 point scale.

pub mod assignment;
pub mod domain;
pub mod grading;
pub mod ledger;
pub mod lifecycle;
pub mod memory;
pub mod repository;
pub mod router;
pub mod service;
pub mod uploads;

#[cfg(test)]
mod tests;

pub use assignment::{AssignmentResolver, ReassignmentOutcome};
pub use domain::{
    AccessStamps, Actor, CaseStudyArtifacts, CaseStudyId, CaseStudyRequest, CaseStudyStatus,
    CaseStudyStatusView, CorrectionArtifacts, Grade, LegalArea, NewCaseStudyRequest, Rating,
    Reassignment, ReassignmentReason, Role, StudentFeedback, StudentOverview, User, UserId,
    VacationWindow,
};
pub use grading::{describe, GradeError};
pub use ledger::{CreditLedger, LedgerError};
pub use lifecycle::{LifecycleAction, LifecycleError, LifecycleEvent, Transition};
pub use memory::InMemoryCaseStudyStore;
pub use repository::{
    BlobError, BlobStorage, CaseStudyStore, CreditDebit, CreditGrant, Notification,
    NotificationError, NotificationKind, NotificationSink, RepositoryError,
};
pub use router::case_study_router;
pub use service::{CaseStudyService, CaseStudyServiceError, FeedbackInput};
pub use uploads::{ArtifactSlot, FileKind, UploadError, UploadPolicy, UploadedFile};
