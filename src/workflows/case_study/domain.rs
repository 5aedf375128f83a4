use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for platform users (students, instructors, springers, admins).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier wrapper for case study requests.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CaseStudyId(pub String);

impl fmt::Display for CaseStudyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Instructor,
    Springer,
    Admin,
}

impl Role {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Instructor => "instructor",
            Self::Springer => "springer",
            Self::Admin => "admin",
        }
    }

    /// Instructors and their substitutes may work on materials and corrections.
    pub const fn is_teaching_staff(self) -> bool {
        matches!(self, Self::Instructor | Self::Springer)
    }
}

impl FromStr for Role {
    type Err = UnknownValue;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "student" => Ok(Self::Student),
            "instructor" | "dozent" => Ok(Self::Instructor),
            "springer" => Ok(Self::Springer),
            "admin" => Ok(Self::Admin),
            other => Err(UnknownValue {
                kind: "role",
                value: other.to_string(),
            }),
        }
    }
}

/// Caller identity supplied by the authentication layer for every orchestrator call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: UserId(id.into()),
            role,
        }
    }
}

/// Top-level subject classification used to match requests to instructors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegalArea {
    CivilLaw,
    CriminalLaw,
    PublicLaw,
}

impl LegalArea {
    pub const fn label(self) -> &'static str {
        match self {
            Self::CivilLaw => "Zivilrecht",
            Self::CriminalLaw => "Strafrecht",
            Self::PublicLaw => "Öffentliches Recht",
        }
    }
}

impl FromStr for LegalArea {
    type Err = UnknownValue;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_lowercase().replace(['-', '_'], " ");
        match normalized.as_str() {
            "zivilrecht" | "civil law" => Ok(Self::CivilLaw),
            "strafrecht" | "criminal law" => Ok(Self::CriminalLaw),
            "öffentliches recht" | "oeffentliches recht" | "public law" => Ok(Self::PublicLaw),
            _ => Err(UnknownValue {
                kind: "legal area",
                value: value.trim().to_string(),
            }),
        }
    }
}

/// Raised when a label cannot be mapped onto one of the closed enumerations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownValue {
    pub kind: &'static str,
    pub value: String,
}

/// Inclusive date range during which an instructor is away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VacationWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl VacationWindow {
    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start <= day && day <= self.end
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub role: Role,
    pub legal_area: Option<LegalArea>,
    pub credit_balance: u64,
    /// Also the "on duty" flag for instructors; `false` while on vacation.
    pub notifications_enabled: bool,
    pub vacation_window: Option<VacationWindow>,
}

impl User {
    pub fn student(id: impl Into<String>, credit_balance: u64) -> Self {
        Self {
            id: UserId(id.into()),
            role: Role::Student,
            legal_area: None,
            credit_balance,
            notifications_enabled: true,
            vacation_window: None,
        }
    }

    pub fn teaching(id: impl Into<String>, role: Role, legal_area: LegalArea) -> Self {
        Self {
            id: UserId(id.into()),
            role,
            legal_area: Some(legal_area),
            credit_balance: 0,
            notifications_enabled: true,
            vacation_window: None,
        }
    }

    pub fn admin(id: impl Into<String>) -> Self {
        Self {
            id: UserId(id.into()),
            role: Role::Admin,
            legal_area: None,
            credit_balance: 0,
            notifications_enabled: true,
            vacation_window: None,
        }
    }

    pub fn is_on_duty(&self) -> bool {
        self.notifications_enabled
    }
}

/// Lifecycle status of a case study request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStudyStatus {
    Requested,
    MaterialsReady,
    Submitted,
    UnderReview,
    /// Legacy terminal value, read as a synonym of `Completed`.
    Corrected,
    Completed,
}

impl CaseStudyStatus {
    /// Statuses in which a request still needs work from its assignee.
    pub const fn open() -> [Self; 4] {
        [
            Self::Requested,
            Self::MaterialsReady,
            Self::Submitted,
            Self::UnderReview,
        ]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Requested => "Angefordert",
            Self::MaterialsReady => "Sachverhalt verfügbar",
            Self::Submitted => "Bearbeitung eingereicht",
            Self::UnderReview => "In Korrektur",
            Self::Corrected | Self::Completed => "Korrektur verfügbar",
        }
    }

    pub const fn is_done(self) -> bool {
        matches!(self, Self::Corrected | Self::Completed)
    }

    pub const fn is_open(self) -> bool {
        !self.is_done()
    }
}

impl FromStr for CaseStudyStatus {
    type Err = UnknownValue;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "requested" => Ok(Self::Requested),
            "materials_ready" | "materialsready" => Ok(Self::MaterialsReady),
            "submitted" => Ok(Self::Submitted),
            "under_review" | "underreview" => Ok(Self::UnderReview),
            "corrected" => Ok(Self::Corrected),
            "completed" => Ok(Self::Completed),
            _ => Err(UnknownValue {
                kind: "status",
                value: value.trim().to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReassignmentReason {
    VacationCover,
}

/// Marker persisted when a request is moved away from its assignee so the move can be undone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reassignment {
    pub previous_assignee: UserId,
    pub reason: ReassignmentReason,
    pub reassigned_at: DateTime<Utc>,
}

/// Opaque artifact URLs owned by the blob storage collaborator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseStudyArtifacts {
    pub case_material_url: Option<String>,
    pub additional_material_urls: Vec<String>,
    pub submission_url: Option<String>,
    pub video_correction_url: Option<String>,
    pub written_correction_url: Option<String>,
    pub model_solution_url: Option<String>,
    pub scoring_sheet_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessStamps {
    pub submission_downloaded_at: Option<DateTime<Utc>>,
    pub video_viewed_at: Option<DateTime<Utc>>,
    pub pdf_downloaded_at: Option<DateTime<Utc>>,
    pub correction_viewed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseStudyRequest {
    pub id: CaseStudyId,
    pub student_id: UserId,
    pub case_number: u32,
    pub legal_area: LegalArea,
    pub sub_area: Option<String>,
    pub focus_area: Option<String>,
    pub federal_state: Option<String>,
    pub random_assignment: bool,
    pub status: CaseStudyStatus,
    pub assigned_instructor_id: Option<UserId>,
    pub reassignment: Option<Reassignment>,
    pub artifacts: CaseStudyArtifacts,
    pub access: AccessStamps,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CaseStudyRequest {
    /// Short human reference used in notification texts.
    pub fn reference(&self) -> String {
        format!("Klausur #{} ({})", self.case_number, self.legal_area.label())
    }

    pub fn status_view(&self) -> CaseStudyStatusView {
        CaseStudyStatusView {
            case_study_id: self.id.clone(),
            case_number: self.case_number,
            legal_area: self.legal_area,
            status: self.status,
            status_label: self.status.label(),
            assigned_instructor_id: self.assigned_instructor_id.clone(),
            updated_at: self.updated_at,
        }
    }
}

/// Sanitized representation of a request's status for API responses.
#[derive(Debug, Clone, Serialize)]
pub struct CaseStudyStatusView {
    pub case_study_id: CaseStudyId,
    pub case_number: u32,
    pub legal_area: LegalArea,
    pub status: CaseStudyStatus,
    pub status_label: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_instructor_id: Option<UserId>,
    pub updated_at: DateTime<Utc>,
}

/// Correction artifacts uploaded together by an instructor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectionArtifacts {
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub written_pdf_url: Option<String>,
    #[serde(default)]
    pub solution_pdf_url: Option<String>,
    #[serde(default)]
    pub scoring_sheet_url: Option<String>,
}

impl CorrectionArtifacts {
    pub fn is_empty(&self) -> bool {
        [
            &self.video_url,
            &self.written_pdf_url,
            &self.solution_pdf_url,
            &self.scoring_sheet_url,
        ]
        .iter()
        .all(|url| url.as_deref().map_or(true, |value| value.trim().is_empty()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grade {
    pub case_study_id: CaseStudyId,
    pub value: Option<f64>,
    /// Band wording for `value`, always derived from the scale.
    pub description: Option<String>,
    /// Free text the instructor wrote alongside the points.
    pub comment: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rating {
    pub case_study_id: CaseStudyId,
    pub student_id: UserId,
    pub stars: u8,
    pub feedback: Option<String>,
}

/// Self-reflection note a student keeps for a corrected case study.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentFeedback {
    pub case_study_id: CaseStudyId,
    pub student_id: UserId,
    pub mistakes_learned: String,
    pub improvements_planned: String,
    pub review_date: Option<NaiveDate>,
    pub reminder_enabled: bool,
}

/// Shape of a new request as submitted by a student.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCaseStudyRequest {
    pub student_id: UserId,
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

/// Student-facing aggregate over all requests of one student.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentOverview {
    pub student_id: UserId,
    pub credit_balance: u64,
    pub total_requests: usize,
    pub open_requests: usize,
    pub completed_requests: usize,
    pub graded_requests: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_grade: Option<f64>,
}
