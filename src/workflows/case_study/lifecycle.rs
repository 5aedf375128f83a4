//! Status state machine for case study requests.
//!
//! Transitions are pure: they take the current record and an action and hand back the updated
//! record together with the notification events the orchestrator should emit. Nothing here
//! touches storage or the network.

use chrono::{DateTime, Utc};

use super::domain::{CaseStudyRequest, CaseStudyStatus, CorrectionArtifacts, UserId};
use super::repository::NotificationKind;

/// Actor-triggered actions understood by the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleAction {
    AttachCaseMaterial { url: String },
    AttachAdditionalMaterials { urls: Vec<String> },
    AppendAdditionalMaterial { url: String },
    SubmitSolution { url: String },
    DownloadSubmission,
    UploadCorrection(CorrectionArtifacts),
    MarkVideoViewed,
    MarkPdfDownloaded,
    MarkCorrectionViewed,
}

impl LifecycleAction {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::AttachCaseMaterial { .. } => "attach_case_material",
            Self::AttachAdditionalMaterials { .. } => "attach_additional_materials",
            Self::AppendAdditionalMaterial { .. } => "append_additional_material",
            Self::SubmitSolution { .. } => "submit_solution",
            Self::DownloadSubmission => "download_submission",
            Self::UploadCorrection(_) => "upload_correction",
            Self::MarkVideoViewed => "mark_video_viewed",
            Self::MarkPdfDownloaded => "mark_pdf_downloaded",
            Self::MarkCorrectionViewed => "mark_correction_viewed",
        }
    }
}

/// Notification side effect produced by a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleEvent {
    pub recipient: UserId,
    pub kind: NotificationKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub request: CaseStudyRequest,
    pub events: Vec<LifecycleEvent>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    #[error("cannot {action} while case study is {from:?}")]
    InvalidTransition {
        action: &'static str,
        from: CaseStudyStatus,
    },
    #[error("{0} must not be empty")]
    MissingArtifact(&'static str),
}

/// Default edges of the lifecycle, excluding admin overrides.
pub const fn can_transition(from: CaseStudyStatus, to: CaseStudyStatus) -> bool {
    use CaseStudyStatus::*;
    matches!(
        (from, to),
        (Requested, MaterialsReady)
            | (MaterialsReady, Submitted)
            | (Submitted, UnderReview)
            | (UnderReview, Completed)
    )
}

/// Admins may move a request between any two statuses.
pub const fn can_admin_override(_from: CaseStudyStatus, _to: CaseStudyStatus) -> bool {
    true
}

/// Check the status and artifact preconditions of `action` without building the new record.
///
/// Payload validation (blank urls, empty corrections) stays in `apply`, so a check that
/// passes only means the current status admits the action.
pub fn check(request: &CaseStudyRequest, action: &LifecycleAction) -> Result<(), LifecycleError> {
    use CaseStudyStatus::*;

    let allowed = match action {
        LifecycleAction::AttachCaseMaterial { .. }
        | LifecycleAction::AttachAdditionalMaterials { .. }
        | LifecycleAction::AppendAdditionalMaterial { .. } => true,
        LifecycleAction::SubmitSolution { .. } => request.status == MaterialsReady,
        LifecycleAction::DownloadSubmission => matches!(request.status, Submitted | UnderReview),
        LifecycleAction::UploadCorrection(_) => {
            matches!(request.status, UnderReview | Corrected | Completed)
        }
        LifecycleAction::MarkVideoViewed => {
            if request.artifacts.video_correction_url.is_none() {
                return Err(LifecycleError::MissingArtifact("video correction"));
            }
            true
        }
        LifecycleAction::MarkPdfDownloaded => {
            if request.artifacts.written_correction_url.is_none() {
                return Err(LifecycleError::MissingArtifact("written correction"));
            }
            true
        }
        LifecycleAction::MarkCorrectionViewed => request.status.is_done(),
    };

    if allowed {
        Ok(())
    } else {
        Err(LifecycleError::InvalidTransition {
            action: action.name(),
            from: request.status,
        })
    }
}

pub fn apply(
    request: &CaseStudyRequest,
    action: LifecycleAction,
    now: DateTime<Utc>,
) -> Result<Transition, LifecycleError> {
    use CaseStudyStatus::*;

    if let LifecycleAction::UploadCorrection(artifacts) = &action {
        if artifacts.is_empty() {
            return Err(LifecycleError::MissingArtifact("correction artifacts"));
        }
    }
    check(request, &action)?;

    let mut next = request.clone();
    let mut events = Vec::new();

    match action {
        LifecycleAction::AttachCaseMaterial { url } => {
            let url = non_empty(url, "case material url")?;
            next.artifacts.case_material_url = Some(url);
            promote_to_materials_ready(&mut next, &mut events);
        }
        LifecycleAction::AttachAdditionalMaterials { urls } => {
            let urls = urls
                .into_iter()
                .map(|url| non_empty(url, "additional material url"))
                .collect::<Result<Vec<_>, _>>()?;
            if urls.is_empty() {
                return Err(LifecycleError::MissingArtifact("additional materials"));
            }
            next.artifacts.additional_material_urls = urls;
            promote_to_materials_ready(&mut next, &mut events);
        }
        LifecycleAction::AppendAdditionalMaterial { url } => {
            let url = non_empty(url, "additional material url")?;
            next.artifacts.additional_material_urls.push(url);
            promote_to_materials_ready(&mut next, &mut events);
        }
        LifecycleAction::SubmitSolution { url } => {
            next.artifacts.submission_url = Some(non_empty(url, "submission url")?);
            next.status = Submitted;
            if let Some(instructor) = &request.assigned_instructor_id {
                events.push(LifecycleEvent {
                    recipient: instructor.clone(),
                    kind: NotificationKind::SolutionSubmitted,
                });
            }
        }
        LifecycleAction::DownloadSubmission => {
            if request.status == Submitted {
                next.status = UnderReview;
            }
            next.access.submission_downloaded_at = Some(now);
        }
        LifecycleAction::UploadCorrection(artifacts) => {
            merge_correction(&mut next, artifacts);
            next.status = Completed;
            events.push(LifecycleEvent {
                recipient: request.student_id.clone(),
                kind: NotificationKind::CorrectionAvailable,
            });
        }
        LifecycleAction::MarkVideoViewed => next.access.video_viewed_at = Some(now),
        LifecycleAction::MarkPdfDownloaded => next.access.pdf_downloaded_at = Some(now),
        LifecycleAction::MarkCorrectionViewed => next.access.correction_viewed_at = Some(now),
    }

    next.updated_at = now;
    Ok(Transition {
        request: next,
        events,
    })
}

/// Privileged status change that bypasses the default edges.
pub fn force_status(
    request: &CaseStudyRequest,
    status: CaseStudyStatus,
    now: DateTime<Utc>,
) -> Transition {
    debug_assert!(can_admin_override(request.status, status));

    let mut next = request.clone();
    next.status = status;
    next.updated_at = now;

    let events = if request.status == status {
        Vec::new()
    } else {
        vec![LifecycleEvent {
            recipient: request.student_id.clone(),
            kind: NotificationKind::StatusChanged,
        }]
    };

    Transition {
        request: next,
        events,
    }
}

// Uploading materials never moves a request backwards.
fn promote_to_materials_ready(next: &mut CaseStudyRequest, events: &mut Vec<LifecycleEvent>) {
    if next.status == CaseStudyStatus::Requested {
        next.status = CaseStudyStatus::MaterialsReady;
        events.push(LifecycleEvent {
            recipient: next.student_id.clone(),
            kind: NotificationKind::MaterialsReady,
        });
    }
}

fn merge_correction(next: &mut CaseStudyRequest, artifacts: CorrectionArtifacts) {
    let CorrectionArtifacts {
        video_url,
        written_pdf_url,
        solution_pdf_url,
        scoring_sheet_url,
    } = artifacts;
    let present = |url: Option<String>| url.filter(|value| !value.trim().is_empty());

    if let Some(url) = present(video_url) {
        next.artifacts.video_correction_url = Some(url);
    }
    if let Some(url) = present(written_pdf_url) {
        next.artifacts.written_correction_url = Some(url);
    }
    if let Some(url) = present(solution_pdf_url) {
        next.artifacts.model_solution_url = Some(url);
    }
    if let Some(url) = present(scoring_sheet_url) {
        next.artifacts.scoring_sheet_url = Some(url);
    }
}

fn non_empty(url: String, field: &'static str) -> Result<String, LifecycleError> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        Err(LifecycleError::MissingArtifact(field))
    } else {
        Ok(trimmed.to_string())
    }
}
