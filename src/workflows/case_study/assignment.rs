use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::domain::{
    CaseStudyRequest, CaseStudyStatus, LegalArea, Reassignment, ReassignmentReason, Role, User,
    UserId,
};
use super::repository::{CaseStudyStore, RepositoryError};

/// A request moved between assignees by the vacation mechanism.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReassignmentOutcome {
    pub request: CaseStudyRequest,
    pub from: UserId,
    pub to: UserId,
}

/// Maps legal areas onto instructors and moves open work around vacations.
///
/// Candidates are ordered by ascending user id so that repeated resolution over the same data
/// always picks the same person.
pub struct AssignmentResolver<S> {
    store: Arc<S>,
}

impl<S> AssignmentResolver<S>
where
    S: CaseStudyStore,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Pick the assignee for a new request.
    ///
    /// On-duty instructors win, then on-duty springers of the same area. When everybody is away
    /// the first matching instructor still gets the request. `None` leaves the request for
    /// manual assignment.
    pub fn resolve(
        &self,
        legal_area: LegalArea,
        federal_state: Option<&str>,
    ) -> Result<Option<UserId>, RepositoryError> {
        let pool = self.candidates(legal_area, None)?;
        let chosen = pool
            .on_duty()
            .or_else(|| pool.instructors.first())
            .map(|user| user.id.clone());

        debug!(
            legal_area = legal_area.label(),
            federal_state = federal_state.unwrap_or("-"),
            assignee = chosen.as_ref().map_or("unresolved", |id| id.0.as_str()),
            "resolved case study assignee"
        );
        Ok(chosen)
    }

    /// Move the instructor's open requests to an on-duty colleague or springer.
    pub fn reassign_on_vacation_start(
        &self,
        instructor: &UserId,
        now: DateTime<Utc>,
    ) -> Result<Vec<ReassignmentOutcome>, RepositoryError> {
        let open = self
            .store
            .requests_for_assignee(instructor, &CaseStudyStatus::open())?;

        let mut moved = Vec::new();
        for mut request in open {
            let pool = self.candidates(request.legal_area, Some(instructor))?;
            let Some(substitute) = pool.on_duty().map(|user| user.id.clone()) else {
                warn!(
                    case_study = %request.id,
                    instructor = %instructor,
                    "no substitute on duty; request stays with vacationing instructor"
                );
                continue;
            };

            // A request already covering for someone keeps pointing at its original owner.
            if request.reassignment.is_none() {
                request.reassignment = Some(Reassignment {
                    previous_assignee: instructor.clone(),
                    reason: ReassignmentReason::VacationCover,
                    reassigned_at: now,
                });
            }
            request.assigned_instructor_id = Some(substitute.clone());
            request.updated_at = now;
            self.store.update_request(request.clone())?;

            info!(case_study = %request.id, from = %instructor, to = %substitute, "reassigned for vacation");
            moved.push(ReassignmentOutcome {
                request,
                from: instructor.clone(),
                to: substitute,
            });
        }

        Ok(moved)
    }

    /// Return requests that were moved away because of this instructor's vacation.
    ///
    /// Requests that reached a done status in the meantime stay with their substitute.
    pub fn reassign_on_vacation_end(
        &self,
        instructor: &UserId,
        now: DateTime<Utc>,
    ) -> Result<Vec<ReassignmentOutcome>, RepositoryError> {
        let covered = self.store.requests_reassigned_from(instructor)?;

        let mut returned = Vec::new();
        for mut request in covered {
            let is_vacation_cover = request
                .reassignment
                .as_ref()
                .is_some_and(|marker| marker.reason == ReassignmentReason::VacationCover);
            if !is_vacation_cover || request.status.is_done() {
                continue;
            }

            let substitute = request
                .assigned_instructor_id
                .replace(instructor.clone());
            request.reassignment = None;
            request.updated_at = now;
            self.store.update_request(request.clone())?;

            info!(case_study = %request.id, to = %instructor, "returned after vacation");
            if let Some(from) = substitute {
                returned.push(ReassignmentOutcome {
                    request,
                    from,
                    to: instructor.clone(),
                });
            }
        }

        Ok(returned)
    }

    fn candidates(
        &self,
        legal_area: LegalArea,
        exclude: Option<&UserId>,
    ) -> Result<CandidatePool, RepositoryError> {
        let select = |role: Role| -> Result<Vec<User>, RepositoryError> {
            let mut users: Vec<User> = self
                .store
                .users_with_role(role)?
                .into_iter()
                .filter(|user| user.legal_area == Some(legal_area))
                .filter(|user| Some(&user.id) != exclude)
                .collect();
            users.sort_by(|left, right| left.id.cmp(&right.id));
            Ok(users)
        };

        Ok(CandidatePool {
            instructors: select(Role::Instructor)?,
            springers: select(Role::Springer)?,
        })
    }
}

struct CandidatePool {
    instructors: Vec<User>,
    springers: Vec<User>,
}

impl CandidatePool {
    fn on_duty(&self) -> Option<&User> {
        self.instructors
            .iter()
            .find(|user| user.is_on_duty())
            .or_else(|| self.springers.iter().find(|user| user.is_on_duty()))
    }
}
