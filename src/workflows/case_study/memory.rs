use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use super::domain::{
    CaseStudyId, CaseStudyRequest, CaseStudyStatus, Grade, Rating, Role, StudentFeedback, User,
    UserId,
};
use super::repository::{CaseStudyStore, CreditDebit, CreditGrant, RepositoryError};

#[derive(Debug, Default)]
struct StoreState {
    users: BTreeMap<UserId, User>,
    requests: BTreeMap<CaseStudyId, CaseStudyRequest>,
    grades: HashMap<CaseStudyId, Grade>,
    ratings: HashMap<(CaseStudyId, UserId), Rating>,
    feedback: HashMap<(CaseStudyId, UserId), StudentFeedback>,
}

/// Single-process store backed by one mutex; every method is one atomic unit of work.
#[derive(Debug, Default)]
pub struct InMemoryCaseStudyStore {
    state: Mutex<StoreState>,
}

impl InMemoryCaseStudyStore {
    pub fn with_users(users: impl IntoIterator<Item = User>) -> Self {
        let store = Self::default();
        if let Ok(mut state) = store.state.lock() {
            for user in users {
                state.users.insert(user.id.clone(), user);
            }
        }
        store
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>, RepositoryError> {
        self.state
            .lock()
            .map_err(|_| RepositoryError::Unavailable("store mutex poisoned".to_string()))
    }
}

impl CaseStudyStore for InMemoryCaseStudyStore {
    fn user(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self.lock()?.users.get(id).cloned())
    }

    fn upsert_user(&self, user: User) -> Result<(), RepositoryError> {
        self.lock()?.users.insert(user.id.clone(), user);
        Ok(())
    }

    fn users_with_role(&self, role: Role) -> Result<Vec<User>, RepositoryError> {
        Ok(self
            .lock()?
            .users
            .values()
            .filter(|user| user.role == role)
            .cloned()
            .collect())
    }

    fn debit_credits(&self, id: &UserId, amount: u32) -> Result<CreditDebit, RepositoryError> {
        let mut state = self.lock()?;
        let user = state.users.get_mut(id).ok_or(RepositoryError::NotFound)?;
        match user.credit_balance.checked_sub(u64::from(amount)) {
            Some(balance) => {
                user.credit_balance = balance;
                Ok(CreditDebit::Applied { balance })
            }
            None => Ok(CreditDebit::Insufficient {
                balance: user.credit_balance,
            }),
        }
    }

    fn add_credits(&self, id: &UserId, amount: u64) -> Result<CreditGrant, RepositoryError> {
        let mut state = self.lock()?;
        let user = state.users.get_mut(id).ok_or(RepositoryError::NotFound)?;
        match user.credit_balance.checked_add(amount) {
            Some(balance) => {
                user.credit_balance = balance;
                Ok(CreditGrant::Applied { balance })
            }
            None => Ok(CreditGrant::Overflow {
                balance: user.credit_balance,
            }),
        }
    }

    fn insert_request(
        &self,
        record: CaseStudyRequest,
    ) -> Result<CaseStudyRequest, RepositoryError> {
        let mut state = self.lock()?;
        if state.requests.contains_key(&record.id) {
            return Err(RepositoryError::Conflict);
        }
        state.requests.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn update_request(&self, record: CaseStudyRequest) -> Result<(), RepositoryError> {
        let mut state = self.lock()?;
        match state.requests.get_mut(&record.id) {
            Some(existing) => {
                *existing = record;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn fetch_request(&self, id: &CaseStudyId) -> Result<Option<CaseStudyRequest>, RepositoryError> {
        Ok(self.lock()?.requests.get(id).cloned())
    }

    fn requests_for_student(
        &self,
        student: &UserId,
    ) -> Result<Vec<CaseStudyRequest>, RepositoryError> {
        let mut requests: Vec<_> = self
            .lock()?
            .requests
            .values()
            .filter(|request| &request.student_id == student)
            .cloned()
            .collect();
        requests.sort_by_key(|request| request.case_number);
        Ok(requests)
    }

    fn requests_for_assignee(
        &self,
        assignee: &UserId,
        statuses: &[CaseStudyStatus],
    ) -> Result<Vec<CaseStudyRequest>, RepositoryError> {
        Ok(self
            .lock()?
            .requests
            .values()
            .filter(|request| request.assigned_instructor_id.as_ref() == Some(assignee))
            .filter(|request| statuses.contains(&request.status))
            .cloned()
            .collect())
    }

    fn requests_reassigned_from(
        &self,
        previous: &UserId,
    ) -> Result<Vec<CaseStudyRequest>, RepositoryError> {
        Ok(self
            .lock()?
            .requests
            .values()
            .filter(|request| {
                request
                    .reassignment
                    .as_ref()
                    .is_some_and(|marker| &marker.previous_assignee == previous)
            })
            .cloned()
            .collect())
    }

    fn grade(&self, id: &CaseStudyId) -> Result<Option<Grade>, RepositoryError> {
        Ok(self.lock()?.grades.get(id).cloned())
    }

    fn save_grade(&self, grade: Grade) -> Result<(), RepositoryError> {
        self.lock()?
            .grades
            .insert(grade.case_study_id.clone(), grade);
        Ok(())
    }

    fn rating(
        &self,
        id: &CaseStudyId,
        student: &UserId,
    ) -> Result<Option<Rating>, RepositoryError> {
        Ok(self
            .lock()?
            .ratings
            .get(&(id.clone(), student.clone()))
            .cloned())
    }

    fn upsert_rating(&self, rating: Rating) -> Result<(), RepositoryError> {
        let key = (rating.case_study_id.clone(), rating.student_id.clone());
        self.lock()?.ratings.insert(key, rating);
        Ok(())
    }

    fn feedback(
        &self,
        id: &CaseStudyId,
        student: &UserId,
    ) -> Result<Option<StudentFeedback>, RepositoryError> {
        Ok(self
            .lock()?
            .feedback
            .get(&(id.clone(), student.clone()))
            .cloned())
    }

    fn upsert_feedback(&self, feedback: StudentFeedback) -> Result<(), RepositoryError> {
        let key = (feedback.case_study_id.clone(), feedback.student_id.clone());
        self.lock()?.feedback.insert(key, feedback);
        Ok(())
    }
}
