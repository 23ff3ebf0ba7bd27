use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use campus_catalog::{Course, Instructor, Section, SectionView, Term};
use campus_core::{
    AccountId, CourseId, Credits, EnrollmentId, InstructorId, SectionId, SessionId, StudentId, TermId,
};
use campus_enrollment::{
    Account, CancelSnapshot, EnrollCommand, EnrollSnapshot, Enrollment, LedgerError, NewPayment,
    Payment, ProfileFields, RefundPolicy, SectionTerms, StudentProfile, decide_cancel,
    decide_enroll, decide_top_up,
};

use super::{
    CancelOutcome, CatalogStore, EnrollOutcome, EnrollmentDetail, EnrollmentFilter, IdentityStore,
    LedgerStore, ProfileStore, Session, SessionStore, StoreError, TopUpOutcome, log_cancel,
};

#[derive(Debug, Default)]
struct State {
    accounts: HashMap<AccountId, Account>,
    sessions: HashMap<SessionId, Session>,
    courses: HashMap<CourseId, Course>,
    instructors: HashMap<InstructorId, Instructor>,
    terms: HashMap<TermId, Term>,
    sections: HashMap<SectionId, Section>,
    profiles: HashMap<StudentId, StudentProfile>,
    enrollments: HashMap<EnrollmentId, Enrollment>,
    payments: Vec<Payment>,
}

impl State {
    fn account_by_email(&self, email: &str) -> Option<&Account> {
        let email = email.to_lowercase();
        self.accounts.values().find(|a| a.email == email)
    }

    fn profile_by_email(&self, email: &str) -> Option<&StudentProfile> {
        let email = email.to_lowercase();
        self.profiles.values().find(|p| p.email == email)
    }

    fn active_in_section(&self, section_id: SectionId) -> u32 {
        let active = self
            .enrollments
            .values()
            .filter(|e| e.section_id == section_id && e.is_active())
            .count();
        u32::try_from(active).unwrap_or(u32::MAX)
    }

    fn has_active_seat(&self, student_id: StudentId, section_id: SectionId) -> bool {
        self.enrollments
            .values()
            .any(|e| e.student_id == student_id && e.section_id == section_id && e.is_active())
    }

    fn section_view(&self, section: &Section) -> Option<SectionView> {
        Some(SectionView {
            section: section.clone(),
            course: self.courses.get(&section.course_id)?.clone(),
            instructor: self.instructors.get(&section.instructor_id)?.clone(),
            term: self.terms.get(&section.term_id)?.clone(),
            seats_taken: self.active_in_section(section.id),
        })
    }

    fn detail(&self, enrollment: &Enrollment) -> Option<EnrollmentDetail> {
        let view = self.section_view(self.sections.get(&enrollment.section_id)?)?;
        Some(EnrollmentDetail {
            enrollment: enrollment.clone(),
            section: view.section,
            course: view.course,
            instructor: view.instructor,
            term: view.term,
        })
    }
}

/// In-memory store for dev and tests.
///
/// One mutex guards all state and every operation holds it from its first
/// read to its last write, so operations are trivially serializable.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
    refund_policy: RefundPolicy,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_refund_policy(mut self, policy: RefundPolicy) -> Self {
        self.refund_policy = policy;
        self
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Unavailable("in-memory store lock poisoned".to_string()))
    }

    #[cfg(test)]
    pub(crate) fn insert_raw(&self, profile: StudentProfile, enrollment: Enrollment) {
        let mut state = self.lock().unwrap();
        state.profiles.insert(profile.id, profile);
        state.enrollments.insert(enrollment.id, enrollment);
    }
}

#[async_trait]
impl IdentityStore for InMemoryStore {
    async fn create_account(&self, mut account: Account) -> Result<Account, StoreError> {
        let mut state = self.lock()?;
        account.email = account.email.trim().to_lowercase();
        if state.account_by_email(&account.email).is_some() {
            return Err(StoreError::Conflict(format!("email {} is already registered", account.email)));
        }
        state.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn account_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        Ok(self.lock()?.account_by_email(email.trim()).cloned())
    }

    async fn account_by_id(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        Ok(self.lock()?.accounts.get(&id).cloned())
    }
}

#[async_trait]
impl SessionStore for InMemoryStore {
    async fn create_session(&self, session: Session) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        if !state.accounts.contains_key(&session.account_id) {
            return Err(StoreError::NotFound("account".to_string()));
        }
        state.sessions.insert(session.id, session);
        Ok(())
    }

    async fn session_active(&self, id: SessionId, now: DateTime<Utc>) -> Result<bool, StoreError> {
        Ok(self
            .lock()?
            .sessions
            .get(&id)
            .is_some_and(|s| s.is_active(now)))
    }

    async fn revoke_session(&self, id: SessionId, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut state = self.lock()?;
        match state.sessions.get_mut(&id) {
            Some(session) if session.revoked_at.is_none() => {
                session.revoked_at = Some(now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl CatalogStore for InMemoryStore {
    async fn create_course(&self, course: Course) -> Result<Course, StoreError> {
        let mut state = self.lock()?;
        if state.courses.values().any(|c| c.code == course.code) {
            return Err(StoreError::Conflict(format!("course code {} already exists", course.code)));
        }
        state.courses.insert(course.id, course.clone());
        Ok(course)
    }

    async fn update_course_cost(&self, id: CourseId, cost: Credits) -> Result<Course, StoreError> {
        if cost.is_zero() {
            return Err(StoreError::Invalid("credit_cost must be positive".to_string()));
        }
        let mut state = self.lock()?;
        let course = state
            .courses
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound("course".to_string()))?;
        course.credit_cost = cost;
        Ok(course.clone())
    }

    async fn list_courses(&self) -> Result<Vec<Course>, StoreError> {
        let mut courses: Vec<_> = self.lock()?.courses.values().cloned().collect();
        courses.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(courses)
    }

    async fn get_course(&self, id: CourseId) -> Result<Option<Course>, StoreError> {
        Ok(self.lock()?.courses.get(&id).cloned())
    }

    async fn create_instructor(&self, instructor: Instructor) -> Result<Instructor, StoreError> {
        let mut state = self.lock()?;
        if state.instructors.values().any(|i| i.email == instructor.email) {
            return Err(StoreError::Conflict(format!(
                "instructor {} already exists",
                instructor.email
            )));
        }
        state.instructors.insert(instructor.id, instructor.clone());
        Ok(instructor)
    }

    async fn list_instructors(&self) -> Result<Vec<Instructor>, StoreError> {
        let mut instructors: Vec<_> = self.lock()?.instructors.values().cloned().collect();
        instructors.sort_by(|a, b| (&a.last_name, &a.first_name).cmp(&(&b.last_name, &b.first_name)));
        Ok(instructors)
    }

    async fn create_term(&self, term: Term) -> Result<Term, StoreError> {
        let mut state = self.lock()?;
        if state.terms.values().any(|t| t.name == term.name) {
            return Err(StoreError::Conflict(format!("term {} already exists", term.name)));
        }
        state.terms.insert(term.id, term.clone());
        Ok(term)
    }

    async fn list_terms(&self) -> Result<Vec<Term>, StoreError> {
        let mut terms: Vec<_> = self.lock()?.terms.values().cloned().collect();
        terms.sort_by_key(|t| t.starts_on);
        Ok(terms)
    }

    async fn create_section(&self, section: Section) -> Result<Section, StoreError> {
        let mut state = self.lock()?;
        if !state.courses.contains_key(&section.course_id) {
            return Err(StoreError::NotFound("course".to_string()));
        }
        if !state.instructors.contains_key(&section.instructor_id) {
            return Err(StoreError::NotFound("instructor".to_string()));
        }
        if !state.terms.contains_key(&section.term_id) {
            return Err(StoreError::NotFound("term".to_string()));
        }
        if state.sections.values().any(|s| {
            s.course_id == section.course_id && s.term_id == section.term_id && s.number == section.number
        }) {
            return Err(StoreError::Conflict(format!(
                "section {} already exists for this course and term",
                section.number
            )));
        }
        state.sections.insert(section.id, section.clone());
        Ok(section)
    }

    async fn sections_for_course(&self, course_id: CourseId) -> Result<Vec<SectionView>, StoreError> {
        let state = self.lock()?;
        let mut views: Vec<_> = state
            .sections
            .values()
            .filter(|s| s.course_id == course_id)
            .filter_map(|s| state.section_view(s))
            .collect();
        views.sort_by_key(|v| (v.term.starts_on, v.section.number));
        Ok(views)
    }
}

#[async_trait]
impl LedgerStore for InMemoryStore {
    #[tracing::instrument(skip(self, profile), err)]
    async fn enroll(
        &self,
        account_id: AccountId,
        section_id: SectionId,
        profile: ProfileFields,
    ) -> Result<EnrollOutcome, LedgerError> {
        let mut guard = self.lock()?;
        let state = &mut *guard;

        let account = state.accounts.get(&account_id).map(Account::balance);
        let section = state.sections.get(&section_id).map(|s| SectionTerms {
            section_id,
            course_id: s.course_id,
            capacity: i64::from(s.capacity),
            credit_cost: state.courses.get(&s.course_id).map(|c| c.credit_cost.amount()),
        });
        let existing = account
            .as_ref()
            .and_then(|a| state.profile_by_email(&a.email))
            .cloned();
        let snapshot = EnrollSnapshot {
            already_enrolled: existing
                .as_ref()
                .is_some_and(|p| state.has_active_seat(p.id, section_id)),
            active_in_section: state.active_in_section(section_id),
            account,
            section,
            profile: existing.clone(),
        };

        let decision = decide_enroll(
            &snapshot,
            &EnrollCommand {
                account_id,
                section_id,
                profile,
                now: Utc::now(),
            },
        )?;

        let student = match decision.new_profile {
            Some(created) => {
                state.profiles.insert(created.id, created.clone());
                created
            }
            None => existing.ok_or_else(|| {
                LedgerError::TransientStore("student profile disappeared mid-operation".to_string())
            })?,
        };
        if let Some(acct) = state.accounts.get_mut(&account_id) {
            acct.credit_balance = decision.new_balance;
        }
        state
            .enrollments
            .insert(decision.enrollment.id, decision.enrollment.clone());

        tracing::info!(
            enrollment_id = %decision.enrollment.id,
            debited = decision.debit.amount(),
            balance = decision.new_balance.amount(),
            "enrollment created"
        );

        Ok(EnrollOutcome {
            enrollment: decision.enrollment,
            student,
            balance: decision.new_balance,
        })
    }

    #[tracing::instrument(skip(self), err)]
    async fn cancel(&self, enrollment_id: EnrollmentId) -> Result<CancelOutcome, LedgerError> {
        let mut guard = self.lock()?;
        let state = &mut *guard;

        let enrollment = state.enrollments.get(&enrollment_id).cloned();
        let refund_account = enrollment
            .as_ref()
            .and_then(|e| state.profiles.get(&e.student_id))
            .and_then(|p| state.account_by_email(&p.email))
            .map(Account::balance);
        let current_cost = enrollment
            .as_ref()
            .and_then(|e| state.sections.get(&e.section_id))
            .and_then(|s| state.courses.get(&s.course_id))
            .map(|c| c.credit_cost.amount());

        let decision = decide_cancel(
            &CancelSnapshot {
                enrollment,
                refund_account,
                current_cost,
            },
            self.refund_policy,
            Utc::now(),
        )?;

        if let Some(acct) = state.accounts.get_mut(&decision.account_id) {
            acct.credit_balance = decision.new_balance;
        }
        state
            .enrollments
            .insert(enrollment_id, decision.enrollment.clone());

        let outcome = CancelOutcome {
            enrollment: decision.enrollment,
            refunded: decision.refund,
            balance: decision.new_balance,
            drift: decision.drift,
        };
        log_cancel(&outcome, decision.account_id);
        Ok(outcome)
    }

    #[tracing::instrument(skip(self, request), fields(amount = request.amount), err)]
    async fn top_up(&self, account_id: AccountId, request: NewPayment) -> Result<TopUpOutcome, LedgerError> {
        let mut state = self.lock()?;
        let account = state
            .accounts
            .get(&account_id)
            .map(Account::balance)
            .ok_or_else(|| LedgerError::not_found("account"))?;

        let decision = decide_top_up(&account, &request, Utc::now())?;
        if let Some(acct) = state.accounts.get_mut(&account_id) {
            acct.credit_balance = decision.new_balance;
        }
        state.payments.push(decision.payment.clone());

        Ok(TopUpOutcome {
            payment: decision.payment,
            balance: decision.new_balance,
        })
    }

    async fn enrollments_for_account(
        &self,
        account_id: AccountId,
        filter: &EnrollmentFilter,
    ) -> Result<Vec<EnrollmentDetail>, StoreError> {
        let state = self.lock()?;
        let Some(profile) = state
            .accounts
            .get(&account_id)
            .and_then(|a| state.profile_by_email(&a.email))
        else {
            return Ok(Vec::new());
        };

        let mut details: Vec<_> = state
            .enrollments
            .values()
            .filter(|e| e.student_id == profile.id)
            .filter_map(|e| state.detail(e))
            .filter(|d| filter.matches(d))
            .collect();
        details.sort_by(|a, b| b.enrollment.enrolled_at.cmp(&a.enrollment.enrolled_at));
        Ok(details)
    }

    async fn enrollment_owner(&self, enrollment_id: EnrollmentId) -> Result<Option<AccountId>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .enrollments
            .get(&enrollment_id)
            .and_then(|e| state.profiles.get(&e.student_id))
            .and_then(|p| state.account_by_email(&p.email))
            .map(|a| a.id))
    }

    async fn payments_for_account(&self, account_id: AccountId) -> Result<Vec<Payment>, StoreError> {
        let mut payments: Vec<_> = self
            .lock()?
            .payments
            .iter()
            .filter(|p| p.account_id == account_id)
            .cloned()
            .collect();
        payments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(payments)
    }
}

#[async_trait]
impl ProfileStore for InMemoryStore {
    async fn profile_for_account(&self, account_id: AccountId) -> Result<Option<StudentProfile>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .accounts
            .get(&account_id)
            .and_then(|a| state.profile_by_email(&a.email))
            .cloned())
    }

    async fn set_avatar_url(&self, account_id: AccountId, url: &str) -> Result<StudentProfile, StoreError> {
        let mut guard = self.lock()?;
        let state = &mut *guard;
        let email = state
            .accounts
            .get(&account_id)
            .map(|a| a.email.clone())
            .ok_or_else(|| StoreError::NotFound("account".to_string()))?;
        let profile = state
            .profiles
            .values_mut()
            .find(|p| p.email == email)
            .ok_or_else(|| StoreError::NotFound("student profile".to_string()))?;
        profile.avatar_url = Some(url.to_string());
        Ok(profile.clone())
    }
}
