//! Storage boundary.
//!
//! Each concern gets its own trait so handlers depend only on what they use.
//! Ledger operations (`LedgerStore`) run their whole read-check-write sequence
//! as one serializable unit and report outcomes as `LedgerError`; everything
//! else reports `StoreError`.

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryStore;
pub use postgres::PostgresStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use campus_catalog::{Course, Instructor, Section, SectionView, Term};
use campus_core::{AccountId, CourseId, Credits, DomainError, EnrollmentId, SectionId, SessionId, TermId};
use campus_enrollment::{
    Account, Enrollment, EnrollmentStatus, LedgerError, NewPayment, Payment, PriceDrift,
    ProfileFields, StudentProfile,
};

/// Infrastructure error for non-ledger store operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    /// A uniqueness rule was violated.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid data: {0}")]
    Invalid(String),

    /// The backing store could not be reached or failed unexpectedly.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<DomainError> for StoreError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::NotFound(entity) => StoreError::NotFound(entity.to_string()),
            DomainError::Conflict(msg) => StoreError::Conflict(msg),
            other => StoreError::Invalid(other.to_string()),
        }
    }
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(entity) => LedgerError::NotFound(entity),
            StoreError::Invalid(msg) | StoreError::Conflict(msg) => LedgerError::Validation(msg),
            StoreError::Unavailable(msg) => LedgerError::TransientStore(msg),
        }
    }
}

/// A server-side login session. Tokens name their session; revoking the
/// session invalidates the token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: SessionId,
    pub account_id: AccountId,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && self.issued_at <= now && now < self.expires_at
    }
}

/// Dashboard row: an enrollment with everything needed to display it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollmentDetail {
    pub enrollment: Enrollment,
    pub section: Section,
    pub course: Course,
    pub instructor: Instructor,
    pub term: Term,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrollmentFilter {
    /// Case-insensitive match on course code or name.
    pub course: Option<String>,
    pub term_id: Option<TermId>,
    pub status: Option<EnrollmentStatus>,
}

impl EnrollmentFilter {
    pub fn matches(&self, detail: &EnrollmentDetail) -> bool {
        let course_ok = self.course.as_deref().is_none_or(|needle| {
            let needle = needle.to_lowercase();
            detail.course.code.to_lowercase().contains(&needle)
                || detail.course.name.to_lowercase().contains(&needle)
        });
        let term_ok = self.term_id.is_none_or(|t| detail.term.id == t);
        let status_ok = self.status.is_none_or(|s| detail.enrollment.status == s);
        course_ok && term_ok && status_ok
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollOutcome {
    pub enrollment: Enrollment,
    pub student: StudentProfile,
    pub balance: Credits,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelOutcome {
    pub enrollment: Enrollment,
    pub refunded: Credits,
    pub balance: Credits,
    pub drift: Option<PriceDrift>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopUpOutcome {
    pub payment: Payment,
    pub balance: Credits,
}

#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Fails with `Conflict` when the (lower-cased) email is taken.
    async fn create_account(&self, account: Account) -> Result<Account, StoreError>;
    async fn account_by_email(&self, email: &str) -> Result<Option<Account>, StoreError>;
    async fn account_by_id(&self, id: AccountId) -> Result<Option<Account>, StoreError>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(&self, session: Session) -> Result<(), StoreError>;
    async fn session_active(&self, id: SessionId, now: DateTime<Utc>) -> Result<bool, StoreError>;
    /// Returns `false` when the session was unknown or already revoked.
    async fn revoke_session(&self, id: SessionId, now: DateTime<Utc>) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn create_course(&self, course: Course) -> Result<Course, StoreError>;
    async fn update_course_cost(&self, id: CourseId, cost: Credits) -> Result<Course, StoreError>;
    /// Ordered by code.
    async fn list_courses(&self) -> Result<Vec<Course>, StoreError>;
    async fn get_course(&self, id: CourseId) -> Result<Option<Course>, StoreError>;
    async fn create_instructor(&self, instructor: Instructor) -> Result<Instructor, StoreError>;
    async fn list_instructors(&self) -> Result<Vec<Instructor>, StoreError>;
    async fn create_term(&self, term: Term) -> Result<Term, StoreError>;
    async fn list_terms(&self) -> Result<Vec<Term>, StoreError>;
    /// Course, instructor and term must exist.
    async fn create_section(&self, section: Section) -> Result<Section, StoreError>;
    /// Sections of a course with their live seat counts, ordered by term
    /// start then section number.
    async fn sections_for_course(&self, course_id: CourseId) -> Result<Vec<SectionView>, StoreError>;
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn enroll(
        &self,
        account_id: AccountId,
        section_id: SectionId,
        profile: ProfileFields,
    ) -> Result<EnrollOutcome, LedgerError>;

    async fn cancel(&self, enrollment_id: EnrollmentId) -> Result<CancelOutcome, LedgerError>;

    async fn top_up(&self, account_id: AccountId, request: NewPayment) -> Result<TopUpOutcome, LedgerError>;

    /// Newest first.
    async fn enrollments_for_account(
        &self,
        account_id: AccountId,
        filter: &EnrollmentFilter,
    ) -> Result<Vec<EnrollmentDetail>, StoreError>;

    /// Account that would receive the refund for this enrollment.
    async fn enrollment_owner(&self, enrollment_id: EnrollmentId) -> Result<Option<AccountId>, StoreError>;

    /// Newest first.
    async fn payments_for_account(&self, account_id: AccountId) -> Result<Vec<Payment>, StoreError>;
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn profile_for_account(&self, account_id: AccountId) -> Result<Option<StudentProfile>, StoreError>;
    /// Fails with `NotFound` until the account has enrolled at least once.
    async fn set_avatar_url(&self, account_id: AccountId, url: &str) -> Result<StudentProfile, StoreError>;
}

pub(crate) fn log_cancel(outcome: &CancelOutcome, account_id: AccountId) {
    if let Some(drift) = outcome.drift {
        tracing::warn!(
            enrollment_id = %outcome.enrollment.id,
            account_id = %account_id,
            charged = drift.charged.amount(),
            current = drift.current.amount(),
            refunded = outcome.refunded.amount(),
            "course price changed since enrollment"
        );
    }
    tracing::info!(
        enrollment_id = %outcome.enrollment.id,
        account_id = %account_id,
        refunded = outcome.refunded.amount(),
        balance = outcome.balance.amount(),
        "enrollment cancelled"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn revoked_or_expired_sessions_are_inactive() {
        let now = Utc::now();
        let mut session = Session {
            id: SessionId::new(),
            account_id: AccountId::new(),
            issued_at: now - Duration::minutes(5),
            expires_at: now + Duration::minutes(5),
            revoked_at: None,
        };
        assert!(session.is_active(now));
        assert!(!session.is_active(now + Duration::minutes(6)));
        session.revoked_at = Some(now);
        assert!(!session.is_active(now));
    }

    #[test]
    fn ledger_sees_unavailable_store_as_transient() {
        let err: LedgerError = StoreError::Unavailable("pool closed".into()).into();
        assert!(err.is_retryable());
    }
}
