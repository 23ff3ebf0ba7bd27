//! Postgres-backed store.
//!
//! Ledger operations run in `SERIALIZABLE` transactions. Within each one the
//! contended rows are locked in a fixed order (enroll: section then account;
//! cancel: enrollment then account) before anything is read for a decision,
//! and the debit itself is a conditional update, so the balance check and the
//! write cannot be separated by another transaction.
//!
//! ## Error Mapping
//!
//! | SQLx error | Postgres code | Ledger operations | Other operations |
//! |------------|---------------|-------------------|------------------|
//! | serialization failure | `40001` | retried, then `TransientStore` | `Unavailable` |
//! | deadlock | `40P01` | retried, then `TransientStore` | `Unavailable` |
//! | unique violation on the active-seat index | `23505` | `DuplicateEnrollment` | `Conflict` |
//! | other unique violation | `23505` | retried, then `TransientStore` | `Conflict` |
//! | foreign key violation | `23503` | `TransientStore` | `NotFound` |
//! | check violation | `23514` | retried, then `TransientStore` | `Invalid` |
//! | pool closed / io / anything else | n/a | `TransientStore` | `Unavailable` |

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use campus_catalog::{Course, DayOfWeek, Instructor, ScheduleSlot, Section, SectionView, Term};
use campus_core::{
    AccountId, CourseId, Credits, EnrollmentId, InstructorId, PaymentId, SectionId, SessionId,
    StudentId, TermId,
};
use campus_enrollment::{
    Account, AccountBalance, CancelSnapshot, EnrollCommand, EnrollSnapshot, Enrollment,
    EnrollmentStatus, LedgerError, NewPayment, Payment, ProfileFields, RefundPolicy, SectionTerms,
    StudentProfile, decide_cancel, decide_enroll, decide_top_up,
};

use super::{
    CancelOutcome, CatalogStore, EnrollOutcome, EnrollmentDetail, EnrollmentFilter, IdentityStore,
    LedgerStore, ProfileStore, Session, SessionStore, StoreError, TopUpOutcome, log_cancel,
};
use crate::retry::RetryPolicy;

const SCHEMA: &str = include_str!("schema.sql");
const ACTIVE_SEAT_INDEX: &str = "enrollments_one_active_seat";

const ACCOUNT_COLUMNS: &str = "id, name, email, password_hash, credit_balance, created_at";
const PROFILE_COLUMNS: &str =
    "id, email, first_name, last_name, phone, birth_date, avatar_url, created_at";
const COURSE_COLUMNS: &str = "c.id AS course_id, c.name AS course_name, c.code AS course_code, \
     c.credits AS course_credits, c.total_hours AS course_total_hours, \
     c.credit_cost AS course_credit_cost, c.description AS course_description, \
     c.image_url AS course_image_url";
const INSTRUCTOR_COLUMNS: &str = "i.id AS instructor_id, i.first_name AS instructor_first_name, \
     i.last_name AS instructor_last_name, i.email AS instructor_email, \
     i.department AS instructor_department";
const TERM_COLUMNS: &str = "t.id AS term_id, t.name AS term_name, t.starts_on AS term_starts_on, \
     t.ends_on AS term_ends_on";
const SECTION_COLUMNS: &str = "s.id AS section_id, s.course_id AS section_course_id, \
     s.instructor_id AS section_instructor_id, s.term_id AS section_term_id, \
     s.number AS section_number, s.capacity AS section_capacity";
const ENROLLMENT_COLUMNS: &str = "e.id AS enrollment_id, e.student_id AS enrollment_student_id, \
     e.section_id AS enrollment_section_id, e.status AS enrollment_status, \
     e.credits_charged AS enrollment_credits_charged, e.enrolled_at AS enrollment_enrolled_at, \
     e.cancelled_at AS enrollment_cancelled_at";

/// Postgres implementation of every store trait.
///
/// `Send + Sync`; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: Arc<PgPool>,
    refund_policy: RefundPolicy,
    retry: RetryPolicy,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
            refund_policy: RefundPolicy::default(),
            retry: RetryPolicy::default(),
        }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(16)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    pub fn with_refund_policy(mut self, policy: RefundPolicy) -> Self {
        self.refund_policy = policy;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create tables and indexes if they do not exist.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    async fn begin_serializable(
        &self,
        operation: &str,
    ) -> Result<Transaction<'static, Postgres>, LedgerError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_ledger_error(operation, e))?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await
            .map_err(|e| map_ledger_error(operation, e))?;
        Ok(tx)
    }

    async fn load_schedules(
        &self,
        section_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, Vec<ScheduleSlot>>, StoreError> {
        let mut by_section: HashMap<Uuid, Vec<ScheduleSlot>> = HashMap::new();
        if section_ids.is_empty() {
            return Ok(by_section);
        }

        let rows = sqlx::query(
            r#"
            SELECT section_id, day, starts_at, ends_at, room
            FROM section_schedules
            WHERE section_id = ANY($1)
            ORDER BY section_id, starts_at
            "#,
        )
        .bind(section_ids)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_schedules", e))?;

        for row in rows {
            let section_id: Uuid = row.try_get("section_id").map_err(|e| map_sqlx_error("load_schedules", e))?;
            let slot = schedule_from_row(&row).map_err(|e| map_sqlx_error("load_schedules", e))?;
            by_section.entry(section_id).or_default().push(slot);
        }
        for slots in by_section.values_mut() {
            slots.sort_by_key(|s| (s.day, s.starts_at));
        }
        Ok(by_section)
    }

    async fn enroll_once(
        &self,
        account_id: AccountId,
        section_id: SectionId,
        profile: ProfileFields,
    ) -> Result<EnrollOutcome, LedgerError> {
        let op = "enroll";
        let mut tx = self.begin_serializable(op).await?;

        // Section first: every enroll into this section queues here.
        let section = sqlx::query(
            r#"
            SELECT s.id, s.course_id, s.capacity, c.credit_cost
            FROM sections s
            LEFT JOIN courses c ON c.id = s.course_id
            WHERE s.id = $1
            FOR UPDATE OF s
            "#,
        )
        .bind(section_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_ledger_error(op, e))?
        .map(|row| -> Result<SectionTerms, sqlx::Error> {
            Ok(SectionTerms {
                section_id,
                course_id: CourseId::from_uuid(row.try_get("course_id")?),
                capacity: i64::from(row.try_get::<i32, _>("capacity")?),
                credit_cost: row.try_get("credit_cost")?,
            })
        })
        .transpose()
        .map_err(|e| map_ledger_error(op, e))?;

        let account = lock_account_by_id(&mut tx, account_id)
            .await
            .map_err(|e| map_ledger_error(op, e))?;

        let active: i64 = sqlx::query(
            "SELECT COUNT(*) AS active FROM enrollments WHERE section_id = $1 AND status = 'active'",
        )
        .bind(section_id.as_uuid())
        .fetch_one(&mut *tx)
        .await
        .and_then(|row| row.try_get("active"))
        .map_err(|e| map_ledger_error(op, e))?;

        let existing = match &account {
            Some(a) => profile_by_email(&mut tx, &a.email)
                .await
                .map_err(|e| map_ledger_error(op, e))?,
            None => None,
        };
        let already_enrolled = match &existing {
            Some(p) => sqlx::query(
                r#"
                SELECT EXISTS (
                    SELECT 1 FROM enrollments
                    WHERE student_id = $1 AND section_id = $2 AND status = 'active'
                ) AS taken
                "#,
            )
            .bind(p.id.as_uuid())
            .bind(section_id.as_uuid())
            .fetch_one(&mut *tx)
            .await
            .and_then(|row| row.try_get::<bool, _>("taken"))
            .map_err(|e| map_ledger_error(op, e))?,
            None => false,
        };

        let snapshot = EnrollSnapshot {
            account,
            section,
            active_in_section: u32::try_from(active).unwrap_or(u32::MAX),
            profile: existing.clone(),
            already_enrolled,
        };
        // Returning early drops `tx`, which rolls it back.
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
                insert_profile(&mut tx, &created)
                    .await
                    .map_err(|e| map_ledger_error(op, e))?;
                created
            }
            None => existing.ok_or_else(|| {
                LedgerError::TransientStore("student profile disappeared mid-transaction".to_string())
            })?,
        };

        let debited: Option<i64> = sqlx::query(
            r#"
            UPDATE accounts
            SET credit_balance = credit_balance - $1
            WHERE id = $2 AND credit_balance >= $1
            RETURNING credit_balance
            "#,
        )
        .bind(decision.debit.amount())
        .bind(account_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .and_then(|row| row.map(|r| r.try_get("credit_balance")).transpose())
        .map_err(|e| map_ledger_error(op, e))?;

        let Some(balance) = debited else {
            let balance = snapshot.account.map(|a| a.balance).unwrap_or(Credits::ZERO);
            return Err(LedgerError::InsufficientCredits {
                balance,
                required: decision.debit,
            });
        };

        let enrollment = decision.enrollment;
        sqlx::query(
            r#"
            INSERT INTO enrollments (id, student_id, section_id, status, credits_charged, enrolled_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(enrollment.id.as_uuid())
        .bind(enrollment.student_id.as_uuid())
        .bind(enrollment.section_id.as_uuid())
        .bind(enrollment.status.as_str())
        .bind(enrollment.credits_charged.amount())
        .bind(enrollment.enrolled_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_ledger_error(op, e))?;

        tx.commit().await.map_err(|e| map_ledger_error(op, e))?;

        let balance = Credits::new(balance)?;
        tracing::info!(
            enrollment_id = %enrollment.id,
            account_id = %account_id,
            debited = decision.debit.amount(),
            balance = balance.amount(),
            "enrollment created"
        );
        Ok(EnrollOutcome {
            enrollment,
            student,
            balance,
        })
    }

    async fn cancel_once(&self, enrollment_id: EnrollmentId) -> Result<(CancelOutcome, AccountId), LedgerError> {
        let op = "cancel";
        let mut tx = self.begin_serializable(op).await?;

        let enrollment = sqlx::query(&format!(
            "SELECT {ENROLLMENT_COLUMNS} FROM enrollments e WHERE e.id = $1 FOR UPDATE"
        ))
        .bind(enrollment_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .and_then(|row| row.as_ref().map(enrollment_from_row).transpose())
        .map_err(|e| map_ledger_error(op, e))?;

        let (refund_account, current_cost) = match &enrollment {
            Some(current) => {
                let account = sqlx::query(
                    r#"
                    SELECT a.id, a.email, a.credit_balance
                    FROM student_profiles p
                    JOIN accounts a ON a.email = p.email
                    WHERE p.id = $1
                    FOR UPDATE OF a
                    "#,
                )
                .bind(current.student_id.as_uuid())
                .fetch_optional(&mut *tx)
                .await
                .and_then(|row| row.as_ref().map(balance_from_row).transpose())
                .map_err(|e| map_ledger_error(op, e))?;

                let cost: Option<i64> = sqlx::query(
                    r#"
                    SELECT c.credit_cost
                    FROM sections s
                    JOIN courses c ON c.id = s.course_id
                    WHERE s.id = $1
                    "#,
                )
                .bind(current.section_id.as_uuid())
                .fetch_optional(&mut *tx)
                .await
                .and_then(|row| row.map(|r| r.try_get("credit_cost")).transpose())
                .map_err(|e| map_ledger_error(op, e))?;

                (account, cost)
            }
            None => (None, None),
        };

        let decision = decide_cancel(
            &CancelSnapshot {
                enrollment,
                refund_account,
                current_cost,
            },
            self.refund_policy,
            Utc::now(),
        )?;

        let balance: i64 = sqlx::query(
            r#"
            UPDATE accounts
            SET credit_balance = credit_balance + $1
            WHERE id = $2
            RETURNING credit_balance
            "#,
        )
        .bind(decision.refund.amount())
        .bind(decision.account_id.as_uuid())
        .fetch_one(&mut *tx)
        .await
        .and_then(|row| row.try_get("credit_balance"))
        .map_err(|e| map_ledger_error(op, e))?;

        let updated = sqlx::query(
            r#"
            UPDATE enrollments
            SET status = 'cancelled', cancelled_at = $2
            WHERE id = $1 AND status = 'active'
            "#,
        )
        .bind(enrollment_id.as_uuid())
        .bind(decision.enrollment.cancelled_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_ledger_error(op, e))?;
        if updated.rows_affected() != 1 {
            return Err(LedgerError::not_found("enrollment"));
        }

        tx.commit().await.map_err(|e| map_ledger_error(op, e))?;

        Ok((
            CancelOutcome {
                enrollment: decision.enrollment,
                refunded: decision.refund,
                balance: Credits::new(balance)?,
                drift: decision.drift,
            },
            decision.account_id,
        ))
    }

    async fn top_up_once(&self, account_id: AccountId, request: &NewPayment) -> Result<TopUpOutcome, LedgerError> {
        let op = "top_up";
        let mut tx = self.begin_serializable(op).await?;

        let account = lock_account_by_id(&mut tx, account_id)
            .await
            .map_err(|e| map_ledger_error(op, e))?
            .ok_or_else(|| LedgerError::not_found("account"))?;
        let decision = decide_top_up(&account, request, Utc::now())?;

        sqlx::query("UPDATE accounts SET credit_balance = $1 WHERE id = $2")
            .bind(decision.new_balance.amount())
            .bind(account_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_ledger_error(op, e))?;

        let payment = &decision.payment;
        sqlx::query(
            r#"
            INSERT INTO payments (id, account_id, amount, currency, method, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(payment.id.as_uuid())
        .bind(account_id.as_uuid())
        .bind(payment.amount.amount())
        .bind(&payment.currency)
        .bind(&payment.method)
        .bind(payment.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_ledger_error(op, e))?;

        tx.commit().await.map_err(|e| map_ledger_error(op, e))?;

        Ok(TopUpOutcome {
            payment: decision.payment,
            balance: decision.new_balance,
        })
    }
}

#[async_trait]
impl IdentityStore for PostgresStore {
    #[instrument(skip(self, account), fields(account_id = %account.id), err)]
    async fn create_account(&self, mut account: Account) -> Result<Account, StoreError> {
        account.email = account.email.trim().to_lowercase();
        sqlx::query(
            r#"
            INSERT INTO accounts (id, name, email, password_hash, credit_balance, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(account.id.as_uuid())
        .bind(&account.name)
        .bind(&account.email)
        .bind(&account.password_hash)
        .bind(account.credit_balance.amount())
        .bind(account.created_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_account", e))?;
        Ok(account)
    }

    async fn account_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        sqlx::query(&format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE email = $1"))
            .bind(email.trim().to_lowercase())
            .fetch_optional(&*self.pool)
            .await
            .and_then(|row| row.as_ref().map(account_from_row).transpose())
            .map_err(|e| map_sqlx_error("account_by_email", e))
    }

    async fn account_by_id(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        sqlx::query(&format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .and_then(|row| row.as_ref().map(account_from_row).transpose())
            .map_err(|e| map_sqlx_error("account_by_id", e))
    }
}

#[async_trait]
impl SessionStore for PostgresStore {
    async fn create_session(&self, session: Session) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO sessions (id, account_id, issued_at, expires_at, revoked_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(session.id.as_uuid())
        .bind(session.account_id.as_uuid())
        .bind(session.issued_at)
        .bind(session.expires_at)
        .bind(session.revoked_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_session", e))?;
        Ok(())
    }

    async fn session_active(&self, id: SessionId, now: DateTime<Utc>) -> Result<bool, StoreError> {
        sqlx::query(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM sessions
                WHERE id = $1 AND revoked_at IS NULL AND issued_at <= $2 AND expires_at > $2
            ) AS active
            "#,
        )
        .bind(id.as_uuid())
        .bind(now)
        .fetch_one(&*self.pool)
        .await
        .and_then(|row| row.try_get("active"))
        .map_err(|e| map_sqlx_error("session_active", e))
    }

    async fn revoke_session(&self, id: SessionId, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE sessions SET revoked_at = $2 WHERE id = $1 AND revoked_at IS NULL")
            .bind(id.as_uuid())
            .bind(now)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("revoke_session", e))?;
        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl CatalogStore for PostgresStore {
    #[instrument(skip(self, course), fields(code = %course.code), err)]
    async fn create_course(&self, course: Course) -> Result<Course, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO courses (id, name, code, credits, total_hours, credit_cost, description, image_url)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(course.id.as_uuid())
        .bind(&course.name)
        .bind(&course.code)
        .bind(course.credits)
        .bind(course.total_hours)
        .bind(course.credit_cost.amount())
        .bind(&course.description)
        .bind(&course.image_url)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_course", e))?;
        Ok(course)
    }

    #[instrument(skip(self), err)]
    async fn update_course_cost(&self, id: CourseId, cost: Credits) -> Result<Course, StoreError> {
        sqlx::query(&format!(
            "UPDATE courses c SET credit_cost = $2 WHERE c.id = $1 RETURNING {COURSE_COLUMNS}"
        ))
        .bind(id.as_uuid())
        .bind(cost.amount())
        .fetch_optional(&*self.pool)
        .await
        .and_then(|row| row.as_ref().map(course_from_row).transpose())
        .map_err(|e| map_sqlx_error("update_course_cost", e))?
        .ok_or_else(|| StoreError::NotFound("course".to_string()))
    }

    async fn list_courses(&self) -> Result<Vec<Course>, StoreError> {
        sqlx::query(&format!("SELECT {COURSE_COLUMNS} FROM courses c ORDER BY c.code"))
            .fetch_all(&*self.pool)
            .await
            .and_then(|rows| rows.iter().map(course_from_row).collect())
            .map_err(|e| map_sqlx_error("list_courses", e))
    }

    async fn get_course(&self, id: CourseId) -> Result<Option<Course>, StoreError> {
        sqlx::query(&format!("SELECT {COURSE_COLUMNS} FROM courses c WHERE c.id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .and_then(|row| row.as_ref().map(course_from_row).transpose())
            .map_err(|e| map_sqlx_error("get_course", e))
    }

    async fn create_instructor(&self, instructor: Instructor) -> Result<Instructor, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO instructors (id, first_name, last_name, email, department)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(instructor.id.as_uuid())
        .bind(&instructor.first_name)
        .bind(&instructor.last_name)
        .bind(&instructor.email)
        .bind(&instructor.department)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_instructor", e))?;
        Ok(instructor)
    }

    async fn list_instructors(&self) -> Result<Vec<Instructor>, StoreError> {
        sqlx::query(&format!(
            "SELECT {INSTRUCTOR_COLUMNS} FROM instructors i ORDER BY i.last_name, i.first_name"
        ))
        .fetch_all(&*self.pool)
        .await
        .and_then(|rows| rows.iter().map(instructor_from_row).collect())
        .map_err(|e| map_sqlx_error("list_instructors", e))
    }

    async fn create_term(&self, term: Term) -> Result<Term, StoreError> {
        sqlx::query("INSERT INTO terms (id, name, starts_on, ends_on) VALUES ($1, $2, $3, $4)")
            .bind(term.id.as_uuid())
            .bind(&term.name)
            .bind(term.starts_on)
            .bind(term.ends_on)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("create_term", e))?;
        Ok(term)
    }

    async fn list_terms(&self) -> Result<Vec<Term>, StoreError> {
        sqlx::query(&format!("SELECT {TERM_COLUMNS} FROM terms t ORDER BY t.starts_on"))
            .fetch_all(&*self.pool)
            .await
            .and_then(|rows| rows.iter().map(term_from_row).collect())
            .map_err(|e| map_sqlx_error("list_terms", e))
    }

    #[instrument(skip(self, section), fields(section_id = %section.id), err)]
    async fn create_section(&self, section: Section) -> Result<Section, StoreError> {
        let op = "create_section";
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error(op, e))?;

        let refs = sqlx::query(
            r#"
            SELECT
                EXISTS (SELECT 1 FROM courses WHERE id = $1) AS course,
                EXISTS (SELECT 1 FROM instructors WHERE id = $2) AS instructor,
                EXISTS (SELECT 1 FROM terms WHERE id = $3) AS term
            "#,
        )
        .bind(section.course_id.as_uuid())
        .bind(section.instructor_id.as_uuid())
        .bind(section.term_id.as_uuid())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error(op, e))?;
        for entity in ["course", "instructor", "term"] {
            let exists: bool = refs.try_get(entity).map_err(|e| map_sqlx_error(op, e))?;
            if !exists {
                return Err(StoreError::NotFound(entity.to_string()));
            }
        }

        sqlx::query(
            r#"
            INSERT INTO sections (id, course_id, instructor_id, term_id, number, capacity)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(section.id.as_uuid())
        .bind(section.course_id.as_uuid())
        .bind(section.instructor_id.as_uuid())
        .bind(section.term_id.as_uuid())
        .bind(section.number)
        .bind(i32::try_from(section.capacity).map_err(|_| StoreError::Invalid("capacity is too large".to_string()))?)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error(op, e))?;

        for slot in &section.schedules {
            sqlx::query(
                r#"
                INSERT INTO section_schedules (section_id, day, starts_at, ends_at, room)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(section.id.as_uuid())
            .bind(slot.day.as_str())
            .bind(slot.starts_at)
            .bind(slot.ends_at)
            .bind(&slot.room)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error(op, e))?;
        }

        tx.commit().await.map_err(|e| map_sqlx_error(op, e))?;
        Ok(section)
    }

    async fn sections_for_course(&self, course_id: CourseId) -> Result<Vec<SectionView>, StoreError> {
        let op = "sections_for_course";
        let rows = sqlx::query(&format!(
            r#"
            SELECT {SECTION_COLUMNS}, {COURSE_COLUMNS}, {INSTRUCTOR_COLUMNS}, {TERM_COLUMNS},
                (SELECT COUNT(*) FROM enrollments e
                 WHERE e.section_id = s.id AND e.status = 'active') AS seats_taken
            FROM sections s
            JOIN courses c ON c.id = s.course_id
            JOIN instructors i ON i.id = s.instructor_id
            JOIN terms t ON t.id = s.term_id
            WHERE s.course_id = $1
            ORDER BY t.starts_on, s.number
            "#
        ))
        .bind(course_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error(op, e))?;

        let mut views = rows
            .iter()
            .map(|row| -> Result<SectionView, sqlx::Error> {
                let seats_taken: i64 = row.try_get("seats_taken")?;
                Ok(SectionView {
                    section: section_from_row(row)?,
                    course: course_from_row(row)?,
                    instructor: instructor_from_row(row)?,
                    term: term_from_row(row)?,
                    seats_taken: u32::try_from(seats_taken).unwrap_or(u32::MAX),
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| map_sqlx_error(op, e))?;

        let ids: Vec<Uuid> = views.iter().map(|v| *v.section.id.as_uuid()).collect();
        let mut schedules = self.load_schedules(&ids).await?;
        for view in &mut views {
            view.section.schedules = schedules.remove(view.section.id.as_uuid()).unwrap_or_default();
        }
        Ok(views)
    }
}

#[async_trait]
impl LedgerStore for PostgresStore {
    #[instrument(skip(self, profile), err)]
    async fn enroll(
        &self,
        account_id: AccountId,
        section_id: SectionId,
        profile: ProfileFields,
    ) -> Result<EnrollOutcome, LedgerError> {
        self.retry
            .retry_if(
                |_| self.enroll_once(account_id, section_id, profile.clone()),
                LedgerError::is_retryable,
            )
            .await
    }

    #[instrument(skip(self), err)]
    async fn cancel(&self, enrollment_id: EnrollmentId) -> Result<CancelOutcome, LedgerError> {
        let (outcome, account_id) = self
            .retry
            .retry_if(|_| self.cancel_once(enrollment_id), LedgerError::is_retryable)
            .await?;
        log_cancel(&outcome, account_id);
        Ok(outcome)
    }

    #[instrument(skip(self, request), fields(amount = request.amount), err)]
    async fn top_up(&self, account_id: AccountId, request: NewPayment) -> Result<TopUpOutcome, LedgerError> {
        self.retry
            .retry_if(|_| self.top_up_once(account_id, &request), LedgerError::is_retryable)
            .await
    }

    async fn enrollments_for_account(
        &self,
        account_id: AccountId,
        filter: &EnrollmentFilter,
    ) -> Result<Vec<EnrollmentDetail>, StoreError> {
        let op = "enrollments_for_account";
        let rows = sqlx::query(&format!(
            r#"
            SELECT {ENROLLMENT_COLUMNS}, {SECTION_COLUMNS}, {COURSE_COLUMNS},
                   {INSTRUCTOR_COLUMNS}, {TERM_COLUMNS}
            FROM accounts a
            JOIN student_profiles p ON p.email = a.email
            JOIN enrollments e ON e.student_id = p.id
            JOIN sections s ON s.id = e.section_id
            JOIN courses c ON c.id = s.course_id
            JOIN instructors i ON i.id = s.instructor_id
            JOIN terms t ON t.id = s.term_id
            WHERE a.id = $1
                AND ($2::text IS NULL OR c.code ILIKE '%' || $2 || '%' OR c.name ILIKE '%' || $2 || '%')
                AND ($3::uuid IS NULL OR t.id = $3)
                AND ($4::text IS NULL OR e.status = $4)
            ORDER BY e.enrolled_at DESC
            "#
        ))
        .bind(account_id.as_uuid())
        .bind(filter.course.as_deref())
        .bind(filter.term_id.map(Uuid::from))
        .bind(filter.status.map(|s| s.as_str()))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error(op, e))?;

        let mut details = rows
            .iter()
            .map(|row| -> Result<EnrollmentDetail, sqlx::Error> {
                Ok(EnrollmentDetail {
                    enrollment: enrollment_from_row(row)?,
                    section: section_from_row(row)?,
                    course: course_from_row(row)?,
                    instructor: instructor_from_row(row)?,
                    term: term_from_row(row)?,
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| map_sqlx_error(op, e))?;

        let ids: Vec<Uuid> = details.iter().map(|d| *d.section.id.as_uuid()).collect();
        let schedules = self.load_schedules(&ids).await?;
        for detail in &mut details {
            detail.section.schedules = schedules
                .get(detail.section.id.as_uuid())
                .cloned()
                .unwrap_or_default();
        }
        Ok(details)
    }

    async fn enrollment_owner(&self, enrollment_id: EnrollmentId) -> Result<Option<AccountId>, StoreError> {
        sqlx::query(
            r#"
            SELECT a.id
            FROM enrollments e
            JOIN student_profiles p ON p.id = e.student_id
            JOIN accounts a ON a.email = p.email
            WHERE e.id = $1
            "#,
        )
        .bind(enrollment_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .and_then(|row| row.map(|r| r.try_get::<Uuid, _>("id")).transpose())
        .map(|id| id.map(AccountId::from_uuid))
        .map_err(|e| map_sqlx_error("enrollment_owner", e))
    }

    async fn payments_for_account(&self, account_id: AccountId) -> Result<Vec<Payment>, StoreError> {
        sqlx::query(
            r#"
            SELECT id, account_id, amount, currency, method, created_at
            FROM payments
            WHERE account_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(account_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .and_then(|rows| rows.iter().map(payment_from_row).collect())
        .map_err(|e| map_sqlx_error("payments_for_account", e))
    }
}

#[async_trait]
impl ProfileStore for PostgresStore {
    async fn profile_for_account(&self, account_id: AccountId) -> Result<Option<StudentProfile>, StoreError> {
        sqlx::query(&format!(
            r#"
            SELECT {PROFILE_COLUMNS}
            FROM student_profiles
            WHERE email = (SELECT email FROM accounts WHERE id = $1)
            "#
        ))
        .bind(account_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .and_then(|row| row.as_ref().map(profile_from_row).transpose())
        .map_err(|e| map_sqlx_error("profile_for_account", e))
    }

    async fn set_avatar_url(&self, account_id: AccountId, url: &str) -> Result<StudentProfile, StoreError> {
        sqlx::query(&format!(
            r#"
            UPDATE student_profiles
            SET avatar_url = $2
            WHERE email = (SELECT email FROM accounts WHERE id = $1)
            RETURNING {PROFILE_COLUMNS}
            "#
        ))
        .bind(account_id.as_uuid())
        .bind(url)
        .fetch_optional(&*self.pool)
        .await
        .and_then(|row| row.as_ref().map(profile_from_row).transpose())
        .map_err(|e| map_sqlx_error("set_avatar_url", e))?
        .ok_or_else(|| StoreError::NotFound("student profile".to_string()))
    }
}

// Transaction helpers

async fn lock_account_by_id(
    tx: &mut Transaction<'_, Postgres>,
    account_id: AccountId,
) -> Result<Option<AccountBalance>, sqlx::Error> {
    sqlx::query("SELECT id, email, credit_balance FROM accounts WHERE id = $1 FOR UPDATE")
        .bind(account_id.as_uuid())
        .fetch_optional(&mut **tx)
        .await?
        .as_ref()
        .map(balance_from_row)
        .transpose()
}

async fn profile_by_email(
    tx: &mut Transaction<'_, Postgres>,
    email: &str,
) -> Result<Option<StudentProfile>, sqlx::Error> {
    sqlx::query(&format!("SELECT {PROFILE_COLUMNS} FROM student_profiles WHERE email = $1"))
        .bind(email)
        .fetch_optional(&mut **tx)
        .await?
        .as_ref()
        .map(profile_from_row)
        .transpose()
}

async fn insert_profile(
    tx: &mut Transaction<'_, Postgres>,
    profile: &StudentProfile,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO student_profiles
            (id, email, first_name, last_name, phone, birth_date, avatar_url, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(profile.id.as_uuid())
    .bind(&profile.email)
    .bind(&profile.first_name)
    .bind(&profile.last_name)
    .bind(&profile.phone)
    .bind(profile.birth_date)
    .bind(&profile.avatar_url)
    .bind(profile.created_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

// Row decoding

fn decode_error(err: impl std::error::Error + Send + Sync + 'static) -> sqlx::Error {
    sqlx::Error::Decode(Box::new(err))
}

fn credits(row: &PgRow, column: &str) -> Result<Credits, sqlx::Error> {
    Credits::new(row.try_get(column)?).map_err(decode_error)
}

fn account_from_row(row: &PgRow) -> Result<Account, sqlx::Error> {
    Ok(Account {
        id: AccountId::from_uuid(row.try_get("id")?),
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        credit_balance: credits(row, "credit_balance")?,
        created_at: row.try_get("created_at")?,
    })
}

fn balance_from_row(row: &PgRow) -> Result<AccountBalance, sqlx::Error> {
    Ok(AccountBalance {
        account_id: AccountId::from_uuid(row.try_get("id")?),
        email: row.try_get("email")?,
        balance: credits(row, "credit_balance")?,
    })
}

fn profile_from_row(row: &PgRow) -> Result<StudentProfile, sqlx::Error> {
    Ok(StudentProfile {
        id: StudentId::from_uuid(row.try_get("id")?),
        email: row.try_get("email")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        phone: row.try_get("phone")?,
        birth_date: row.try_get("birth_date")?,
        avatar_url: row.try_get("avatar_url")?,
        created_at: row.try_get("created_at")?,
    })
}

fn course_from_row(row: &PgRow) -> Result<Course, sqlx::Error> {
    Ok(Course {
        id: CourseId::from_uuid(row.try_get("course_id")?),
        name: row.try_get("course_name")?,
        code: row.try_get("course_code")?,
        credits: row.try_get("course_credits")?,
        total_hours: row.try_get("course_total_hours")?,
        credit_cost: credits(row, "course_credit_cost")?,
        description: row.try_get("course_description")?,
        image_url: row.try_get("course_image_url")?,
    })
}

fn instructor_from_row(row: &PgRow) -> Result<Instructor, sqlx::Error> {
    Ok(Instructor {
        id: InstructorId::from_uuid(row.try_get("instructor_id")?),
        first_name: row.try_get("instructor_first_name")?,
        last_name: row.try_get("instructor_last_name")?,
        email: row.try_get("instructor_email")?,
        department: row.try_get("instructor_department")?,
    })
}

fn term_from_row(row: &PgRow) -> Result<Term, sqlx::Error> {
    Ok(Term {
        id: TermId::from_uuid(row.try_get("term_id")?),
        name: row.try_get("term_name")?,
        starts_on: row.try_get("term_starts_on")?,
        ends_on: row.try_get("term_ends_on")?,
    })
}

/// Schedules are loaded separately.
fn section_from_row(row: &PgRow) -> Result<Section, sqlx::Error> {
    let capacity: i32 = row.try_get("section_capacity")?;
    Ok(Section {
        id: SectionId::from_uuid(row.try_get("section_id")?),
        course_id: CourseId::from_uuid(row.try_get("section_course_id")?),
        instructor_id: InstructorId::from_uuid(row.try_get("section_instructor_id")?),
        term_id: TermId::from_uuid(row.try_get("section_term_id")?),
        number: row.try_get("section_number")?,
        capacity: u32::try_from(capacity).map_err(decode_error)?,
        schedules: Vec::new(),
    })
}

fn schedule_from_row(row: &PgRow) -> Result<ScheduleSlot, sqlx::Error> {
    let day: String = row.try_get("day")?;
    Ok(ScheduleSlot {
        day: day.parse::<DayOfWeek>().map_err(decode_error)?,
        starts_at: row.try_get("starts_at")?,
        ends_at: row.try_get("ends_at")?,
        room: row.try_get("room")?,
    })
}

fn enrollment_from_row(row: &PgRow) -> Result<Enrollment, sqlx::Error> {
    let status: String = row.try_get("enrollment_status")?;
    Ok(Enrollment {
        id: EnrollmentId::from_uuid(row.try_get("enrollment_id")?),
        student_id: StudentId::from_uuid(row.try_get("enrollment_student_id")?),
        section_id: SectionId::from_uuid(row.try_get("enrollment_section_id")?),
        status: status.parse::<EnrollmentStatus>().map_err(decode_error)?,
        credits_charged: credits(row, "enrollment_credits_charged")?,
        enrolled_at: row.try_get("enrollment_enrolled_at")?,
        cancelled_at: row.try_get("enrollment_cancelled_at")?,
    })
}

fn payment_from_row(row: &PgRow) -> Result<Payment, sqlx::Error> {
    Ok(Payment {
        id: PaymentId::from_uuid(row.try_get("id")?),
        account_id: AccountId::from_uuid(row.try_get("account_id")?),
        amount: credits(row, "amount")?,
        currency: row.try_get("currency")?,
        method: row.try_get("method")?,
        created_at: row.try_get("created_at")?,
    })
}

// Error mapping

fn pg_code(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().map(|c| c.to_string()),
        _ => None,
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match pg_code(&err).as_deref() {
        Some("23505") => StoreError::Conflict(unique_message(&err)),
        Some("23503") => StoreError::NotFound(format!("row referenced by {operation}")),
        Some("23514") => StoreError::Invalid(format!("check constraint failed in {operation}: {err}")),
        _ => StoreError::Unavailable(format!("sqlx error in {operation}: {err}")),
    }
}

fn unique_message(err: &sqlx::Error) -> String {
    match err {
        sqlx::Error::Database(db_err) => match db_err.constraint() {
            Some("accounts_email_key") => "email is already registered".to_string(),
            Some("courses_code_key") => "course code already exists".to_string(),
            Some("instructors_email_key") => "instructor email already exists".to_string(),
            Some("terms_name_key") => "term name already exists".to_string(),
            Some(other) => format!("duplicate value violates {other}"),
            None => "duplicate value".to_string(),
        },
        _ => "duplicate value".to_string(),
    }
}

/// Ledger operations only distinguish duplicates; everything else is worth
/// retrying or reporting as transient.
fn map_ledger_error(operation: &str, err: sqlx::Error) -> LedgerError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some("23505") && db_err.constraint() == Some(ACTIVE_SEAT_INDEX) {
            return LedgerError::DuplicateEnrollment;
        }
    }
    match pg_code(&err).as_deref() {
        Some("40001") | Some("40P01") => {
            LedgerError::TransientStore(format!("serialization conflict in {operation}"))
        }
        _ => LedgerError::TransientStore(format!("sqlx error in {operation}: {err}")),
    }
}
