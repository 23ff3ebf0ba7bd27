//! Enroll / Cancel / TopUp decisions.
//!
//! Checks run in a fixed order (configuration, capacity, duplicate, funds) and
//! all of them run before the caller writes anything.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use campus_core::{AccountId, CourseId, Credits, DomainError, EnrollmentId, PaymentId, SectionId, StudentId};

use crate::account::{AccountBalance, ProfileFields, StudentProfile};
use crate::enrollment::{Enrollment, EnrollmentStatus};
use crate::error::LedgerError;
use crate::payment::{NewPayment, Payment};

/// Which price a cancellation refunds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundPolicy {
    /// Refund what was debited at enrollment time.
    #[default]
    ChargedAmount,
    /// Refund the course's price at cancellation time.
    CurrentPrice,
}

impl core::str::FromStr for RefundPolicy {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "charged" | "charged_amount" => Ok(RefundPolicy::ChargedAmount),
            "current" | "current_price" => Ok(RefundPolicy::CurrentPrice),
            other => Err(DomainError::validation(format!(
                "unknown refund policy '{other}' (expected 'charged' or 'current')"
            ))),
        }
    }
}

/// Section and course pricing as stored. Raw integers on purpose: malformed
/// rows must surface as configuration errors, not panics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionTerms {
    pub section_id: SectionId,
    pub course_id: CourseId,
    pub capacity: i64,
    pub credit_cost: Option<i64>,
}

impl SectionTerms {
    fn validate(&self) -> Result<(u32, Credits), LedgerError> {
        let capacity = u32::try_from(self.capacity)
            .ok()
            .filter(|c| *c > 0)
            .ok_or_else(|| {
                LedgerError::Configuration(format!(
                    "section {} has invalid capacity {}",
                    self.section_id, self.capacity
                ))
            })?;
        let cost = self
            .credit_cost
            .filter(|c| *c > 0)
            .and_then(|c| Credits::new(c).ok())
            .ok_or_else(|| {
                LedgerError::Configuration(format!(
                    "course {} has no positive credit cost",
                    self.course_id
                ))
            })?;
        Ok((capacity, cost))
    }
}

/// Everything `decide_enroll` needs, read inside the enrolling transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollSnapshot {
    pub account: Option<AccountBalance>,
    pub section: Option<SectionTerms>,
    /// Active enrollments in the section, counted under the section lock.
    pub active_in_section: u32,
    /// Existing profile for the account's email, if any.
    pub profile: Option<StudentProfile>,
    /// Whether `profile` already holds an active seat in the section.
    pub already_enrolled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollCommand {
    pub account_id: AccountId,
    pub section_id: SectionId,
    pub profile: ProfileFields,
    pub now: DateTime<Utc>,
}

/// Writes an accepted enrollment requires, all in one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollDecision {
    pub account_id: AccountId,
    pub debit: Credits,
    pub new_balance: Credits,
    pub enrollment: Enrollment,
    pub new_profile: Option<StudentProfile>,
}

pub fn decide_enroll(
    snapshot: &EnrollSnapshot,
    command: &EnrollCommand,
) -> Result<EnrollDecision, LedgerError> {
    let account = snapshot
        .account
        .as_ref()
        .ok_or_else(|| LedgerError::not_found("account"))?;

    let terms = snapshot.section.as_ref().ok_or_else(|| {
        LedgerError::Configuration(format!("section {} does not exist", command.section_id))
    })?;
    let (capacity, cost) = terms.validate()?;

    if snapshot.active_in_section >= capacity {
        return Err(LedgerError::CapacityExceeded {
            section_id: terms.section_id,
            capacity,
        });
    }

    if snapshot.already_enrolled {
        return Err(LedgerError::DuplicateEnrollment);
    }

    let new_balance = account
        .balance
        .checked_sub(cost)
        .ok_or(LedgerError::InsufficientCredits {
            balance: account.balance,
            required: cost,
        })?;

    let (student_id, new_profile) = match &snapshot.profile {
        Some(profile) => (profile.id, None),
        None => {
            let profile = command.profile.clone().into_profile(
                StudentId::new(),
                &account.email,
                command.now,
            )?;
            (profile.id, Some(profile))
        }
    };

    Ok(EnrollDecision {
        account_id: account.account_id,
        debit: cost,
        new_balance,
        enrollment: Enrollment {
            id: EnrollmentId::new(),
            student_id,
            section_id: terms.section_id,
            status: EnrollmentStatus::Active,
            credits_charged: cost,
            enrolled_at: command.now,
            cancelled_at: None,
        },
        new_profile,
    })
}

/// Everything `decide_cancel` needs, read inside the cancelling transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelSnapshot {
    pub enrollment: Option<Enrollment>,
    /// Account resolved through the student's email.
    pub refund_account: Option<AccountBalance>,
    /// The course's price right now.
    pub current_cost: Option<i64>,
}

/// Charged price and current price disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PriceDrift {
    pub charged: Credits,
    pub current: Credits,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelDecision {
    pub account_id: AccountId,
    pub refund: Credits,
    pub new_balance: Credits,
    /// The enrollment in its cancelled state.
    pub enrollment: Enrollment,
    pub drift: Option<PriceDrift>,
}

pub fn decide_cancel(
    snapshot: &CancelSnapshot,
    policy: RefundPolicy,
    now: DateTime<Utc>,
) -> Result<CancelDecision, LedgerError> {
    let enrollment = snapshot
        .enrollment
        .as_ref()
        .filter(|e| e.is_active())
        .ok_or_else(|| LedgerError::not_found("enrollment"))?;

    let account = snapshot
        .refund_account
        .as_ref()
        .ok_or(LedgerError::RefundTargetMissing)?;

    let charged = enrollment.credits_charged;
    let current = snapshot
        .current_cost
        .filter(|c| *c > 0)
        .and_then(|c| Credits::new(c).ok());
    let drift = current
        .filter(|c| *c != charged)
        .map(|current| PriceDrift { charged, current });

    let refund = match policy {
        RefundPolicy::ChargedAmount => charged,
        RefundPolicy::CurrentPrice => current.ok_or_else(|| {
            LedgerError::Configuration("course has no positive credit cost to refund".into())
        })?,
    };

    let new_balance = account
        .balance
        .checked_add(refund)
        .ok_or_else(|| LedgerError::Validation("refund would overflow the balance".into()))?;

    Ok(CancelDecision {
        account_id: account.account_id,
        refund,
        new_balance,
        enrollment: Enrollment {
            status: EnrollmentStatus::Cancelled,
            cancelled_at: Some(now),
            ..enrollment.clone()
        },
        drift,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopUpDecision {
    pub payment: Payment,
    pub new_balance: Credits,
}

pub fn decide_top_up(
    account: &AccountBalance,
    request: &NewPayment,
    now: DateTime<Utc>,
) -> Result<TopUpDecision, LedgerError> {
    if request.amount <= 0 {
        return Err(LedgerError::Validation("amount must be positive".into()));
    }
    let amount = Credits::new(request.amount)?;
    let currency = request.normalized_currency()?;
    let new_balance = account
        .balance
        .checked_add(amount)
        .ok_or_else(|| LedgerError::Validation("top-up would overflow the balance".into()))?;

    Ok(TopUpDecision {
        payment: Payment {
            id: PaymentId::new(),
            account_id: account.account_id,
            amount,
            currency,
            method: request.normalized_method(),
            created_at: now,
        },
        new_balance,
    })
}
