use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{Value, json};

use campus_catalog::SectionView;
use campus_enrollment::{Account, ProfileFields, StudentProfile};
use campus_infra::store::{CancelOutcome, EnrollOutcome, EnrollmentDetail};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCostRequest {
    pub credit_cost: i64,
}

#[derive(Debug, Deserialize)]
pub struct EnrollRequest {
    pub section_id: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub birth_date: NaiveDate,
}

impl EnrollRequest {
    pub fn profile(&self) -> ProfileFields {
        ProfileFields {
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            phone: self.phone.clone(),
            birth_date: self.birth_date,
        }
    }
}

/// `GET /me/enrollments` query string; every filter is optional.
#[derive(Debug, Default, Deserialize)]
pub struct EnrollmentQuery {
    pub course: Option<String>,
    pub term_id: Option<String>,
    pub status: Option<String>,
}

// -------------------------
// Response mapping
// -------------------------

pub fn account_to_json(account: &Account) -> Value {
    json!({
        "id": account.id.to_string(),
        "name": account.name,
        "email": account.email,
        "credit_balance": account.credit_balance.amount(),
        "created_at": account.created_at.to_rfc3339(),
    })
}

pub fn profile_to_json(profile: &StudentProfile) -> Value {
    json!({
        "id": profile.id.to_string(),
        "email": profile.email,
        "first_name": profile.first_name,
        "last_name": profile.last_name,
        "phone": profile.phone,
        "birth_date": profile.birth_date.to_string(),
        "avatar_url": profile.avatar_url,
    })
}

pub fn section_view_to_json(view: &SectionView) -> Value {
    json!({
        "id": view.section.id.to_string(),
        "number": view.section.number,
        "capacity": view.section.capacity,
        "seats_taken": view.seats_taken,
        "seats_remaining": view.seats_remaining(),
        "schedules": view.section.schedules,
        "instructor": view.instructor,
        "term": view.term,
    })
}

pub fn enrollment_detail_to_json(detail: &EnrollmentDetail) -> Value {
    json!({
        "id": detail.enrollment.id.to_string(),
        "status": detail.enrollment.status.as_str(),
        "credits_charged": detail.enrollment.credits_charged.amount(),
        "enrolled_at": detail.enrollment.enrolled_at.to_rfc3339(),
        "cancelled_at": detail.enrollment.cancelled_at.map(|t| t.to_rfc3339()),
        "course": {
            "id": detail.course.id.to_string(),
            "code": detail.course.code,
            "name": detail.course.name,
            "credits": detail.course.credits,
        },
        "section": {
            "id": detail.section.id.to_string(),
            "number": detail.section.number,
            "schedules": detail.section.schedules,
        },
        "instructor": {
            "id": detail.instructor.id.to_string(),
            "name": detail.instructor.full_name(),
        },
        "term": {
            "id": detail.term.id.to_string(),
            "name": detail.term.name,
        },
    })
}

pub fn enroll_outcome_to_json(outcome: &EnrollOutcome) -> Value {
    json!({
        "enrollment": outcome.enrollment,
        "student": profile_to_json(&outcome.student),
        "balance": outcome.balance.amount(),
    })
}

pub fn cancel_outcome_to_json(outcome: &CancelOutcome) -> Value {
    json!({
        "enrollment": outcome.enrollment,
        "refunded": outcome.refunded.amount(),
        "balance": outcome.balance.amount(),
        "price_drift": outcome.drift,
    })
}
