use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use campus_core::{Credits, DomainError, EnrollmentId, Entity, SectionId, StudentId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrollmentStatus {
    Active,
    Cancelled,
}

impl EnrollmentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            EnrollmentStatus::Active => "active",
            EnrollmentStatus::Cancelled => "cancelled",
        }
    }
}

impl core::str::FromStr for EnrollmentStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(EnrollmentStatus::Active),
            "cancelled" => Ok(EnrollmentStatus::Cancelled),
            other => Err(DomainError::validation(format!(
                "unknown enrollment status '{other}'"
            ))),
        }
    }
}

/// A student's seat in a section.
///
/// Cancellation flips the status and stamps `cancelled_at`; rows are never
/// deleted. `credits_charged` is the course cost debited at enrollment time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: EnrollmentId,
    pub student_id: StudentId,
    pub section_id: SectionId,
    pub status: EnrollmentStatus,
    pub credits_charged: Credits,
    pub enrolled_at: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Entity for Enrollment {
    type Id = EnrollmentId;

    fn id(&self) -> EnrollmentId {
        self.id
    }
}

impl Enrollment {
    pub fn is_active(&self) -> bool {
        self.status == EnrollmentStatus::Active
    }
}
