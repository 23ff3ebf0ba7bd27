use serde::{Deserialize, Serialize};

use campus_core::{CourseId, Credits, DomainError, Entity, error::require_non_blank};

/// A course in the catalog.
///
/// `credit_cost` is what enrolling in any section of the course debits from
/// the student's balance; `credits` is the academic weight shown to students.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub id: CourseId,
    pub name: String,
    pub code: String,
    pub credits: i32,
    pub total_hours: i32,
    pub credit_cost: Credits,
    pub description: Option<String>,
    pub image_url: Option<String>,
}

impl Entity for Course {
    type Id = CourseId;

    fn id(&self) -> CourseId {
        self.id
    }
}

/// Input for creating a course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCourse {
    pub name: String,
    pub code: String,
    pub credits: i32,
    pub total_hours: i32,
    pub credit_cost: Credits,
    pub description: Option<String>,
    pub image_url: Option<String>,
}

impl NewCourse {
    /// Validate and assign an id. Codes are normalized to upper case so that
    /// uniqueness is case-insensitive.
    pub fn into_course(self, id: CourseId) -> Result<Course, DomainError> {
        let name = require_non_blank("name", &self.name)?;
        let code = require_non_blank("code", &self.code)?.to_uppercase();
        if self.credits <= 0 {
            return Err(DomainError::validation("credits must be positive"));
        }
        if self.total_hours <= 0 {
            return Err(DomainError::validation("total_hours must be positive"));
        }
        if self.credit_cost.is_zero() {
            return Err(DomainError::validation("credit_cost must be positive"));
        }

        Ok(Course {
            id,
            name,
            code,
            credits: self.credits,
            total_hours: self.total_hours,
            credit_cost: self.credit_cost,
            description: non_empty(self.description),
            image_url: non_empty(self.image_url),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn algebra() -> NewCourse {
        NewCourse {
            name: "Linear Algebra".to_string(),
            code: "mat-201".to_string(),
            credits: 3,
            total_hours: 48,
            credit_cost: Credits::new(20_000).unwrap(),
            description: Some("   ".to_string()),
            image_url: None,
        }
    }

    #[test]
    fn code_is_upper_cased_and_blank_description_dropped() {
        let course = algebra().into_course(CourseId::new()).unwrap();
        assert_eq!(course.code, "MAT-201");
        assert_eq!(course.description, None);
    }

    #[test]
    fn zero_cost_is_a_validation_error() {
        let mut input = algebra();
        input.credit_cost = Credits::ZERO;
        assert_eq!(
            input.into_course(CourseId::new()),
            Err(DomainError::validation("credit_cost must be positive"))
        );
    }

    #[test]
    fn missing_name_is_rejected() {
        let mut input = algebra();
        input.name = String::new();
        assert!(matches!(
            input.into_course(CourseId::new()),
            Err(DomainError::Validation(_))
        ));
    }
}
