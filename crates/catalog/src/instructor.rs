use serde::{Deserialize, Serialize};

use campus_core::{DomainError, Entity, InstructorId, error::require_non_blank};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instructor {
    pub id: InstructorId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub department: Option<String>,
}

impl Entity for Instructor {
    type Id = InstructorId;

    fn id(&self) -> InstructorId {
        self.id
    }
}

impl Instructor {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewInstructor {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub department: Option<String>,
}

impl NewInstructor {
    pub fn into_instructor(self, id: InstructorId) -> Result<Instructor, DomainError> {
        let email = require_non_blank("email", &self.email)?.to_lowercase();
        if !email.contains('@') {
            return Err(DomainError::validation("email is malformed"));
        }

        Ok(Instructor {
            id,
            first_name: require_non_blank("first_name", &self.first_name)?,
            last_name: require_non_blank("last_name", &self.last_name)?,
            email,
            department: self
                .department
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_is_normalized() {
        let instructor = NewInstructor {
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: " Ada@Example.org ".to_string(),
            department: None,
        }
        .into_instructor(InstructorId::new())
        .unwrap();

        assert_eq!(instructor.email, "ada@example.org");
        assert_eq!(instructor.full_name(), "Ada Lovelace");
    }
}
