use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use campus_core::{DomainError, Entity, TermId, error::require_non_blank};

/// An academic term (the period a section runs in).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Term {
    pub id: TermId,
    pub name: String,
    pub starts_on: NaiveDate,
    pub ends_on: NaiveDate,
}

impl Entity for Term {
    type Id = TermId;

    fn id(&self) -> TermId {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTerm {
    pub name: String,
    pub starts_on: NaiveDate,
    pub ends_on: NaiveDate,
}

impl NewTerm {
    pub fn into_term(self, id: TermId) -> Result<Term, DomainError> {
        if self.ends_on <= self.starts_on {
            return Err(DomainError::validation("term must end after it starts"));
        }
        Ok(Term {
            id,
            name: require_non_blank("name", &self.name)?,
            starts_on: self.starts_on,
            ends_on: self.ends_on,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inverted_dates_are_rejected() {
        let input = NewTerm {
            name: "2025-1".to_string(),
            starts_on: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            ends_on: NaiveDate::from_ymd_opt(2025, 2, 1).unwrap(),
        };
        assert!(input.into_term(TermId::new()).is_err());
    }
}
