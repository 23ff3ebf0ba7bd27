use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use campus_core::{AccountId, Credits, DomainError, Entity, StudentId, error::require_non_blank};

/// A login account. Owns the credit balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub name: String,
    /// Lower-cased; unique across accounts.
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub credit_balance: Credits,
    pub created_at: DateTime<Utc>,
}

impl Entity for Account {
    type Id = AccountId;

    fn id(&self) -> AccountId {
        self.id
    }
}

impl Account {
    pub fn balance(&self) -> AccountBalance {
        AccountBalance {
            account_id: self.id,
            email: self.email.clone(),
            balance: self.credit_balance,
        }
    }
}

/// The slice of an account the ledger reads (and locks) inside a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountBalance {
    pub account_id: AccountId,
    pub email: String,
    pub balance: Credits,
}

/// Student contact record. Linked to its account by email and created the
/// first time the account enrolls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentProfile {
    pub id: StudentId,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub birth_date: NaiveDate,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Entity for StudentProfile {
    type Id = StudentId;

    fn id(&self) -> StudentId {
        self.id
    }
}

/// Profile fields supplied with an enrollment request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileFields {
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub birth_date: NaiveDate,
}

impl ProfileFields {
    pub fn into_profile(
        self,
        id: StudentId,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<StudentProfile, DomainError> {
        if self.birth_date > now.date_naive() {
            return Err(DomainError::validation("birth_date must not be in the future"));
        }

        Ok(StudentProfile {
            id,
            email: email.to_lowercase(),
            first_name: require_non_blank("first_name", &self.first_name)?,
            last_name: require_non_blank("last_name", &self.last_name)?,
            phone: require_non_blank("phone", &self.phone)?,
            birth_date: self.birth_date,
            avatar_url: None,
            created_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fields() -> ProfileFields {
        ProfileFields {
            first_name: " Maria ".to_string(),
            last_name: "Gomez".to_string(),
            phone: "+57 300 000 0000".to_string(),
            birth_date: NaiveDate::from_ymd_opt(2001, 4, 9).unwrap(),
        }
    }

    #[test]
    fn profile_is_keyed_by_lowercase_email() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let profile = fields()
            .into_profile(StudentId::new(), "Maria@Uni.edu", now)
            .unwrap();
        assert_eq!(profile.email, "maria@uni.edu");
        assert_eq!(profile.first_name, "Maria");
        assert_eq!(profile.avatar_url, None);
    }

    #[test]
    fn future_birth_date_is_rejected() {
        let now = Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap();
        assert!(fields().into_profile(StudentId::new(), "a@b.c", now).is_err());
    }

    #[test]
    fn password_hash_never_serializes() {
        let account = Account {
            id: AccountId::new(),
            name: "Maria".to_string(),
            email: "maria@uni.edu".to_string(),
            password_hash: "$argon2id$secret".to_string(),
            credit_balance: Credits::ZERO,
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&account).unwrap();
        assert!(!json.contains("argon2"));
    }
}
