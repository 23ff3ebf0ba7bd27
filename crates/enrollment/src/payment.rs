use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use campus_core::{AccountId, Credits, DomainError, Entity, PaymentId};

pub const DEFAULT_CURRENCY: &str = "COP";
pub const DEFAULT_METHOD: &str = "card";

/// A recorded credit purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub account_id: AccountId,
    pub amount: Credits,
    pub currency: String,
    pub method: String,
    pub created_at: DateTime<Utc>,
}

impl Entity for Payment {
    type Id = PaymentId;

    fn id(&self) -> PaymentId {
        self.id
    }
}

/// Top-up request. Amount is raw so that non-positive input is reported as a
/// validation failure rather than a deserialization error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPayment {
    pub amount: i64,
    pub currency: Option<String>,
    pub method: Option<String>,
}

impl NewPayment {
    pub(crate) fn normalized_currency(&self) -> Result<String, DomainError> {
        let currency = self
            .currency
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_CURRENCY)
            .to_uppercase();
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(DomainError::validation("currency must be a 3-letter ISO code"));
        }
        Ok(currency)
    }

    pub(crate) fn normalized_method(&self) -> String {
        self.method
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(DEFAULT_METHOD)
            .to_lowercase()
    }
}
