//! Process configuration, read once from the environment at startup.

use std::{env, net::SocketAddr, str::FromStr};

use campus_enrollment::RefundPolicy;
use thiserror::Error;
use tracing::{info, warn};

const DEV_JWT_SECRET: &str = "dev-secret";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },

    #[error("{key} is required when {because}")]
    Missing { key: &'static str, because: &'static str },
}

/// Where avatar uploads go when a real bucket is configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageSettings {
    pub base_url: String,
    pub service_key: String,
    pub bucket: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub bind: SocketAddr,
    pub jwt_secret: String,
    pub session_ttl_minutes: i64,
    /// Postgres connection string; `None` runs on in-memory stores.
    pub database_url: Option<String>,
    pub refund_policy: RefundPolicy,
    pub ledger_max_attempts: usize,
    /// Lower-cased emails that get the admin role at login.
    pub admin_emails: Vec<String>,
    pub storage: Option<StorageSettings>,
    pub storage_bucket: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let use_persistent = parse_or("USE_PERSISTENT_STORES", false)?;
        let database_url = if use_persistent {
            Some(env::var("DATABASE_URL").map_err(|_| ConfigError::Missing {
                key: "DATABASE_URL",
                because: "USE_PERSISTENT_STORES=true",
            })?)
        } else {
            None
        };

        let jwt_secret = env::var("JWT_SECRET").unwrap_or_else(|_| {
            warn!("JWT_SECRET not set; using insecure dev default");
            DEV_JWT_SECRET.to_string()
        });

        let session_ttl_minutes: i64 = parse_or("SESSION_TTL_MINUTES", 120)?;
        if session_ttl_minutes <= 0 {
            return Err(ConfigError::Invalid {
                key: "SESSION_TTL_MINUTES",
                message: "must be positive".to_string(),
            });
        }

        let storage_bucket = env::var("STORAGE_BUCKET").unwrap_or_else(|_| "avatars".to_string());
        let storage = match (env::var("STORAGE_URL").ok(), env::var("STORAGE_KEY").ok()) {
            (Some(base_url), Some(service_key)) => Some(StorageSettings {
                base_url: base_url.trim_end_matches('/').to_string(),
                service_key,
                bucket: storage_bucket.clone(),
            }),
            (Some(_), None) => {
                return Err(ConfigError::Missing {
                    key: "STORAGE_KEY",
                    because: "STORAGE_URL is set",
                });
            }
            _ => {
                info!("STORAGE_URL not set; avatars are kept in memory");
                None
            }
        };

        Ok(Self {
            bind: parse_or("CAMPUS_BIND", SocketAddr::from(([0, 0, 0, 0], 8080)))?,
            jwt_secret,
            session_ttl_minutes,
            database_url,
            refund_policy: parse_or("CAMPUS_REFUND_POLICY", RefundPolicy::ChargedAmount)?,
            ledger_max_attempts: parse_or("LEDGER_MAX_ATTEMPTS", 5)?,
            admin_emails: parse_admin_emails(&env::var("CAMPUS_ADMIN_EMAILS").unwrap_or_default()),
            storage,
            storage_bucket,
        })
    }

    /// In-memory configuration with a fixed secret.
    pub fn for_tests() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 0)),
            jwt_secret: "test-secret".to_string(),
            session_ttl_minutes: 120,
            database_url: None,
            refund_policy: RefundPolicy::ChargedAmount,
            ledger_max_attempts: 5,
            admin_emails: vec!["admin@campus.test".to_string()],
            storage: None,
            storage_bucket: "avatars".to_string(),
        }
    }

    pub fn is_admin_email(&self, email: &str) -> bool {
        let email = email.trim().to_lowercase();
        self.admin_emails.iter().any(|a| *a == email)
    }
}

fn parse_or<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            message: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

fn parse_admin_emails(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|e| e.trim().to_lowercase())
        .filter(|e| !e.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_emails_are_normalized() {
        assert_eq!(
            parse_admin_emails(" Dean@Uni.edu, ,registrar@uni.edu "),
            vec!["dean@uni.edu".to_string(), "registrar@uni.edu".to_string()]
        );
    }

    #[test]
    fn admin_check_ignores_case() {
        let config = AppConfig::for_tests();
        assert!(config.is_admin_email("Admin@Campus.Test"));
        assert!(!config.is_admin_email("student@campus.test"));
    }
}
