//! Store and adapter wiring.
//!
//! `AppConfig::database_url` decides between the Postgres store and the
//! in-memory one; every handler only sees the store traits.

use std::sync::Arc;

use anyhow::Context;
use chrono::{Duration, Utc};

use campus_auth::{Hs256Jwt, JwtClaims, JwtIssuer, Role, TokenError};
use campus_core::{AccountId, SessionId};
use campus_infra::{
    config::AppConfig,
    object_storage::{HttpObjectStorage, InMemoryObjectStorage, ObjectStorage},
    retry::RetryPolicy,
    store::{
        CatalogStore, IdentityStore, InMemoryStore, LedgerStore, PostgresStore, ProfileStore,
        Session, SessionStore, StoreError,
    },
};

#[derive(Clone)]
pub struct AppServices {
    pub identity: Arc<dyn IdentityStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub catalog: Arc<dyn CatalogStore>,
    pub ledger: Arc<dyn LedgerStore>,
    pub profiles: Arc<dyn ProfileStore>,
    pub storage: Arc<dyn ObjectStorage>,
    pub jwt: Arc<Hs256Jwt>,
    pub session_ttl: Duration,
    config: AppConfig,
}

/// A freshly opened session and the token that carries it.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub claims: JwtClaims,
}

#[derive(Debug)]
pub enum SessionIssueError {
    Store(StoreError),
    Token(TokenError),
}

impl AppServices {
    pub async fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let storage: Arc<dyn ObjectStorage> = match &config.storage {
            Some(settings) => Arc::new(HttpObjectStorage::new(settings.clone())),
            None => Arc::new(InMemoryObjectStorage::new("memory://", &config.storage_bucket)),
        };

        let services = match &config.database_url {
            Some(url) => {
                let store = PostgresStore::connect(url)
                    .await
                    .context("failed to connect to postgres")?
                    .with_refund_policy(config.refund_policy)
                    .with_retry(RetryPolicy::for_transactions(config.ledger_max_attempts));
                store.migrate().await.context("failed to apply schema")?;
                tracing::info!("using postgres stores");
                Self::with_store(Arc::new(store), storage, config)
            }
            None => {
                tracing::info!("using in-memory stores");
                let store = InMemoryStore::new().with_refund_policy(config.refund_policy);
                Self::with_store(Arc::new(store), storage, config)
            }
        };
        Ok(services)
    }

    /// Wire every store trait to one backing store.
    pub fn with_store<S>(store: Arc<S>, storage: Arc<dyn ObjectStorage>, config: &AppConfig) -> Self
    where
        S: IdentityStore + SessionStore + CatalogStore + LedgerStore + ProfileStore + 'static,
    {
        Self {
            identity: store.clone(),
            sessions: store.clone(),
            catalog: store.clone(),
            ledger: store.clone(),
            profiles: store,
            storage,
            jwt: Arc::new(Hs256Jwt::new(config.jwt_secret.as_bytes())),
            session_ttl: Duration::minutes(config.session_ttl_minutes),
            config: config.clone(),
        }
    }

    /// Roles granted at login; admins are listed by email in configuration.
    pub fn roles_for(&self, email: &str) -> Vec<Role> {
        if self.config.is_admin_email(email) {
            vec![Role::ADMIN]
        } else {
            vec![Role::STUDENT]
        }
    }

    /// Persist a session row, then sign a token pointing at it.
    pub async fn open_session(
        &self,
        account_id: AccountId,
        roles: Vec<Role>,
    ) -> Result<IssuedSession, SessionIssueError> {
        let now = Utc::now();
        let session = Session {
            id: SessionId::new(),
            account_id,
            issued_at: now,
            expires_at: now + self.session_ttl,
            revoked_at: None,
        };
        let claims = JwtClaims {
            sub: account_id,
            sid: session.id,
            roles,
            issued_at: session.issued_at,
            expires_at: session.expires_at,
        };

        self.sessions
            .create_session(session)
            .await
            .map_err(SessionIssueError::Store)?;
        let token = self.jwt.issue(&claims).map_err(SessionIssueError::Token)?;

        tracing::info!(account_id = %account_id, session_id = %claims.sid, "session opened");
        Ok(IssuedSession { token, claims })
    }
}
