use campus_auth::Role;
use campus_core::{AccountId, SessionId};

/// Principal context for a request (authenticated account, session, roles).
///
/// Inserted by the auth middleware once the token and its session check out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    account_id: AccountId,
    session_id: SessionId,
    roles: Vec<Role>,
}

impl PrincipalContext {
    pub fn new(account_id: AccountId, session_id: SessionId, roles: Vec<Role>) -> Self {
        Self {
            account_id,
            session_id,
            roles,
        }
    }

    pub fn account_id(&self) -> AccountId {
        self.account_id
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }
}
