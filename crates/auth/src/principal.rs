use campus_core::AccountId;

use crate::{Permission, Role};

/// A fully resolved principal for authorization decisions.
///
/// Built by the API from verified session claims plus the role→permission
/// policy; this crate never looks anything up itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub account_id: AccountId,
    pub roles: Vec<Role>,
    pub permissions: Vec<Permission>,
}

impl Principal {
    pub fn is_admin(&self) -> bool {
        self.roles.iter().any(Role::is_admin)
    }
}
