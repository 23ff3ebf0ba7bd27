use std::collections::HashSet;

use thiserror::Error;

use campus_core::AccountId;

use crate::{Permission, Principal};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),

    #[error("forbidden: resource belongs to another account")]
    NotOwner,
}

/// Command-side authorization contract (checked at the command boundary).
///
/// The API layer enforces these requirements before touching the store.
pub trait CommandAuthorization {
    fn required_permissions(&self) -> &[Permission];
}

/// Authorize a principal for a single permission.
///
/// - No IO
/// - No panics
pub fn authorize(principal: &Principal, required: &Permission) -> Result<(), AuthzError> {
    let perms: HashSet<&str> = principal.permissions.iter().map(|p| p.as_str()).collect();

    if perms.contains("*") || perms.contains(required.as_str()) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

/// Allow access to a resource owned by `owner` (admins may act on anyone's).
pub fn authorize_owner(principal: &Principal, owner: AccountId) -> Result<(), AuthzError> {
    if principal.account_id == owner || principal.is_admin() {
        Ok(())
    } else {
        Err(AuthzError::NotOwner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Role;

    fn student(account_id: AccountId) -> Principal {
        Principal {
            account_id,
            roles: vec![Role::STUDENT],
            permissions: vec![Permission::ENROLLMENTS_CREATE],
        }
    }

    #[test]
    fn explicit_permission_is_granted() {
        let p = student(AccountId::new());
        assert_eq!(authorize(&p, &Permission::ENROLLMENTS_CREATE), Ok(()));
        assert_eq!(
            authorize(&p, &Permission::CATALOG_WRITE),
            Err(AuthzError::Forbidden("catalog.write".to_string()))
        );
    }

    #[test]
    fn wildcard_grants_everything() {
        let p = Principal {
            account_id: AccountId::new(),
            roles: vec![Role::ADMIN],
            permissions: vec![Permission::new("*")],
        };
        assert_eq!(authorize(&p, &Permission::CATALOG_WRITE), Ok(()));
    }

    #[test]
    fn owners_and_admins_pass_the_owner_check() {
        let owner = AccountId::new();
        assert_eq!(authorize_owner(&student(owner), owner), Ok(()));
        assert_eq!(
            authorize_owner(&student(AccountId::new()), owner),
            Err(AuthzError::NotOwner)
        );

        let admin = Principal {
            account_id: AccountId::new(),
            roles: vec![Role::ADMIN],
            permissions: vec![Permission::new("*")],
        };
        assert_eq!(authorize_owner(&admin, owner), Ok(()));
    }
}
