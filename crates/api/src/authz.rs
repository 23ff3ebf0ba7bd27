//! API-side authorization guard for commands.
//!
//! Enforced at the command boundary, before the store is touched; domain
//! crates and stores stay auth-agnostic.

use campus_auth::{AuthzError, CommandAuthorization, Permission, Principal, Role, authorize};
use campus_core::AccountId;

use crate::context::PrincipalContext;

/// Check authorization for a command in the current request context.
pub fn authorize_command<C: CommandAuthorization>(
    principal: &PrincipalContext,
    command: &C,
) -> Result<(), AuthzError> {
    let principal = resolve(principal);
    for perm in command.required_permissions() {
        authorize(&principal, perm)?;
    }
    Ok(())
}

/// Owner-or-admin check for resources that belong to an account.
pub fn authorize_owner(principal: &PrincipalContext, owner: AccountId) -> Result<(), AuthzError> {
    campus_auth::authorize_owner(&resolve(principal), owner)
}

pub fn resolve(principal: &PrincipalContext) -> Principal {
    Principal {
        account_id: principal.account_id(),
        roles: principal.roles().to_vec(),
        permissions: permissions_from_roles(principal.roles()),
    }
}

/// Static role→permission policy.
fn permissions_from_roles(roles: &[Role]) -> Vec<Permission> {
    if roles.iter().any(Role::is_admin) {
        return vec![Permission::new("*")];
    }

    let mut permissions = Vec::new();
    if roles.contains(&Role::STUDENT) {
        permissions.extend([
            Permission::ENROLLMENTS_CREATE,
            Permission::ENROLLMENTS_CANCEL,
            Permission::PAYMENTS_CREATE,
            Permission::PROFILE_UPDATE,
        ]);
    }
    permissions
}

#[cfg(test)]
mod tests {
    use super::*;
    use campus_core::SessionId;

    struct Needs(Vec<Permission>);

    impl CommandAuthorization for Needs {
        fn required_permissions(&self) -> &[Permission] {
            &self.0
        }
    }

    fn ctx(role: Role) -> PrincipalContext {
        PrincipalContext::new(AccountId::new(), SessionId::new(), vec![role])
    }

    #[test]
    fn students_may_enroll_but_not_edit_the_catalog() {
        let student = ctx(Role::STUDENT);
        assert!(authorize_command(&student, &Needs(vec![Permission::ENROLLMENTS_CREATE])).is_ok());
        assert_eq!(
            authorize_command(&student, &Needs(vec![Permission::CATALOG_WRITE])),
            Err(AuthzError::Forbidden("catalog.write".to_string()))
        );
    }

    #[test]
    fn admins_hold_every_permission() {
        let admin = ctx(Role::ADMIN);
        assert!(authorize_command(&admin, &Needs(vec![Permission::CATALOG_WRITE])).is_ok());
        assert!(authorize_owner(&admin, AccountId::new()).is_ok());
    }

    #[test]
    fn unknown_roles_get_nothing() {
        let guest = ctx(Role::new("guest"));
        assert!(authorize_command(&guest, &Needs(vec![Permission::PAYMENTS_CREATE])).is_err());
        assert_eq!(
            authorize_owner(&guest, AccountId::new()),
            Err(AuthzError::NotOwner)
        );
    }
}
