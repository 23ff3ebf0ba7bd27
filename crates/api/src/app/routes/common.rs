use std::str::FromStr;

use axum::response::Response;

use campus_auth::{CommandAuthorization, Permission};

use crate::app::errors;
use crate::context::PrincipalContext;

/// Small helper wrapper to associate required permissions with a command.
pub struct CmdAuth<C> {
    pub inner: C,
    pub required: Vec<Permission>,
}

impl<C> CmdAuth<C> {
    pub fn new(inner: C, required: Permission) -> Self {
        Self {
            inner,
            required: vec![required],
        }
    }

    /// Unwrap the command once the principal holds every required permission.
    pub fn authorize(self, principal: &PrincipalContext) -> Result<C, Response> {
        crate::authz::authorize_command(principal, &self).map_err(errors::authz_error_to_response)?;
        Ok(self.inner)
    }
}

impl<C> CommandAuthorization for CmdAuth<C> {
    fn required_permissions(&self) -> &[Permission] {
        &self.required
    }
}

/// Parse a path or body id, answering 400 on garbage.
pub fn parse_id<T: FromStr>(raw: &str, what: &str) -> Result<T, Response> {
    raw.trim().parse().map_err(|_| errors::invalid_id(what))
}
