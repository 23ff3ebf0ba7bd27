//! `campus-auth` — authentication and authorization boundary.
//!
//! This crate is intentionally decoupled from HTTP and storage: it knows how to
//! hash passwords, mint/verify session tokens and check permissions, but not
//! where sessions or accounts live.

pub mod authorize;
pub mod claims;
pub mod jwt;
pub mod password;
pub mod permissions;
pub mod principal;
pub mod roles;

pub use authorize::{authorize, authorize_owner, AuthzError, CommandAuthorization};
pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use jwt::{Hs256Jwt, JwtIssuer, JwtValidator, TokenError};
pub use password::{hash_password, validate_password_policy, verify_password, PasswordError};
pub use permissions::Permission;
pub use principal::Principal;
pub use roles::Role;
