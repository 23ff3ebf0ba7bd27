use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier.
///
/// Permissions are opaque strings (e.g. "enrollments.create"). The wildcard
/// `"*"` grants everything and is what the `admin` role maps to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub const ENROLLMENTS_CREATE: Permission = Permission(Cow::Borrowed("enrollments.create"));
    pub const ENROLLMENTS_CANCEL: Permission = Permission(Cow::Borrowed("enrollments.cancel"));
    pub const PAYMENTS_CREATE: Permission = Permission(Cow::Borrowed("payments.create"));
    pub const PROFILE_UPDATE: Permission = Permission(Cow::Borrowed("profile.update"));
    pub const CATALOG_WRITE: Permission = Permission(Cow::Borrowed("catalog.write"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
