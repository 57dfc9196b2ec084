use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const ROLE_ADMIN: &str = "ADMIN";
pub const ROLE_USER: &str = "USER";

/// Identity carried inside a token.
///
/// Timestamps are Unix epoch seconds. The subject is redacted in Debug output
/// so claims can sit in log fields without leaking user ids.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub iss: String,
    pub sub: String,
    pub iat: u64,
    pub exp: u64,
    pub roles: Vec<String>,
}

impl Claims {
    /// Claims issued now and valid for `ttl`.
    pub fn new(
        subject: impl Into<String>,
        issuer: impl Into<String>,
        roles: impl IntoIterator<Item = impl Into<String>>,
        ttl: Duration,
    ) -> Self {
        let now = jsonwebtoken::get_current_timestamp();
        Self {
            iss: issuer.into(),
            sub: subject.into(),
            iat: now,
            exp: now.saturating_add(ttl.as_secs()),
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// True if the claims hold at least one of `roles`. Exact match, no
    /// hierarchy between roles.
    pub fn authorized<R: AsRef<str>>(&self, roles: &[R]) -> bool {
        roles.iter().any(|role| self.has_role(role.as_ref()))
    }
}

impl fmt::Debug for Claims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Claims")
            .field("iss", &self.iss)
            .field("sub", &"[REDACTED]")
            .field("iat", &self.iat)
            .field("exp", &self.exp)
            .field("roles", &self.roles)
            .finish()
    }
}
