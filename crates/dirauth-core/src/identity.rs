//! Authenticated identities

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Strip every character outside `[A-Za-z0-9-_.]`.
///
/// The result is safe to splice into a directory search filter.
pub fn sanitize_username(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        .collect()
}

/// Username and secret as presented by a caller
#[derive(Clone)]
pub struct Credentials {
    pub identity: String,
    pub secret: String,
}

impl Credentials {
    pub fn new(identity: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            secret: secret.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("identity", &self.identity)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// A successfully authenticated principal and its transitive group memberships
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    username: String,
    memberships: Vec<String>,
}

impl Identity {
    /// Build an identity; duplicate memberships are dropped, keeping the
    /// first occurrence so discovery order is reproducible.
    pub fn new(username: impl Into<String>, memberships: impl IntoIterator<Item = String>) -> Self {
        let mut seen = HashSet::new();
        let memberships = memberships
            .into_iter()
            .filter(|dn| seen.insert(dn.clone()))
            .collect();

        Self {
            username: username.into(),
            memberships,
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Group DNs in discovery order
    pub fn memberships(&self) -> &[String] {
        &self.memberships
    }

    pub fn is_member_of(&self, group_dn: &str) -> bool {
        self.memberships.iter().any(|dn| dn == group_dn)
    }
}
