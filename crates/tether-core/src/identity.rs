//! User identity for tether.
//!
//! Identities are stable, lowercase-normalized handles assigned by the
//! external credential store at registration time. Every registry in the
//! hub is keyed by [`UserId`].

use std::fmt;

/// A stable user identity.
///
/// The inner handle is lowercase-normalized on construction so that
/// lookups are case-insensitive regardless of how a client spells the
/// handle on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(String);

impl UserId {
    /// Create a user identity, normalizing to lowercase.
    #[must_use]
    pub fn new(handle: impl AsRef<str>) -> Self {
        Self(handle.as_ref().to_ascii_lowercase())
    }

    /// Get the identity as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_normalizes_case() {
        let id = UserId::new("Alice");
        assert_eq!(id.as_str(), "alice");
        assert_eq!(UserId::new("ALICE"), id);
    }

    #[test]
    fn test_user_id_from_str() {
        let id: UserId = "Bob_42".into();
        assert_eq!(id.as_str(), "bob_42");
        assert_eq!(id.to_string(), "bob_42");
    }
}
