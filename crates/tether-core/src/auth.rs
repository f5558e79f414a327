//! Session authentication seam for tether.
//!
//! The hub never stores credentials; it verifies opaque session tokens
//! against an external credential store through the [`Authenticator`]
//! trait. Validation happens exactly once per transport connection, as
//! the first event, before any routing is allowed.

use crate::identity::UserId;
use async_trait::async_trait;
use thiserror::Error;

/// Authentication failures. Both are fatal to the connection.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    /// The token is unknown to the credential store.
    #[error("Invalid session")]
    Invalid,

    /// The token was valid once but its session has expired.
    #[error("Session expired")]
    Expired,
}

/// The identity a validated session resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    /// Stable lowercase handle, the key into every hub registry.
    pub user_id: UserId,
    /// Display name as registered, original casing preserved.
    pub display_name: String,
}

/// Verifies opaque session tokens against the external credential store.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Resolve a session token to a stable identity.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Invalid`] for unknown tokens and
    /// [`AuthError::Expired`] for sessions past their validity window.
    async fn validate(&self, token: &str) -> Result<SessionIdentity, AuthError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct FixedAuthenticator {
        sessions: HashMap<String, SessionIdentity>,
    }

    #[async_trait]
    impl Authenticator for FixedAuthenticator {
        async fn validate(&self, token: &str) -> Result<SessionIdentity, AuthError> {
            self.sessions.get(token).cloned().ok_or(AuthError::Invalid)
        }
    }

    #[tokio::test]
    async fn test_authenticator_trait_object() {
        let mut sessions = HashMap::new();
        sessions.insert(
            "tok".to_string(),
            SessionIdentity {
                user_id: UserId::new("alice"),
                display_name: "Alice".to_string(),
            },
        );
        let auth: Box<dyn Authenticator> = Box::new(FixedAuthenticator { sessions });

        let identity = auth.validate("tok").await.unwrap();
        assert_eq!(identity.user_id, UserId::new("alice"));
        assert_eq!(auth.validate("nope").await, Err(AuthError::Invalid));
    }
}
