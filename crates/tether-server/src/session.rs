//! In-memory credential and session store.
//!
//! Hosts the hub's `Authenticator` collaborator: user registration with
//! argon2-hashed passwords, session issuance as random 32-byte hex tokens,
//! and token validation with a fixed expiry window. Nothing here survives
//! a restart; only connection-facing state matters to the hub.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use dashmap::DashMap;
use rand::RngCore;
use std::fmt::Write as _;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tether_core::{AuthError, Authenticator, SessionIdentity, UserId};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Minimum username length.
const USERNAME_MIN: usize = 3;
/// Maximum username length.
const USERNAME_MAX: usize = 20;
/// Minimum password length.
const PASSWORD_MIN: usize = 6;

/// Credential operation errors. Messages are client-facing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CredentialError {
    #[error("Username already exists")]
    UsernameTaken,

    #[error("Username must be {USERNAME_MIN}-{USERNAME_MAX} characters long")]
    UsernameLength,

    #[error("Username can only contain letters, numbers, underscore, and dash")]
    UsernameCharset,

    #[error("Password must be at least {PASSWORD_MIN} characters long")]
    WeakPassword,

    #[error("Invalid username or password")]
    BadCredentials,

    #[error("Password hashing failed")]
    Hashing,
}

#[derive(Debug)]
struct UserRecord {
    /// Display casing as registered.
    username: String,
    password_hash: String,
    created_at: u64,
    last_login: Option<u64>,
}

#[derive(Debug, Clone)]
struct SessionRecord {
    user_id: String,
    username: String,
    login_time: u64,
}

/// A freshly issued login session.
#[derive(Debug, Clone)]
pub struct LoginSession {
    /// Opaque session token for the `register` handshake.
    pub token: String,
    /// Display name as registered.
    pub username: String,
}

/// In-memory user and session tables.
///
/// Both tables are independent concurrent maps; no compound invariant
/// spans them, so no outer lock is needed.
pub struct SessionStore {
    users: DashMap<String, UserRecord>,
    sessions: DashMap<String, SessionRecord>,
    ttl: Duration,
}

impl SessionStore {
    /// Create an empty store with the given session validity window.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            users: DashMap::new(),
            sessions: DashMap::new(),
            ttl,
        }
    }

    /// Register a new user.
    ///
    /// # Errors
    ///
    /// Fails on duplicate usernames, invalid usernames, or weak passwords.
    pub fn register(&self, username: &str, password: &str) -> Result<(), CredentialError> {
        validate_username(username)?;
        if password.len() < PASSWORD_MIN {
            return Err(CredentialError::WeakPassword);
        }

        let key = username.to_ascii_lowercase();
        if self.users.contains_key(&key) {
            return Err(CredentialError::UsernameTaken);
        }

        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|_| CredentialError::Hashing)?
            .to_string();

        self.users.insert(
            key,
            UserRecord {
                username: username.to_string(),
                password_hash,
                created_at: now_millis(),
                last_login: None,
            },
        );

        info!(username, "User registered");
        Ok(())
    }

    /// Verify credentials and issue a session token.
    ///
    /// # Errors
    ///
    /// Fails with [`CredentialError::BadCredentials`] on unknown users or
    /// wrong passwords; the two cases are indistinguishable to the caller.
    pub fn login(&self, username: &str, password: &str) -> Result<LoginSession, CredentialError> {
        let key = username.to_ascii_lowercase();
        let mut record = self
            .users
            .get_mut(&key)
            .ok_or(CredentialError::BadCredentials)?;

        let parsed =
            PasswordHash::new(&record.password_hash).map_err(|_| CredentialError::Hashing)?;
        if Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_err()
        {
            warn!(username, "Failed login attempt");
            return Err(CredentialError::BadCredentials);
        }

        let now = now_millis();
        record.last_login = Some(now);

        let token = generate_token();
        self.sessions.insert(
            token.clone(),
            SessionRecord {
                user_id: key,
                username: record.username.clone(),
                login_time: now,
            },
        );

        info!(username, "User logged in");
        Ok(LoginSession {
            token,
            username: record.username.clone(),
        })
    }

    /// Discard a session token. Unknown tokens are a no-op.
    pub fn logout(&self, token: &str) {
        if let Some((_, session)) = self.sessions.remove(token) {
            info!(username = %session.username, "User logged out");
        }
    }

    fn validate_token(&self, token: &str) -> Result<SessionIdentity, AuthError> {
        let session = self
            .sessions
            .get(token)
            .map(|entry| entry.value().clone())
            .ok_or(AuthError::Invalid)?;

        let age = now_millis().saturating_sub(session.login_time);
        if age > self.ttl.as_millis() as u64 {
            self.sessions.remove(token);
            debug!(username = %session.username, "Session expired");
            return Err(AuthError::Expired);
        }

        Ok(SessionIdentity {
            user_id: UserId::new(&session.user_id),
            display_name: session.username,
        })
    }

    #[cfg(test)]
    fn backdate_session(&self, token: &str, age: Duration) {
        if let Some(mut session) = self.sessions.get_mut(token) {
            session.login_time = now_millis().saturating_sub(age.as_millis() as u64);
        }
    }
}

#[async_trait]
impl Authenticator for SessionStore {
    async fn validate(&self, token: &str) -> Result<SessionIdentity, AuthError> {
        self.validate_token(token)
    }
}

fn validate_username(username: &str) -> Result<(), CredentialError> {
    if username.len() < USERNAME_MIN || username.len() > USERNAME_MAX {
        return Err(CredentialError::UsernameLength);
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(CredentialError::UsernameCharset);
    }
    Ok(())
}

fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().fold(String::with_capacity(64), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SessionStore {
        SessionStore::new(Duration::from_secs(30 * 24 * 60 * 60))
    }

    #[test]
    fn test_register_validations() {
        let store = store();
        assert_eq!(
            store.register("ab", "password"),
            Err(CredentialError::UsernameLength)
        );
        assert_eq!(
            store.register(&"a".repeat(21), "password"),
            Err(CredentialError::UsernameLength)
        );
        assert_eq!(
            store.register("bad name", "password"),
            Err(CredentialError::UsernameCharset)
        );
        assert_eq!(
            store.register("alice", "short"),
            Err(CredentialError::WeakPassword)
        );
        assert_eq!(store.register("alice", "password"), Ok(()));
        assert_eq!(
            store.register("Alice", "password"),
            Err(CredentialError::UsernameTaken)
        );
    }

    #[tokio::test]
    async fn test_login_and_validate() {
        let store = store();
        store.register("Alice", "password").unwrap();

        let session = store.login("alice", "password").unwrap();
        assert_eq!(session.username, "Alice");
        assert_eq!(session.token.len(), 64);

        let identity = store.validate(&session.token).await.unwrap();
        assert_eq!(identity.user_id, UserId::new("alice"));
        assert_eq!(identity.display_name, "Alice");
    }

    #[test]
    fn test_login_rejects_bad_credentials() {
        let store = store();
        store.register("alice", "password").unwrap();

        assert_eq!(
            store.login("alice", "wrong").map(|_| ()),
            Err(CredentialError::BadCredentials)
        );
        assert_eq!(
            store.login("nobody", "password").map(|_| ()),
            Err(CredentialError::BadCredentials)
        );
    }

    #[tokio::test]
    async fn test_validate_unknown_token() {
        let store = store();
        assert_eq!(store.validate("bogus").await, Err(AuthError::Invalid));
    }

    #[tokio::test]
    async fn test_expired_session_is_removed() {
        let store = store();
        store.register("alice", "password").unwrap();
        let session = store.login("alice", "password").unwrap();

        store.backdate_session(&session.token, Duration::from_secs(31 * 24 * 60 * 60));
        assert_eq!(store.validate(&session.token).await, Err(AuthError::Expired));
        // A second attempt sees the token gone entirely.
        assert_eq!(store.validate(&session.token).await, Err(AuthError::Invalid));
    }

    #[tokio::test]
    async fn test_logout_invalidates_token() {
        let store = store();
        store.register("alice", "password").unwrap();
        let session = store.login("alice", "password").unwrap();

        store.logout(&session.token);
        assert_eq!(store.validate(&session.token).await, Err(AuthError::Invalid));
        // Logging out twice is harmless.
        store.logout(&session.token);
    }
}
