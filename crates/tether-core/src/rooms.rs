//! Private room registry for tether.
//!
//! Rooms are ephemeral, key-addressed group channels: a 6-digit key maps to
//! a non-empty member set. Rooms come into existence implicitly on the
//! first join and are destroyed the instant the member set drains, whether
//! by explicit leave or by the last member's connection closing.

use crate::identity::UserId;
use std::collections::{HashMap, HashSet};
use std::fmt;
use thiserror::Error;
use tracing::debug;

/// Required room key length.
pub const ROOM_KEY_LENGTH: usize = 6;

/// Room registry errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RoomError {
    /// The key is not exactly six ASCII digits.
    #[error("Invalid room key format")]
    InvalidKey,

    /// The acting identity has no live connection.
    #[error("Not connected")]
    NotConnected,
}

/// A validated room key: exactly six ASCII digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoomKey(String);

impl RoomKey {
    /// Validate and wrap a raw key.
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::InvalidKey`] unless the key is exactly
    /// [`ROOM_KEY_LENGTH`] ASCII digits.
    pub fn parse(raw: &str) -> Result<Self, RoomError> {
        if raw.len() != ROOM_KEY_LENGTH || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return Err(RoomError::InvalidKey);
        }
        Ok(Self(raw.to_string()))
    }

    /// Get the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of a join: whether this call brought the room into existence.
///
/// Computed from prior existence at call time; the caller-supplied
/// "creating" intent plays no part in the decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// The room did not exist and was created by this join.
    Created,
    /// The room already existed and was joined.
    Joined,
}

impl JoinOutcome {
    /// Whether this join created the room.
    #[must_use]
    pub fn was_created(self) -> bool {
        matches!(self, JoinOutcome::Created)
    }
}

/// Registry of live rooms, keyed by room key.
///
/// Holds the forward direction (key -> members) of the membership
/// relation; the reverse direction lives on each connection entry. The hub
/// mutates both under one lock so the two always agree.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: HashMap<RoomKey, HashSet<UserId>>,
}

impl RoomRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an identity to a room, creating the room if absent.
    pub fn join(&mut self, user: &UserId, key: &RoomKey) -> JoinOutcome {
        let outcome = if self.rooms.contains_key(key) {
            JoinOutcome::Joined
        } else {
            debug!(room = %key, "Creating room");
            JoinOutcome::Created
        };

        self.rooms
            .entry(key.clone())
            .or_default()
            .insert(user.clone());
        outcome
    }

    /// Remove an identity from a room, deleting the room if it drains.
    ///
    /// Returns `true` if the identity was a member; absent rooms and
    /// non-members are a no-op, never an error.
    pub fn leave(&mut self, user: &UserId, key: &RoomKey) -> bool {
        let Some(members) = self.rooms.get_mut(key) else {
            return false;
        };
        let removed = members.remove(user);
        if members.is_empty() {
            self.rooms.remove(key);
            debug!(room = %key, "Deleted empty room");
        }
        removed
    }

    /// Check whether a room exists.
    #[must_use]
    pub fn contains(&self, key: &RoomKey) -> bool {
        self.rooms.contains_key(key)
    }

    /// Check whether an identity is a member of a room.
    #[must_use]
    pub fn is_member(&self, key: &RoomKey, user: &UserId) -> bool {
        self.rooms.get(key).is_some_and(|m| m.contains(user))
    }

    /// The member set of a room, if it exists.
    #[must_use]
    pub fn members(&self, key: &RoomKey) -> Option<&HashSet<UserId>> {
        self.rooms.get(key)
    }

    /// Number of members in a room (zero if absent).
    #[must_use]
    pub fn member_count(&self, key: &RoomKey) -> usize {
        self.rooms.get(key).map_or(0, HashSet::len)
    }

    /// Number of live rooms.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(raw: &str) -> RoomKey {
        RoomKey::parse(raw).unwrap()
    }

    #[test]
    fn test_room_key_validation() {
        assert!(RoomKey::parse("123456").is_ok());
        assert_eq!(RoomKey::parse("12345"), Err(RoomError::InvalidKey));
        assert_eq!(RoomKey::parse("1234567"), Err(RoomError::InvalidKey));
        assert_eq!(RoomKey::parse("12a456"), Err(RoomError::InvalidKey));
        assert_eq!(RoomKey::parse(""), Err(RoomError::InvalidKey));
        // Non-ASCII digits are rejected even at the right char count.
        assert_eq!(RoomKey::parse("١٢٣٤٥٦"), Err(RoomError::InvalidKey));
    }

    #[test]
    fn test_join_reports_creation() {
        let mut registry = RoomRegistry::new();
        let alice = UserId::new("alice");
        let bob = UserId::new("bob");

        assert_eq!(registry.join(&alice, &key("123456")), JoinOutcome::Created);
        assert_eq!(registry.join(&bob, &key("123456")), JoinOutcome::Joined);
        assert_eq!(registry.member_count(&key("123456")), 2);
    }

    #[test]
    fn test_leave_deletes_empty_room() {
        let mut registry = RoomRegistry::new();
        let alice = UserId::new("alice");

        registry.join(&alice, &key("999999"));
        assert!(registry.leave(&alice, &key("999999")));
        assert!(!registry.contains(&key("999999")));
        assert_eq!(registry.room_count(), 0);

        // A later join reports creation again.
        assert_eq!(registry.join(&alice, &key("999999")), JoinOutcome::Created);
    }

    #[test]
    fn test_leave_is_idempotent() {
        let mut registry = RoomRegistry::new();
        let alice = UserId::new("alice");

        registry.join(&alice, &key("123456"));
        assert!(registry.leave(&alice, &key("123456")));
        assert!(!registry.leave(&alice, &key("123456")));
        assert!(!registry.leave(&alice, &key("000000")));
    }

    #[test]
    fn test_rejoining_is_a_set_insert() {
        let mut registry = RoomRegistry::new();
        let alice = UserId::new("alice");

        registry.join(&alice, &key("123456"));
        registry.join(&alice, &key("123456"));
        assert_eq!(registry.member_count(&key("123456")), 1);
    }
}
