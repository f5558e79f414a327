//! Connection registry for tether.
//!
//! The registry is the single source of truth for "who is online": it maps
//! each identity to its live outbound handle, session token, and the set of
//! room keys it currently belongs to. At most one connection is tracked per
//! identity; a rebind replaces the prior entry (last-writer-wins).

use crate::identity::UserId;
use crate::rooms::RoomKey;
use std::collections::{HashMap, HashSet};
use tether_protocol::ServerEvent;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

/// The outbound peer is gone; the event was not delivered.
#[derive(Debug, Error)]
#[error("Connection handle dropped")]
pub struct HandleDropped;

/// Outbound capability for one client connection.
///
/// Pushes are fire-and-forget: the event is queued for the transport task
/// to write, and a closed peer surfaces as [`HandleDropped`] rather than a
/// panic or a block.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    sender: mpsc::UnboundedSender<ServerEvent>,
}

impl ClientHandle {
    /// Wrap an outbound event sender.
    #[must_use]
    pub fn new(sender: mpsc::UnboundedSender<ServerEvent>) -> Self {
        Self { sender }
    }

    /// Create a handle together with its receiving end.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    /// Queue an event for delivery.
    ///
    /// # Errors
    ///
    /// Returns [`HandleDropped`] if the receiving transport task is gone.
    pub fn push(&self, event: ServerEvent) -> Result<(), HandleDropped> {
        self.sender.send(event).map_err(|_| HandleDropped)
    }

    /// Check whether the receiving end is still attached.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.sender.is_closed()
    }
}

/// Live state for one bound connection.
#[derive(Debug)]
pub struct ConnectionEntry {
    /// Outbound handle for pushes.
    pub handle: ClientHandle,
    /// Session token the connection authenticated with.
    pub token: String,
    /// Display name from the credential store.
    pub display_name: String,
    /// Rooms this identity currently belongs to (reverse of the room
    /// registry's member sets).
    pub rooms: HashSet<RoomKey>,
    /// Bind epoch, used to ignore stale disconnect cleanup after a
    /// last-writer-wins rebind.
    pub epoch: u64,
}

/// Registry of live connections, keyed by identity.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    entries: HashMap<UserId, ConnectionEntry>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace the connection for an identity.
    ///
    /// Room memberships belong to the identity, not the transport, so a
    /// replaced entry's room set carries over to the new one.
    pub fn bind(
        &mut self,
        user: UserId,
        handle: ClientHandle,
        token: String,
        display_name: String,
        epoch: u64,
    ) {
        let rooms = self
            .entries
            .remove(&user)
            .map(|prior| {
                debug!(user = %user, "Replacing existing connection");
                prior.rooms
            })
            .unwrap_or_default();

        self.entries.insert(
            user,
            ConnectionEntry {
                handle,
                token,
                display_name,
                rooms,
                epoch,
            },
        );
    }

    /// Remove the entry for an identity, returning it.
    pub fn unbind(&mut self, user: &UserId) -> Option<ConnectionEntry> {
        self.entries.remove(user)
    }

    /// Check whether an identity has a live connection.
    #[must_use]
    pub fn is_online(&self, user: &UserId) -> bool {
        self.entries.contains_key(user)
    }

    /// Get the entry for an identity.
    #[must_use]
    pub fn get(&self, user: &UserId) -> Option<&ConnectionEntry> {
        self.entries.get(user)
    }

    /// Get the mutable entry for an identity.
    pub fn get_mut(&mut self, user: &UserId) -> Option<&mut ConnectionEntry> {
        self.entries.get_mut(user)
    }

    /// Number of live connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_receive() {
        let (handle, mut rx) = ClientHandle::channel();
        handle
            .push(ServerEvent::auth_success("alice", "Alice"))
            .unwrap();

        let event = rx.try_recv().unwrap();
        assert!(matches!(event, ServerEvent::AuthSuccess { .. }));
    }

    #[test]
    fn test_push_to_dropped_handle() {
        let (handle, rx) = ClientHandle::channel();
        drop(rx);

        assert!(!handle.is_open());
        assert!(handle.push(ServerEvent::room_left("123456")).is_err());
    }

    #[test]
    fn test_bind_replaces_and_carries_rooms() {
        let mut registry = ConnectionRegistry::new();
        let alice = UserId::new("alice");

        let (h1, _rx1) = ClientHandle::channel();
        registry.bind(alice.clone(), h1, "t1".into(), "Alice".into(), 1);
        registry
            .get_mut(&alice)
            .unwrap()
            .rooms
            .insert(RoomKey::parse("123456").unwrap());

        let (h2, _rx2) = ClientHandle::channel();
        registry.bind(alice.clone(), h2, "t2".into(), "Alice".into(), 2);

        let entry = registry.get(&alice).unwrap();
        assert_eq!(entry.epoch, 2);
        assert_eq!(entry.token, "t2");
        assert_eq!(entry.rooms.len(), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unbind() {
        let mut registry = ConnectionRegistry::new();
        let alice = UserId::new("alice");

        let (handle, _rx) = ClientHandle::channel();
        registry.bind(alice.clone(), handle, "t".into(), "Alice".into(), 1);
        assert!(registry.is_online(&alice));

        assert!(registry.unbind(&alice).is_some());
        assert!(!registry.is_online(&alice));
        assert!(registry.unbind(&alice).is_none());
    }
}
