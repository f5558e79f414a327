//! The tether hub: message/presence routing and notification fan-out.
//!
//! The hub owns the connection registry, friend graph, and room registry
//! behind a single lock, so compound invariants (friendship symmetry, room
//! membership bidirectionality) are never observed half-updated. Every
//! mutation path goes through the hub's API; outbound pushes are queued
//! into per-connection channels and never block.

use crate::connection::{ClientHandle, ConnectionEntry, ConnectionRegistry};
use crate::friends::{FriendError, FriendGraph};
use crate::identity::UserId;
use crate::rooms::{JoinOutcome, RoomError, RoomKey, RoomRegistry};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tether_protocol::{RoomSummary, ServerEvent};
use tracing::{debug, info, trace};

/// Shared hub tables. One lock guards all three so cross-table invariants
/// hold at every observable instant.
#[derive(Debug, Default)]
struct HubState {
    connections: ConnectionRegistry,
    friends: FriendGraph,
    rooms: RoomRegistry,
}

/// The central routing component.
///
/// All operations are synchronous and in-memory; the only external call in
/// the connection lifecycle (session validation) happens before `bind`.
#[derive(Debug, Default)]
pub struct Hub {
    state: Mutex<HubState>,
    /// Monotonic bind counter; lets `unbind` ignore stale transport closes
    /// after a last-writer-wins rebind.
    epoch: AtomicU64,
}

impl Hub {
    /// Create an empty hub.
    #[must_use]
    pub fn new() -> Self {
        info!("Creating hub");
        Self::default()
    }

    /// Get hub statistics.
    #[must_use]
    pub fn stats(&self) -> HubStats {
        let state = self.state.lock();
        HubStats {
            connection_count: state.connections.len(),
            room_count: state.rooms.room_count(),
            friendship_count: state.friends.friendship_count(),
        }
    }

    /// Register (or replace) the live connection for an authenticated
    /// identity. Returns the bind epoch to pass back to [`Hub::unbind`].
    ///
    /// First-seen identities get empty friend-graph entries. The fresh
    /// connection receives its friends-list, pending-requests, and
    /// room-list snapshots, and each online friend gets a refreshed
    /// friends list (presence changed).
    pub fn bind(
        &self,
        user: UserId,
        display_name: impl Into<String>,
        token: impl Into<String>,
        handle: ClientHandle,
    ) -> u64 {
        let epoch = self.epoch.fetch_add(1, Ordering::Relaxed) + 1;
        let mut guard = self.state.lock();
        let state = &mut *guard;

        state.friends.ensure_entry(&user);
        state
            .connections
            .bind(user.clone(), handle, token.into(), display_name.into(), epoch);

        let HubState {
            connections,
            friends,
            rooms,
        } = state;

        if let Some(entry) = connections.get(&user) {
            push_to(entry, friends_list_event(connections, friends, &user));
            push_to(entry, pending_event(friends, &user));
            if let Some(event) = room_list_event(connections, rooms, &user) {
                push_to(entry, event);
            }
        }

        for friend in friends.friends_of(&user) {
            if let Some(entry) = connections.get(&friend) {
                push_to(entry, friends_list_event(connections, friends, &friend));
            }
        }

        debug!(user = %user, epoch, "Connection bound");
        epoch
    }

    /// Tear down the connection for an identity, if `epoch` still names
    /// the live entry. Stale closes (the transport of an already-replaced
    /// connection going away) are a no-op.
    ///
    /// Every room the identity belonged to is left implicitly; rooms that
    /// drain are deleted, remaining members get refreshed room lists, and
    /// online friends are told presence changed.
    pub fn unbind(&self, user: &UserId, epoch: u64) {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        match state.connections.get(user) {
            Some(entry) if entry.epoch == epoch => {}
            Some(_) => {
                debug!(user = %user, epoch, "Ignoring stale unbind");
                return;
            }
            None => return,
        }

        let entry = state
            .connections
            .unbind(user)
            .expect("entry checked above");

        let HubState {
            connections,
            friends,
            rooms,
        } = state;

        for key in &entry.rooms {
            rooms.leave(user, key);
            if let Some(members) = rooms.members(key) {
                for member in members {
                    if let (Some(member_entry), Some(event)) = (
                        connections.get(member),
                        room_list_event(connections, rooms, member),
                    ) {
                        push_to(member_entry, event);
                    }
                }
            }
        }

        for friend in friends.friends_of(user) {
            if let Some(friend_entry) = connections.get(&friend) {
                push_to(friend_entry, friends_list_event(connections, friends, &friend));
            }
        }

        debug!(user = %user, "Connection unbound");
    }

    /// Check whether an identity has a live connection.
    #[must_use]
    pub fn is_online(&self, user: &UserId) -> bool {
        self.state.lock().connections.is_online(user)
    }

    /// Record a pending friend request and notify the target if online.
    ///
    /// # Errors
    ///
    /// Propagates [`FriendError`] from the graph; nothing is mutated or
    /// pushed on failure.
    pub fn send_request(&self, requester: &UserId, target: &UserId) -> Result<(), FriendError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let count = state.friends.send_request(requester, target)?;
        if let Some(entry) = state.connections.get(target) {
            push_to(
                entry,
                ServerEvent::NewFriendRequest {
                    from: requester.to_string(),
                    request_count: count,
                },
            );
        }
        Ok(())
    }

    /// Convert a pending request into a friendship and push refreshed
    /// friend/pending snapshots to both parties if online.
    ///
    /// # Errors
    ///
    /// Fails with [`FriendError::NoSuchRequest`] if no such request is
    /// pending; nothing is mutated or pushed on failure.
    pub fn accept_request(&self, accepter: &UserId, requester: &UserId) -> Result<(), FriendError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let remaining = state.friends.accept_request(accepter, requester)?;

        let HubState {
            connections,
            friends,
            ..
        } = state;

        if let Some(entry) = connections.get(accepter) {
            push_to(
                entry,
                ServerEvent::FriendRequestAccepted {
                    friend_id: requester.to_string(),
                    request_count: Some(remaining),
                },
            );
            push_to(entry, friends_list_event(connections, friends, accepter));
            push_to(entry, pending_event(friends, accepter));
        }

        if let Some(entry) = connections.get(requester) {
            push_to(
                entry,
                ServerEvent::FriendRequestAccepted {
                    friend_id: accepter.to_string(),
                    request_count: None,
                },
            );
            push_to(entry, friends_list_event(connections, friends, requester));
            push_to(entry, pending_event(friends, requester));
        }

        Ok(())
    }

    /// Drop a pending request from both sides (idempotent) and push
    /// refreshed pending snapshots to both parties if online.
    pub fn reject_request(&self, rejecter: &UserId, requester: &UserId) {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let remaining = state.friends.reject_request(rejecter, requester);

        let HubState {
            connections,
            friends,
            ..
        } = state;

        if let Some(entry) = connections.get(rejecter) {
            push_to(
                entry,
                ServerEvent::FriendRequestRejected {
                    requester_id: Some(requester.to_string()),
                    rejected_by: None,
                    request_count: Some(remaining),
                },
            );
            push_to(entry, pending_event(friends, rejecter));
        }

        if let Some(entry) = connections.get(requester) {
            push_to(
                entry,
                ServerEvent::FriendRequestRejected {
                    requester_id: None,
                    rejected_by: Some(rejecter.to_string()),
                    request_count: None,
                },
            );
            push_to(entry, pending_event(friends, requester));
        }
    }

    /// The identities `user` is friends with.
    #[must_use]
    pub fn friends_of(&self, user: &UserId) -> Vec<UserId> {
        self.state.lock().friends.friends_of(user)
    }

    /// Pending requests awaiting `user`'s answer.
    #[must_use]
    pub fn pending_incoming(&self, user: &UserId) -> Vec<UserId> {
        self.state.lock().friends.pending_incoming(user)
    }

    /// Requests `user` has sent that are not yet answered.
    #[must_use]
    pub fn pending_outgoing(&self, user: &UserId) -> Vec<UserId> {
        self.state.lock().friends.pending_outgoing(user)
    }

    /// Join a room, creating it if absent. The outcome reports whether
    /// this call created the room, decided by prior existence alone.
    ///
    /// The joiner gets a `roomJoined` push and every member of the room
    /// (joiner included) gets a refreshed room list.
    ///
    /// # Errors
    ///
    /// [`RoomError::InvalidKey`] for a malformed key;
    /// [`RoomError::NotConnected`] if the identity has no live connection
    /// (a disconnect raced the join). Nothing is mutated on failure.
    pub fn join_room(&self, user: &UserId, raw_key: &str) -> Result<JoinOutcome, RoomError> {
        let key = RoomKey::parse(raw_key)?;
        let mut guard = self.state.lock();
        let state = &mut *guard;

        if state.connections.get(user).is_none() {
            return Err(RoomError::NotConnected);
        }

        let outcome = state.rooms.join(user, &key);
        state
            .connections
            .get_mut(user)
            .expect("connection checked above")
            .rooms
            .insert(key.clone());

        let HubState {
            connections, rooms, ..
        } = state;

        if let Some(entry) = connections.get(user) {
            push_to(
                entry,
                ServerEvent::room_joined(key.as_str(), outcome.was_created()),
            );
        }

        if let Some(members) = rooms.members(&key) {
            for member in members {
                if let (Some(entry), Some(event)) = (
                    connections.get(member),
                    room_list_event(connections, rooms, member),
                ) {
                    push_to(entry, event);
                }
            }
        }

        debug!(user = %user, room = %key, created = outcome.was_created(), "Joined room");
        Ok(outcome)
    }

    /// Leave a room. Unknown keys, malformed keys, and non-membership are
    /// all the same no-op; the leaver still gets `roomLeft` plus a
    /// refreshed room list, and remaining members get refreshed lists.
    pub fn leave_room(&self, user: &UserId, raw_key: &str) {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let parsed = RoomKey::parse(raw_key).ok();
        if let Some(key) = &parsed {
            state.rooms.leave(user, key);
            if let Some(entry) = state.connections.get_mut(user) {
                entry.rooms.remove(key);
            }
        }

        let HubState {
            connections, rooms, ..
        } = state;

        if let Some(entry) = connections.get(user) {
            push_to(entry, ServerEvent::room_left(raw_key));
            if let Some(event) = room_list_event(connections, rooms, user) {
                push_to(entry, event);
            }
        }

        if let Some(key) = &parsed {
            if let Some(members) = rooms.members(key) {
                for member in members {
                    if let (Some(entry), Some(event)) = (
                        connections.get(member),
                        room_list_event(connections, rooms, member),
                    ) {
                        push_to(entry, event);
                    }
                }
            }
        }

        debug!(user = %user, room = %raw_key, "Left room");
    }

    /// Route a chat message by scope: room (`room_key` set), direct (`to`
    /// set), or broadcast to online friends (neither set).
    ///
    /// Returns the number of live connections the message was delivered
    /// to. A direct message to a non-friend delivers a `messageError` to
    /// the sender only; offline targets and non-member room sends are
    /// dropped silently.
    pub fn route_message(
        &self,
        sender: &UserId,
        to: Option<&str>,
        room_key: Option<&str>,
        body: &str,
        timestamp: u64,
    ) -> usize {
        let from = sender.to_string();
        let body = body.to_string();
        self.route_scoped(sender, to, room_key, true, |to_field, room_field| {
            ServerEvent::Message {
                from: from.clone(),
                to: to_field,
                room_key: room_field,
                body: body.clone(),
                timestamp,
            }
        })
    }

    /// Route a typing indicator with the same scoping as a message.
    ///
    /// Typing carries no stored state and surfaces no errors: a typing
    /// signal to a non-friend is dropped silently.
    pub fn route_typing(
        &self,
        sender: &UserId,
        to: Option<&str>,
        room_key: Option<&str>,
        is_typing: bool,
    ) -> usize {
        let from = sender.to_string();
        self.route_scoped(sender, to, room_key, false, |to_field, room_field| {
            ServerEvent::Typing {
                from: from.clone(),
                to: to_field,
                room_key: room_field,
                is_typing,
            }
        })
    }

    /// Push a fresh friends-list snapshot (online friends only) to an
    /// identity's connection.
    pub fn push_friends_list(&self, user: &UserId) {
        let guard = self.state.lock();
        let HubState {
            connections,
            friends,
            ..
        } = &*guard;
        if let Some(entry) = connections.get(user) {
            push_to(entry, friends_list_event(connections, friends, user));
        }
    }

    /// Push a fresh pending-requests snapshot to an identity's connection.
    pub fn push_pending_requests(&self, user: &UserId) {
        let guard = self.state.lock();
        let HubState {
            connections,
            friends,
            ..
        } = &*guard;
        if let Some(entry) = connections.get(user) {
            push_to(entry, pending_event(friends, user));
        }
    }

    /// Push a fresh room-list snapshot to an identity's connection.
    pub fn push_room_list(&self, user: &UserId) {
        let guard = self.state.lock();
        let HubState {
            connections, rooms, ..
        } = &*guard;
        if let (Some(entry), Some(event)) =
            (connections.get(user), room_list_event(connections, rooms, user))
        {
            push_to(entry, event);
        }
    }

    /// Current members of a room (empty if the room does not exist).
    #[must_use]
    pub fn room_members(&self, raw_key: &str) -> Vec<UserId> {
        let Ok(key) = RoomKey::parse(raw_key) else {
            return Vec::new();
        };
        self.state
            .lock()
            .rooms
            .members(&key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn route_scoped<F>(
        &self,
        sender: &UserId,
        to: Option<&str>,
        room_key: Option<&str>,
        report_not_friends: bool,
        build: F,
    ) -> usize
    where
        F: Fn(Option<String>, Option<String>) -> ServerEvent,
    {
        let guard = self.state.lock();
        let HubState {
            connections,
            friends,
            rooms,
        } = &*guard;

        if let Some(raw) = room_key {
            let Ok(key) = RoomKey::parse(raw) else {
                trace!(sender = %sender, room = %raw, "Dropping event for malformed room key");
                return 0;
            };
            let Some(members) = rooms.members(&key) else {
                trace!(sender = %sender, room = %key, "Dropping event for unknown room");
                return 0;
            };
            if !members.contains(sender) {
                trace!(sender = %sender, room = %key, "Dropping event from non-member");
                return 0;
            }

            let mut delivered = 0;
            for member in members {
                if member == sender {
                    continue;
                }
                if let Some(entry) = connections.get(member) {
                    if entry
                        .handle
                        .push(build(None, Some(raw.to_string())))
                        .is_ok()
                    {
                        delivered += 1;
                    }
                }
            }
            trace!(sender = %sender, room = %key, recipients = delivered, "Routed room event");
            delivered
        } else if let Some(target_raw) = to {
            let target = UserId::new(target_raw);
            if !friends.are_friends(sender, &target) {
                if report_not_friends {
                    if let Some(entry) = connections.get(sender) {
                        push_to(
                            entry,
                            ServerEvent::message_error(
                                "You can only send messages to friends",
                                target_raw,
                            ),
                        );
                    }
                }
                trace!(sender = %sender, target = %target, "Dropping event to non-friend");
                return 0;
            }

            if let Some(entry) = connections.get(&target) {
                if entry
                    .handle
                    .push(build(Some(target_raw.to_string()), None))
                    .is_ok()
                {
                    return 1;
                }
            }
            // Offline target: dropped, no store-and-forward.
            trace!(sender = %sender, target = %target, "Dropping event to offline friend");
            0
        } else {
            let mut delivered = 0;
            for friend in friends.friends_of(sender) {
                if let Some(entry) = connections.get(&friend) {
                    if entry.handle.push(build(None, None)).is_ok() {
                        delivered += 1;
                    }
                }
            }
            trace!(sender = %sender, recipients = delivered, "Routed broadcast event");
            delivered
        }
    }
}

/// Hub statistics.
#[derive(Debug, Clone)]
pub struct HubStats {
    /// Number of live connections.
    pub connection_count: usize,
    /// Number of live rooms.
    pub room_count: usize,
    /// Number of friendship edges.
    pub friendship_count: usize,
}

fn push_to(entry: &ConnectionEntry, event: ServerEvent) {
    if entry.handle.push(event).is_err() {
        trace!("Dropped push to closed handle");
    }
}

fn friends_list_event(
    connections: &ConnectionRegistry,
    friends: &FriendGraph,
    user: &UserId,
) -> ServerEvent {
    let mut online: Vec<String> = friends
        .friends_of(user)
        .into_iter()
        .filter(|friend| connections.is_online(friend))
        .map(|friend| friend.to_string())
        .collect();
    online.sort();
    ServerEvent::FriendsList { friends: online }
}

fn pending_event(friends: &FriendGraph, user: &UserId) -> ServerEvent {
    let mut incoming: Vec<String> = friends
        .pending_incoming(user)
        .into_iter()
        .map(|id| id.to_string())
        .collect();
    let mut sent: Vec<String> = friends
        .pending_outgoing(user)
        .into_iter()
        .map(|id| id.to_string())
        .collect();
    incoming.sort();
    sent.sort();
    let request_count = incoming.len();
    ServerEvent::PendingRequests {
        incoming,
        sent,
        request_count,
    }
}

fn room_list_event(
    connections: &ConnectionRegistry,
    rooms: &RoomRegistry,
    user: &UserId,
) -> Option<ServerEvent> {
    connections.get(user).map(|entry| {
        let mut summaries: Vec<RoomSummary> = entry
            .rooms
            .iter()
            .map(|key| RoomSummary {
                key: key.to_string(),
                member_count: rooms.member_count(key),
            })
            .collect();
        summaries.sort_by(|a, b| a.key.cmp(&b.key));
        ServerEvent::RoomList { rooms: summaries }
    })
}
