//! Friend graph for tether.
//!
//! The graph holds symmetric friendship edges plus directed pending-request
//! edges (incoming and outgoing per user). A friendship only ever comes
//! into existence by accepting a pending request; there is no operation to
//! remove one, so friendships live in their own edge set to keep removal
//! addable later without reshaping the model.

use crate::identity::UserId;
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::debug;

/// Friend graph errors.
///
/// Messages are client-facing; they travel in `friendRequestResult` events.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FriendError {
    /// Requester and target are the same identity.
    #[error("Cannot send a friend request to yourself")]
    SelfRequest,

    /// A friendship edge already exists.
    #[error("Already friends with this user")]
    AlreadyFriends,

    /// An outgoing request to this target is already pending.
    #[error("Friend request already sent")]
    DuplicateRequest,

    /// No pending request exists from the named requester.
    #[error("No pending friend request from this user")]
    NoSuchRequest,
}

/// Symmetric friendships and directed pending requests.
#[derive(Debug, Default)]
pub struct FriendGraph {
    /// Symmetric friendship edges: `a ∈ friendships[b]` iff `b ∈ friendships[a]`.
    friendships: HashMap<UserId, HashSet<UserId>>,
    /// Directed pending edges, keyed by target: requesters awaiting an answer.
    incoming: HashMap<UserId, HashSet<UserId>>,
    /// Directed pending edges, keyed by requester: targets not yet answered.
    outgoing: HashMap<UserId, HashSet<UserId>>,
}

impl FriendGraph {
    /// Create an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create empty entry sets for an identity if it has none.
    ///
    /// Idempotent first-seen initialization, called when an identity
    /// authenticates or is first named by a request.
    pub fn ensure_entry(&mut self, user: &UserId) {
        self.friendships.entry(user.clone()).or_default();
        self.incoming.entry(user.clone()).or_default();
        self.outgoing.entry(user.clone()).or_default();
    }

    /// Record a pending request from `requester` to `target`.
    ///
    /// Returns the target's new pending-request count.
    ///
    /// # Errors
    ///
    /// Fails with [`FriendError::SelfRequest`], [`FriendError::AlreadyFriends`],
    /// or [`FriendError::DuplicateRequest`]; no state is mutated on failure.
    pub fn send_request(&mut self, requester: &UserId, target: &UserId) -> Result<usize, FriendError> {
        if requester == target {
            return Err(FriendError::SelfRequest);
        }

        self.ensure_entry(requester);
        self.ensure_entry(target);

        if self.friendships[requester].contains(target) {
            return Err(FriendError::AlreadyFriends);
        }
        if self.outgoing[requester].contains(target) {
            return Err(FriendError::DuplicateRequest);
        }

        self.incoming
            .get_mut(target)
            .expect("entry ensured above")
            .insert(requester.clone());
        self.outgoing
            .get_mut(requester)
            .expect("entry ensured above")
            .insert(target.clone());

        debug!(requester = %requester, target = %target, "Friend request sent");
        Ok(self.incoming[target].len())
    }

    /// Convert a pending request into a symmetric friendship.
    ///
    /// Atomically removes the pending edge from both sides and inserts the
    /// friendship edge in both directions. Returns the accepter's remaining
    /// pending-request count.
    ///
    /// # Errors
    ///
    /// Fails with [`FriendError::NoSuchRequest`] if `requester` has no
    /// pending request to `accepter`; no state is mutated on failure.
    pub fn accept_request(&mut self, accepter: &UserId, requester: &UserId) -> Result<usize, FriendError> {
        self.ensure_entry(accepter);
        self.ensure_entry(requester);

        if !self.incoming[accepter].contains(requester) {
            return Err(FriendError::NoSuchRequest);
        }

        self.incoming
            .get_mut(accepter)
            .expect("entry ensured above")
            .remove(requester);
        self.outgoing
            .get_mut(requester)
            .expect("entry ensured above")
            .remove(accepter);

        self.friendships
            .get_mut(accepter)
            .expect("entry ensured above")
            .insert(requester.clone());
        self.friendships
            .get_mut(requester)
            .expect("entry ensured above")
            .insert(accepter.clone());

        debug!(accepter = %accepter, requester = %requester, "Friend request accepted");
        Ok(self.incoming[accepter].len())
    }

    /// Remove a pending request from both sides without creating a
    /// friendship. Idempotent: absent edges are not an error.
    ///
    /// Returns the rejecter's remaining pending-request count.
    pub fn reject_request(&mut self, rejecter: &UserId, requester: &UserId) -> usize {
        self.ensure_entry(rejecter);
        self.ensure_entry(requester);

        self.incoming
            .get_mut(rejecter)
            .expect("entry ensured above")
            .remove(requester);
        self.outgoing
            .get_mut(requester)
            .expect("entry ensured above")
            .remove(rejecter);

        debug!(rejecter = %rejecter, requester = %requester, "Friend request rejected");
        self.incoming[rejecter].len()
    }

    /// Check whether a friendship edge exists between two identities.
    #[must_use]
    pub fn are_friends(&self, a: &UserId, b: &UserId) -> bool {
        self.friendships
            .get(a)
            .is_some_and(|friends| friends.contains(b))
    }

    /// The identities `user` is friends with.
    #[must_use]
    pub fn friends_of(&self, user: &UserId) -> Vec<UserId> {
        self.friendships
            .get(user)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Pending requests awaiting `user`'s answer.
    #[must_use]
    pub fn pending_incoming(&self, user: &UserId) -> Vec<UserId> {
        self.incoming
            .get(user)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Requests `user` has sent that are not yet answered.
    #[must_use]
    pub fn pending_outgoing(&self, user: &UserId) -> Vec<UserId> {
        self.outgoing
            .get(user)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of requests awaiting `user`'s answer.
    #[must_use]
    pub fn request_count(&self, user: &UserId) -> usize {
        self.incoming.get(user).map_or(0, HashSet::len)
    }

    /// Total number of friendship edges in the graph.
    #[must_use]
    pub fn friendship_count(&self) -> usize {
        self.friendships.values().map(HashSet::len).sum::<usize>() / 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> (UserId, UserId) {
        (UserId::new("alice"), UserId::new("bob"))
    }

    #[test]
    fn test_send_accept_creates_symmetric_edge() {
        let (alice, bob) = ids();
        let mut graph = FriendGraph::new();

        assert_eq!(graph.send_request(&alice, &bob), Ok(1));
        assert_eq!(graph.pending_incoming(&bob), vec![alice.clone()]);
        assert_eq!(graph.pending_outgoing(&alice), vec![bob.clone()]);

        assert_eq!(graph.accept_request(&bob, &alice), Ok(0));
        assert!(graph.are_friends(&alice, &bob));
        assert!(graph.are_friends(&bob, &alice));
        assert!(graph.pending_incoming(&bob).is_empty());
        assert!(graph.pending_outgoing(&alice).is_empty());
        assert!(graph.pending_incoming(&alice).is_empty());
        assert!(graph.pending_outgoing(&bob).is_empty());
        assert_eq!(graph.friendship_count(), 1);
    }

    #[test]
    fn test_self_request_rejected() {
        let alice = UserId::new("alice");
        let mut graph = FriendGraph::new();
        assert_eq!(
            graph.send_request(&alice, &alice),
            Err(FriendError::SelfRequest)
        );
    }

    #[test]
    fn test_duplicate_request_rejected() {
        let (alice, bob) = ids();
        let mut graph = FriendGraph::new();

        graph.send_request(&alice, &bob).unwrap();
        assert_eq!(
            graph.send_request(&alice, &bob),
            Err(FriendError::DuplicateRequest)
        );
        // The reverse direction is a distinct edge and still allowed.
        assert_eq!(graph.send_request(&bob, &alice), Ok(1));
    }

    #[test]
    fn test_request_to_existing_friend_rejected() {
        let (alice, bob) = ids();
        let mut graph = FriendGraph::new();

        graph.send_request(&alice, &bob).unwrap();
        graph.accept_request(&bob, &alice).unwrap();
        assert_eq!(
            graph.send_request(&alice, &bob),
            Err(FriendError::AlreadyFriends)
        );
        assert_eq!(
            graph.send_request(&bob, &alice),
            Err(FriendError::AlreadyFriends)
        );
    }

    #[test]
    fn test_accept_without_request_fails() {
        let (alice, bob) = ids();
        let mut graph = FriendGraph::new();
        assert_eq!(
            graph.accept_request(&bob, &alice),
            Err(FriendError::NoSuchRequest)
        );
        assert!(!graph.are_friends(&alice, &bob));
    }

    #[test]
    fn test_reject_removes_both_directions() {
        let (alice, bob) = ids();
        let mut graph = FriendGraph::new();

        graph.send_request(&alice, &bob).unwrap();
        assert_eq!(graph.reject_request(&bob, &alice), 0);
        assert!(graph.pending_incoming(&bob).is_empty());
        assert!(graph.pending_outgoing(&alice).is_empty());
        assert!(!graph.are_friends(&alice, &bob));

        // Idempotent: rejecting again is a no-op.
        assert_eq!(graph.reject_request(&bob, &alice), 0);
    }

    #[test]
    fn test_request_count_tracks_incoming() {
        let mut graph = FriendGraph::new();
        let carol = UserId::new("carol");

        graph.send_request(&UserId::new("alice"), &carol).unwrap();
        graph.send_request(&UserId::new("bob"), &carol).unwrap();
        assert_eq!(graph.request_count(&carol), 2);
    }
}
