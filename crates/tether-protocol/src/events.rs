//! Event types for the tether protocol.
//!
//! Events are the unit of communication between clients and the hub.
//! Each event is a JSON object carrying a `type` discriminator plus the
//! fields relevant to its operation; field names are camelCase on the wire.

use serde::{Deserialize, Serialize};

/// An event sent by a client to the hub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Authenticate the connection. Must be the first event sent.
    #[serde(rename = "register")]
    Register {
        /// Opaque session token issued by the credential store.
        token: String,
    },

    /// A chat message. Exactly one of three scopes applies: room
    /// (`roomKey` set), direct (`to` set), or broadcast (neither set).
    #[serde(rename = "message", rename_all = "camelCase")]
    Message {
        /// Sender handle as claimed by the client.
        from: String,
        /// Direct recipient.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to: Option<String>,
        /// Target room key.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        room_key: Option<String>,
        /// Opaque message body (encrypted by the caller, if at all).
        body: String,
        /// Client-side send time in milliseconds since the Unix epoch.
        timestamp: u64,
    },

    /// A transient typing indicator, routed with the same scoping rules
    /// as `message` but never stored.
    #[serde(rename = "typing", rename_all = "camelCase")]
    Typing {
        from: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        room_key: Option<String>,
        is_typing: bool,
    },

    /// Join (or implicitly create) a private room.
    #[serde(rename = "joinRoom", rename_all = "camelCase")]
    JoinRoom {
        user_id: String,
        room_key: String,
        /// Whether the client intends to create the room. Only shapes the
        /// UI reported back; actual creation depends on prior existence.
        #[serde(default)]
        is_creating: bool,
    },

    /// Leave a private room.
    #[serde(rename = "leaveRoom", rename_all = "camelCase")]
    LeaveRoom { user_id: String, room_key: String },

    /// Send a friend request to another user.
    #[serde(rename = "sendFriendRequest", rename_all = "camelCase")]
    SendFriendRequest { from: String, target_user_id: String },

    /// Accept a pending friend request.
    #[serde(rename = "acceptFriendRequest", rename_all = "camelCase")]
    AcceptFriendRequest { from: String, requester_id: String },

    /// Reject a pending friend request.
    #[serde(rename = "rejectFriendRequest", rename_all = "camelCase")]
    RejectFriendRequest {
        from: String,
        reject_requester_id: String,
    },

    /// Request a fresh friends-list snapshot.
    #[serde(rename = "getFriendsList")]
    GetFriendsList { from: String },

    /// Request a fresh pending-requests snapshot.
    #[serde(rename = "getPendingRequests")]
    GetPendingRequests { from: String },
}

/// An event pushed by the hub to a client connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Authentication succeeded; the connection is now bound.
    #[serde(rename = "authSuccess", rename_all = "camelCase")]
    AuthSuccess { user_id: String, username: String },

    /// Authentication failed; the connection will be closed.
    #[serde(rename = "authError")]
    AuthError { error: String },

    /// A routed chat message. Scope fields mirror the inbound event.
    #[serde(rename = "message", rename_all = "camelCase")]
    Message {
        from: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        room_key: Option<String>,
        body: String,
        timestamp: u64,
    },

    /// A routed typing indicator.
    #[serde(rename = "typing", rename_all = "camelCase")]
    Typing {
        from: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        room_key: Option<String>,
        is_typing: bool,
    },

    /// Outcome of a `joinRoom` request.
    #[serde(rename = "roomJoined", rename_all = "camelCase")]
    RoomJoined {
        room_key: String,
        success: bool,
        /// Whether this join created the room. Present on success only.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        is_created: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// Confirmation of a `leaveRoom` request.
    #[serde(rename = "roomLeft", rename_all = "camelCase")]
    RoomLeft { room_key: String },

    /// Snapshot of the rooms the recipient currently belongs to.
    #[serde(rename = "roomList")]
    RoomList { rooms: Vec<RoomSummary> },

    /// Snapshot of the recipient's currently online friends.
    #[serde(rename = "friendsList")]
    FriendsList { friends: Vec<String> },

    /// Snapshot of the recipient's pending friend requests.
    #[serde(rename = "pendingRequests", rename_all = "camelCase")]
    PendingRequests {
        incoming: Vec<String>,
        sent: Vec<String>,
        request_count: usize,
    },

    /// A new friend request arrived for the recipient.
    #[serde(rename = "newFriendRequest", rename_all = "camelCase")]
    NewFriendRequest { from: String, request_count: usize },

    /// A friend request involving the recipient was accepted.
    #[serde(rename = "friendRequestAccepted", rename_all = "camelCase")]
    FriendRequestAccepted {
        friend_id: String,
        /// Remaining pending count, sent to the accepting side only.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_count: Option<usize>,
    },

    /// A friend request involving the recipient was rejected.
    #[serde(rename = "friendRequestRejected", rename_all = "camelCase")]
    FriendRequestRejected {
        /// Set on the copy pushed to the rejecting side.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        requester_id: Option<String>,
        /// Set on the copy pushed to the rejected requester.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rejected_by: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_count: Option<usize>,
    },

    /// Acknowledgement of a friend-request operation to its originator.
    #[serde(rename = "friendRequestResult")]
    FriendRequestResult {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// A message could not be routed; reported to the sender only.
    #[serde(rename = "messageError", rename_all = "camelCase")]
    MessageError { error: String, target_user: String },
}

/// One entry of a `roomList` snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub key: String,
    pub member_count: usize,
}

impl ServerEvent {
    /// Create an `authSuccess` event.
    #[must_use]
    pub fn auth_success(user_id: impl Into<String>, username: impl Into<String>) -> Self {
        ServerEvent::AuthSuccess {
            user_id: user_id.into(),
            username: username.into(),
        }
    }

    /// Create an `authError` event.
    #[must_use]
    pub fn auth_error(error: impl Into<String>) -> Self {
        ServerEvent::AuthError {
            error: error.into(),
        }
    }

    /// Create a successful `roomJoined` event.
    #[must_use]
    pub fn room_joined(room_key: impl Into<String>, is_created: bool) -> Self {
        ServerEvent::RoomJoined {
            room_key: room_key.into(),
            success: true,
            is_created: Some(is_created),
            error: None,
        }
    }

    /// Create a failed `roomJoined` event.
    #[must_use]
    pub fn room_join_failed(room_key: impl Into<String>, error: impl Into<String>) -> Self {
        ServerEvent::RoomJoined {
            room_key: room_key.into(),
            success: false,
            is_created: None,
            error: Some(error.into()),
        }
    }

    /// Create a `roomLeft` event.
    #[must_use]
    pub fn room_left(room_key: impl Into<String>) -> Self {
        ServerEvent::RoomLeft {
            room_key: room_key.into(),
        }
    }

    /// Create a successful `friendRequestResult` event.
    #[must_use]
    pub fn request_ok(message: impl Into<String>) -> Self {
        ServerEvent::FriendRequestResult {
            success: true,
            message: Some(message.into()),
            error: None,
        }
    }

    /// Create a failed `friendRequestResult` event.
    #[must_use]
    pub fn request_failed(error: impl Into<String>) -> Self {
        ServerEvent::FriendRequestResult {
            success: false,
            message: None,
            error: Some(error.into()),
        }
    }

    /// Create a `messageError` event.
    #[must_use]
    pub fn message_error(error: impl Into<String>, target_user: impl Into<String>) -> Self {
        ServerEvent::MessageError {
            error: error.into(),
            target_user: target_user.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_event_wire_names() {
        let ev: ClientEvent = serde_json::from_value(json!({
            "type": "joinRoom",
            "userId": "alice",
            "roomKey": "123456",
            "isCreating": true,
        }))
        .unwrap();
        assert_eq!(
            ev,
            ClientEvent::JoinRoom {
                user_id: "alice".into(),
                room_key: "123456".into(),
                is_creating: true,
            }
        );
    }

    #[test]
    fn test_is_creating_defaults_false() {
        let ev: ClientEvent = serde_json::from_value(json!({
            "type": "joinRoom",
            "userId": "alice",
            "roomKey": "123456",
        }))
        .unwrap();
        assert!(matches!(
            ev,
            ClientEvent::JoinRoom {
                is_creating: false,
                ..
            }
        ));
    }

    #[test]
    fn test_message_scope_fields_optional() {
        let ev: ClientEvent = serde_json::from_value(json!({
            "type": "message",
            "from": "alice",
            "body": "hi",
            "timestamp": 1700000000000u64,
        }))
        .unwrap();
        assert_eq!(
            ev,
            ClientEvent::Message {
                from: "alice".into(),
                to: None,
                room_key: None,
                body: "hi".into(),
                timestamp: 1_700_000_000_000,
            }
        );
    }

    #[test]
    fn test_server_event_serializes_camel_case() {
        let ev = ServerEvent::room_joined("654321", true);
        let value = serde_json::to_value(&ev).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "roomJoined",
                "roomKey": "654321",
                "success": true,
                "isCreated": true,
            })
        );
    }

    #[test]
    fn test_pending_requests_shape() {
        let ev = ServerEvent::PendingRequests {
            incoming: vec!["bob".into()],
            sent: vec!["carol".into()],
            request_count: 1,
        };
        let value = serde_json::to_value(&ev).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "pendingRequests",
                "incoming": ["bob"],
                "sent": ["carol"],
                "requestCount": 1,
            })
        );
    }

    #[test]
    fn test_message_error_shape() {
        let ev = ServerEvent::message_error("You can only send messages to friends", "bob");
        let value = serde_json::to_value(&ev).unwrap();
        assert_eq!(value["type"], "messageError");
        assert_eq!(value["targetUser"], "bob");
    }
}
