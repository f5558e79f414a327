//! # tether-protocol
//!
//! Wire protocol definitions for the tether realtime chat hub.
//!
//! This crate defines the JSON event protocol spoken between tether
//! clients and the hub: the inbound [`ClientEvent`] and outbound
//! [`ServerEvent`] shapes, plus the text codec.
//!
//! ## Event Types
//!
//! - `register` - Authenticate the connection (first event)
//! - `message` / `typing` - Room, direct, or broadcast routing
//! - `joinRoom` / `leaveRoom` - Private room membership
//! - `sendFriendRequest` / `acceptFriendRequest` / `rejectFriendRequest` -
//!   Friend graph mutation
//! - `getFriendsList` / `getPendingRequests` - Snapshot refresh
//!
//! ## Example
//!
//! ```rust
//! use tether_protocol::{codec, ClientEvent};
//!
//! let event = ClientEvent::Register { token: "abc123".into() };
//!
//! // Encode and decode
//! let encoded = codec::encode_client(&event).unwrap();
//! let decoded = codec::decode(&encoded).unwrap();
//! assert_eq!(event, decoded);
//! ```

pub mod codec;
pub mod events;

pub use codec::{decode, encode, ProtocolError};
pub use events::{ClientEvent, RoomSummary, ServerEvent};
