//! # tether-core
//!
//! Core registries and routing for the tether realtime chat hub.
//!
//! This crate provides the fundamental building blocks:
//!
//! - **ConnectionRegistry** - Live identity-to-transport bindings
//! - **FriendGraph** - Symmetric friendships and directed pending requests
//! - **RoomRegistry** - Ephemeral key-addressed group rooms
//! - **Hub** - Authorization-aware message/typing routing and
//!   notification fan-out across the three registries
//! - **Authenticator** - Seam to the external credential store
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Connection │────▶│     Hub     │────▶│ FriendGraph │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!                            │
//!                            ▼
//!                     ┌─────────────┐
//!                     │ RoomRegistry│
//!                     └─────────────┘
//! ```

pub mod auth;
pub mod connection;
pub mod friends;
pub mod hub;
pub mod identity;
pub mod rooms;

pub use auth::{AuthError, Authenticator, SessionIdentity};
pub use connection::{ClientHandle, ConnectionRegistry, HandleDropped};
pub use friends::{FriendError, FriendGraph};
pub use hub::{Hub, HubStats};
pub use identity::UserId;
pub use rooms::{JoinOutcome, RoomError, RoomKey, RoomRegistry};
