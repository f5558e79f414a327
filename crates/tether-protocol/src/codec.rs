//! Codec for encoding and decoding tether events.
//!
//! Events travel as WebSocket text messages, one JSON object per message.
//! The transport supplies message boundaries, so no length framing is
//! needed; the codec is a thin, size-checked layer over `serde_json`.

use thiserror::Error;

use crate::events::{ClientEvent, ServerEvent};

/// Maximum encoded event size (64 KiB).
pub const MAX_EVENT_SIZE: usize = 64 * 1024;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Event exceeds maximum size.
    #[error("Event size {0} exceeds maximum {MAX_EVENT_SIZE}")]
    EventTooLarge(usize),

    /// JSON encoding error.
    #[error("Encoding error: {0}")]
    Encode(#[source] serde_json::Error),

    /// JSON decoding error.
    #[error("Decoding error: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Encode a server event to a JSON text message.
///
/// # Errors
///
/// Returns an error if the event is too large or serialization fails.
pub fn encode(event: &ServerEvent) -> Result<String, ProtocolError> {
    let text = serde_json::to_string(event).map_err(ProtocolError::Encode)?;
    if text.len() > MAX_EVENT_SIZE {
        return Err(ProtocolError::EventTooLarge(text.len()));
    }
    Ok(text)
}

/// Decode a client event from a JSON text message.
///
/// # Errors
///
/// Returns an error if the text is too large or not a valid event.
pub fn decode(text: &str) -> Result<ClientEvent, ProtocolError> {
    if text.len() > MAX_EVENT_SIZE {
        return Err(ProtocolError::EventTooLarge(text.len()));
    }
    serde_json::from_str(text).map_err(ProtocolError::Decode)
}

/// Encode a client event to a JSON text message (client-side use).
///
/// # Errors
///
/// Returns an error if the event is too large or serialization fails.
pub fn encode_client(event: &ClientEvent) -> Result<String, ProtocolError> {
    let text = serde_json::to_string(event).map_err(ProtocolError::Encode)?;
    if text.len() > MAX_EVENT_SIZE {
        return Err(ProtocolError::EventTooLarge(text.len()));
    }
    Ok(text)
}

/// Decode a server event from a JSON text message (client-side use).
///
/// # Errors
///
/// Returns an error if the text is too large or not a valid event.
pub fn decode_server(text: &str) -> Result<ServerEvent, ProtocolError> {
    if text.len() > MAX_EVENT_SIZE {
        return Err(ProtocolError::EventTooLarge(text.len()));
    }
    serde_json::from_str(text).map_err(ProtocolError::Decode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_roundtrip() {
        let events = vec![
            ClientEvent::Register {
                token: "token123".into(),
            },
            ClientEvent::Message {
                from: "alice".into(),
                to: Some("bob".into()),
                room_key: None,
                body: "Hello, world!".into(),
                timestamp: 1_700_000_000_000,
            },
            ClientEvent::Typing {
                from: "alice".into(),
                to: None,
                room_key: Some("123456".into()),
                is_typing: true,
            },
            ClientEvent::GetFriendsList {
                from: "alice".into(),
            },
        ];

        for event in events {
            let encoded = encode_client(&event).unwrap();
            let decoded = decode(&encoded).unwrap();
            assert_eq!(event, decoded);
        }
    }

    #[test]
    fn test_decode_unknown_type() {
        let result = decode(r#"{"type":"teleport","from":"alice"}"#);
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_decode_not_json() {
        assert!(decode("not json at all").is_err());
    }

    #[test]
    fn test_event_too_large() {
        let body = "x".repeat(MAX_EVENT_SIZE + 1);
        let event = ClientEvent::Message {
            from: "alice".into(),
            to: None,
            room_key: None,
            body,
            timestamp: 0,
        };

        match encode_client(&event) {
            Err(ProtocolError::EventTooLarge(_)) => {}
            other => panic!("Expected EventTooLarge error, got {:?}", other),
        }
    }

    #[test]
    fn test_server_roundtrip() {
        let event = ServerEvent::PendingRequests {
            incoming: vec!["bob".into()],
            sent: vec![],
            request_count: 1,
        };
        let encoded = encode(&event).unwrap();
        let decoded = decode_server(&encoded).unwrap();
        assert_eq!(event, decoded);
    }
}
