//! Codec for encoding and decoding Huddle frames.
//!
//! Frames are UTF-8 JSON text, one object per transport message.

use thiserror::Error;

use crate::events::{Event, InboundFrame};

/// Maximum frame size (1 MiB).
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame exceeds maximum size.
    #[error("Frame size {0} exceeds maximum {MAX_FRAME_SIZE}")]
    FrameTooLarge(usize),

    /// JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Encode an outbound event to JSON text.
///
/// # Errors
///
/// Returns an error if the encoded frame is too large or encoding fails.
pub fn encode(event: &Event) -> Result<String, ProtocolError> {
    let text = serde_json::to_string(event)?;

    if text.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(text.len()));
    }

    Ok(text)
}

/// Decode an outbound event from JSON text.
///
/// Used by clients and tests; the server never receives events.
///
/// # Errors
///
/// Returns an error if the text is too large or not a valid event.
pub fn decode(text: &str) -> Result<Event, ProtocolError> {
    if text.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(text.len()));
    }
    Ok(serde_json::from_str(text)?)
}

/// Decode an inbound client frame.
///
/// # Errors
///
/// Returns an error if the text is too large, not JSON, or lacks a string
/// `message` field.
pub fn decode_inbound(text: &str) -> Result<InboundFrame, ProtocolError> {
    if text.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(text.len()));
    }
    Ok(serde_json::from_str(text)?)
}

/// Encode an inbound client frame.
///
/// # Errors
///
/// Returns an error if encoding fails.
pub fn encode_inbound(frame: &InboundFrame) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(frame)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_event() {
        let event = Event::private_message("alice", "psst");
        let text = encode(&event).unwrap();
        assert!(text.contains(r#""type":"private_message""#));
        assert_eq!(decode(&text).unwrap(), event);
    }

    #[test]
    fn test_decode_inbound() {
        let frame = decode_inbound(r#"{"message": "hi room"}"#).unwrap();
        assert_eq!(frame.message, "hi room");
    }

    #[test]
    fn test_decode_inbound_malformed() {
        assert!(matches!(decode_inbound("{}"), Err(ProtocolError::Json(_))));
        assert!(matches!(
            decode_inbound("not json"),
            Err(ProtocolError::Json(_))
        ));
        assert!(matches!(
            decode_inbound(r#"{"message": 7}"#),
            Err(ProtocolError::Json(_))
        ));
    }

    #[test]
    fn test_frame_too_large() {
        let event = Event::chat_message("alice", "x".repeat(MAX_FRAME_SIZE + 1));

        match encode(&event) {
            Err(ProtocolError::FrameTooLarge(_)) => {}
            other => panic!("Expected FrameTooLarge error, got {:?}", other),
        }
    }
}
