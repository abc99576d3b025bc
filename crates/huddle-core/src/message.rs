//! Delivery envelopes for Huddle.
//!
//! An [`Envelope`] is an event plus its pre-encoded wire text. It is built
//! once per broadcast and shared by `Arc` across every recipient mailbox.

use huddle_protocol::{codec, Event, ProtocolError};
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// An encoded event ready for delivery.
#[derive(Debug, Clone)]
pub struct Envelope {
    /// The event.
    pub event: Event,
    /// JSON text of `event`.
    pub text: String,
}

impl Envelope {
    /// Encode an event into a new envelope.
    ///
    /// # Errors
    ///
    /// Returns an error if the event cannot be encoded.
    pub fn new(event: Event) -> Result<Self, ProtocolError> {
        let text = codec::encode(&event)?;
        Ok(Self { event, text })
    }

    /// Get the encoded text.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_encodes_once() {
        let env = Envelope::new(Event::user_join("alice")).unwrap();
        assert_eq!(env.text(), r#"{"type":"user_join","user":"alice"}"#);
        assert_eq!(env.event, Event::user_join("alice"));
    }
}
