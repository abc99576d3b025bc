//! Message routing for Huddle.
//!
//! Routing is a pure decision: given the sender's identity and a raw inbound
//! frame, produce either a room broadcast or a private message. Executing the
//! decision is the session's job.

use crate::connection::Identity;
use huddle_protocol::codec;
use thiserror::Error;

/// Prefix of a private message command. Case-sensitive, exactly one space.
pub const PRIVATE_MESSAGE_PREFIX: &str = "/pm ";

/// Routing errors. Both are dropped silently by the session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    /// The frame is not JSON, lacks a string `message`, or is a bad `/pm`.
    #[error("Malformed payload: {0}")]
    Malformed(String),

    /// The sender is not authenticated.
    #[error("Sender is not authenticated")]
    Unauthorized,
}

/// What to do with an inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouterAction {
    /// Broadcast to the sender's room.
    Broadcast {
        /// Message text.
        text: String,
    },

    /// Deliver to the target user's inbox.
    PrivateMessage {
        /// Target username.
        target: String,
        /// Message text.
        text: String,
    },
}

/// Route an inbound frame.
///
/// The payload is parsed before the sender is checked, so a malformed frame
/// from an anonymous connection reports [`RouteError::Malformed`].
///
/// # Errors
///
/// Returns [`RouteError::Malformed`] for unparseable payloads and bad `/pm`
/// commands, and [`RouteError::Unauthorized`] for anonymous senders.
pub fn route(sender: &Identity, payload: &str) -> Result<RouterAction, RouteError> {
    let frame =
        codec::decode_inbound(payload).map_err(|e| RouteError::Malformed(e.to_string()))?;

    if !sender.is_authenticated() {
        return Err(RouteError::Unauthorized);
    }

    let message = frame.message;
    if !message.starts_with(PRIVATE_MESSAGE_PREFIX) {
        return Ok(RouterAction::Broadcast { text: message });
    }

    let mut parts = message.splitn(3, ' ');
    let _command = parts.next();
    let target = parts.next().unwrap_or_default();
    let text = parts.next().unwrap_or_default();

    if target.is_empty() {
        return Err(RouteError::Malformed("private message without target".into()));
    }
    if text.is_empty() {
        return Err(RouteError::Malformed("private message without text".into()));
    }

    Ok(RouterAction::PrivateMessage {
        target: target.to_string(),
        text: text.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Identity {
        Identity::authenticated("alice")
    }

    #[test]
    fn test_route_broadcast() {
        assert_eq!(
            route(&alice(), r#"{"message": "hi room"}"#),
            Ok(RouterAction::Broadcast {
                text: "hi room".into()
            })
        );
    }

    #[test]
    fn test_route_private_message() {
        assert_eq!(
            route(&alice(), r#"{"message": "/pm bob hello there"}"#),
            Ok(RouterAction::PrivateMessage {
                target: "bob".into(),
                text: "hello there".into()
            })
        );
    }

    #[test]
    fn test_route_private_message_keeps_inner_spacing() {
        assert_eq!(
            route(&alice(), r#"{"message": "/pm bob  two  spaces "}"#),
            Ok(RouterAction::PrivateMessage {
                target: "bob".into(),
                text: " two  spaces ".into()
            })
        );
    }

    #[test]
    fn test_route_private_message_without_text() {
        for payload in [
            r#"{"message": "/pm bob"}"#,
            r#"{"message": "/pm bob "}"#,
            r#"{"message": "/pm "}"#,
            r#"{"message": "/pm  bob hi"}"#,
        ] {
            assert!(
                matches!(route(&alice(), payload), Err(RouteError::Malformed(_))),
                "{payload}"
            );
        }
    }

    #[test]
    fn test_route_prefix_is_exact() {
        for message in ["/pm", "/PM bob hi", "/pmbob hi", " /pm bob hi"] {
            let payload = serde_json::json!({ "message": message }).to_string();
            assert_eq!(
                route(&alice(), &payload),
                Ok(RouterAction::Broadcast {
                    text: message.into()
                })
            );
        }
    }

    #[test]
    fn test_route_malformed() {
        assert!(matches!(route(&alice(), "{}"), Err(RouteError::Malformed(_))));
        assert!(matches!(
            route(&alice(), "hello"),
            Err(RouteError::Malformed(_))
        ));
        assert!(matches!(
            route(&alice(), r#"{"message": null}"#),
            Err(RouteError::Malformed(_))
        ));
    }

    #[test]
    fn test_route_unauthorized() {
        assert_eq!(
            route(&Identity::anonymous(), r#"{"message": "hi"}"#),
            Err(RouteError::Unauthorized)
        );
        assert_eq!(
            route(&Identity::anonymous(), r#"{"message": "/pm bob hi"}"#),
            Err(RouteError::Unauthorized)
        );
    }
}
