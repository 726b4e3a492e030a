use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::{RelayError, Result};

/// Event carrying chat messages in both directions. The generic `send`
/// primitive travels on this event too.
pub const MESSAGE_EVENT: &str = "message";
/// First envelope a client sends, naming the session user.
pub const IDENTIFY_EVENT: &str = "identify";
/// Server-side complaint about the last thing a client did.
pub const ERROR_EVENT: &str = "error";

/// Placeholder rendered for a missing field when reproducing the literal
/// rendering of malformed payloads.
pub const UNDEFINED: &str = "undefined";

/// One line on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    pub fn new<T: Serialize>(event: &str, data: &T) -> Result<Self> {
        Ok(Self {
            event: event.to_string(),
            data: serde_json::to_value(data)?,
        })
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            event: ERROR_EVENT.to_string(),
            data: serde_json::json!({ "message": message.into() }),
        }
    }
}

/// What the client transmits on a send action. There is deliberately no
/// `sender` field; the server stamps identity from the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub message: String,
    pub recipient: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identify {
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerError {
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageFormat {
    Text,
    Image,
    Video,
    Link,
}

impl fmt::Display for MessageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageFormat::Text => "TEXT",
            MessageFormat::Image => "IMAGE",
            MessageFormat::Video => "VIDEO",
            MessageFormat::Link => "LINK",
        };
        f.write_str(name)
    }
}

/// A message as delivered by the server. Only `sender` and `message` are
/// required; the rest is stamped by the relay server when present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub sender: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<MessageFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl InboundMessage {
    /// Strict parse: anything without string `sender` and `message` is
    /// a [`RelayError::MalformedPayload`].
    pub fn from_value(data: &Value) -> Result<Self> {
        InboundMessage::deserialize(data).map_err(|e| RelayError::MalformedPayload(e.to_string()))
    }

    /// Lossy parse that never fails. Missing fields become `undefined` and
    /// non-string values are rendered as their JSON text.
    pub fn from_value_lossy(data: &Value) -> Self {
        if let Ok(msg) = Self::from_value(data) {
            return msg;
        }

        let field = |name: &str| match data.get(name) {
            None => UNDEFINED.to_string(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        };

        Self {
            sender: field("sender"),
            message: field("message"),
            recipient: None,
            format: None,
            timestamp: None,
        }
    }
}

/// One entry of the rendered message list.
///
/// Sender and body are escaped on construction, so a line can be written to
/// a terminal as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedLine {
    pub sender: String,
    pub body: String,
    pub timestamp: Option<DateTime<Utc>>,
}

impl RenderedLine {
    pub fn new(sender: &str, body: &str, timestamp: Option<DateTime<Utc>>) -> Self {
        Self {
            sender: escape_untrusted(sender),
            body: escape_untrusted(body),
            timestamp,
        }
    }

    /// `"<sender>: <message>"`
    pub fn text(&self) -> String {
        self.to_string()
    }
}

impl From<&InboundMessage> for RenderedLine {
    fn from(msg: &InboundMessage) -> Self {
        RenderedLine::new(&msg.sender, &msg.message, msg.timestamp)
    }
}

impl fmt::Display for RenderedLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.sender, self.body)
    }
}

/// Replaces control characters (ESC, newlines, ...) with their visible
/// escape sequence so untrusted text cannot restyle or split the list.
pub fn escape_untrusted(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_control() {
            out.extend(c.escape_default());
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strict_parse_requires_both_fields() {
        let err = InboundMessage::from_value(&json!({ "sender": "alice" })).unwrap_err();
        assert!(matches!(err, RelayError::MalformedPayload(_)));

        let msg = InboundMessage::from_value(&json!({ "sender": "alice", "message": "hi" })).unwrap();
        assert_eq!(msg.sender, "alice");
        assert_eq!(msg.message, "hi");
        assert_eq!(msg.format, None);
    }

    #[test]
    fn lossy_parse_renders_undefined() {
        let msg = InboundMessage::from_value_lossy(&json!({ "sender": "alice" }));
        assert_eq!(RenderedLine::from(&msg).text(), "alice: undefined");

        let msg = InboundMessage::from_value_lossy(&json!({}));
        assert_eq!(RenderedLine::from(&msg).text(), "undefined: undefined");

        let msg = InboundMessage::from_value_lossy(&json!({ "sender": "bob", "message": 42 }));
        assert_eq!(RenderedLine::from(&msg).text(), "bob: 42");
    }

    #[test]
    fn control_characters_are_escaped() {
        let line = RenderedLine::new("mallory", "\u{1b}[31mred\nsecond", None);
        assert_eq!(line.text(), "mallory: \\u{1b}[31mred\\nsecond");
        assert_eq!(escape_untrusted("<b>plain</b>"), "<b>plain</b>");
    }

    #[test]
    fn outbound_never_carries_sender() {
        let out = OutboundMessage {
            message: "hello".into(),
            recipient: "bob".into(),
        };
        let value = serde_json::to_value(&out).unwrap();
        assert_eq!(value, json!({ "message": "hello", "recipient": "bob" }));
        assert!(value.get("sender").is_none());
    }

    #[test]
    fn format_uses_uppercase_names() {
        assert_eq!(serde_json::to_value(MessageFormat::Video).unwrap(), json!("VIDEO"));
        assert_eq!(MessageFormat::Link.to_string(), "LINK");
    }
}
