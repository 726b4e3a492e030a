//! In-memory [`Channel`] for tests and offline front ends.

use serde_json::Value;

use crate::channel::{Channel, Subscribers, Subscription};
use crate::error::{RelayError, Result};
use crate::types::Envelope;

/// Records every emitted envelope and lets the caller inject inbound events.
#[derive(Debug, Default)]
pub struct MemoryChannel {
    sent: Vec<Envelope>,
    subscribers: Subscribers,
    disconnected: bool,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates the server pushing `data` on `event`.
    pub fn deliver(&self, event: &str, data: Value) -> usize {
        self.subscribers.dispatch(event, data)
    }

    /// Everything emitted so far, oldest first.
    pub fn sent(&self) -> &[Envelope] {
        &self.sent
    }

    pub fn take_sent(&mut self) -> Vec<Envelope> {
        std::mem::take(&mut self.sent)
    }

    /// Further emits fail with [`RelayError::ChannelUnavailable`] and all
    /// subscriptions end.
    pub fn disconnect(&mut self) {
        self.disconnected = true;
        self.subscribers.close();
    }
}

impl Channel for MemoryChannel {
    fn emit(&mut self, event: &str, data: Value) -> Result<()> {
        if self.disconnected {
            return Err(RelayError::ChannelUnavailable);
        }
        self.sent.push(Envelope {
            event: event.to_string(),
            data,
        });
        Ok(())
    }

    fn subscribe(&mut self, event: &str) -> Subscription {
        self.subscribers.subscribe(event)
    }

    fn is_connected(&self) -> bool {
        !self.disconnected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MESSAGE_EVENT;
    use serde_json::json;

    #[test]
    fn generic_send_uses_default_event() {
        let mut channel = MemoryChannel::new();
        channel.send(json!({ "message": "hi" })).unwrap();
        channel.emit("typing", json!(true)).unwrap();

        let sent = channel.take_sent();
        assert_eq!(sent[0].event, MESSAGE_EVENT);
        assert_eq!(sent[1].event, "typing");
        assert!(channel.sent().is_empty());
    }

    #[test]
    fn disconnected_channel_refuses_sends() {
        let mut channel = MemoryChannel::new();
        let mut sub = channel.subscribe(MESSAGE_EVENT);
        channel.disconnect();

        assert!(!channel.is_connected());
        assert!(matches!(
            channel.send(json!({})),
            Err(RelayError::ChannelUnavailable)
        ));
        assert_eq!(channel.deliver(MESSAGE_EVENT, json!({})), 0);
        assert_eq!(sub.try_recv(), None);
    }
}
