//! The relay client: two handlers bridging a compose form and a channel.
//!
//! [`MessageRelayClient`] knows nothing about terminals or widgets. Front
//! ends hand it a [`MessageList`] to append rendered lines to and a
//! [`ComposeForm`] to read the outgoing message from. Both handlers are
//! synchronous and run to completion.

use serde_json::Value;
use tracing::{debug, warn};

use crate::channel::{Channel, Subscription};
use crate::config::{ClientOptions, MalformedPolicy};
use crate::error::{RelayError, Result};
use crate::types::{InboundMessage, MESSAGE_EVENT, OutboundMessage, RenderedLine};

/// Append-only list of rendered messages.
pub trait MessageList {
    fn append_line(&mut self, line: RenderedLine);
}

/// The compose surface: a message field and a recipient field.
pub trait ComposeForm {
    fn message_body(&self) -> String;
    fn recipient(&self) -> String;
    fn clear_message_body(&mut self);
}

impl MessageList for Vec<RenderedLine> {
    fn append_line(&mut self, line: RenderedLine) {
        self.push(line);
    }
}

pub struct MessageRelayClient<C: Channel> {
    channel: C,
    options: ClientOptions,
}

impl<C: Channel> MessageRelayClient<C> {
    /// Wraps a connected channel and subscribes to inbound `message`
    /// events. The returned subscription feeds [`Self::pump`] or
    /// [`Self::on_message_received`].
    pub fn new(mut channel: C, options: ClientOptions) -> (Self, Subscription) {
        let inbox = channel.subscribe(MESSAGE_EVENT);
        (Self { channel, options }, inbox)
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    pub fn options(&self) -> ClientOptions {
        self.options
    }

    /// Renders one inbound payload as `"<sender>: <message>"` after every
    /// previously rendered line.
    pub fn on_message_received(&mut self, data: Value, list: &mut impl MessageList) -> Result<()> {
        let message = match self.options.malformed {
            MalformedPolicy::Reject => InboundMessage::from_value(&data)?,
            MalformedPolicy::RenderLiteral => InboundMessage::from_value_lossy(&data),
        };
        list.append_line(RenderedLine::from(&message));
        Ok(())
    }

    /// Transmits `{message, recipient}` with the channel's generic send.
    pub fn on_send_requested(&mut self, body: &str, recipient: &str) -> Result<()> {
        if self.options.reject_empty_messages && body.trim().is_empty() {
            return Err(RelayError::EmptyMessageRejected);
        }
        if !self.channel.is_connected() {
            return Err(RelayError::ChannelUnavailable);
        }

        let outbound = OutboundMessage {
            message: body.to_string(),
            recipient: recipient.to_string(),
        };
        self.channel.send(serde_json::to_value(&outbound)?)?;
        debug!(recipient, len = body.len(), "message handed to channel");
        Ok(())
    }

    /// Reads the form, sends, then clears the message field without
    /// waiting for delivery. On error the field keeps its text.
    pub fn on_send_clicked(&mut self, form: &mut impl ComposeForm) -> Result<()> {
        let body = form.message_body();
        let recipient = form.recipient();
        self.on_send_requested(&body, &recipient)?;
        form.clear_message_body();
        Ok(())
    }

    /// Applies every payload already waiting in `inbox`, in arrival order.
    /// Malformed payloads are logged and skipped. Returns the number of
    /// lines rendered.
    pub fn pump(&mut self, inbox: &mut Subscription, list: &mut impl MessageList) -> usize {
        let mut rendered = 0;
        while let Some(data) = inbox.try_recv() {
            match self.on_message_received(data, list) {
                Ok(()) => rendered += 1,
                Err(e) => warn!("dropping inbound message: {e}"),
            }
        }
        rendered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryChannel;
    use serde_json::json;

    #[derive(Default)]
    struct Form {
        body: String,
        recipient: String,
    }

    impl ComposeForm for Form {
        fn message_body(&self) -> String {
            self.body.clone()
        }

        fn recipient(&self) -> String {
            self.recipient.clone()
        }

        fn clear_message_body(&mut self) {
            self.body.clear();
        }
    }

    fn texts(list: &[RenderedLine]) -> Vec<String> {
        list.iter().map(RenderedLine::text).collect()
    }

    #[test]
    fn send_click_transmits_and_clears() {
        let (mut client, _inbox) = MessageRelayClient::new(MemoryChannel::new(), ClientOptions::default());
        let mut form = Form {
            body: "hello".into(),
            recipient: "bob".into(),
        };

        client.on_send_clicked(&mut form).unwrap();

        let sent = client.channel_mut().take_sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].event, MESSAGE_EVENT);
        assert_eq!(sent[0].data, json!({ "message": "hello", "recipient": "bob" }));
        assert_eq!(form.body, "");
        assert_eq!(form.recipient, "bob");
    }

    #[test]
    fn empty_body_is_still_sent_by_default() {
        let (mut client, _inbox) = MessageRelayClient::new(MemoryChannel::new(), ClientOptions::default());
        let mut form = Form {
            body: String::new(),
            recipient: "carol".into(),
        };

        client.on_send_clicked(&mut form).unwrap();

        assert_eq!(form.body, "");
        assert_eq!(
            client.channel().sent()[0].data,
            json!({ "message": "", "recipient": "carol" })
        );
    }

    #[test]
    fn empty_body_rejected_when_configured() {
        let options = ClientOptions {
            reject_empty_messages: true,
            ..ClientOptions::default()
        };
        let (mut client, _inbox) = MessageRelayClient::new(MemoryChannel::new(), options);
        let mut form = Form {
            body: "   ".into(),
            recipient: "carol".into(),
        };

        let err = client.on_send_clicked(&mut form).unwrap_err();
        assert!(matches!(err, RelayError::EmptyMessageRejected));
        assert_eq!(form.body, "   ");
        assert!(client.channel().sent().is_empty());
    }

    #[test]
    fn disconnected_channel_keeps_text() {
        let (mut client, _inbox) = MessageRelayClient::new(MemoryChannel::new(), ClientOptions::default());
        client.channel_mut().disconnect();
        let mut form = Form {
            body: "are you there".into(),
            recipient: "bob".into(),
        };

        let err = client.on_send_clicked(&mut form).unwrap_err();
        assert!(matches!(err, RelayError::ChannelUnavailable));
        assert_eq!(form.body, "are you there");
    }

    #[test]
    fn inbound_lines_append_in_order() {
        let (mut client, _inbox) = MessageRelayClient::new(MemoryChannel::new(), ClientOptions::default());
        let mut list = Vec::new();

        client
            .on_message_received(json!({ "sender": "alice", "message": "one" }), &mut list)
            .unwrap();
        client
            .on_message_received(json!({ "sender": "bob", "message": "two" }), &mut list)
            .unwrap();

        assert_eq!(texts(&list), ["alice: one", "bob: two"]);
    }

    #[test]
    fn malformed_inbound_rejected_by_default() {
        let (mut client, _inbox) = MessageRelayClient::new(MemoryChannel::new(), ClientOptions::default());
        let mut list = Vec::new();

        let err = client
            .on_message_received(json!({ "sender": "alice" }), &mut list)
            .unwrap_err();
        assert!(matches!(err, RelayError::MalformedPayload(_)));
        assert!(list.is_empty());
    }

    #[test]
    fn malformed_inbound_rendered_literally_when_configured() {
        let options = ClientOptions {
            malformed: MalformedPolicy::RenderLiteral,
            ..ClientOptions::default()
        };
        let (mut client, _inbox) = MessageRelayClient::new(MemoryChannel::new(), options);
        let mut list = Vec::new();

        client
            .on_message_received(json!({ "sender": "alice" }), &mut list)
            .unwrap();
        assert_eq!(texts(&list), ["alice: undefined"]);
    }

    #[test]
    fn pump_drains_subscription_and_skips_bad_payloads() {
        let (mut client, mut inbox) = MessageRelayClient::new(MemoryChannel::new(), ClientOptions::default());
        client
            .channel()
            .deliver(MESSAGE_EVENT, json!({ "sender": "alice", "message": "hi" }));
        client.channel().deliver(MESSAGE_EVENT, json!("garbage"));
        client
            .channel()
            .deliver(MESSAGE_EVENT, json!({ "sender": "bob", "message": "yo" }));
        client.channel().deliver("error", json!({ "message": "ignored" }));

        let mut list = Vec::new();
        assert_eq!(client.pump(&mut inbox, &mut list), 2);
        assert_eq!(texts(&list), ["alice: hi", "bob: yo"]);
        assert_eq!(client.pump(&mut inbox, &mut list), 0);
    }
}
