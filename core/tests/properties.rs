//! Property tests for the relay client handlers over the in-memory channel.

use proptest::prelude::*;
use relay_core::types::MESSAGE_EVENT;
use relay_core::{ClientOptions, MemoryChannel, MessageRelayClient, RenderedLine};
use serde_json::json;

fn name_strategy() -> impl Strategy<Value = String> {
    "[a-z]{1,8}"
}

proptest! {
    #[test]
    fn inbound_messages_render_in_delivery_order(
        messages in prop::collection::vec((name_strategy(), "[ -~]{0,40}"), 0..50)
    ) {
        let (mut client, mut inbox) = MessageRelayClient::new(MemoryChannel::new(), ClientOptions::default());
        for (sender, body) in &messages {
            client.channel().deliver(MESSAGE_EVENT, json!({ "sender": sender, "message": body }));
        }

        let mut list: Vec<RenderedLine> = Vec::new();
        let rendered = client.pump(&mut inbox, &mut list);

        prop_assert_eq!(rendered, messages.len());
        let expected: Vec<String> = messages.iter().map(|(s, m)| format!("{s}: {m}")).collect();
        let actual: Vec<String> = list.iter().map(RenderedLine::text).collect();
        prop_assert_eq!(actual, expected);
    }

    #[test]
    fn outbound_payload_is_exactly_message_and_recipient(
        body in any::<String>(),
        recipient in name_strategy(),
    ) {
        let (mut client, _inbox) = MessageRelayClient::new(MemoryChannel::new(), ClientOptions::default());
        client.on_send_requested(&body, &recipient).unwrap();

        let sent = client.channel_mut().take_sent();
        prop_assert_eq!(sent.len(), 1);
        prop_assert_eq!(sent[0].event.as_str(), MESSAGE_EVENT);
        prop_assert_eq!(&sent[0].data, &json!({ "message": body, "recipient": recipient }));
        prop_assert!(sent[0].data.get("sender").is_none());
    }
}
