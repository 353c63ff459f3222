//! Property-based tests for the named-event codec and status ordering.
//!
//! The decoder sits directly on untrusted transport input, so it must reject
//! garbage with an error rather than panic, and whatever it accepts must
//! survive a re-encode unchanged.

use chrono::DateTime;
use parley_proto::{
    ClientCommand, Envelope, MessageKind, MessageStatus, ProtocolError, ServerEvent, UserTyping,
    WireMessage,
};
use proptest::prelude::*;

fn arbitrary_status() -> impl Strategy<Value = MessageStatus> {
    prop_oneof![
        Just(MessageStatus::Sending),
        Just(MessageStatus::Sent),
        Just(MessageStatus::Delivered),
        Just(MessageStatus::Read),
        Just(MessageStatus::Failed),
    ]
}

fn arbitrary_kind() -> impl Strategy<Value = MessageKind> {
    prop_oneof![
        Just(MessageKind::Text),
        Just(MessageKind::Image),
        Just(MessageKind::File),
        Just(MessageKind::Audio),
        Just(MessageKind::Video),
    ]
}

fn arbitrary_message() -> impl Strategy<Value = WireMessage> {
    (
        any::<u64>(),
        any::<u64>(),
        any::<u64>(),
        ".{0,64}",
        arbitrary_kind(),
        arbitrary_status(),
        0i64..4_000_000_000,
        any::<bool>(),
        proptest::option::of(".{0,16}"),
        proptest::option::of(any::<u64>()),
    )
        .prop_map(
            |(id, chat_id, sender_id, content, kind, status, secs, is_deleted, caption, reply_to)| {
                WireMessage {
                    id,
                    chat_id,
                    sender_id,
                    content,
                    message_type: kind,
                    status,
                    created_at: DateTime::from_timestamp(secs, 0).unwrap_or_default(),
                    is_deleted,
                    caption,
                    reply_to,
                }
            },
        )
}

proptest! {
    #[test]
    fn decode_never_panics_on_arbitrary_text(text in ".{0,256}") {
        let _ = ServerEvent::decode(&text);
    }

    #[test]
    fn decode_never_panics_on_arbitrary_payload(
        name in prop_oneof![
            Just("message_sent"),
            Just("new_message"),
            Just("message_status_updated"),
            Just("messages_read_bulk"),
            Just("user_typing"),
            Just("message_deleted"),
            Just("presence_info"),
        ],
        payload in ".{0,64}",
    ) {
        let envelope = Envelope::new(name, serde_json::Value::String(payload));
        let result = ServerEvent::from_envelope(envelope);
        let is_invalid_payload = matches!(result, Err(ProtocolError::InvalidPayload { .. }));
        prop_assert!(is_invalid_payload);
    }

    #[test]
    fn new_message_survives_reencode(message in arbitrary_message()) {
        let event = ServerEvent::NewMessage(message);
        let decoded = ServerEvent::decode(&event.encode().unwrap()).unwrap();
        prop_assert_eq!(decoded, event);
    }

    #[test]
    fn typing_survives_reencode(chat_id in any::<u64>(), user_id in any::<u64>(), is_typing in any::<bool>()) {
        let event = ServerEvent::UserTyping(UserTyping { chat_id, user_id, is_typing });
        let decoded = ServerEvent::decode(&event.encode().unwrap()).unwrap();
        prop_assert_eq!(decoded, event);
    }

    #[test]
    fn command_event_name_matches_envelope(chat_id in any::<u64>(), ids in prop::collection::vec(any::<u64>(), 0..16)) {
        let command = ClientCommand::BulkMarkRead { chat_id, message_ids: ids };
        let envelope = Envelope::from_text(&command.encode().unwrap()).unwrap();
        prop_assert_eq!(envelope.event.as_str(), command.event_name());
    }

    #[test]
    fn merge_never_regresses(current in arbitrary_status(), observed in arbitrary_status()) {
        let merged = current.merge(observed);
        prop_assert!(current.can_advance_to(merged));
    }

    #[test]
    fn merge_is_idempotent(current in arbitrary_status(), observed in arbitrary_status()) {
        let once = current.merge(observed);
        prop_assert_eq!(once.merge(observed), once);
    }
}
