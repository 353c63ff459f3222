//! Fuzz target for inbound frame decoding
//!
//! Arbitrary text frames go through the envelope parser, the typed event
//! decoder and the client's event bus.
//!
//! # Invariants
//!
//! - NEVER panic on malformed input
//! - Every frame is counted once, as decoded or dropped
//! - Decoded client commands re-encode to text that decodes to the same command

#![no_main]

use libfuzzer_sys::fuzz_target;
use parley_client::EventBus;
use parley_proto::{ClientCommand, ServerEvent};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    let _ = ServerEvent::decode(text);

    let mut bus = EventBus::new();
    let _ = bus.decode(text);
    assert_eq!(bus.decoded() + bus.dropped(), 1);

    if let Ok(command) = ClientCommand::decode(text) {
        let encoded = command.encode().expect("decoded command must re-encode");
        assert_eq!(ClientCommand::decode(&encoded).ok(), Some(command));
    }
});
