//! Fuzz target for the chat session state machine
//!
//! # Strategy
//!
//! - Small id pools so duplicates, echoes and early statuses collide often
//! - Sends online and offline, confirmations for known and unknown temp ids
//! - History loads with pages that overlap the working set, with realtime
//!   events landing between the request and the page
//!
//! # Invariants
//!
//! - One entry per durable id and per temp id
//! - Statuses never move backwards
//! - Deleted messages always show the tombstone
//! - Early event buffer stays within its bound

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use parley_client::{ChatSession, Draft, SessionConfig};
use parley_harness::{
    InvariantRegistry, SimInstant, StatusRecorder, SystemSnapshot,
    fixtures::{timestamp, wire},
};
use parley_proto::{MessageSent, MessageStatus, MessagesReadBulk, TempId, UserTyping};

const CHAT: u64 = 1;
const ME: u64 = 1;
const PEER: u64 = 2;
const EARLY_CAPACITY: usize = 4;

#[derive(Debug, Clone, Arbitrary)]
enum SessionOp {
    NewMessage { id: u8, from_peer: bool },
    Send { online: bool },
    Confirm { send: u8, id: u8 },
    Status { id: u8, status: StatusChoice },
    ReadBulk { ids: Vec<u8> },
    Deleted { id: u8 },
    Typing { is_typing: bool },
    BeginLoad,
    CompleteLoad { ids: Vec<u8>, fail: bool },
}

#[derive(Debug, Clone, Copy, Arbitrary)]
enum StatusChoice {
    Sent,
    Delivered,
    Read,
}

impl From<StatusChoice> for MessageStatus {
    fn from(choice: StatusChoice) -> Self {
        match choice {
            StatusChoice::Sent => MessageStatus::Sent,
            StatusChoice::Delivered => MessageStatus::Delivered,
            StatusChoice::Read => MessageStatus::Read,
        }
    }
}

fuzz_target!(|ops: Vec<SessionOp>| {
    let config = SessionConfig { early_event_capacity: EARLY_CAPACITY, ..SessionConfig::default() };
    let mut session: ChatSession<SimInstant> = ChatSession::new(CHAT, ME, config);
    let mut recorder = StatusRecorder::new();
    let invariants = InvariantRegistry::standard();
    let mut sends: Vec<(TempId, bool)> = Vec::new();

    for op in ops {
        match op {
            SessionOp::NewMessage { id, from_peer } => {
                let sender = if from_peer { PEER } else { ME };
                session.on_new_message(wire(u64::from(id % 16), CHAT, sender), true);
            },
            SessionOp::Send { online } => {
                let temp_id = TempId::new(format!("t{}", sends.len()));
                session.send(Draft::text("x"), temp_id.clone(), timestamp(0), online);
                sends.push((temp_id, online));
            },
            SessionOp::Confirm { send, id } => {
                // Failed sends never reached the server.
                let Some((temp_id, true)) = sends.get(usize::from(send)).cloned() else {
                    continue;
                };
                let message = wire(u64::from(id % 16), CHAT, ME);
                session.on_message_sent(MessageSent { temp_id, message });
            },
            SessionOp::Status { id, status } => {
                session.on_status_updated(u64::from(id % 16), status.into());
            },
            SessionOp::ReadBulk { ids } => {
                let message_ids = ids.iter().map(|id| u64::from(id % 16)).collect();
                session.on_read_bulk(&MessagesReadBulk { message_ids, user_id: PEER, chat_id: CHAT });
            },
            SessionOp::Deleted { id } => session.on_deleted(u64::from(id % 16)),
            SessionOp::Typing { is_typing } => {
                session.on_user_typing(&UserTyping { chat_id: CHAT, user_id: PEER, is_typing });
            },
            SessionOp::BeginLoad => {
                session.begin_load();
            },
            SessionOp::CompleteLoad { ids, fail } => {
                let result = if fail {
                    Err(parley_client::HistoryError::Network("fuzz".into()))
                } else {
                    Ok(ids.iter().map(|id| wire(u64::from(id % 16), CHAT, PEER)).collect())
                };
                session.complete_load(result, true);
            },
        }

        assert!(session.early_event_count() <= EARLY_CAPACITY);
        let snapshot = SystemSnapshot::single(recorder.observe(&session));
        invariants.assert_all(&snapshot, "after fuzz op");
    }
});
