//! Message-list rules.

use std::collections::HashSet;

use parley_client::TOMBSTONE;

use super::{ChatInvariant, ChatSnapshot};

/// No durable id appears twice.
///
/// Duplicate deliveries, broadcasts of our own sends and history reloads must
/// all collapse onto one entry.
pub struct UniqueDurableIds;

impl ChatInvariant for UniqueDurableIds {
    fn name(&self) -> &'static str {
        "unique_durable_ids"
    }

    fn check(&self, chat: &ChatSnapshot) -> Result<(), String> {
        let mut seen = HashSet::new();
        match chat.messages.iter().filter_map(|m| m.id()).find(|id| !seen.insert(*id)) {
            Some(id) => Err(format!("message {id} listed twice")),
            None => Ok(()),
        }
    }
}

/// At most one entry per temp id, pending or confirmed.
pub struct UniquePlaceholders;

impl ChatInvariant for UniquePlaceholders {
    fn name(&self) -> &'static str {
        "unique_placeholders"
    }

    fn check(&self, chat: &ChatSnapshot) -> Result<(), String> {
        let mut seen = HashSet::new();
        match chat.messages.iter().filter_map(|m| m.temp_id()).find(|temp_id| !seen.insert(*temp_id)) {
            Some(temp_id) => Err(format!("temp id {temp_id} listed twice")),
            None => Ok(()),
        }
    }
}

/// Statuses only move forward.
///
/// `sending < sent < delivered < read`; `failed` is reachable only from
/// `sending` and nothing follows it.
pub struct StatusMonotonicity;

impl ChatInvariant for StatusMonotonicity {
    fn name(&self) -> &'static str {
        "status_monotonicity"
    }

    fn check(&self, chat: &ChatSnapshot) -> Result<(), String> {
        for (key, history) in &chat.status_history {
            if let Some(step) = history.windows(2).find(|step| !step[0].can_advance_to(step[1])) {
                return Err(format!(
                    "{key:?} went {:?} -> {:?} (seen {history:?})",
                    step[0], step[1]
                ));
            }
        }
        Ok(())
    }
}

/// Deleted messages show the tombstone and nothing else.
pub struct TombstoneConsistency;

impl ChatInvariant for TombstoneConsistency {
    fn name(&self) -> &'static str {
        "tombstone_consistency"
    }

    fn check(&self, chat: &ChatSnapshot) -> Result<(), String> {
        let stale = chat
            .messages
            .iter()
            .find(|m| m.is_deleted && (m.content != TOMBSTONE || m.caption.is_some()));
        match stale {
            Some(message) => Err(format!("deleted {:?} still shows {:?}", message.key, message.content)),
            None => Ok(()),
        }
    }
}
