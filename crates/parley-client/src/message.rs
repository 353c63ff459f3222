//! Local message model.
//!
//! A message in a chat session is either a pending placeholder known only by
//! its temp id, or a confirmed message known by its durable id. Confirmed
//! messages remember the temp id they resolved from so late echoes of the
//! same send can be recognised.

use chrono::{DateTime, Utc};
use parley_proto::{ChatId, MessageId, MessageKind, MessageStatus, TempId, UserId, WireMessage};

/// Content shown in place of a soft-deleted message.
pub const TOMBSTONE: &str = "This message was deleted";

/// Identity of a message in a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageKey {
    /// Optimistic send awaiting confirmation
    Pending(TempId),
    /// Server-confirmed message
    Confirmed {
        /// Durable id
        id: MessageId,
        /// Temp id this message resolved from, if it was sent here
        temp_id: Option<TempId>,
    },
}

/// Outgoing message content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draft {
    /// Text body or attachment reference
    pub content: String,
    /// Content kind
    pub kind: MessageKind,
    /// Attachment caption
    pub caption: Option<String>,
    /// Message being replied to
    pub reply_to: Option<MessageId>,
}

impl Draft {
    /// Plain text draft.
    pub fn text(content: impl Into<String>) -> Self {
        Self::new(content, MessageKind::Text)
    }

    /// Draft of the given kind.
    pub fn new(content: impl Into<String>, kind: MessageKind) -> Self {
        Self { content: content.into(), kind, caption: None, reply_to: None }
    }

    /// Attach a caption.
    #[must_use]
    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = Some(caption.into());
        self
    }

    /// Mark as a reply to `message_id`.
    #[must_use]
    pub fn replying_to(mut self, message_id: MessageId) -> Self {
        self.reply_to = Some(message_id);
        self
    }

    /// Whether the draft has nothing to send.
    pub fn is_blank(&self) -> bool {
        self.content.trim().is_empty()
    }
}

/// One message in a chat session's working set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// Identity
    pub key: MessageKey,
    /// Conversation
    pub chat_id: ChatId,
    /// Author
    pub sender_id: UserId,
    /// Display content; [`TOMBSTONE`] once deleted
    pub content: String,
    /// Content kind
    pub kind: MessageKind,
    /// Delivery status
    pub status: MessageStatus,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Soft-deletion flag
    pub is_deleted: bool,
    /// Attachment caption
    pub caption: Option<String>,
    /// Message replied to
    pub reply_to: Option<MessageId>,
}

impl ChatMessage {
    /// Optimistic placeholder for a send.
    pub fn placeholder(
        chat_id: ChatId,
        sender_id: UserId,
        temp_id: TempId,
        draft: Draft,
        status: MessageStatus,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            key: MessageKey::Pending(temp_id),
            chat_id,
            sender_id,
            content: draft.content,
            kind: draft.kind,
            status,
            created_at,
            is_deleted: false,
            caption: draft.caption,
            reply_to: draft.reply_to,
        }
    }

    /// Confirmed message from the wire.
    pub fn confirmed(wire: WireMessage, temp_id: Option<TempId>) -> Self {
        let mut message = Self {
            key: MessageKey::Confirmed { id: wire.id, temp_id },
            chat_id: wire.chat_id,
            sender_id: wire.sender_id,
            content: wire.content,
            kind: wire.message_type,
            status: wire.status,
            created_at: wire.created_at,
            is_deleted: false,
            caption: wire.caption,
            reply_to: wire.reply_to,
        };
        if wire.is_deleted {
            message.tombstone();
        }
        message
    }

    /// Durable id, once confirmed.
    pub fn id(&self) -> Option<MessageId> {
        match self.key {
            MessageKey::Confirmed { id, .. } => Some(id),
            MessageKey::Pending(_) => None,
        }
    }

    /// Temp id, for placeholders and messages confirmed from a local send.
    pub fn temp_id(&self) -> Option<&TempId> {
        match &self.key {
            MessageKey::Pending(temp_id) => Some(temp_id),
            MessageKey::Confirmed { temp_id, .. } => temp_id.as_ref(),
        }
    }

    /// Placeholder still waiting for the server.
    pub fn is_pending(&self) -> bool {
        matches!(self.key, MessageKey::Pending(_))
    }

    /// Placeholder in flight (`sending`), not failed.
    pub fn is_unresolved(&self) -> bool {
        self.is_pending() && self.status == MessageStatus::Sending
    }

    /// Advance status without regressing.
    pub fn observe_status(&mut self, observed: MessageStatus) {
        self.status = self.status.merge(observed);
    }

    /// Replace content with the tombstone and drop attachment metadata.
    pub fn tombstone(&mut self) {
        self.is_deleted = true;
        self.content = TOMBSTONE.to_string();
        self.caption = None;
    }

    /// Fold another copy of the same message into this one.
    ///
    /// Status never regresses and deletion is sticky.
    pub(crate) fn absorb(&mut self, other: &Self) {
        self.observe_status(other.status);
        if other.is_deleted && !self.is_deleted {
            self.tombstone();
        }
    }
}
