use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::record::Record;

const TEMP_ID_PREFIX: &str = "pending-";

static NEXT_TEMP_SEQ: AtomicU64 = AtomicU64::new(1);

/// A server-confirmed message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub body: String,
    pub sent_at: DateTime<Utc>,
    #[serde(default)]
    pub read: bool,
}

impl Record for Message {
    const TABLE: &'static str = "messages";

    fn id(&self) -> &str {
        &self.id
    }
}

/// Insert payload; the backend assigns `id` and `sent_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutgoingMessage<'a> {
    pub conversation_id: &'a str,
    pub sender_id: &'a str,
    pub recipient_id: &'a str,
    pub body: &'a str,
    pub read: bool,
}

/// Local echo of a message whose insert is still in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMessage {
    pub temp_id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

impl PendingMessage {
    pub fn new(
        conversation_id: impl Into<String>,
        sender_id: impl Into<String>,
        recipient_id: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        let created_at = Utc::now();
        let seq = NEXT_TEMP_SEQ.fetch_add(1, Ordering::Relaxed);

        Self {
            temp_id: format!(
                "{TEMP_ID_PREFIX}{}-{seq}",
                created_at.timestamp_nanos_opt().unwrap_or_default()
            ),
            conversation_id: conversation_id.into(),
            sender_id: sender_id.into(),
            recipient_id: recipient_id.into(),
            body: body.into(),
            created_at,
        }
    }

    pub fn outgoing(&self) -> OutgoingMessage<'_> {
        OutgoingMessage {
            conversation_id: &self.conversation_id,
            sender_id: &self.sender_id,
            recipient_id: &self.recipient_id,
            body: &self.body,
            read: false,
        }
    }
}

/// One row of a rendered conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEntry {
    Confirmed(Message),
    Pending(PendingMessage),
}

impl ChatEntry {
    pub fn id(&self) -> &str {
        match self {
            Self::Confirmed(message) => &message.id,
            Self::Pending(pending) => &pending.temp_id,
        }
    }

    pub fn sender_id(&self) -> &str {
        match self {
            Self::Confirmed(message) => &message.sender_id,
            Self::Pending(pending) => &pending.sender_id,
        }
    }

    pub fn body(&self) -> &str {
        match self {
            Self::Confirmed(message) => &message.body,
            Self::Pending(pending) => &pending.body,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Confirmed(message) => message.sent_at,
            Self::Pending(pending) => pending.created_at,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }
}
