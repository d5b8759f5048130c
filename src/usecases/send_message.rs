//! Writing a message to the backend.
//!
//! Validation happens before any local state changes; the insert itself and
//! the follow-up activity bump run once the pending echo is on screen.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

use crate::{
    backend::{records, BackendError, BackendService, Filter, Row},
    domain::{
        conversation::Conversation,
        message::{Message, PendingMessage},
        record::Record,
    },
    usecases::error::SyncError,
};

pub const MAX_MESSAGE_CHARS: usize = 4_000;

const CONVERSATION_ACTIVITY_BUMP_FAILED: &str = "CONVERSATION_ACTIVITY_BUMP_FAILED";

/// Trims `body` and rejects text that cannot be sent.
pub fn validate_body(body: &str) -> Result<&str, SyncError> {
    let text = body.trim();
    if text.is_empty() {
        return Err(SyncError::EmptyMessage);
    }
    if text.chars().count() > MAX_MESSAGE_CHARS {
        return Err(SyncError::MessageTooLong {
            max: MAX_MESSAGE_CHARS,
        });
    }

    Ok(text)
}

/// Inserts `pending` and returns the stored message. A stored message also
/// moves the conversation's `last_activity_at`; failing that is only logged.
pub async fn send_message(
    backend: &dyn BackendService,
    pending: &PendingMessage,
) -> Result<Message, BackendError> {
    let message: Message = records::insert(backend, &pending.outgoing()).await?;

    if let Err(error) = touch_conversation(backend, &message.conversation_id, message.sent_at).await
    {
        tracing::warn!(
            code = CONVERSATION_ACTIVITY_BUMP_FAILED,
            conversation_id = %message.conversation_id,
            error = %error,
            "failed to update conversation activity"
        );
    }

    Ok(message)
}

async fn touch_conversation(
    backend: &dyn BackendService,
    conversation_id: &str,
    at: DateTime<Utc>,
) -> Result<(), BackendError> {
    let mut patch = Row::new();
    patch.insert(
        "last_activity_at".to_owned(),
        Value::String(at.to_rfc3339_opts(SecondsFormat::Millis, true)),
    );

    backend
        .update(
            Conversation::TABLE,
            vec![Filter::eq("id", conversation_id)],
            patch,
        )
        .await
        .map(|_| ())
}
