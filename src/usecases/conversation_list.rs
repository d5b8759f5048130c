//! Conversation inbox and idempotent conversation creation.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::{
    backend::{records, BackendError, BackendService, Filter, Query, Sort},
    domain::{
        conversation::{participant_pair, Conversation},
        paged_list::Cursor,
        record::Record,
    },
    usecases::{
        error::SyncError,
        paged_cache::{PageSource, PagedCache},
    },
};

const CONVERSATION_CREATE_RACE: &str = "CONVERSATION_CREATE_RACE";

pub type Inbox = PagedCache<InboxSource>;

/// Conversations the filtered user takes part in, most recent first.
#[derive(Clone)]
pub struct InboxSource {
    backend: Arc<dyn BackendService>,
}

impl InboxSource {
    pub fn new(backend: Arc<dyn BackendService>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl PageSource for InboxSource {
    type Item = Conversation;
    /// The user whose inbox is listed.
    type Filters = String;

    fn name(&self) -> &'static str {
        "inbox"
    }

    async fn fetch_page(
        &self,
        user_id: &String,
        cursor: Cursor,
        limit: usize,
    ) -> Result<Vec<Conversation>, BackendError> {
        records::fetch(
            self.backend.as_ref(),
            Query::table(Conversation::TABLE)
                .filter(participant_filter(user_id))
                .sort(Sort::descending("last_activity_at"))
                .page(cursor.offset(), limit),
        )
        .await
    }
}

#[derive(Debug, Serialize)]
struct NewConversation<'a> {
    participant_a: &'a str,
    participant_b: &'a str,
}

/// Returns the conversation between `first` and `second`, creating it when
/// it does not exist yet. The pair is unordered.
pub async fn get_or_create_conversation(
    backend: &dyn BackendService,
    first: &str,
    second: &str,
) -> Result<Conversation, SyncError> {
    if first.trim().is_empty() || second.trim().is_empty() {
        return Err(SyncError::MissingUser);
    }
    if first == second {
        return Err(SyncError::SelfConversation);
    }

    let (participant_a, participant_b) = participant_pair(first, second);
    if let Some(existing) = find_pair(backend, participant_a, participant_b).await? {
        return Ok(existing);
    }

    let created = records::insert::<Conversation, _>(
        backend,
        &NewConversation {
            participant_a,
            participant_b,
        },
    )
    .await;

    match created {
        Ok(conversation) => {
            tracing::info!(
                conversation_id = %conversation.id,
                participant_a,
                participant_b,
                "conversation created"
            );
            Ok(conversation)
        }
        Err(BackendError::Conflict { .. }) => {
            tracing::debug!(
                code = CONVERSATION_CREATE_RACE,
                participant_a,
                participant_b,
                "conversation created concurrently, reading it back"
            );
            find_pair(backend, participant_a, participant_b)
                .await?
                .ok_or(SyncError::ConversationNotFound)
        }
        Err(error) => Err(error.into()),
    }
}

async fn find_pair(
    backend: &dyn BackendService,
    participant_a: &str,
    participant_b: &str,
) -> Result<Option<Conversation>, BackendError> {
    records::fetch_one(
        backend,
        vec![
            Filter::eq("participant_a", participant_a),
            Filter::eq("participant_b", participant_b),
        ],
    )
    .await
}

fn participant_filter(user_id: &str) -> Filter {
    Filter::or([
        Filter::eq("participant_a", user_id),
        Filter::eq("participant_b", user_id),
    ])
}
