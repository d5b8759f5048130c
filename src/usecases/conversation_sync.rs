//! One open conversation: history, live changes and optimistic sends.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Duration;
use serde_json::Value;

use crate::{
    backend::{records, BackendService, ChangeEvent, Filter, Row},
    domain::{
        conversation::Conversation,
        conversation_state::{ConversationState, InsertOutcome, SendOutcome, SessionStatus},
        message::{ChatEntry, Message, PendingMessage},
        record::Record,
    },
    infra::config::ChatConfig,
    usecases::{
        error::SyncError,
        live_feed::LiveFeed,
        load_messages::{load_history, LoadHistoryQuery},
        send_message::{send_message, validate_body},
    },
};

const MAX_RECONCILE_WINDOW_MS: u64 = 3_600_000;

const CHAT_OPEN_REJECTED: &str = "CHAT_OPEN_REJECTED";
const CHAT_SUBSCRIBE_FAILED: &str = "CHAT_SUBSCRIBE_FAILED";
const CHAT_HISTORY_FAILED: &str = "CHAT_HISTORY_FAILED";
const CHAT_SEND_FAILED: &str = "CHAT_SEND_FAILED";
const CHAT_MARK_READ_FAILED: &str = "CHAT_MARK_READ_FAILED";
const CHAT_CHANGE_UNREADABLE: &str = "CHAT_CHANGE_UNREADABLE";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatOptions {
    pub history_page_size: usize,
    pub reconcile_window: Duration,
}

impl ChatOptions {
    pub fn from_config(config: &ChatConfig) -> Self {
        let window_ms = config.reconcile_window_ms.min(MAX_RECONCILE_WINDOW_MS);
        Self {
            history_page_size: config.history_page_size,
            reconcile_window: Duration::milliseconds(window_ms as i64),
        }
    }
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self::from_config(&ChatConfig::default())
    }
}

/// What a conversation screen renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSnapshot {
    pub status: SessionStatus,
    pub entries: Vec<ChatEntry>,
    pub error: Option<String>,
    pub sending: bool,
}

pub struct ConversationSession {
    backend: Arc<dyn BackendService>,
    conversation_id: String,
    current_user: String,
    conversation: Option<Conversation>,
    options: ChatOptions,
    state: Arc<Mutex<ConversationState>>,
    live: Mutex<Option<LiveFeed>>,
}

impl ConversationSession {
    /// Opens `conversation_id` for `current_user`. Never fails outright: an
    /// unknown conversation or a non-participant ends in `Invalid`, a
    /// backend failure in `Failed`.
    pub async fn open(
        backend: Arc<dyn BackendService>,
        conversation_id: &str,
        current_user: &str,
        options: ChatOptions,
    ) -> Self {
        let mut session = Self {
            backend,
            conversation_id: conversation_id.to_owned(),
            current_user: current_user.to_owned(),
            conversation: None,
            options,
            state: Arc::new(Mutex::new(ConversationState::new(
                conversation_id,
                options.reconcile_window,
            ))),
            live: Mutex::new(None),
        };

        session.load().await;
        session
    }

    pub fn conversation(&self) -> Option<&Conversation> {
        self.conversation.as_ref()
    }

    pub fn current_user(&self) -> &str {
        &self.current_user
    }

    pub fn snapshot(&self) -> ChatSnapshot {
        let state = self.state();
        ChatSnapshot {
            status: state.status(),
            entries: state.entries().to_vec(),
            error: state.error().map(str::to_owned),
            sending: state.is_sending(),
        }
    }

    /// Retries after `Failed`, or refetches history when `Ready`.
    pub async fn reload(&mut self) -> Result<(), SyncError> {
        if !self.state().begin_reload() {
            return Err(SyncError::SessionClosed);
        }

        self.load().await;
        Ok(())
    }

    /// Shows `body` at once as a pending message, then stores it.
    pub async fn send(&self, body: &str) -> Result<(), SyncError> {
        let text = validate_body(body)?;
        let Some(conversation) = self.conversation.as_ref() else {
            return Err(SyncError::NotReady);
        };
        let Some(recipient) = conversation.counterpart(&self.current_user) else {
            return Err(SyncError::NotParticipant);
        };

        let pending = PendingMessage::new(&conversation.id, &self.current_user, recipient, text);
        {
            let mut state = self.state();
            match state.status() {
                SessionStatus::Ready => {}
                SessionStatus::Closed => return Err(SyncError::SessionClosed),
                _ => return Err(SyncError::NotReady),
            }
            state.push_pending(pending.clone());
        }

        match send_message(self.backend.as_ref(), &pending).await {
            Ok(message) => {
                tracing::debug!(
                    conversation_id = %self.conversation_id,
                    temp_id = %pending.temp_id,
                    message_id = %message.id,
                    "message delivered"
                );
                self.state().complete_send(
                    &pending.temp_id,
                    SendOutcome::Delivered {
                        id: message.id,
                        sent_at: message.sent_at,
                    },
                );
                Ok(())
            }
            Err(error) => {
                tracing::warn!(
                    code = CHAT_SEND_FAILED,
                    conversation_id = %self.conversation_id,
                    error = %error,
                    "message send failed"
                );
                self.state()
                    .complete_send(&pending.temp_id, SendOutcome::Failed(error.to_string()));
                Err(error.into())
            }
        }
    }

    pub fn clear_error(&self) {
        self.state().clear_error();
    }

    /// Ends the session and releases the live subscription. Results still
    /// in flight are discarded when they land.
    pub async fn close(&self) {
        self.state().close();

        let live = self.live_slot().take();
        if let Some(live) = live {
            live.stop().await;
        }

        tracing::debug!(conversation_id = %self.conversation_id, "conversation closed");
    }

    async fn load(&mut self) {
        if self.conversation.is_none() {
            match self.fetch_conversation().await {
                Ok(conversation) => self.conversation = Some(conversation),
                Err(error) => {
                    tracing::info!(
                        code = CHAT_OPEN_REJECTED,
                        conversation_id = %self.conversation_id,
                        user_id = %self.current_user,
                        error = %error,
                        "conversation cannot be opened"
                    );
                    let mut state = self.state();
                    match error {
                        SyncError::Backend(_) => state.set_failed(error.to_string()),
                        _ => state.set_invalid(error.to_string()),
                    }
                    return;
                }
            }
        }

        if let Err(error) = self.ensure_live_feed().await {
            tracing::warn!(
                code = CHAT_SUBSCRIBE_FAILED,
                conversation_id = %self.conversation_id,
                error = %error,
                "live subscription failed"
            );
            self.state().set_failed(error.to_string());
            return;
        }

        let query = LoadHistoryQuery::new(self.conversation_id.as_str())
            .with_page_size(self.options.history_page_size);
        match load_history(self.backend.as_ref(), query).await {
            Ok(history) => {
                let installed = self.state().set_ready(history);
                if installed {
                    self.mark_read().await;
                }
            }
            Err(error) => {
                tracing::warn!(
                    code = CHAT_HISTORY_FAILED,
                    conversation_id = %self.conversation_id,
                    error = %error,
                    "history load failed"
                );
                self.state().set_failed(error.to_string());
            }
        }
    }

    async fn fetch_conversation(&self) -> Result<Conversation, SyncError> {
        let conversation: Conversation = records::fetch_one(
            self.backend.as_ref(),
            vec![Filter::eq("id", self.conversation_id.as_str())],
        )
        .await?
        .ok_or(SyncError::ConversationNotFound)?;

        if !conversation.involves(&self.current_user) {
            return Err(SyncError::NotParticipant);
        }

        Ok(conversation)
    }

    /// Subscribes before history is fetched so nothing inserted in between
    /// is missed; inserts seen while loading are held by the state.
    async fn ensure_live_feed(&self) -> Result<(), SyncError> {
        if self.live_slot().is_some() {
            return Ok(());
        }

        let subscription = self
            .backend
            .subscribe(
                Message::TABLE,
                Some(Filter::eq("conversation_id", self.conversation_id.as_str())),
            )
            .await?;

        let state = Arc::clone(&self.state);
        let feed = LiveFeed::start(Arc::clone(&self.backend), subscription, move |event| {
            apply_change(&state, event);
        });
        *self.live_slot() = Some(feed);
        Ok(())
    }

    async fn mark_read(&self) {
        let mut patch = Row::new();
        patch.insert("read".to_owned(), Value::Bool(true));

        let result = self
            .backend
            .update(
                Message::TABLE,
                vec![
                    Filter::eq("conversation_id", self.conversation_id.as_str()),
                    Filter::eq("recipient_id", self.current_user.as_str()),
                    Filter::eq("read", false),
                ],
                patch,
            )
            .await;

        match result {
            Ok(updated) => {
                tracing::debug!(
                    conversation_id = %self.conversation_id,
                    marked = updated.len(),
                    "incoming messages marked read"
                );
            }
            Err(error) => {
                tracing::warn!(
                    code = CHAT_MARK_READ_FAILED,
                    conversation_id = %self.conversation_id,
                    error = %error,
                    "failed to mark messages read"
                );
            }
        }
    }

    fn state(&self) -> MutexGuard<'_, ConversationState> {
        lock_state(&self.state)
    }

    fn live_slot(&self) -> MutexGuard<'_, Option<LiveFeed>> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn lock_state(state: &Mutex<ConversationState>) -> MutexGuard<'_, ConversationState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn apply_change(state: &Mutex<ConversationState>, event: ChangeEvent) {
    match event {
        ChangeEvent::Insert(row) => match records::decode::<Message>(row) {
            Ok(message) => {
                let id = message.id.clone();
                let outcome = lock_state(state).apply_insert(message);
                if outcome == InsertOutcome::Duplicate {
                    tracing::debug!(message_id = %id, "duplicate insert ignored");
                } else {
                    tracing::trace!(message_id = %id, outcome = ?outcome, "live insert applied");
                }
            }
            Err(error) => log_unreadable("insert", &error.to_string()),
        },
        ChangeEvent::Update(row) => match records::decode::<Message>(row) {
            Ok(message) => {
                lock_state(state).apply_update(message);
            }
            Err(error) => log_unreadable("update", &error.to_string()),
        },
        ChangeEvent::Delete(row) => match row.get("id").and_then(Value::as_str) {
            Some(id) => {
                lock_state(state).apply_delete(id);
            }
            None => log_unreadable("delete", "row has no id"),
        },
    }
}

fn log_unreadable(kind: &'static str, details: &str) {
    tracing::warn!(
        code = CHAT_CHANGE_UNREADABLE,
        kind,
        details,
        "live change could not be decoded"
    );
}
