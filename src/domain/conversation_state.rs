use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

use super::message::{ChatEntry, Message, PendingMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Loading,
    Ready,
    /// History could not be fetched; `reload` may recover.
    Failed,
    /// Unknown conversation or the user is not a participant. Terminal.
    Invalid,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Appended,
    /// Took the place of the matching pending echo.
    Reconciled,
    Duplicate,
    /// Held until history has loaded.
    Buffered,
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Delivered { id: String, sent_at: DateTime<Utc> },
    Failed(String),
}

/// Message list and lifecycle of one open conversation.
///
/// Confirmed ids are unique in `entries`, and a pending echo never sits next
/// to its own confirmed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationState {
    conversation_id: String,
    status: SessionStatus,
    entries: Vec<ChatEntry>,
    buffered: Vec<Message>,
    awaiting_echo: HashMap<String, DateTime<Utc>>,
    sends_in_flight: usize,
    error: Option<String>,
    reconcile_window: Duration,
}

impl ConversationState {
    pub fn new(conversation_id: impl Into<String>, reconcile_window: Duration) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            status: SessionStatus::Loading,
            entries: Vec::new(),
            buffered: Vec::new(),
            awaiting_echo: HashMap::new(),
            sends_in_flight: 0,
            error: None,
            reconcile_window,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn entries(&self) -> &[ChatEntry] {
        &self.entries
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_sending(&self) -> bool {
        self.sends_in_flight > 0
    }

    pub fn is_active(&self) -> bool {
        !matches!(self.status, SessionStatus::Invalid | SessionStatus::Closed)
    }

    pub fn begin_reload(&mut self) -> bool {
        if !self.is_active() {
            return false;
        }

        self.status = SessionStatus::Loading;
        self.error = None;
        true
    }

    pub fn set_invalid(&mut self, message: impl Into<String>) {
        if self.status == SessionStatus::Closed {
            return;
        }

        self.status = SessionStatus::Invalid;
        self.entries.clear();
        self.buffered.clear();
        self.error = Some(message.into());
    }

    pub fn set_failed(&mut self, message: impl Into<String>) {
        if self.status != SessionStatus::Loading {
            return;
        }

        self.status = SessionStatus::Failed;
        self.error = Some(message.into());
    }

    /// Installs history (ascending `sent_at`) and merges inserts that arrived
    /// while it was loading. Returns false if the session moved on.
    pub fn set_ready(&mut self, history: Vec<Message>) -> bool {
        if self.status != SessionStatus::Loading {
            return false;
        }

        self.entries.retain(ChatEntry::is_pending);
        let pending = std::mem::take(&mut self.entries);
        for message in history {
            if !self.contains_confirmed(&message.id) {
                self.entries.push(ChatEntry::Confirmed(message));
            }
        }
        self.entries.extend(pending);
        self.status = SessionStatus::Ready;

        for message in std::mem::take(&mut self.buffered) {
            self.apply_insert(message);
        }

        true
    }

    pub fn apply_insert(&mut self, message: Message) -> InsertOutcome {
        if message.conversation_id != self.conversation_id {
            return InsertOutcome::Ignored;
        }

        match self.status {
            SessionStatus::Invalid | SessionStatus::Closed => return InsertOutcome::Ignored,
            SessionStatus::Loading | SessionStatus::Failed => {
                if self.buffered.iter().any(|held| held.id == message.id) {
                    return InsertOutcome::Duplicate;
                }
                self.buffered.push(message);
                return InsertOutcome::Buffered;
            }
            SessionStatus::Ready => {}
        }

        if self.contains_confirmed(&message.id) {
            return InsertOutcome::Duplicate;
        }

        self.prune_awaiting_echo(message.sent_at);
        if self.awaiting_echo.remove(&message.id).is_some() {
            self.entries.push(ChatEntry::Confirmed(message));
            return InsertOutcome::Appended;
        }

        if let Some(index) = self.matching_pending(&message) {
            self.entries[index] = ChatEntry::Confirmed(message);
            return InsertOutcome::Reconciled;
        }

        self.entries.push(ChatEntry::Confirmed(message));
        InsertOutcome::Appended
    }

    /// Replaces the confirmed message with the same id, if shown.
    pub fn apply_update(&mut self, message: Message) -> bool {
        if !self.is_active() || message.conversation_id != self.conversation_id {
            return false;
        }

        if let Some(held) = self.buffered.iter_mut().find(|held| held.id == message.id) {
            *held = message;
            return true;
        }

        match self.entries.iter_mut().find(
            |entry| matches!(entry, ChatEntry::Confirmed(current) if current.id == message.id),
        ) {
            Some(entry) => {
                *entry = ChatEntry::Confirmed(message);
                true
            }
            None => false,
        }
    }

    pub fn apply_delete(&mut self, id: &str) -> bool {
        if !self.is_active() {
            return false;
        }

        let before = self.entries.len() + self.buffered.len();
        self.buffered.retain(|held| held.id != id);
        self.entries
            .retain(|entry| !matches!(entry, ChatEntry::Confirmed(current) if current.id == id));
        before != self.entries.len() + self.buffered.len()
    }

    /// Shows `pending` at the tail. Only allowed while `Ready`.
    pub fn push_pending(&mut self, pending: PendingMessage) -> bool {
        if self.status != SessionStatus::Ready {
            return false;
        }

        self.sends_in_flight += 1;
        self.error = None;
        self.entries.push(ChatEntry::Pending(pending));
        true
    }

    /// Removes the pending echo `temp_id`. A delivered id is remembered so
    /// its live echo is appended without claiming another pending entry.
    pub fn complete_send(&mut self, temp_id: &str, outcome: SendOutcome) {
        if !self.is_active() {
            return;
        }

        self.sends_in_flight = self.sends_in_flight.saturating_sub(1);
        self.entries
            .retain(|entry| !matches!(entry, ChatEntry::Pending(pending) if pending.temp_id == temp_id));

        match outcome {
            SendOutcome::Delivered { id, sent_at } => {
                if !self.contains_confirmed(&id) {
                    self.awaiting_echo.insert(id, sent_at);
                }
            }
            SendOutcome::Failed(message) => self.error = Some(message),
        }
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    /// Pending entries are dropped: their sends can no longer be confirmed.
    pub fn close(&mut self) {
        self.status = SessionStatus::Closed;
        self.entries.retain(|entry| !entry.is_pending());
        self.buffered.clear();
        self.awaiting_echo.clear();
        self.sends_in_flight = 0;
    }

    fn contains_confirmed(&self, id: &str) -> bool {
        self.entries
            .iter()
            .any(|entry| matches!(entry, ChatEntry::Confirmed(current) if current.id == id))
    }

    /// Oldest pending entry from the same sender with the same body, sent
    /// within the reconcile window of `message`.
    fn matching_pending(&self, message: &Message) -> Option<usize> {
        self.entries.iter().position(|entry| match entry {
            ChatEntry::Pending(pending) => {
                pending.sender_id == message.sender_id
                    && pending.body == message.body
                    && (message.sent_at - pending.created_at).abs() <= self.reconcile_window
            }
            ChatEntry::Confirmed(_) => false,
        })
    }

    fn prune_awaiting_echo(&mut self, now: DateTime<Utc>) {
        let window = self.reconcile_window;
        self.awaiting_echo
            .retain(|_, delivered_at| now - *delivered_at <= window);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::message;

    fn window() -> Duration {
        Duration::seconds(30)
    }

    fn ready(history: Vec<Message>) -> ConversationState {
        let mut state = ConversationState::new("c1", window());
        assert!(state.set_ready(history));
        state
    }

    fn ids(state: &ConversationState) -> Vec<&str> {
        state.entries().iter().map(ChatEntry::id).collect()
    }

    fn pending_from(sender: &str, body: &str) -> PendingMessage {
        PendingMessage::new("c1", sender, "u2", body)
    }

    #[test]
    fn new_state_is_loading_and_empty() {
        let state = ConversationState::new("c1", window());

        assert_eq!(state.status(), SessionStatus::Loading);
        assert!(state.entries().is_empty());
        assert!(!state.is_sending());
    }

    #[test]
    fn set_ready_dedups_history() {
        let state = ready(vec![
            message("m1", "u1", "hi", 0),
            message("m1", "u1", "hi", 0),
            message("m2", "u2", "hello", 1),
        ]);

        assert_eq!(state.status(), SessionStatus::Ready);
        assert_eq!(ids(&state), ["m1", "m2"]);
    }

    #[test]
    fn inserts_during_loading_are_merged_after_history() {
        let mut state = ConversationState::new("c1", window());

        assert_eq!(
            state.apply_insert(message("m2", "u2", "late", 2)),
            InsertOutcome::Buffered
        );
        assert_eq!(
            state.apply_insert(message("m3", "u1", "later", 3)),
            InsertOutcome::Buffered
        );
        state.set_ready(vec![message("m1", "u1", "a", 1), message("m2", "u2", "late", 2)]);

        assert_eq!(ids(&state), ["m1", "m2", "m3"]);
    }

    #[test]
    fn replayed_insert_is_kept_once() {
        let mut state = ready(vec![]);

        let first = state.apply_insert(message("m1", "u2", "hello", 0));
        let second = state.apply_insert(message("m1", "u2", "hello", 0));

        assert_eq!(first, InsertOutcome::Appended);
        assert_eq!(second, InsertOutcome::Duplicate);
        assert_eq!(ids(&state), ["m1"]);
    }

    #[test]
    fn pending_is_replaced_when_echo_arrives_before_send_completes() {
        let mut state = ready(vec![message("m1", "u2", "hey", 0)]);
        let pending = pending_from("u1", "hello");
        let temp_id = pending.temp_id.clone();
        let mut echo = message("m9", "u1", "hello", 0);
        echo.sent_at = pending.created_at + Duration::milliseconds(120);
        state.push_pending(pending);

        assert_eq!(state.apply_insert(echo.clone()), InsertOutcome::Reconciled);
        state.complete_send(
            &temp_id,
            SendOutcome::Delivered {
                id: "m9".to_owned(),
                sent_at: echo.sent_at,
            },
        );

        assert_eq!(ids(&state), ["m1", "m9"]);
        assert!(!state.is_sending());
    }

    #[test]
    fn delivered_send_then_echo_yields_one_confirmed_message() {
        let mut state = ready(vec![]);
        let pending = pending_from("u1", "hello");
        let temp_id = pending.temp_id.clone();
        let sent_at = pending.created_at;
        state.push_pending(pending);

        state.complete_send(
            &temp_id,
            SendOutcome::Delivered {
                id: "m5".to_owned(),
                sent_at,
            },
        );
        assert!(state.entries().is_empty());

        let mut echo = message("m5", "u1", "hello", 0);
        echo.sent_at = sent_at;
        state.apply_insert(echo);

        assert_eq!(ids(&state), ["m5"]);
    }

    #[test]
    fn echo_of_delivered_send_does_not_claim_a_later_identical_pending() {
        let mut state = ready(vec![]);
        let first = pending_from("u1", "ok");
        let second = pending_from("u1", "ok");
        let first_id = first.temp_id.clone();
        let second_id = second.temp_id.clone();
        let sent_at = first.created_at;
        state.push_pending(first);
        state.push_pending(second);

        state.complete_send(
            &first_id,
            SendOutcome::Delivered {
                id: "m1".to_owned(),
                sent_at,
            },
        );
        let mut echo = message("m1", "u1", "ok", 0);
        echo.sent_at = sent_at;

        assert_eq!(state.apply_insert(echo), InsertOutcome::Appended);
        assert_eq!(ids(&state), [second_id.as_str(), "m1"]);
    }

    #[test]
    fn echo_outside_window_does_not_reconcile() {
        let mut state = ready(vec![]);
        let pending = pending_from("u1", "hello");
        let mut echo = message("m3", "u1", "hello", 0);
        echo.sent_at = pending.created_at + Duration::minutes(5);
        state.push_pending(pending);

        assert_eq!(state.apply_insert(echo), InsertOutcome::Appended);
        assert_eq!(state.entries().len(), 2);
    }

    #[test]
    fn failed_send_removes_pending_and_sets_error() {
        let mut state = ready(vec![]);
        let pending = pending_from("u1", "hello");
        let temp_id = pending.temp_id.clone();
        state.push_pending(pending);
        assert!(state.is_sending());

        state.complete_send(&temp_id, SendOutcome::Failed("offline".to_owned()));

        assert!(state.entries().is_empty());
        assert_eq!(state.error(), Some("offline"));
        assert!(!state.is_sending());
    }

    #[test]
    fn push_pending_requires_ready() {
        let mut state = ConversationState::new("c1", window());

        assert!(!state.push_pending(pending_from("u1", "too early")));
        assert!(state.entries().is_empty());
    }

    #[test]
    fn update_and_delete_touch_confirmed_messages() {
        let mut state = ready(vec![message("m1", "u2", "hi", 0), message("m2", "u2", "yo", 1)]);
        let mut read = message("m1", "u2", "hi", 0);
        read.read = true;

        assert!(state.apply_update(read));
        assert!(state.apply_delete("m2"));
        assert!(!state.apply_delete("m2"));

        assert_eq!(ids(&state), ["m1"]);
        assert!(matches!(&state.entries()[0], ChatEntry::Confirmed(m) if m.read));
    }

    #[test]
    fn invalid_is_terminal() {
        let mut state = ConversationState::new("c1", window());

        state.set_invalid("not a participant");

        assert!(!state.set_ready(vec![message("m1", "u1", "hi", 0)]));
        assert!(!state.begin_reload());
        assert_eq!(
            state.apply_insert(message("m2", "u1", "hi", 1)),
            InsertOutcome::Ignored
        );
        assert_eq!(state.status(), SessionStatus::Invalid);
        assert_eq!(state.error(), Some("not a participant"));
    }

    #[test]
    fn failed_history_can_reload() {
        let mut state = ConversationState::new("c1", window());

        state.set_failed("offline");
        assert_eq!(state.status(), SessionStatus::Failed);

        assert!(state.begin_reload());
        assert!(state.set_ready(vec![]));
        assert_eq!(state.error(), None);
    }

    #[test]
    fn messages_from_other_conversations_are_ignored() {
        let mut state = ready(vec![message("m1", "u2", "hi", 0)]);
        let mut foreign = message("m2", "u2", "elsewhere", 1);
        foreign.conversation_id = "c2".to_owned();
        let mut edited = message("m1", "u2", "changed", 0);
        edited.conversation_id = "c2".to_owned();

        assert_eq!(state.apply_insert(foreign), InsertOutcome::Ignored);
        assert!(!state.apply_update(edited));
        assert_eq!(ids(&state), ["m1"]);
        assert_eq!(state.entries()[0].body(), "hi");
    }

    #[test]
    fn close_drops_pending_entries_but_keeps_confirmed() {
        let mut state = ready(vec![message("m1", "u2", "hi", 0)]);
        state.push_pending(pending_from("u1", "on my way"));
        assert!(state.is_sending());

        state.close();

        assert_eq!(ids(&state), ["m1"]);
        assert!(!state.is_sending());
    }

    #[test]
    fn closed_state_ignores_late_results() {
        let mut state = ready(vec![]);
        let pending = pending_from("u1", "bye");
        let temp_id = pending.temp_id.clone();
        state.push_pending(pending);

        state.close();
        state.complete_send(&temp_id, SendOutcome::Failed("offline".to_owned()));

        assert_eq!(state.status(), SessionStatus::Closed);
        assert_eq!(state.error(), None);
        assert!(state.entries().is_empty());
        assert!(!state.is_sending());
        assert_eq!(
            state.apply_insert(message("m1", "u2", "hi", 0)),
            InsertOutcome::Ignored
        );
    }
}
