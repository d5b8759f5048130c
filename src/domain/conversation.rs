use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::record::Record;

/// A two-party message thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub participant_a: String,
    pub participant_b: String,
    #[serde(default)]
    pub last_activity_at: Option<DateTime<Utc>>,
}

impl Record for Conversation {
    const TABLE: &'static str = "conversations";

    fn id(&self) -> &str {
        &self.id
    }
}

impl Conversation {
    pub fn involves(&self, user_id: &str) -> bool {
        self.participant_a == user_id || self.participant_b == user_id
    }

    /// Returns the other side of the thread, or None if `user_id` is not a
    /// participant.
    pub fn counterpart(&self, user_id: &str) -> Option<&str> {
        if self.participant_a == user_id {
            Some(&self.participant_b)
        } else if self.participant_b == user_id {
            Some(&self.participant_a)
        } else {
            None
        }
    }
}

/// Orders a participant pair so the same two users always map to the same
/// stored `(participant_a, participant_b)`.
pub fn participant_pair<'a>(first: &'a str, second: &'a str) -> (&'a str, &'a str) {
    if first <= second {
        (first, second)
    } else {
        (second, first)
    }
}
