//! Conversation rendering for the terminal.
//!
//! - Date separators between messages from different days
//! - Sender grouping (consecutive messages from one sender show the name once)
//! - Pending messages are marked until the backend confirms them

use chrono::{DateTime, NaiveDate, Utc};

use crate::domain::message::ChatEntry;

const PENDING_MARKER: &str = "(sending)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageListElement {
    DateSeparator(String),
    Message {
        time: String,
        sender: Option<String>,
        content: String,
        pending: bool,
    },
}

/// Builds the visual list for `entries` as seen by `viewer_id`.
pub fn build_message_list_elements(
    entries: &[ChatEntry],
    viewer_id: &str,
) -> Vec<MessageListElement> {
    let mut elements = Vec::new();
    let mut prev_date: Option<NaiveDate> = None;
    let mut prev_sender: Option<&str> = None;

    for entry in entries {
        let date = entry.timestamp().date_naive();
        if prev_date != Some(date) {
            elements.push(MessageListElement::DateSeparator(format_date(date)));
            prev_sender = None;
        }

        let sender_id = entry.sender_id();
        let sender =
            (prev_sender != Some(sender_id)).then(|| display_sender(sender_id, viewer_id));

        elements.push(MessageListElement::Message {
            time: format_time(entry.timestamp()),
            sender,
            content: entry.body().to_owned(),
            pending: entry.is_pending(),
        });

        prev_date = Some(date);
        prev_sender = Some(sender_id);
    }

    elements
}

/// Plain text lines for one element.
pub fn element_lines(element: &MessageListElement) -> Vec<String> {
    match element {
        MessageListElement::DateSeparator(date) => vec![String::new(), format!("--- {date} ---")],
        MessageListElement::Message {
            time,
            sender,
            content,
            pending,
        } => {
            let indent = "      ";
            let mut lines = Vec::new();
            if let Some(sender) = sender {
                lines.push(format!("{time:>5} {sender}:"));
            }

            let mut body_lines = content.lines();
            let first = body_lines.next().unwrap_or("[Empty message]");
            let marker = if *pending {
                format!(" {PENDING_MARKER}")
            } else {
                String::new()
            };
            if sender.is_some() {
                lines.push(format!("{indent}{first}{marker}"));
            } else {
                lines.push(format!("{time:>5} {first}{marker}"));
            }
            lines.extend(body_lines.map(|line| format!("{indent}{line}")));
            lines
        }
    }
}

fn display_sender(sender_id: &str, viewer_id: &str) -> String {
    if sender_id == viewer_id {
        "You".to_owned()
    } else {
        sender_id.to_owned()
    }
}

fn format_date(date: NaiveDate) -> String {
    date.format("%d %b %Y").to_string()
}

fn format_time(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%H:%M").to_string()
}
