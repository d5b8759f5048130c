//! Builds the in-memory backend used by the CLI from a JSON seed file.
//!
//! The file maps table names to arrays of row objects:
//! `{ "projects": [ { "id": "p1", ... } ], "follows": [ ... ] }`.

use std::{collections::BTreeMap, fs, path::Path};

use crate::{
    backend::{MemoryBackend, Row},
    domain::{
        conversation::Conversation, message::Message, record::Record, social::Follow,
        social::Like,
    },
    infra::error::AppError,
};

/// Applies the production schema rules: message timestamps live in
/// `sent_at` and default to unread, and likes, follows and conversation
/// pairs are unique.
pub fn configure(backend: MemoryBackend) -> MemoryBackend {
    backend
        .with_timestamp_column(Message::TABLE, "sent_at")
        .with_default(Message::TABLE, "read", false)
        .with_unique(Like::TABLE, &["project_id", "user_id"])
        .with_unique(Follow::TABLE, &["follower_id", "followed_id"])
        .with_unique(Conversation::TABLE, &["participant_a", "participant_b"])
}

pub fn load(path: &Path) -> Result<MemoryBackend, AppError> {
    let raw = fs::read_to_string(path).map_err(|source| AppError::SeedRead {
        path: path.to_path_buf(),
        source,
    })?;

    let tables: BTreeMap<String, Vec<Row>> =
        serde_json::from_str(&raw).map_err(|source| AppError::SeedParse {
            path: path.to_path_buf(),
            source,
        })?;

    let backend = configure(MemoryBackend::new());
    for (table, rows) in tables {
        tracing::debug!(table = %table, rows = rows.len(), "seeding table");
        backend.seed_rows(&table, rows);
    }

    Ok(backend)
}
