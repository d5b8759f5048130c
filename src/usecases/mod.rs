//! Use case layer: sync sessions and application wiring.

pub mod bootstrap;
pub mod context;
pub mod conversation_list;
pub mod conversation_sync;
pub mod error;
pub mod live_feed;
pub mod load_messages;
pub mod paged_cache;
pub mod project_feed;
pub mod send_message;

/// Returns the usecases module name for smoke checks.
pub fn module_name() -> &'static str {
    "usecases"
}
