//! Domain layer: records and the pure state machines behind each screen.

pub mod conversation;
pub mod conversation_state;
pub mod filters;
pub mod message;
pub mod paged_list;
pub mod project;
pub mod record;
pub mod social;

/// Returns the domain module name for smoke checks.
pub fn module_name() -> &'static str {
    "domain"
}
