use thiserror::Error;

use crate::backend::BackendError;

/// How a screen should present a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Backend call failed or timed out; offer a retry.
    NetworkOrQuery,
    /// The request can never succeed as issued.
    Validation,
    /// An optimistic edit was undone after the backend refused it.
    OptimisticRollback,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("you need to be signed in to do this")]
    MissingUser,
    #[error("this conversation does not exist")]
    ConversationNotFound,
    #[error("you are not a participant in this conversation")]
    NotParticipant,
    #[error("a conversation needs two different people")]
    SelfConversation,
    #[error("message text is empty")]
    EmptyMessage,
    #[error("message is longer than {max} characters")]
    MessageTooLong { max: usize },
    #[error("this item is no longer in the list")]
    UnknownRecord { id: String },
    #[error("the conversation is not ready yet")]
    NotReady,
    #[error("this screen has been closed")]
    SessionClosed,
    #[error("could not {action}, the change was undone: {source}")]
    RolledBack {
        action: &'static str,
        #[source]
        source: BackendError,
    },
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Backend(_) => ErrorKind::NetworkOrQuery,
            Self::RolledBack { .. } => ErrorKind::OptimisticRollback,
            Self::MissingUser
            | Self::ConversationNotFound
            | Self::NotParticipant
            | Self::SelfConversation
            | Self::EmptyMessage
            | Self::MessageTooLong { .. }
            | Self::UnknownRecord { .. }
            | Self::NotReady
            | Self::SessionClosed => ErrorKind::Validation,
        }
    }
}
