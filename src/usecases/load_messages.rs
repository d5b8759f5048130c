use crate::{
    backend::{records, BackendError, BackendService, Filter, Query, Sort},
    domain::{message::Message, record::Record},
};

const DEFAULT_HISTORY_PAGE_SIZE: usize = 100;
const MAX_HISTORY_PAGE_SIZE: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadHistoryQuery {
    pub conversation_id: String,
    pub page_size: usize,
}

impl LoadHistoryQuery {
    pub fn new(conversation_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            page_size: DEFAULT_HISTORY_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    fn normalized_page_size(&self) -> usize {
        match self.page_size {
            0 => DEFAULT_HISTORY_PAGE_SIZE,
            value if value > MAX_HISTORY_PAGE_SIZE => MAX_HISTORY_PAGE_SIZE,
            value => value,
        }
    }
}

/// Loads the whole history of a conversation, oldest first, one page at a
/// time until the backend returns a short page.
pub async fn load_history(
    backend: &dyn BackendService,
    query: LoadHistoryQuery,
) -> Result<Vec<Message>, BackendError> {
    let page_size = query.normalized_page_size();
    let mut history: Vec<Message> = Vec::new();

    loop {
        let page: Vec<Message> = records::fetch(
            backend,
            Query::table(Message::TABLE)
                .filter(Filter::eq("conversation_id", query.conversation_id.as_str()))
                .sort(Sort::ascending("sent_at"))
                .page(history.len(), page_size),
        )
        .await?;

        let fetched = page.len();
        history.extend(page);
        if fetched < page_size {
            break;
        }
    }

    tracing::debug!(
        conversation_id = %query.conversation_id,
        messages = history.len(),
        page_size,
        "conversation history loaded"
    );

    Ok(history)
}
