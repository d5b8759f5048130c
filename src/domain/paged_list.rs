use std::collections::HashSet;

use super::record::{append_unique, Record};

/// Position of the next page. Counts rows the backend has handed out, so
/// rows dropped as duplicates still advance it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cursor {
    offset: usize,
}

impl Cursor {
    pub fn start() -> Self {
        Self::default()
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    fn advance(self, fetched: usize) -> Self {
        Self {
            offset: self.offset + fetched,
        }
    }
}

/// A page fetch the caller must run and then hand back to the list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest<F> {
    pub generation: u64,
    pub cursor: Cursor,
    pub limit: usize,
    pub filters: F,
}

/// An optimistic edit that has been applied locally and awaits the
/// backend verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimisticChange<T> {
    generation: u64,
    original: T,
    updated: T,
}

impl<T> OptimisticChange<T> {
    pub fn updated(&self) -> &T {
        &self.updated
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptimisticStart<T> {
    Started(OptimisticChange<T>),
    /// A previous edit of the same record has not settled yet.
    InFlight,
    Missing,
}

/// Paginated, deduplicated list state for one screen session.
///
/// Every reload bumps `generation`; results carrying an older generation,
/// or arriving after `close`, are dropped without touching the list.
#[derive(Debug, Clone)]
pub struct PagedList<T, F> {
    filters: F,
    page_size: usize,
    items: Vec<T>,
    cursor: Cursor,
    has_more: bool,
    loading: bool,
    loading_more: bool,
    error: Option<String>,
    generation: u64,
    in_flight_edits: HashSet<String>,
    closed: bool,
}

impl<T, F> PagedList<T, F>
where
    T: Record,
    F: Clone + PartialEq,
{
    pub fn new(filters: F, page_size: usize) -> Self {
        Self {
            filters,
            page_size: page_size.max(1),
            items: Vec::new(),
            cursor: Cursor::start(),
            has_more: false,
            loading: false,
            loading_more: false,
            error: None,
            generation: 0,
            in_flight_edits: HashSet::new(),
            closed: false,
        }
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn item(&self, id: &str) -> Option<&T> {
        self.items.iter().find(|item| item.id() == id)
    }

    pub fn filters(&self) -> &F {
        &self.filters
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_loading_more(&self) -> bool {
        self.loading_more
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Stores `filters` and reports whether they differ from the current set.
    pub fn replace_filters(&mut self, filters: F) -> bool {
        if self.filters == filters {
            return false;
        }

        self.filters = filters;
        true
    }

    /// Discards the list and starts over from the first page.
    pub fn begin_reload(&mut self) -> Option<PageRequest<F>> {
        if self.closed {
            return None;
        }

        self.generation += 1;
        self.items.clear();
        self.cursor = Cursor::start();
        self.has_more = false;
        self.loading = true;
        self.loading_more = false;
        self.error = None;
        self.in_flight_edits.clear();

        Some(self.request())
    }

    /// Returns false when the result was stale and ignored.
    pub fn finish_reload(&mut self, generation: u64, result: Result<Vec<T>, String>) -> bool {
        if !self.accepts(generation) || !self.loading {
            return false;
        }

        self.loading = false;
        match result {
            Ok(page) => {
                let fetched = page.len();
                append_unique(&mut self.items, page);
                self.cursor = Cursor::start().advance(fetched);
                self.has_more = fetched == self.page_size;
            }
            Err(message) => {
                self.items.clear();
                self.has_more = false;
                self.error = Some(message);
            }
        }

        true
    }

    /// None when a page is already in flight, the list is exhausted, or
    /// the session is closed.
    pub fn begin_load_more(&mut self) -> Option<PageRequest<F>> {
        if self.closed || self.loading || self.loading_more || !self.has_more {
            return None;
        }

        self.loading_more = true;
        self.error = None;
        Some(self.request())
    }

    pub fn finish_load_more(&mut self, generation: u64, result: Result<Vec<T>, String>) -> bool {
        if !self.accepts(generation) || !self.loading_more {
            return false;
        }

        self.loading_more = false;
        match result {
            Ok(page) => {
                let fetched = page.len();
                append_unique(&mut self.items, page);
                self.cursor = self.cursor.advance(fetched);
                self.has_more = fetched == self.page_size;
            }
            Err(message) => self.error = Some(message),
        }

        true
    }

    /// Applies `edit` to the record with `id` ahead of the backend call.
    pub fn begin_optimistic(
        &mut self,
        id: &str,
        edit: impl FnOnce(&mut T),
    ) -> OptimisticStart<T> {
        if self.closed {
            return OptimisticStart::Missing;
        }
        if self.in_flight_edits.contains(id) {
            return OptimisticStart::InFlight;
        }
        let Some(item) = self.items.iter_mut().find(|item| item.id() == id) else {
            return OptimisticStart::Missing;
        };

        let original = item.clone();
        edit(item);
        let updated = item.clone();
        self.in_flight_edits.insert(id.to_owned());

        OptimisticStart::Started(OptimisticChange {
            generation: self.generation,
            original,
            updated,
        })
    }

    /// Settles an optimistic edit. On failure the record is restored to its
    /// pre-edit value. Returns true when a rollback was applied.
    pub fn settle_optimistic(
        &mut self,
        change: OptimisticChange<T>,
        outcome: Result<(), String>,
    ) -> bool {
        if !self.accepts(change.generation) {
            return false;
        }

        let id = change.original.id().to_owned();
        self.in_flight_edits.remove(&id);

        let Err(message) = outcome else {
            return false;
        };

        self.error = Some(message);
        match self.items.iter_mut().find(|item| item.id() == id) {
            Some(item) => {
                *item = change.original;
                true
            }
            None => false,
        }
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    pub fn close(&mut self) {
        self.closed = true;
        self.loading = false;
        self.loading_more = false;
        self.in_flight_edits.clear();
    }

    fn accepts(&self, generation: u64) -> bool {
        !self.closed && generation == self.generation
    }

    fn request(&self) -> PageRequest<F> {
        PageRequest {
            generation: self.generation,
            cursor: self.cursor,
            limit: self.page_size,
            filters: self.filters.clone(),
        }
    }
}
