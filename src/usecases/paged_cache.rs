//! Generic paginated cache with optimistic edits, shared by every list
//! screen (project feed, conversation inbox).

use std::{
    fmt,
    future::Future,
    sync::{Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;

use crate::{
    backend::BackendError,
    domain::{
        paged_list::{Cursor, OptimisticStart, PagedList},
        record::Record,
    },
    usecases::error::SyncError,
};

const DEFAULT_PAGE_SIZE: usize = 10;
const MAX_PAGE_SIZE: usize = 100;

const PAGE_RELOAD_FAILED: &str = "PAGE_RELOAD_FAILED";
const PAGE_LOAD_MORE_FAILED: &str = "PAGE_LOAD_MORE_FAILED";
const PAGE_RESULT_STALE: &str = "PAGE_RESULT_STALE";
const OPTIMISTIC_ROLLBACK: &str = "OPTIMISTIC_ROLLBACK";

/// Fetches one page of records for a filter set.
#[async_trait]
pub trait PageSource: Send + Sync {
    type Item: Record;
    type Filters: Clone + PartialEq + fmt::Debug + Send + Sync;

    /// Short label used in log events.
    fn name(&self) -> &'static str;

    async fn fetch_page(
        &self,
        filters: &Self::Filters,
        cursor: Cursor,
        limit: usize,
    ) -> Result<Vec<Self::Item>, BackendError>;
}

/// What a list screen renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSnapshot<T> {
    pub items: Vec<T>,
    pub loading: bool,
    pub loading_more: bool,
    pub error: Option<String>,
    pub has_more: bool,
}

pub struct PagedCache<S: PageSource> {
    source: S,
    state: Mutex<PagedList<S::Item, S::Filters>>,
}

impl<S: PageSource> PagedCache<S> {
    /// Builds an idle cache; call `refresh` to load the first page.
    pub fn new(source: S, filters: S::Filters, page_size: usize) -> Self {
        Self {
            source,
            state: Mutex::new(PagedList::new(filters, normalized_page_size(page_size))),
        }
    }

    /// Builds the cache and loads the first page. A failed load is kept in
    /// the snapshot's `error`.
    pub async fn initialize(source: S, filters: S::Filters, page_size: usize) -> Self {
        let cache = Self::new(source, filters, page_size);
        let _ = cache.refresh().await;
        cache
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn filters(&self) -> S::Filters {
        self.state().filters().clone()
    }

    pub fn snapshot(&self) -> PageSnapshot<S::Item> {
        let state = self.state();
        PageSnapshot {
            items: state.items().to_vec(),
            loading: state.is_loading(),
            loading_more: state.is_loading_more(),
            error: state.error().map(str::to_owned),
            has_more: state.has_more(),
        }
    }

    /// Drops the current list and fetches the first page again.
    pub async fn refresh(&self) -> Result<(), SyncError> {
        let Some(request) = self.state().begin_reload() else {
            return Err(SyncError::SessionClosed);
        };

        tracing::debug!(
            source = self.source.name(),
            generation = request.generation,
            filters = ?request.filters,
            "loading first page"
        );

        match self
            .source
            .fetch_page(&request.filters, request.cursor, request.limit)
            .await
        {
            Ok(page) => {
                let fetched = page.len();
                if self.state().finish_reload(request.generation, Ok(page)) {
                    tracing::debug!(source = self.source.name(), fetched, "first page loaded");
                } else {
                    self.log_stale(request.generation);
                }
                Ok(())
            }
            Err(error) => {
                tracing::warn!(
                    code = PAGE_RELOAD_FAILED,
                    source = self.source.name(),
                    error = %error,
                    "first page load failed"
                );
                if !self
                    .state()
                    .finish_reload(request.generation, Err(error.to_string()))
                {
                    self.log_stale(request.generation);
                }
                Err(error.into())
            }
        }
    }

    /// Appends the next page. Returns `Ok(false)` without fetching when a
    /// page is already in flight or the list is exhausted.
    pub async fn load_more(&self) -> Result<bool, SyncError> {
        let Some(request) = self.state().begin_load_more() else {
            tracing::trace!(source = self.source.name(), "load more skipped");
            return Ok(false);
        };

        match self
            .source
            .fetch_page(&request.filters, request.cursor, request.limit)
            .await
        {
            Ok(page) => {
                let fetched = page.len();
                if self.state().finish_load_more(request.generation, Ok(page)) {
                    tracing::debug!(
                        source = self.source.name(),
                        offset = request.cursor.offset(),
                        fetched,
                        "next page loaded"
                    );
                } else {
                    self.log_stale(request.generation);
                }
                Ok(true)
            }
            Err(error) => {
                tracing::warn!(
                    code = PAGE_LOAD_MORE_FAILED,
                    source = self.source.name(),
                    offset = request.cursor.offset(),
                    error = %error,
                    "next page load failed"
                );
                if !self
                    .state()
                    .finish_load_more(request.generation, Err(error.to_string()))
                {
                    self.log_stale(request.generation);
                }
                Err(error.into())
            }
        }
    }

    /// Switches filters and reloads when they differ by value. Returns
    /// whether a reload happened.
    pub async fn set_filters(&self, filters: S::Filters) -> Result<bool, SyncError> {
        if !self.state().replace_filters(filters) {
            return Ok(false);
        }

        self.refresh().await.map(|()| true)
    }

    /// Applies `edit` to the record `id` at once, then runs `mutation` with
    /// the edited record. If the mutation fails the record is restored and
    /// the error is reported as a rollback of `action`. An edit of a record
    /// whose previous edit is still in flight is skipped.
    pub async fn optimistic_update<E, M, Fut>(
        &self,
        id: &str,
        action: &'static str,
        edit: E,
        mutation: M,
    ) -> Result<(), SyncError>
    where
        E: FnOnce(&mut S::Item),
        M: FnOnce(S::Item) -> Fut,
        Fut: Future<Output = Result<(), BackendError>>,
    {
        let start = self.state().begin_optimistic(id, edit);
        let change = match start {
            OptimisticStart::Started(change) => change,
            OptimisticStart::InFlight => {
                tracing::debug!(source = self.source.name(), id, "edit already in flight");
                return Ok(());
            }
            OptimisticStart::Missing => {
                return Err(SyncError::UnknownRecord { id: id.to_owned() })
            }
        };

        match mutation(change.updated().clone()).await {
            Ok(()) => {
                self.state().settle_optimistic(change, Ok(()));
                Ok(())
            }
            Err(source) => {
                let error = SyncError::RolledBack { action, source };
                let rolled_back = self
                    .state()
                    .settle_optimistic(change, Err(error.to_string()));
                tracing::warn!(
                    code = OPTIMISTIC_ROLLBACK,
                    source = self.source.name(),
                    id,
                    rolled_back,
                    error = %error,
                    "optimistic edit rejected by backend"
                );
                Err(error)
            }
        }
    }

    pub fn clear_error(&self) {
        self.state().clear_error();
    }

    /// Marks the session torn down; in-flight results are discarded.
    pub fn close(&self) {
        self.state().close();
    }

    fn state(&self) -> MutexGuard<'_, PagedList<S::Item, S::Filters>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn log_stale(&self, generation: u64) {
        tracing::debug!(
            code = PAGE_RESULT_STALE,
            source = self.source.name(),
            generation,
            "discarding result for a superseded or closed list"
        );
    }
}

fn normalized_page_size(page_size: usize) -> usize {
    match page_size {
        0 => DEFAULT_PAGE_SIZE,
        value if value > MAX_PAGE_SIZE => MAX_PAGE_SIZE,
        value => value,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex as StdMutex};

    use super::*;
    use crate::{domain::project::Project, test_support::projects};

    /// Serves pages out of a fixed list, yielding once per call.
    struct VecSource {
        items: StdMutex<Vec<Project>>,
        failures: StdMutex<Vec<BackendError>>,
        calls: StdMutex<Vec<(String, usize, usize)>>,
    }

    impl VecSource {
        fn new(items: Vec<Project>) -> Self {
            Self {
                items: StdMutex::new(items),
                failures: StdMutex::new(Vec::new()),
                calls: StdMutex::new(Vec::new()),
            }
        }

        fn fail_next(&self, error: BackendError) {
            self.failures.lock().expect("failures lock").push(error);
        }

        fn calls(&self) -> Vec<(String, usize, usize)> {
            self.calls.lock().expect("calls lock").clone()
        }
    }

    #[async_trait]
    impl PageSource for VecSource {
        type Item = Project;
        type Filters = String;

        fn name(&self) -> &'static str {
            "vec"
        }

        async fn fetch_page(
            &self,
            filters: &String,
            cursor: Cursor,
            limit: usize,
        ) -> Result<Vec<Project>, BackendError> {
            self.calls
                .lock()
                .expect("calls lock")
                .push((filters.clone(), cursor.offset(), limit));
            tokio::task::yield_now().await;

            if let Some(error) = self.failures.lock().expect("failures lock").pop() {
                return Err(error);
            }

            Ok(self
                .items
                .lock()
                .expect("items lock")
                .iter()
                .skip(cursor.offset())
                .take(limit)
                .cloned()
                .collect())
        }
    }

    fn ids(snapshot: &PageSnapshot<Project>) -> Vec<&str> {
        snapshot.items.iter().map(|item| item.id.as_str()).collect()
    }

    #[tokio::test]
    async fn walks_five_items_in_pages_of_two() {
        let cache = PagedCache::initialize(VecSource::new(projects(5)), "all".to_owned(), 2).await;
        let first = cache.snapshot();
        assert_eq!(ids(&first), ["p1", "p2"]);
        assert!(first.has_more);

        assert!(cache.load_more().await.expect("second page"));
        let second = cache.snapshot();
        assert_eq!(ids(&second), ["p1", "p2", "p3", "p4"]);
        assert!(second.has_more);

        assert!(cache.load_more().await.expect("third page"));
        let third = cache.snapshot();
        assert_eq!(ids(&third), ["p1", "p2", "p3", "p4", "p5"]);
        assert!(!third.has_more);

        assert!(!cache.load_more().await.expect("exhausted list is a no-op"));
        assert_eq!(cache.source().calls().len(), 3);
    }

    #[tokio::test]
    async fn exhausts_after_ceil_n_over_p_pages_without_duplicates() {
        for (count, page_size) in [(0, 3), (1, 3), (6, 3), (7, 3), (10, 4)] {
            let cache =
                PagedCache::initialize(VecSource::new(projects(count)), "all".to_owned(), page_size)
                    .await;

            let mut loads = 0;
            while cache.load_more().await.expect("page should load") {
                loads += 1;
            }

            let snapshot = cache.snapshot();
            let mut unique = ids(&snapshot);
            unique.sort_unstable();
            unique.dedup();
            assert_eq!(snapshot.items.len(), count, "count={count} page={page_size}");
            assert_eq!(unique.len(), count);
            assert!(!snapshot.has_more);
            assert!(loads <= count.div_ceil(page_size));
        }
    }

    #[tokio::test]
    async fn shifted_offsets_do_not_duplicate_items() {
        let source = VecSource::new(projects(4));
        let cache = PagedCache::initialize(source, "all".to_owned(), 2).await;

        let mut fresh = projects(1).remove(0);
        fresh.id = "p0".to_owned();
        cache
            .source()
            .items
            .lock()
            .expect("items lock")
            .insert(0, fresh);
        cache.load_more().await.expect("second page");

        assert_eq!(ids(&cache.snapshot()), ["p1", "p2", "p3"]);
    }

    #[tokio::test]
    async fn concurrent_load_more_issues_one_fetch() {
        let cache = PagedCache::initialize(VecSource::new(projects(6)), "all".to_owned(), 2).await;

        let (first, second) = tokio::join!(cache.load_more(), cache.load_more());

        assert_eq!(first, Ok(true));
        assert_eq!(second, Ok(false));
        assert_eq!(cache.source().calls().len(), 2);
        assert_eq!(cache.snapshot().items.len(), 4);
    }

    #[tokio::test]
    async fn loading_flag_is_visible_while_first_page_is_in_flight() {
        let cache = PagedCache::new(VecSource::new(projects(3)), "all".to_owned(), 2);

        let (_, during) = tokio::join!(cache.refresh(), async { cache.snapshot() });

        assert!(during.loading);
        assert!(during.items.is_empty());
        assert!(!cache.snapshot().loading);
    }

    #[tokio::test]
    async fn failed_first_page_sets_error_and_empty_list() {
        let source = VecSource::new(projects(3));
        source.fail_next(BackendError::Unavailable);

        let cache = PagedCache::initialize(source, "all".to_owned(), 2).await;
        let snapshot = cache.snapshot();

        assert!(snapshot.items.is_empty());
        assert!(!snapshot.loading);
        assert_eq!(
            snapshot.error.as_deref(),
            Some("the service is unreachable, check your connection and try again")
        );

        cache.refresh().await.expect("retry should succeed");
        assert_eq!(ids(&cache.snapshot()), ["p1", "p2"]);
        assert_eq!(cache.snapshot().error, None);
    }

    #[tokio::test]
    async fn failed_load_more_keeps_loaded_items() {
        let cache = PagedCache::initialize(VecSource::new(projects(5)), "all".to_owned(), 2).await;
        cache.source().fail_next(BackendError::Unavailable);

        let result = cache.load_more().await;
        let snapshot = cache.snapshot();

        assert_eq!(result, Err(SyncError::Backend(BackendError::Unavailable)));
        assert_eq!(ids(&snapshot), ["p1", "p2"]);
        assert!(snapshot.has_more);
        assert!(snapshot.error.is_some());

        assert_eq!(cache.load_more().await, Ok(true));
        assert_eq!(cache.snapshot().items.len(), 4);
    }

    #[tokio::test]
    async fn refresh_replaces_instead_of_appending() {
        let cache = PagedCache::initialize(VecSource::new(projects(5)), "all".to_owned(), 2).await;
        cache.load_more().await.expect("second page");

        cache.refresh().await.expect("refresh");

        let snapshot = cache.snapshot();
        assert_eq!(ids(&snapshot), ["p1", "p2"]);
        assert!(snapshot.has_more);
        assert_eq!(cache.source().calls().last(), Some(&("all".to_owned(), 0, 2)));
    }

    #[tokio::test]
    async fn filter_change_resets_cursor_and_equal_filters_do_nothing() {
        let cache = PagedCache::initialize(VecSource::new(projects(5)), "all".to_owned(), 2).await;
        cache.load_more().await.expect("second page");

        assert_eq!(cache.set_filters("all".to_owned()).await, Ok(false));
        assert_eq!(cache.snapshot().items.len(), 4);

        assert_eq!(cache.set_filters("funding".to_owned()).await, Ok(true));
        assert_eq!(
            cache.source().calls().last(),
            Some(&("funding".to_owned(), 0, 2))
        );
        assert_eq!(ids(&cache.snapshot()), ["p1", "p2"]);
        assert_eq!(cache.filters(), "funding");
    }

    #[tokio::test]
    async fn load_more_finishing_after_refresh_is_discarded() {
        let cache = PagedCache::initialize(VecSource::new(projects(6)), "all".to_owned(), 2).await;

        let (more, refreshed) = tokio::join!(cache.load_more(), cache.refresh());

        assert_eq!(more, Ok(true));
        assert_eq!(refreshed, Ok(()));
        assert_eq!(ids(&cache.snapshot()), ["p1", "p2"]);
        assert!(!cache.snapshot().loading_more);
    }

    #[tokio::test]
    async fn results_after_close_are_ignored() {
        let cache = PagedCache::new(VecSource::new(projects(3)), "all".to_owned(), 2);

        let (result, ()) = tokio::join!(cache.refresh(), async { cache.close() });

        assert_eq!(result, Ok(()));
        assert!(cache.snapshot().items.is_empty());
        assert_eq!(cache.refresh().await, Err(SyncError::SessionClosed));
        assert_eq!(cache.load_more().await, Ok(false));
    }

    #[tokio::test]
    async fn optimistic_failure_restores_exact_values() {
        let cache = PagedCache::initialize(VecSource::new(projects(2)), "all".to_owned(), 2).await;
        let before = cache.snapshot().items[0].clone();

        let result = cache
            .optimistic_update("p1", "like this project", Project::toggle_like, |_| async {
                Err(BackendError::Unavailable)
            })
            .await;

        assert!(matches!(result, Err(SyncError::RolledBack { .. })));
        assert_eq!(cache.snapshot().items[0], before);
        assert!(cache.snapshot().error.is_some());
    }

    #[tokio::test]
    async fn optimistic_edit_is_visible_before_mutation_settles() {
        let cache = PagedCache::initialize(VecSource::new(projects(2)), "all".to_owned(), 2).await;
        let seen = Arc::new(StdMutex::new(None));
        let observed = Arc::clone(&seen);

        cache
            .optimistic_update("p1", "like this project", Project::toggle_like, |updated| {
                *observed.lock().expect("seen lock") = Some(updated.is_liked);
                async { Ok(()) }
            })
            .await
            .expect("update should succeed");

        assert_eq!(*seen.lock().expect("seen lock"), Some(true));
        assert!(cache.snapshot().items[0].is_liked);
    }

    #[tokio::test]
    async fn optimistic_update_on_unknown_id_fails_validation() {
        let cache = PagedCache::initialize(VecSource::new(projects(1)), "all".to_owned(), 2).await;

        let result = cache
            .optimistic_update("nope", "like this project", Project::toggle_like, |_| async {
                Ok(())
            })
            .await;

        assert_eq!(
            result,
            Err(SyncError::UnknownRecord {
                id: "nope".to_owned()
            })
        );
    }

    #[test]
    fn page_size_is_normalized() {
        assert_eq!(normalized_page_size(0), DEFAULT_PAGE_SIZE);
        assert_eq!(normalized_page_size(999), MAX_PAGE_SIZE);
        assert_eq!(normalized_page_size(7), 7);
    }
}
