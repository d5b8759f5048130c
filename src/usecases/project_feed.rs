//! Project feed: paginated projects with per-viewer like state.

use std::{collections::HashSet, sync::Arc};

use async_trait::async_trait;
use serde_json::Value;

use crate::{
    backend::{records, BackendError, BackendService, Filter, Query, Row, Sort},
    domain::{
        filters::FeedFilters,
        paged_list::Cursor,
        project::Project,
        record::Record,
        social::{Follow, Like},
    },
    usecases::{
        error::SyncError,
        paged_cache::{PageSource, PagedCache},
    },
};

const FEED_FOLLOWED_WITHOUT_VIEWER: &str = "FEED_FOLLOWED_WITHOUT_VIEWER";
const FEED_LIKE_CONFLICT_IGNORED: &str = "FEED_LIKE_CONFLICT_IGNORED";
const FEED_LIKE_COUNT_SYNC_FAILED: &str = "FEED_LIKE_COUNT_SYNC_FAILED";

pub type ProjectFeed = PagedCache<ProjectFeedSource>;

#[derive(Clone)]
pub struct ProjectFeedSource {
    backend: Arc<dyn BackendService>,
    viewer_id: Option<String>,
}

impl ProjectFeedSource {
    pub fn new(backend: Arc<dyn BackendService>, viewer_id: Option<String>) -> Self {
        Self { backend, viewer_id }
    }

    pub fn viewer_id(&self) -> Option<&str> {
        self.viewer_id.as_deref()
    }

    async fn followed_farmers(&self, viewer_id: &str) -> Result<Vec<String>, BackendError> {
        let follows: Vec<Follow> = records::fetch(
            self.backend.as_ref(),
            Query::table(Follow::TABLE).filter(Filter::eq("follower_id", viewer_id)),
        )
        .await?;

        Ok(follows.into_iter().map(|follow| follow.followed_id).collect())
    }

    async fn annotate_likes(&self, projects: &mut [Project]) -> Result<(), BackendError> {
        let Some(viewer_id) = self.viewer_id.as_deref() else {
            return Ok(());
        };
        if projects.is_empty() {
            return Ok(());
        }

        let likes: Vec<Like> = records::fetch(
            self.backend.as_ref(),
            Query::table(Like::TABLE)
                .filter(Filter::eq("user_id", viewer_id))
                .filter(Filter::any_of(
                    "project_id",
                    projects.iter().map(|project| project.id.clone()),
                )),
        )
        .await?;

        let liked: HashSet<&str> = likes.iter().map(|like| like.project_id.as_str()).collect();
        for project in projects.iter_mut() {
            project.is_liked = liked.contains(project.id.as_str());
        }

        Ok(())
    }
}

#[async_trait]
impl PageSource for ProjectFeedSource {
    type Item = Project;
    type Filters = FeedFilters;

    fn name(&self) -> &'static str {
        "project_feed"
    }

    async fn fetch_page(
        &self,
        filters: &FeedFilters,
        cursor: Cursor,
        limit: usize,
    ) -> Result<Vec<Project>, BackendError> {
        let mut query = Query::table(Project::TABLE)
            .sort(Sort::descending("created_at"))
            .page(cursor.offset(), limit);

        if let Some(status) = filters.status {
            query = query.filter(Filter::eq("status", status.as_str()));
        }
        for (field, value) in filters.text_criteria() {
            query = query.filter(Filter::eq(field, value));
        }

        if filters.followed_users_only {
            let Some(viewer_id) = self.viewer_id.as_deref() else {
                tracing::debug!(
                    code = FEED_FOLLOWED_WITHOUT_VIEWER,
                    "followed-only feed requested without a viewer"
                );
                return Ok(Vec::new());
            };

            let farmers = self.followed_farmers(viewer_id).await?;
            if farmers.is_empty() {
                return Ok(Vec::new());
            }
            query = query.filter(Filter::any_of("farmer_id", farmers));
        }

        let mut projects: Vec<Project> = records::fetch(self.backend.as_ref(), query).await?;
        self.annotate_likes(&mut projects).await?;
        Ok(projects)
    }
}

impl PagedCache<ProjectFeedSource> {
    /// Flips the viewer's like on `project_id` locally, then writes the
    /// `likes` row and the project's stored `likes_count`. The local change
    /// is undone if the like write fails.
    pub async fn toggle_like(&self, project_id: &str) -> Result<(), SyncError> {
        let Some(viewer_id) = self.source().viewer_id().map(str::to_owned) else {
            return Err(SyncError::MissingUser);
        };
        let backend = Arc::clone(&self.source().backend);

        self.optimistic_update(
            project_id,
            "update your like",
            Project::toggle_like,
            |updated| async move {
                let changed = if updated.is_liked {
                    add_like(backend.as_ref(), &updated.id, &viewer_id).await?
                } else {
                    remove_like(backend.as_ref(), &updated.id, &viewer_id).await?
                };
                if changed {
                    sync_likes_count(backend.as_ref(), &updated.id, updated.is_liked).await;
                }
                Ok::<(), BackendError>(())
            },
        )
        .await
    }
}

/// Returns whether a new row was stored.
async fn add_like(
    backend: &dyn BackendService,
    project_id: &str,
    user_id: &str,
) -> Result<bool, BackendError> {
    match records::insert::<Like, _>(backend, &Like::new(project_id, user_id)).await {
        Ok(_) => Ok(true),
        Err(BackendError::Conflict { .. }) => {
            tracing::debug!(
                code = FEED_LIKE_CONFLICT_IGNORED,
                project_id,
                user_id,
                "like already stored"
            );
            Ok(false)
        }
        Err(error) => Err(error),
    }
}

/// Returns whether a row was removed.
async fn remove_like(
    backend: &dyn BackendService,
    project_id: &str,
    user_id: &str,
) -> Result<bool, BackendError> {
    let removed = backend
        .delete(
            Like::TABLE,
            vec![
                Filter::eq("project_id", project_id),
                Filter::eq("user_id", user_id),
            ],
        )
        .await?;
    Ok(!removed.is_empty())
}

/// Moves the stored `likes_count` one step. The like row is already
/// written, so a failure here is logged and the local count is kept.
async fn sync_likes_count(backend: &dyn BackendService, project_id: &str, liked: bool) {
    match write_likes_count(backend, project_id, liked).await {
        Ok(Some(count)) => {
            tracing::debug!(project_id, likes_count = count, "stored like count updated");
        }
        Ok(None) => {
            tracing::warn!(
                code = FEED_LIKE_COUNT_SYNC_FAILED,
                project_id,
                "project row missing, like count not updated"
            );
        }
        Err(error) => {
            tracing::warn!(
                code = FEED_LIKE_COUNT_SYNC_FAILED,
                project_id,
                error = %error,
                "failed to update stored like count"
            );
        }
    }
}

async fn write_likes_count(
    backend: &dyn BackendService,
    project_id: &str,
    liked: bool,
) -> Result<Option<u32>, BackendError> {
    let Some(project) =
        records::fetch_one::<Project>(backend, vec![Filter::eq("id", project_id)]).await?
    else {
        return Ok(None);
    };

    let count = if liked {
        project.likes_count.saturating_add(1)
    } else {
        project.likes_count.saturating_sub(1)
    };
    let mut patch = Row::new();
    patch.insert("likes_count".to_owned(), Value::from(count));
    backend
        .update(Project::TABLE, vec![Filter::eq("id", project_id)], patch)
        .await?;

    Ok(Some(count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backend::{memory::Operation, MemoryBackend},
        domain::project::ProjectStatus,
        test_support::{backend, project, projects},
    };

    fn feed_backend(items: &[Project]) -> MemoryBackend {
        let backend = backend();
        backend.seed(items).expect("projects should seed");
        backend
    }

    async fn open_feed(
        backend: &MemoryBackend,
        filters: FeedFilters,
        page_size: usize,
    ) -> ProjectFeed {
        let source = ProjectFeedSource::new(Arc::new(backend.clone()), Some("u1".to_owned()));
        ProjectFeed::initialize(source, filters, page_size).await
    }

    fn ids(feed: &ProjectFeed) -> Vec<String> {
        feed.snapshot()
            .items
            .into_iter()
            .map(|project| project.id)
            .collect()
    }

    #[tokio::test]
    async fn pages_newest_first_and_exhausts() {
        let backend = feed_backend(&projects(5));
        let feed = open_feed(&backend, FeedFilters::default(), 2).await;

        assert_eq!(ids(&feed), ["p1", "p2"]);
        feed.load_more().await.expect("page two");
        feed.load_more().await.expect("page three");

        assert_eq!(ids(&feed), ["p1", "p2", "p3", "p4", "p5"]);
        assert!(!feed.snapshot().has_more);
        assert_eq!(backend.call_count("projects", Operation::Query), 3);
    }

    #[tokio::test]
    async fn concurrent_load_more_queries_backend_once() {
        let backend = feed_backend(&projects(5));
        let feed = open_feed(&backend, FeedFilters::default(), 2).await;

        let (first, second) = tokio::join!(feed.load_more(), feed.load_more());

        assert_eq!(first, Ok(true));
        assert_eq!(second, Ok(false));
        assert_eq!(backend.call_count("projects", Operation::Query), 2);
    }

    #[tokio::test]
    async fn status_and_region_filters_apply_as_equality() {
        let mut pending = project("p-pending", 10);
        pending.status = ProjectStatus::Pending;
        let mut elsewhere = project("p-elsewhere", 9);
        elsewhere.region = Some("Vakinankaratra".to_owned());
        let backend = feed_backend(&[pending, elsewhere, project("p-match", 8)]);

        let feed = open_feed(
            &backend,
            FeedFilters::default()
                .with_status(ProjectStatus::Funding)
                .with_region("Analamanga"),
            10,
        )
        .await;

        assert_eq!(ids(&feed), ["p-match"]);
    }

    #[tokio::test]
    async fn filter_change_replaces_list_and_resets_cursor() {
        let mut first = projects(4);
        first[3].status = ProjectStatus::Completed;
        let backend = feed_backend(&first);
        let feed = open_feed(&backend, FeedFilters::default(), 2).await;
        feed.load_more().await.expect("page two");

        let changed = feed
            .set_filters(FeedFilters::default().with_status(ProjectStatus::Completed))
            .await
            .expect("filter change");

        assert!(changed);
        assert_eq!(ids(&feed), ["p4"]);
        assert!(!feed.snapshot().has_more);
    }

    #[tokio::test]
    async fn followed_only_restricts_to_followed_farmers() {
        let mut other = project("p-other", 5);
        other.farmer_id = "farmer-2".to_owned();
        let backend = feed_backend(&[project("p-followed", 6), other]);
        backend
            .seed(&[Follow {
                id: "f1".to_owned(),
                follower_id: "u1".to_owned(),
                followed_id: "farmer-1".to_owned(),
            }])
            .expect("follows should seed");

        let feed = open_feed(&backend, FeedFilters::default().followed_only(), 10).await;

        assert_eq!(ids(&feed), ["p-followed"]);
    }

    #[tokio::test]
    async fn followed_only_with_no_follows_skips_project_query() {
        let backend = feed_backend(&projects(3));

        let feed = open_feed(&backend, FeedFilters::default().followed_only(), 10).await;

        assert!(feed.snapshot().items.is_empty());
        assert!(!feed.snapshot().has_more);
        assert_eq!(backend.call_count("projects", Operation::Query), 0);
    }

    #[tokio::test]
    async fn page_is_annotated_with_viewer_likes() {
        let backend = feed_backend(&projects(3));
        backend
            .seed(&[Like::new("p2", "u1"), Like::new("p3", "someone-else")])
            .expect("likes should seed");

        let feed = open_feed(&backend, FeedFilters::default(), 10).await;
        let liked: Vec<bool> = feed
            .snapshot()
            .items
            .iter()
            .map(|project| project.is_liked)
            .collect();

        assert_eq!(liked, [false, true, false]);
    }

    #[tokio::test]
    async fn toggle_like_inserts_then_deletes_like_row() {
        let backend = feed_backend(&projects(1));
        let feed = open_feed(&backend, FeedFilters::default(), 10).await;

        feed.toggle_like("p1").await.expect("like");
        let liked = feed.snapshot().items[0].clone();
        assert!(liked.is_liked);
        assert_eq!(liked.likes_count, 4);
        assert_eq!(backend.rows("likes").len(), 1);

        feed.toggle_like("p1").await.expect("unlike");
        let unliked = feed.snapshot().items[0].clone();
        assert!(!unliked.is_liked);
        assert_eq!(unliked.likes_count, 3);
        assert!(backend.rows("likes").is_empty());
    }

    #[tokio::test]
    async fn confirmed_like_survives_refresh() {
        let backend = feed_backend(&projects(1));
        let feed = open_feed(&backend, FeedFilters::default(), 10).await;

        feed.toggle_like("p1").await.expect("like");
        feed.refresh().await.expect("refresh");

        let liked = feed.snapshot().items[0].clone();
        assert!(liked.is_liked);
        assert_eq!(liked.likes_count, 4);

        feed.toggle_like("p1").await.expect("unlike");
        feed.refresh().await.expect("refresh");

        let unliked = feed.snapshot().items[0].clone();
        assert!(!unliked.is_liked);
        assert_eq!(unliked.likes_count, 3);
    }

    #[tokio::test]
    async fn count_sync_failure_keeps_the_like() {
        let backend = feed_backend(&projects(1));
        let feed = open_feed(&backend, FeedFilters::default(), 10).await;
        backend.fail("projects", Operation::Update, BackendError::Unavailable);

        feed.toggle_like("p1").await.expect("like row was written");

        let liked = feed.snapshot().items[0].clone();
        assert!(liked.is_liked);
        assert_eq!(liked.likes_count, 4);
        assert_eq!(feed.snapshot().error, None);
        assert_eq!(backend.rows("likes").len(), 1);
    }

    #[tokio::test]
    async fn failed_like_rolls_back_exact_values() {
        let backend = feed_backend(&projects(2));
        let feed = open_feed(&backend, FeedFilters::default(), 10).await;
        let before = feed.snapshot().items;
        backend.fail("likes", Operation::Insert, BackendError::Unavailable);

        let error = feed.toggle_like("p1").await.expect_err("insert must fail");

        assert_eq!(error.kind(), crate::usecases::error::ErrorKind::OptimisticRollback);
        assert_eq!(feed.snapshot().items, before);
        assert!(feed.snapshot().error.is_some());
        assert!(backend.rows("likes").is_empty());
    }

    #[tokio::test]
    async fn second_toggle_while_first_in_flight_is_ignored() {
        let backend = feed_backend(&projects(1));
        let feed = open_feed(&backend, FeedFilters::default(), 10).await;

        let (first, second) = tokio::join!(feed.toggle_like("p1"), feed.toggle_like("p1"));

        assert_eq!(first, Ok(()));
        assert_eq!(second, Ok(()));
        assert!(feed.snapshot().items[0].is_liked);
        assert_eq!(backend.call_count("likes", Operation::Insert), 1);
    }

    #[tokio::test]
    async fn duplicate_like_conflict_counts_as_liked() {
        let backend = feed_backend(&projects(1));
        let feed = open_feed(&backend, FeedFilters::default(), 10).await;
        backend
            .seed(&[Like::new("p1", "u1")])
            .expect("like should seed");

        feed.toggle_like("p1").await.expect("conflict is not a failure");

        assert!(feed.snapshot().items[0].is_liked);
        assert_eq!(backend.rows("likes").len(), 1);
        assert_eq!(backend.call_count("projects", Operation::Update), 0);
    }

    #[tokio::test]
    async fn toggle_without_viewer_is_rejected() {
        let backend = feed_backend(&projects(1));
        let source = ProjectFeedSource::new(Arc::new(backend.clone()), None);
        let feed = ProjectFeed::initialize(source, FeedFilters::default(), 10).await;

        assert_eq!(feed.toggle_like("p1").await, Err(SyncError::MissingUser));
        assert!(!feed.snapshot().items[0].is_liked);
    }

    #[tokio::test]
    async fn toggle_unknown_project_is_validation_error() {
        let backend = feed_backend(&projects(1));
        let feed = open_feed(&backend, FeedFilters::default(), 10).await;

        let error = feed.toggle_like("missing").await.expect_err("unknown id");

        assert_eq!(error.kind(), crate::usecases::error::ErrorKind::Validation);
        assert_eq!(backend.call_count("likes", Operation::Insert), 0);
    }
}
