//! Keeps post fields in step with the notebook's `%META` cell.

use std::{collections::BTreeSet, sync::Arc, time::Instant};

use async_trait::async_trait;
use metrics::counter;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::application::fetch::{FetchError, NotebookSource};
use crate::application::repos::{CategoriesRepo, PostSaveHook, PostsRepo, PostsWriteRepo, RepoError};
use crate::domain::metadata::{MetadataDirectives, PostMetadataUpdate};
use crate::domain::notebook::NotebookDocument;
use crate::domain::shortcode::find_directives;

#[derive(Debug, Error)]
pub enum MetadataSyncError {
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("notebook is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Why a sync finished without touching the post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Fired by this service's own metadata write.
    Reentrant,
    NotFound,
    /// Revisions and autosaves are left alone.
    Snapshot,
    NoDirective,
    /// More than one directive; which notebook owns the post is undecided.
    Ambiguous { count: usize },
    NoMetadataCell,
    EmptyMetadata,
    /// The post was saved again before the update could be written.
    Superseded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Applied(PostMetadataUpdate),
    Skipped(SkipReason),
}

/// A notebook document the caller already downloaded.
#[derive(Debug, Clone, Copy)]
pub struct Prefetched<'a> {
    pub source_url: &'a str,
    pub raw: &'a str,
}

tokio::task_local! {
    /// Post whose metadata update is being written by the current task.
    static APPLYING: Uuid;
}

/// True while this task is inside the metadata write for `post_id`, which is
/// where the save hooks fired by that write run.
fn applying(post_id: Uuid) -> bool {
    APPLYING.try_with(|id| *id == post_id).unwrap_or(false)
}

#[derive(Clone)]
pub struct MetadataSyncService {
    posts: Arc<dyn PostsRepo>,
    writer: Arc<dyn PostsWriteRepo>,
    categories: Arc<dyn CategoriesRepo>,
    source: Arc<dyn NotebookSource>,
}

impl MetadataSyncService {
    pub fn new(
        posts: Arc<dyn PostsRepo>,
        writer: Arc<dyn PostsWriteRepo>,
        categories: Arc<dyn CategoriesRepo>,
        source: Arc<dyn NotebookSource>,
    ) -> Self {
        Self {
            posts,
            writer,
            categories,
            source,
        }
    }

    /// Copy the notebook's metadata cell onto the post.
    ///
    /// `prefetched` is used instead of downloading when its URL matches the
    /// post's directive. Save hooks fired by our own update return early.
    /// When the post body changed while the notebook was being fetched, the
    /// newer save owns the post and this sync backs off.
    pub async fn sync(
        &self,
        post_id: Uuid,
        prefetched: Option<Prefetched<'_>>,
    ) -> Result<SyncOutcome, MetadataSyncError> {
        if applying(post_id) {
            return Ok(SyncOutcome::Skipped(SkipReason::Reentrant));
        }
        let started_at = Instant::now();

        let Some(post) = self.posts.find_post(post_id).await? else {
            return Ok(SyncOutcome::Skipped(SkipReason::NotFound));
        };
        if post.kind.is_snapshot() {
            return Ok(SyncOutcome::Skipped(SkipReason::Snapshot));
        }

        let directives = find_directives(&post.body);
        let source_url = match directives.as_slice() {
            [] => return Ok(SyncOutcome::Skipped(SkipReason::NoDirective)),
            [only] => match only.url.as_deref() {
                Some(url) => url.to_string(),
                None => return Ok(SyncOutcome::Skipped(SkipReason::NoDirective)),
            },
            many => {
                return Ok(SyncOutcome::Skipped(SkipReason::Ambiguous {
                    count: many.len(),
                }));
            }
        };

        let raw = match prefetched {
            Some(doc) if doc.source_url == source_url => doc.raw.to_string(),
            _ => self.source.fetch(&source_url).await?,
        };

        let document = NotebookDocument::parse(&raw)?;
        let Some(cell) = document.metadata_cell() else {
            return Ok(SyncOutcome::Skipped(SkipReason::NoMetadataCell));
        };
        let mut directives = MetadataDirectives::from_cell(cell);
        if directives.is_empty() {
            return Ok(SyncOutcome::Skipped(SkipReason::EmptyMetadata));
        }

        let category_ids = match directives.categories.take() {
            Some(names) => Some(self.resolve_categories(&names).await?),
            None => None,
        };

        match self.posts.find_post(post_id).await? {
            Some(current) if current.body == post.body => {}
            Some(_) => return Ok(SyncOutcome::Skipped(SkipReason::Superseded)),
            None => return Ok(SyncOutcome::Skipped(SkipReason::NotFound)),
        }

        let update = PostMetadataUpdate::new(post_id, directives, category_ids);
        APPLYING
            .scope(post_id, self.writer.apply_post_metadata(&update))
            .await?;

        counter!("nbpress_metadata_synced_total").increment(1);
        info!(
            target = "application::metadata",
            op = "metadata::sync",
            result = "applied",
            post_id = %post_id,
            source_url = %source_url,
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "Applied notebook metadata to post"
        );

        Ok(SyncOutcome::Applied(update))
    }

    async fn resolve_categories(&self, names: &[String]) -> Result<BTreeSet<Uuid>, RepoError> {
        let mut ids = BTreeSet::new();
        for name in names {
            let category = match self.categories.find_category_by_name(name).await? {
                Some(existing) => existing,
                None => match self.categories.create_category(name).await {
                    Ok(created) => created,
                    // Lost a race with another writer creating the same name.
                    Err(RepoError::Duplicate { .. }) => self
                        .categories
                        .find_category_by_name(name)
                        .await?
                        .ok_or(RepoError::NotFound)?,
                    Err(err) => return Err(err),
                },
            };
            ids.insert(category.id);
        }
        Ok(ids)
    }
}

#[async_trait]
impl PostSaveHook for MetadataSyncService {
    async fn post_saved(&self, post_id: Uuid) {
        match self.sync(post_id, None).await {
            Ok(SyncOutcome::Applied(_)) => {}
            Ok(SyncOutcome::Skipped(reason)) => debug!(
                target = "application::metadata",
                op = "metadata::post_saved",
                result = "skipped",
                post_id = %post_id,
                reason = ?reason,
                "Metadata sync skipped"
            ),
            Err(err) => warn!(
                target = "application::metadata",
                op = "metadata::post_saved",
                result = "error",
                post_id = %post_id,
                error = %err,
                "Metadata sync failed"
            ),
        }
    }
}
