//! Bundled host adapter: posts and categories kept in memory and, when a path
//! is configured, mirrored to a JSON file after every write.

use std::{
    collections::BTreeMap,
    io::{self, ErrorKind, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError, Weak},
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::application::repos::{
    CategoriesRepo, PostSaveHook, PostsRepo, PostsWriteRepo, RepoError, SavePostParams,
};
use crate::domain::entities::{CategoryRecord, PostRecord};
use crate::domain::metadata::PostMetadataUpdate;
use crate::domain::slug::derive_slug;
use crate::infra::error::InfraError;

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreData {
    #[serde(default)]
    posts: BTreeMap<Uuid, PostRecord>,
    #[serde(default)]
    categories: BTreeMap<Uuid, CategoryRecord>,
}

pub struct JsonStore {
    data: RwLock<StoreData>,
    path: Option<PathBuf>,
    hooks: Mutex<Vec<Weak<dyn PostSaveHook>>>,
}

impl JsonStore {
    pub fn in_memory() -> Self {
        Self {
            data: RwLock::new(StoreData::default()),
            path: None,
            hooks: Mutex::new(Vec::new()),
        }
    }

    /// Load the store from `path`; a missing file starts an empty store.
    pub async fn open(path: PathBuf) -> Result<Self, InfraError> {
        let data = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|err| {
                InfraError::store(format!("failed to parse `{}`: {err}", path.display()))
            })?,
            Err(err) if err.kind() == ErrorKind::NotFound => StoreData::default(),
            Err(err) => return Err(InfraError::Io(err)),
        };

        info!(
            target = "infra::store",
            op = "store::open",
            path = %path.display(),
            posts = data.posts.len(),
            categories = data.categories.len(),
            "Post store loaded"
        );

        Ok(Self {
            data: RwLock::new(data),
            path: Some(path),
            hooks: Mutex::new(Vec::new()),
        })
    }

    /// Register a hook fired after every post write. Only a weak reference is
    /// kept; hooks dropped by their owner are pruned on the next write.
    pub fn register_hook(&self, hook: Arc<dyn PostSaveHook>) {
        self.hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::downgrade(&hook));
    }

    async fn notify(&self, post_id: Uuid) {
        let live: Vec<Arc<dyn PostSaveHook>> = {
            let mut hooks = self.hooks.lock().unwrap_or_else(PoisonError::into_inner);
            hooks.retain(|hook| hook.strong_count() > 0);
            hooks.iter().filter_map(Weak::upgrade).collect()
        };

        debug!(
            target = "infra::store",
            op = "store::notify",
            post_id = %post_id,
            hooks = live.len(),
            "Firing post save hooks"
        );

        for hook in live {
            hook.post_saved(post_id).await;
        }
    }

    async fn persist(&self, data: &StoreData) -> Result<(), RepoError> {
        let Some(path) = self.path.clone() else {
            return Ok(());
        };
        let bytes = serde_json::to_vec_pretty(data).map_err(RepoError::from_persistence)?;

        tokio::task::spawn_blocking(move || write_atomically(&path, &bytes))
            .await
            .map_err(RepoError::from_persistence)?
            .map_err(RepoError::from_persistence)
    }
}

fn write_atomically(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(directory)?;

    let mut file = NamedTempFile::new_in(directory)?;
    file.write_all(bytes)?;
    file.flush()?;
    file.persist(path).map_err(|err| err.error)?;
    Ok(())
}

#[async_trait]
impl PostsRepo for JsonStore {
    async fn find_post(&self, id: Uuid) -> Result<Option<PostRecord>, RepoError> {
        Ok(self.data.read().await.posts.get(&id).cloned())
    }
}

#[async_trait]
impl PostsWriteRepo for JsonStore {
    async fn save_post(&self, params: SavePostParams) -> Result<PostRecord, RepoError> {
        if params.title.trim().is_empty() {
            return Err(RepoError::InvalidInput {
                message: "title must not be empty".to_string(),
            });
        }

        let record = {
            let mut data = self.data.write().await;
            let now = OffsetDateTime::now_utc();
            let record = match data.posts.get(&params.id) {
                Some(existing) => PostRecord {
                    kind: params.kind,
                    title: params.title,
                    body: params.body,
                    updated_at: now,
                    ..existing.clone()
                },
                None => PostRecord {
                    id: params.id,
                    kind: params.kind,
                    slug: derive_slug(&params.title),
                    title: params.title,
                    excerpt: String::new(),
                    body: params.body,
                    tags: Default::default(),
                    category_ids: Default::default(),
                    updated_at: now,
                },
            };
            data.posts.insert(record.id, record.clone());
            self.persist(&data).await?;
            record
        };

        self.notify(record.id).await;
        Ok(record)
    }

    async fn apply_post_metadata(
        &self,
        update: &PostMetadataUpdate,
    ) -> Result<PostRecord, RepoError> {
        let record = {
            let mut data = self.data.write().await;
            let Some(post) = data.posts.get_mut(&update.post_id) else {
                return Err(RepoError::NotFound);
            };

            if let Some(title) = update.title.as_ref() {
                post.title = title.clone();
            }
            if let Some(slug) = update.slug.as_ref() {
                post.slug = slug.clone();
            }
            if let Some(excerpt) = update.excerpt.as_ref() {
                post.excerpt = excerpt.clone();
            }
            if let Some(tags) = update.tags.as_ref() {
                post.tags = tags.clone();
            }
            if let Some(category_ids) = update.category_ids.as_ref() {
                post.category_ids = category_ids.clone();
            }
            post.updated_at = OffsetDateTime::now_utc();

            let record = post.clone();
            self.persist(&data).await?;
            record
        };

        self.notify(record.id).await;
        Ok(record)
    }
}

#[async_trait]
impl CategoriesRepo for JsonStore {
    async fn find_category_by_name(
        &self,
        name: &str,
    ) -> Result<Option<CategoryRecord>, RepoError> {
        let data = self.data.read().await;
        Ok(data
            .categories
            .values()
            .find(|category| category.name == name)
            .cloned())
    }

    async fn create_category(&self, name: &str) -> Result<CategoryRecord, RepoError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(RepoError::InvalidInput {
                message: "category name must not be empty".to_string(),
            });
        }

        let mut data = self.data.write().await;
        if data.categories.values().any(|category| category.name == name) {
            return Err(RepoError::Duplicate {
                constraint: "categories_name_key".to_string(),
            });
        }

        let category = CategoryRecord {
            id: Uuid::new_v4(),
            name: name.to_string(),
        };
        data.categories.insert(category.id, category.clone());
        self.persist(&data).await?;
        Ok(category)
    }
}
