//! Repository traits describing the host platform's persistence adapters.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::entities::{CategoryRecord, PostKind, PostRecord};
use crate::domain::metadata::PostMetadataUpdate;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct SavePostParams {
    pub id: Uuid,
    pub kind: PostKind,
    pub title: String,
    pub body: String,
}

#[async_trait]
pub trait PostsRepo: Send + Sync {
    async fn find_post(&self, id: Uuid) -> Result<Option<PostRecord>, RepoError>;
}

#[async_trait]
pub trait PostsWriteRepo: Send + Sync {
    /// Create or replace a post's body, then notify save hooks.
    async fn save_post(&self, params: SavePostParams) -> Result<PostRecord, RepoError>;

    /// Apply a partial metadata update as one write, then notify save hooks.
    async fn apply_post_metadata(
        &self,
        update: &PostMetadataUpdate,
    ) -> Result<PostRecord, RepoError>;
}

#[async_trait]
pub trait CategoriesRepo: Send + Sync {
    async fn find_category_by_name(&self, name: &str)
    -> Result<Option<CategoryRecord>, RepoError>;

    async fn create_category(&self, name: &str) -> Result<CategoryRecord, RepoError>;
}

/// Invoked by the host after every post write.
#[async_trait]
pub trait PostSaveHook: Send + Sync {
    async fn post_saved(&self, post_id: Uuid);
}
