//! Host-side records the pipeline reads and updates.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Distinguishes live posts from snapshots the host keeps for history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PostKind {
    #[default]
    Post,
    Revision,
    Autosave,
}

impl PostKind {
    /// Revisions and autosaves never receive metadata updates.
    pub fn is_snapshot(self) -> bool {
        matches!(self, PostKind::Revision | PostKind::Autosave)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostRecord {
    pub id: Uuid,
    #[serde(default)]
    pub kind: PostKind,
    pub slug: String,
    pub title: String,
    #[serde(default)]
    pub excerpt: String,
    pub body: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub category_ids: BTreeSet<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRecord {
    pub id: Uuid,
    pub name: String,
}
