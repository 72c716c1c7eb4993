//! On-disk cache of transformed notebooks, one file per source URL.
//!
//! An entry is `<sha256(url)>.ipynbcache` in the media directory and its
//! modification time is the only freshness signal. Entries at or past the
//! TTL are deleted when a request notices them and regenerated in the same
//! request. There is no locking: concurrent misses for one URL each write a
//! complete file via rename, and the last writer wins.

use std::{
    io::{self, ErrorKind, Write},
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant, SystemTime},
};

use metrics::counter;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::fs;
use tracing::{info, warn};

use crate::application::fetch::{FetchError, NotebookSource};
use crate::application::transform::{NotebookTransformer, TransformError};

pub const CACHE_EXTENSION: &str = "ipynbcache";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Transform(#[from] TransformError),
    #[error("cache storage failed: {0}")]
    Io(#[from] io::Error),
    #[error("notebook transform task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// How the returned document was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Freshness {
    /// Fetched and transformed during this call; `raw` is the untransformed
    /// download, still carrying its metadata cell.
    Regenerated { raw: String },
    /// Served from an existing entry younger than the TTL.
    Cached { age: Duration },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedNotebook {
    pub document: String,
    pub freshness: Freshness,
}

pub struct NotebookCache {
    directory: PathBuf,
    ttl: Duration,
    source: Arc<dyn NotebookSource>,
    transformer: Arc<NotebookTransformer>,
}

impl NotebookCache {
    /// Create a cache rooted at `directory`, creating it if necessary.
    pub fn new(
        directory: PathBuf,
        ttl: Duration,
        source: Arc<dyn NotebookSource>,
        transformer: Arc<NotebookTransformer>,
    ) -> io::Result<Self> {
        std::fs::create_dir_all(&directory)?;
        Ok(Self {
            directory,
            ttl,
            source,
            transformer,
        })
    }

    /// Deterministic cache file location for a source URL.
    pub fn entry_path(&self, source_url: &str) -> PathBuf {
        self.directory
            .join(format!("{}.{CACHE_EXTENSION}", cache_key(source_url)))
    }

    /// Return a transformed document that is younger than the TTL, regenerating
    /// it when the entry is missing or stale.
    pub async fn load(&self, source_url: &str) -> Result<CachedNotebook, CacheError> {
        let started_at = Instant::now();
        let path = self.entry_path(source_url);

        if let Some(cached) = self.read_fresh(&path).await {
            counter!("nbpress_cache_hit_total").increment(1);
            info!(
                target = "application::cache",
                op = "cache::load",
                result = "cache_hit",
                age_secs = cached.1.as_secs(),
                elapsed_ms = started_at.elapsed().as_millis() as u64,
                cache_path = %path.display(),
                "Notebook served from cache"
            );
            return Ok(CachedNotebook {
                document: cached.0,
                freshness: Freshness::Cached { age: cached.1 },
            });
        }

        counter!("nbpress_cache_miss_total").increment(1);
        let raw = self.source.fetch(source_url).await?;

        let transformer = Arc::clone(&self.transformer);
        let input = raw.clone();
        let transformed =
            tokio::task::spawn_blocking(move || transformer.transform(&input)).await??;

        let directory = self.directory.clone();
        let target = path.clone();
        let document = transformed.json;
        let contents = document.clone();
        tokio::task::spawn_blocking(move || write_entry(&directory, &target, &contents)).await??;

        info!(
            target = "application::cache",
            op = "cache::load",
            result = "regenerated",
            images_replaced = transformed.images_replaced,
            metadata_cell_removed = transformed.metadata_cell_removed,
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            cache_path = %path.display(),
            "Notebook cache regenerated"
        );

        Ok(CachedNotebook {
            document,
            freshness: Freshness::Regenerated { raw },
        })
    }

    /// Read the entry if it exists and is younger than the TTL. Stale entries
    /// are deleted; a failed delete is logged and left for the next request.
    async fn read_fresh(&self, path: &Path) -> Option<(String, Duration)> {
        let metadata = match fs::metadata(path).await {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == ErrorKind::NotFound => return None,
            Err(err) => {
                warn!(
                    target = "application::cache",
                    op = "cache::stat",
                    cache_path = %path.display(),
                    error = %err,
                    "Failed to inspect cache entry; regenerating"
                );
                return None;
            }
        };

        let age = metadata
            .modified()
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok())
            .unwrap_or_default();

        if age >= self.ttl {
            counter!("nbpress_cache_expired_total").increment(1);
            match fs::remove_file(path).await {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => warn!(
                    target = "application::cache",
                    op = "cache::expire",
                    cache_path = %path.display(),
                    age_secs = age.as_secs(),
                    error = %err,
                    "Failed to delete stale cache entry"
                ),
            }
            return None;
        }

        match fs::read_to_string(path).await {
            Ok(document) => Some((document, age)),
            Err(err) => {
                if err.kind() != ErrorKind::NotFound {
                    warn!(
                        target = "application::cache",
                        op = "cache::read",
                        cache_path = %path.display(),
                        error = %err,
                        "Failed to read cache entry; regenerating"
                    );
                }
                None
            }
        }
    }
}

/// Write the full document to a temp file in the cache directory, then rename
/// it over the entry so readers never observe a partial file.
fn write_entry(directory: &Path, target: &Path, contents: &str) -> io::Result<()> {
    let mut file = NamedTempFile::new_in(directory)?;
    file.write_all(contents.as_bytes())?;
    file.flush()?;

    match file.persist(target) {
        Ok(_) => Ok(()),
        Err(err) if err.error.kind() == ErrorKind::AlreadyExists => {
            // A concurrent request persisted the same entry first.
            Ok(())
        }
        Err(err) => Err(err.error),
    }
}

fn cache_key(source_url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_url.as_bytes());
    hex::encode(hasher.finalize())
}
