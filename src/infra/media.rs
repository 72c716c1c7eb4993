//! Read access to the media directory shared by cache entries and images.

use std::path::{Component, Path, PathBuf};

use bytes::Bytes;
use thiserror::Error;
use tokio::fs;

use crate::application::images::MATERIALIZED_EXTENSION;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("invalid media path")]
    InvalidPath,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Filesystem-backed media directory. Only materialized images are readable;
/// cache entries and in-progress temp files live alongside them but are never
/// served.
#[derive(Debug)]
pub struct MediaStorage {
    root: PathBuf,
}

impl MediaStorage {
    /// Initialise storage rooted at the provided directory, creating it if necessary.
    pub fn new(root: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub async fn read(&self, name: &str) -> Result<Bytes, MediaError> {
        let absolute = self.resolve(name)?;
        let data = fs::read(absolute).await?;
        Ok(Bytes::from(data))
    }

    fn resolve(&self, name: &str) -> Result<PathBuf, MediaError> {
        let relative = Path::new(name);
        if relative.is_absolute()
            || relative
                .components()
                .any(|component| !matches!(component, Component::Normal(_)))
        {
            return Err(MediaError::InvalidPath);
        }

        let served = relative
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext == MATERIALIZED_EXTENSION);
        if !served {
            return Err(MediaError::InvalidPath);
        }

        Ok(self.root.join(relative))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn reads_materialized_images() {
        let dir = TempDir::new().expect("temp dir");
        std::fs::write(dir.path().join("abc.webp"), b"RIFF").expect("write");
        let storage = MediaStorage::new(dir.path().to_path_buf()).expect("storage");

        let bytes = storage.read("abc.webp").await.expect("read");
        assert_eq!(bytes.as_ref(), b"RIFF");
    }

    #[tokio::test]
    async fn rejects_traversal_and_cache_entries() {
        let dir = TempDir::new().expect("temp dir");
        std::fs::write(dir.path().join("abc.ipynbcache"), b"{}").expect("write");
        let storage = MediaStorage::new(dir.path().join("media")).expect("storage");

        for name in ["../abc.webp", "/etc/passwd.webp", "abc.ipynbcache", "./abc.webp"] {
            assert!(
                matches!(storage.read(name).await, Err(MediaError::InvalidPath)),
                "{name} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn missing_file_is_io_not_found() {
        let dir = TempDir::new().expect("temp dir");
        let storage = MediaStorage::new(dir.path().to_path_buf()).expect("storage");

        match storage.read("missing.webp").await {
            Err(MediaError::Io(err)) => assert_eq!(err.kind(), std::io::ErrorKind::NotFound),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
