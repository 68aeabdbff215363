use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use super::error::CacheError;

/// Single-slot store for the last known snapshot.
#[async_trait]
pub trait LocalCache: Send + Sync {
    async fn read(&self) -> Result<Option<String>, CacheError>;
    async fn write(&self, snapshot: &str) -> Result<(), CacheError>;
    async fn clear(&self) -> Result<(), CacheError>;
}

/// Snapshot kept in one file. Writes go through a sibling temp file and a
/// rename, so a crash never leaves a partial snapshot behind.
#[derive(Clone, Debug)]
pub struct FileCache {
    path: PathBuf,
}

impl FileCache {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl LocalCache for FileCache {
    async fn read(&self) -> Result<Option<String>, CacheError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, snapshot: &str) -> Result<(), CacheError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let temp = self.temp_path();
        tokio::fs::write(&temp, snapshot).await?;
        tokio::fs::rename(&temp, &self.path).await?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        match tokio::fs::remove_file(&self.path).await {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

/// In-process cache for tests and clients without a writable disk.
#[derive(Debug, Default)]
pub struct MemoryCache {
    slot: Mutex<Option<String>>,
}

impl MemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_contents(snapshot: impl Into<String>) -> Self {
        Self {
            slot: Mutex::new(Some(snapshot.into())),
        }
    }

    #[must_use]
    pub fn contents(&self) -> Option<String> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl LocalCache for MemoryCache {
    async fn read(&self) -> Result<Option<String>, CacheError> {
        Ok(self.contents())
    }

    async fn write(&self, snapshot: &str) -> Result<(), CacheError> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(snapshot.to_string());
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_cache_round_trips_and_clears() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path().join("nested").join("progress.json"));

        assert_eq!(cache.read().await.unwrap(), None);
        cache.write(r#"{"roles":{}}"#).await.unwrap();
        assert_eq!(cache.read().await.unwrap().as_deref(), Some(r#"{"roles":{}}"#));
        assert!(!cache.temp_path().exists());

        cache.clear().await.unwrap();
        assert_eq!(cache.read().await.unwrap(), None);
        cache.clear().await.unwrap();
    }

    #[tokio::test]
    async fn memory_cache_overwrites_single_slot() {
        let cache = MemoryCache::new();
        cache.write("a").await.unwrap();
        cache.write("b").await.unwrap();
        assert_eq!(cache.contents().as_deref(), Some("b"));
        cache.clear().await.unwrap();
        assert_eq!(cache.read().await.unwrap(), None);
    }
}
