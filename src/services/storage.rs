//! Dump file storage
//!
//! Files live under a per-user prefix (`<user_id>/<name>`) on local disk.
//! The trait keeps handlers independent of the backing store.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Component, Path, PathBuf};

/// Storage errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Destination already holds an object; writes never overwrite
    #[error("An object with that name already exists")]
    AlreadyExists,

    /// No object at that key
    #[error("Object not found")]
    NotFound,

    /// Key escapes the store root or contains forbidden components
    #[error("Invalid object name")]
    InvalidKey,

    /// Underlying I/O failure
    #[error("Storage error: {0}")]
    Io(#[from] anyhow::Error),
}

/// Metadata for one stored object.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ObjectInfo {
    pub name: String,
    pub size: u64,
    pub modified_at: Option<DateTime<Utc>>,
}

/// Object store over opaque string keys.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List objects directly under a prefix.
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>, StoreError>;

    /// Write a new object. Fails with `AlreadyExists` if the key is taken.
    async fn put(&self, key: &str, data: &[u8]) -> Result<(), StoreError>;

    /// Read an object's contents.
    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    /// Delete an object.
    async fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Rename within the store. Fails with `AlreadyExists` if the
    /// destination is taken.
    async fn rename(&self, from: &str, to: &str) -> Result<(), StoreError>;
}

/// Filesystem-backed store rooted at a single directory.
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve a key to a path inside the root, rejecting anything that
    /// could escape it.
    fn resolve(&self, key: &str) -> Result<PathBuf, StoreError> {
        if key.is_empty() {
            return Err(StoreError::InvalidKey);
        }
        let rel = Path::new(key);
        for component in rel.components() {
            match component {
                Component::Normal(_) => {}
                _ => return Err(StoreError::InvalidKey),
            }
        }
        Ok(self.root.join(rel))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>, StoreError> {
        let dir = self.resolve(prefix)?;
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            // A prefix nothing has been written under is just empty
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(anyhow::Error::from(e).into()),
        };

        let mut objects = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .context("Failed to read storage directory")?
        {
            let metadata = entry
                .metadata()
                .await
                .context("Failed to read object metadata")?;
            if !metadata.is_file() {
                continue;
            }
            objects.push(ObjectInfo {
                name: entry.file_name().to_string_lossy().into_owned(),
                size: metadata.len(),
                modified_at: metadata.modified().ok().map(DateTime::<Utc>::from),
            });
        }
        objects.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(objects)
    }

    async fn put(&self, key: &str, data: &[u8]) -> Result<(), StoreError> {
        let path = self.resolve(key)?;
        if tokio::fs::try_exists(&path)
            .await
            .context("Failed to check object existence")?
        {
            return Err(StoreError::AlreadyExists);
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create storage directory")?;
        }
        tokio::fs::write(&path, data)
            .await
            .context("Failed to write object")?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.resolve(key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StoreError::NotFound),
            Err(e) => Err(anyhow::Error::from(e).into()),
        }
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let path = self.resolve(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StoreError::NotFound),
            Err(e) => Err(anyhow::Error::from(e).into()),
        }
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), StoreError> {
        let src = self.resolve(from)?;
        let dst = self.resolve(to)?;
        if !tokio::fs::try_exists(&src)
            .await
            .context("Failed to check object existence")?
        {
            return Err(StoreError::NotFound);
        }
        if tokio::fs::try_exists(&dst)
            .await
            .context("Failed to check object existence")?
        {
            return Err(StoreError::AlreadyExists);
        }
        if let Some(parent) = dst.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create storage directory")?;
        }
        tokio::fs::rename(&src, &dst)
            .await
            .context("Failed to rename object")?;
        Ok(())
    }
}
