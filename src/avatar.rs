/// Avatar storage
///
/// Handles avatar image blobs keyed by opaque storage keys. The lifecycle
/// manager only ever deletes through this interface; uploads happen in the
/// web layer.
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs;

/// Avatar storage backend trait
#[async_trait]
pub trait AvatarStore: Send + Sync {
    /// Store an avatar under a key
    async fn put(&self, key: &str, data: Vec<u8>) -> Result<()>;

    /// Retrieve an avatar by key
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Delete an avatar by key; deleting a missing avatar is a no-op
    async fn delete(&self, key: &str) -> Result<()>;

    /// Check if an avatar exists
    async fn exists(&self, key: &str) -> Result<bool>;
}

/// Disk storage backend
///
/// Stores avatars on the local filesystem with directory sharding based on
/// key prefixes to prevent too many files in one directory.
#[derive(Clone)]
pub struct DiskAvatarStore {
    base_path: PathBuf,
}

impl DiskAvatarStore {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    /// Get the file path for a key
    ///
    /// Uses directory sharding: {base}/{first2chars}/{key}
    fn avatar_path(&self, key: &str) -> PathBuf {
        if key.len() >= 2 {
            let shard = &key[0..2];
            self.base_path.join(shard).join(key)
        } else {
            self.base_path.join("_").join(key)
        }
    }
}

#[async_trait]
impl AvatarStore for DiskAvatarStore {
    async fn put(&self, key: &str, data: Vec<u8>) -> Result<()> {
        let path = self.avatar_path(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::Internal(format!("Failed to create avatar directory: {}", e))
            })?;
        }

        fs::write(&path, data)
            .await
            .map_err(|e| Error::Internal(format!("Failed to write avatar {}: {}", key, e)))?;

        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match fs::read(self.avatar_path(key)).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Internal(format!(
                "Failed to read avatar {}: {}",
                key, e
            ))),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.avatar_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Internal(format!(
                "Failed to delete avatar {}: {}",
                key, e
            ))),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(fs::try_exists(self.avatar_path(key)).await?)
    }
}
