//! Object store contract
//!
//! The final compressed map artifact is handed to object storage (S3 in
//! production) under the key `maps/{job_id}`. Upload is insert-only: writing
//! to an existing key is a deliberate write-once failure, so re-runs must
//! use a new logical key or an explicit overwrite path.

use async_trait::async_trait;
use std::path::PathBuf;
use textmap_common::{Error, Result};
use tokio::io::AsyncWriteExt;

/// Object key for a job's final map artifact
pub fn map_key(job_id: &str) -> String {
    format!("maps/{}", job_id)
}

/// Insert-only blob sink
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `data` at `key`; fails with `AlreadyExists` if the key is taken
    async fn put_new(&self, key: &str, data: &[u8]) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn exists(&self, key: &str) -> Result<bool>;
}

/// Filesystem-backed object store rooted under the data folder
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put_new(&self, key: &str, data: &[u8]) -> Result<()> {
        let path = self.path_for(key);
        if path.exists() {
            return Err(Error::AlreadyExists(key.to_string()));
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        // create_new keeps the write-once guarantee even when two workers
        // race for the same key
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::AlreadyExists {
                    Error::AlreadyExists(key.to_string())
                } else {
                    Error::Io(e)
                }
            })?;
        file.write_all(data).await?;
        file.flush().await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.path_for(key)).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Io(e)),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.path_for(key).exists())
    }
}
