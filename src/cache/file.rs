//! Local filesystem cache backend.
//!
//! Persistent counterpart of browser local storage: one JSON file per key.
//!
//! ## Storage Layout
//!
//! ```text
//! {root}/
//! ├── 6169726c792d...json   # hex(key).json
//! └── 617169636e2d...json
//! ```
//!
//! File names are the hex-encoded key, so any key is a valid file name and
//! prefix clearing can recover the original key from the name.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::cache::CacheBackend;
use crate::error::{AppError, Result};

const EXTENSION: &str = "json";

/// Directory-backed cache storage.
#[derive(Debug)]
pub struct FileBackend {
    root_dir: PathBuf,
    tmp_counter: AtomicU64,
}

impl FileBackend {
    /// Create a FileBackend rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            tmp_counter: AtomicU64::new(0),
        }
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Get the full path for a key.
    fn path(&self, key: &str) -> PathBuf {
        self.root_dir
            .join(format!("{}.{}", hex::encode(key.as_bytes()), EXTENSION))
    }

    /// Recover the key from a cache file name.
    fn key_from_path(path: &Path) -> Option<String> {
        if path.extension()?.to_str()? != EXTENSION {
            return None;
        }
        let stem = path.file_stem()?.to_str()?;
        let bytes = hex::decode(stem).ok()?;
        String::from_utf8(bytes).ok()
    }
}

#[async_trait]
impl CacheBackend for FileBackend {
    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.path(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write(&self, key: &str, bytes: &[u8]) -> Result<()> {
        tokio::fs::create_dir_all(&self.root_dir).await?;

        let path = self.path(key);
        let n = self.tmp_counter.fetch_add(1, Ordering::Relaxed);
        let tmp = path.with_extension(format!("{n}.tmp"));

        let written = async {
            let mut file = tokio::fs::File::create(&tmp).await?;
            file.write_all(bytes).await?;
            file.flush().await?;
            drop(file);
            tokio::fs::rename(&tmp, &path).await
        }
        .await;

        if let Err(e) = written {
            // No partial file may outlive a failed write
            if let Err(cleanup) = tokio::fs::remove_file(&tmp).await {
                if cleanup.kind() != std::io::ErrorKind::NotFound {
                    log::debug!("Failed to remove {}: {}", tmp.display(), cleanup);
                }
            }
            return Err(AppError::Io(e));
        }
        Ok(())
    }

    async fn remove_prefixed(&self, prefixes: &[String]) -> Result<usize> {
        let mut dir = match tokio::fs::read_dir(&self.root_dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(AppError::Io(e)),
        };

        let mut removed = 0;
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            let Some(key) = Self::key_from_path(&path) else {
                continue;
            };
            if prefixes.iter().any(|p| key.starts_with(p.as_str())) {
                tokio::fs::remove_file(&path).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}
