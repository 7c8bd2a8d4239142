//! Byte storage behind the streaming endpoint.
//!
//! The responder only needs three read-only operations from storage, captured
//! by [`MediaStore`]. [`FsMediaStore`] serves uploaded tracks from a directory
//! on disk; [`MemoryMediaStore`] keeps everything in RAM.

use std::collections::HashMap;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use parking_lot::RwLock;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tunestream_common::paths::validate_resource_id;
use tunestream_common::{Error, Result};

/// Read buffer size for streamed bodies. Bounds per-request memory.
pub const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Lazy, finite stream of body bytes. Not restartable.
pub type ByteStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;

/// Read-only access to stored media.
///
/// Implementations must tolerate concurrent reads of the same resource.
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Whether `resource_id` names a stored resource.
    async fn exists(&self, resource_id: &str) -> bool;

    /// Current byte length of the resource. Never cached.
    async fn size(&self, resource_id: &str) -> Result<u64>;

    /// Open the inclusive byte window `[start, end]` of the resource.
    ///
    /// Callers guarantee `start <= end < size`.
    async fn open_range(&self, resource_id: &str, start: u64, end: u64) -> Result<ByteStream>;
}

/// Media store over a directory of uploaded files.
#[derive(Debug, Clone)]
pub struct FsMediaStore {
    root: PathBuf,
}

impl FsMediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a resource id to a path under the root.
    fn resolve(&self, resource_id: &str) -> Result<PathBuf> {
        validate_resource_id(resource_id)?;
        Ok(self.root.join(resource_id))
    }
}

#[async_trait]
impl MediaStore for FsMediaStore {
    async fn exists(&self, resource_id: &str) -> bool {
        let Ok(path) = self.resolve(resource_id) else {
            return false;
        };
        tokio::fs::metadata(&path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }

    async fn size(&self, resource_id: &str) -> Result<u64> {
        let path = self
            .resolve(resource_id)
            .map_err(|_| Error::not_found(resource_id))?;
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|_| Error::not_found(resource_id))?;
        if !metadata.is_file() {
            return Err(Error::not_found(resource_id));
        }
        Ok(metadata.len())
    }

    async fn open_range(&self, resource_id: &str, start: u64, end: u64) -> Result<ByteStream> {
        let path = self
            .resolve(resource_id)
            .map_err(|_| Error::not_found(resource_id))?;
        let length = end - start + 1;

        let mut file = tokio::fs::File::open(&path).await?;
        file.seek(SeekFrom::Start(start)).await?;

        // Take limits reads to exactly the window; dropping the stream closes the file.
        let limited = file.take(length);
        Ok(Box::pin(ReaderStream::with_capacity(limited, READ_BUFFER_SIZE)))
    }
}

/// Media store holding resources in memory.
#[derive(Debug, Default)]
pub struct MemoryMediaStore {
    resources: RwLock<HashMap<String, Bytes>>,
}

impl MemoryMediaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store (or replace) a resource.
    pub fn insert(&self, resource_id: impl Into<String>, data: impl Into<Bytes>) {
        self.resources.write().insert(resource_id.into(), data.into());
    }

    /// Remove a resource, returning its contents if it existed.
    pub fn remove(&self, resource_id: &str) -> Option<Bytes> {
        self.resources.write().remove(resource_id)
    }

    fn get(&self, resource_id: &str) -> Result<Bytes> {
        self.resources
            .read()
            .get(resource_id)
            .cloned()
            .ok_or_else(|| Error::not_found(resource_id))
    }
}

#[async_trait]
impl MediaStore for MemoryMediaStore {
    async fn exists(&self, resource_id: &str) -> bool {
        self.resources.read().contains_key(resource_id)
    }

    async fn size(&self, resource_id: &str) -> Result<u64> {
        Ok(self.get(resource_id)?.len() as u64)
    }

    async fn open_range(&self, resource_id: &str, start: u64, end: u64) -> Result<ByteStream> {
        let data = self.get(resource_id)?;
        let offset = |value: u64| {
            usize::try_from(value).map_err(|_| {
                Error::invalid_input(format!("offset {value} does not fit in memory"))
            })
        };
        let (start, end) = (offset(start)?, offset(end)?);
        if start > end || end >= data.len() {
            return Err(Error::invalid_input(format!(
                "window {start}-{end} outside resource of {} bytes",
                data.len()
            )));
        }

        let window = data.slice(start..=end);
        let pieces: Vec<std::io::Result<Bytes>> = (0..window.len())
            .step_by(READ_BUFFER_SIZE)
            .map(|offset| {
                let stop = (offset + READ_BUFFER_SIZE).min(window.len());
                Ok(window.slice(offset..stop))
            })
            .collect();
        Ok(Box::pin(futures::stream::iter(pieces)))
    }
}
