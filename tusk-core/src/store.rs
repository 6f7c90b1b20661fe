//! Contracts implemented by storage and lock backends
//!
//! A backend always implements [`DataStore`] and [`Upload`]. The optional
//! protocol extensions are separate traits registered on the
//! [`StoreComposer`](crate::StoreComposer); the engine never probes a store
//! for them at runtime.

use async_trait::async_trait;
use tokio::io::AsyncRead;

use crate::{FileInfo, Result};

/// Byte source handed to stores, typically a request body
pub type ChunkReader<'a> = dyn AsyncRead + Send + Unpin + 'a;

/// Owned byte stream returned from [`Upload::get_reader`]
pub type UploadReader = Box<dyn AsyncRead + Send + Unpin>;

/// Core storage: allocation and lookup of uploads
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Allocate a new upload. The store assigns the ID.
    async fn new_upload(&self, info: FileInfo) -> Result<Box<dyn Upload>>;

    /// Look up an existing upload, failing with `NotFound` when absent
    async fn get_upload(&self, id: &str) -> Result<Box<dyn Upload>>;
}

/// Handle to a single upload
#[async_trait]
pub trait Upload: Send + Sync {
    /// ID of the upload behind this handle
    fn id(&self) -> &str;

    /// Canonical info as persisted by the store
    async fn get_info(&self) -> Result<FileInfo>;

    /// Append bytes read from `src` at `offset`, returning the number of
    /// bytes persisted. The store advances its own offset.
    async fn write_chunk(&self, offset: u64, src: &mut ChunkReader<'_>) -> Result<u64>;

    /// Stream the bytes received so far
    async fn get_reader(&self) -> Result<UploadReader>;

    /// Called once every declared byte has been received
    async fn finish_upload(&self) -> Result<()>;
}

/// Termination extension
#[async_trait]
pub trait Terminater: Send + Sync {
    async fn terminate(&self, upload: &dyn Upload) -> Result<()>;
}

/// Concatenation extension
#[async_trait]
pub trait Concater: Send + Sync {
    /// Fill `target` with the contents of `partials`, in order
    async fn concat_uploads(&self, target: &dyn Upload, partials: &[Box<dyn Upload>]) -> Result<()>;
}

/// Deferred length extension
#[async_trait]
pub trait LengthDeferrer: Send + Sync {
    /// Fix the size of an upload created with a deferred length
    async fn declare_length(&self, upload: &dyn Upload, length: u64) -> Result<()>;
}

/// Factory of per-ID locks
pub trait Locker: Send + Sync {
    fn new_lock(&self, id: &str) -> Result<Box<dyn Lock>>;
}

/// Exclusive lock on one upload ID
///
/// `lock` never waits: it either acquires immediately or fails with
/// `AlreadyLocked`.
pub trait Lock: Send {
    fn lock(&mut self) -> Result<()>;
    fn unlock(&mut self) -> Result<()>;
}
