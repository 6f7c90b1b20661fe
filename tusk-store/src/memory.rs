//! In-process store keeping every upload in memory

use async_trait::async_trait;
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::sync::Mutex;
use tracing::debug;
use tusk_core::*;

use crate::READ_BUFFER_SIZE;

#[derive(Debug, Default)]
struct Entry {
    info: FileInfo,
    data: Vec<u8>,
}

type Uploads = Arc<Mutex<HashMap<String, Entry>>>;

/// Store implementing every extension on top of a shared map
#[derive(Clone, Default)]
pub struct MemoryStore {
    uploads: Uploads,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of uploads currently held
    pub async fn len(&self) -> usize {
        self.uploads.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.uploads.lock().await.is_empty()
    }

    /// Copy of the bytes received for an upload
    pub async fn data(&self, id: &str) -> Option<Vec<u8>> {
        self.uploads.lock().await.get(id).map(|e| e.data.clone())
    }
}

/// Handle onto one entry of a [`MemoryStore`]
pub struct MemoryUpload {
    id: String,
    uploads: Uploads,
}

#[async_trait]
impl DataStore for MemoryStore {
    async fn new_upload(&self, mut info: FileInfo) -> Result<Box<dyn Upload>> {
        let id = ulid::Ulid::new().to_string();
        info.id = id.clone();
        info.offset = 0;

        debug!(id = %id, size = info.size, deferred = info.size_is_deferred, "allocating upload");
        self.uploads.lock().await.insert(
            id.clone(),
            Entry {
                info,
                data: Vec::new(),
            },
        );

        Ok(Box::new(MemoryUpload {
            id,
            uploads: self.uploads.clone(),
        }))
    }

    async fn get_upload(&self, id: &str) -> Result<Box<dyn Upload>> {
        if !self.uploads.lock().await.contains_key(id) {
            return Err(TusError::NotFound);
        }
        Ok(Box::new(MemoryUpload {
            id: id.to_string(),
            uploads: self.uploads.clone(),
        }))
    }
}

#[async_trait]
impl Upload for MemoryUpload {
    fn id(&self) -> &str {
        &self.id
    }

    async fn get_info(&self) -> Result<FileInfo> {
        self.uploads
            .lock()
            .await
            .get(&self.id)
            .map(|e| e.info.clone())
            .ok_or(TusError::NotFound)
    }

    async fn write_chunk(&self, offset: u64, src: &mut ChunkReader<'_>) -> Result<u64> {
        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        let mut written = 0u64;

        loop {
            let n = src.read(&mut buf).await?;
            if n == 0 {
                break;
            }

            let mut uploads = self.uploads.lock().await;
            let entry = uploads.get_mut(&self.id).ok_or(TusError::NotFound)?;
            if entry.info.offset != offset + written {
                return Err(TusError::MismatchOffset);
            }
            entry.data.extend_from_slice(&buf[..n]);
            entry.info.offset += n as u64;
            written += n as u64;
        }

        Ok(written)
    }

    async fn get_reader(&self) -> Result<UploadReader> {
        let data = self
            .uploads
            .lock()
            .await
            .get(&self.id)
            .map(|e| e.data.clone())
            .ok_or(TusError::NotFound)?;
        Ok(Box::new(Cursor::new(data)))
    }

    async fn finish_upload(&self) -> Result<()> {
        debug!(id = %self.id, "upload finished");
        Ok(())
    }
}

#[async_trait]
impl Terminater for MemoryStore {
    async fn terminate(&self, upload: &dyn Upload) -> Result<()> {
        self.uploads
            .lock()
            .await
            .remove(upload.id())
            .map(|_| ())
            .ok_or(TusError::NotFound)
    }
}

#[async_trait]
impl Concater for MemoryStore {
    async fn concat_uploads(&self, target: &dyn Upload, partials: &[Box<dyn Upload>]) -> Result<()> {
        let mut uploads = self.uploads.lock().await;

        let mut data = Vec::new();
        for partial in partials {
            let entry = uploads.get(partial.id()).ok_or(TusError::NotFound)?;
            data.extend_from_slice(&entry.data);
        }

        let entry = uploads.get_mut(target.id()).ok_or(TusError::NotFound)?;
        entry.info.offset = data.len() as u64;
        entry.data = data;
        Ok(())
    }
}

#[async_trait]
impl LengthDeferrer for MemoryStore {
    async fn declare_length(&self, upload: &dyn Upload, length: u64) -> Result<()> {
        let mut uploads = self.uploads.lock().await;
        let entry = uploads.get_mut(upload.id()).ok_or(TusError::NotFound)?;
        entry.info.size = length;
        entry.info.size_is_deferred = false;
        Ok(())
    }
}
