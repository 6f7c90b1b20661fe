//! Persistent store backed by a fjall keyspace
//!
//! Layout inside the `uploads` partition:
//! - `info:<id>` holds the JSON encoded [`FileInfo`]
//! - `data:<id>:<offset>` holds one piece of the upload's bytes, the offset
//!   zero padded so that a prefix scan returns pieces in byte order

use async_trait::async_trait;
use fjall::{Config, Keyspace, Partition, PartitionCreateOptions, PersistMode};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::debug;
use tusk_core::*;

use crate::READ_BUFFER_SIZE;

/// Store wrapping a fjall keyspace
#[derive(Clone)]
pub struct FjallStore {
    keyspace: Arc<Keyspace>,
    partition: Arc<Partition>,
}

impl FjallStore {
    /// Open or create a store at the given path
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let keyspace = Config::new(path)
            .open()
            .map_err(|e| TusError::Storage(e.to_string()))?;

        let partition = keyspace
            .open_partition("uploads", PartitionCreateOptions::default())
            .map_err(|e| TusError::Storage(e.to_string()))?;

        Ok(FjallStore {
            keyspace: Arc::new(keyspace),
            partition: Arc::new(partition),
        })
    }

    /// Create temporary store for testing
    #[cfg(any(test, feature = "test-utils"))]
    pub fn temp() -> Result<(Self, tempfile::TempDir)> {
        let temp_dir = tempfile::tempdir()?;
        let store = Self::new(temp_dir.path())?;
        Ok((store, temp_dir))
    }

    /// Persist all changes to disk
    pub fn persist(&self) -> Result<()> {
        self.keyspace
            .persist(PersistMode::SyncAll)
            .map_err(|e| TusError::Storage(e.to_string()))
    }

    fn load_info(&self, id: &str) -> Result<Option<FileInfo>> {
        match self.partition.get(info_key(id)) {
            Ok(Some(data)) => Ok(Some(serde_json::from_slice(&data)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(TusError::Storage(e.to_string())),
        }
    }

    fn save_info(&self, info: &FileInfo) -> Result<()> {
        let json = serde_json::to_vec(info)?;
        self.partition
            .insert(info_key(&info.id), json)
            .map_err(|e| TusError::Storage(e.to_string()))
    }

    fn put_piece(&self, id: &str, offset: u64, data: &[u8]) -> Result<()> {
        self.partition
            .insert(data_key(id, offset), data)
            .map_err(|e| TusError::Storage(e.to_string()))
    }

    /// All bytes stored for an upload, reassembled in order
    fn read_data(&self, id: &str) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        for item in self.partition.prefix(data_prefix(id)) {
            let (_key, value) = item.map_err(|e| TusError::Storage(e.to_string()))?;
            data.extend_from_slice(&value);
        }
        Ok(data)
    }

    fn remove_upload(&self, id: &str) -> Result<()> {
        let mut keys = Vec::new();
        for item in self.partition.prefix(data_prefix(id)) {
            let (key, _value) = item.map_err(|e| TusError::Storage(e.to_string()))?;
            keys.push(key);
        }

        for key in keys {
            self.partition
                .remove(key)
                .map_err(|e| TusError::Storage(e.to_string()))?;
        }
        self.partition
            .remove(info_key(id))
            .map_err(|e| TusError::Storage(e.to_string()))
    }
}

/// Handle onto one upload of a [`FjallStore`]
pub struct FjallUpload {
    id: String,
    store: FjallStore,
}

impl FjallUpload {
    fn info(&self) -> Result<FileInfo> {
        self.store.load_info(&self.id)?.ok_or(TusError::NotFound)
    }
}

#[async_trait]
impl DataStore for FjallStore {
    async fn new_upload(&self, mut info: FileInfo) -> Result<Box<dyn Upload>> {
        info.id = ulid::Ulid::new().to_string();
        info.offset = 0;
        self.save_info(&info)?;

        debug!(id = %info.id, size = info.size, deferred = info.size_is_deferred, "allocating upload");
        Ok(Box::new(FjallUpload {
            id: info.id,
            store: self.clone(),
        }))
    }

    async fn get_upload(&self, id: &str) -> Result<Box<dyn Upload>> {
        if self.load_info(id)?.is_none() {
            return Err(TusError::NotFound);
        }
        Ok(Box::new(FjallUpload {
            id: id.to_string(),
            store: self.clone(),
        }))
    }
}

#[async_trait]
impl Upload for FjallUpload {
    fn id(&self) -> &str {
        &self.id
    }

    async fn get_info(&self) -> Result<FileInfo> {
        self.info()
    }

    async fn write_chunk(&self, offset: u64, src: &mut ChunkReader<'_>) -> Result<u64> {
        let mut info = self.info()?;
        if info.offset != offset {
            return Err(TusError::MismatchOffset);
        }

        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        let mut written = 0u64;

        loop {
            let n = src.read(&mut buf).await?;
            if n == 0 {
                break;
            }

            self.store.put_piece(&self.id, offset + written, &buf[..n])?;
            written += n as u64;

            // stored offset always matches the persisted pieces
            info.offset = offset + written;
            self.store.save_info(&info)?;
        }

        Ok(written)
    }

    async fn get_reader(&self) -> Result<UploadReader> {
        let data = self.store.read_data(&self.id)?;
        Ok(Box::new(Cursor::new(data)))
    }

    async fn finish_upload(&self) -> Result<()> {
        self.store.persist()
    }
}

#[async_trait]
impl Terminater for FjallStore {
    async fn terminate(&self, upload: &dyn Upload) -> Result<()> {
        if self.load_info(upload.id())?.is_none() {
            return Err(TusError::NotFound);
        }
        self.remove_upload(upload.id())?;
        self.persist()
    }
}

#[async_trait]
impl Concater for FjallStore {
    async fn concat_uploads(&self, target: &dyn Upload, partials: &[Box<dyn Upload>]) -> Result<()> {
        let mut info = self.load_info(target.id())?.ok_or(TusError::NotFound)?;

        let mut offset = 0u64;
        for partial in partials {
            let data = self.read_data(partial.id())?;
            if !data.is_empty() {
                self.put_piece(target.id(), offset, &data)?;
            }
            offset += data.len() as u64;
        }

        info.offset = offset;
        self.save_info(&info)?;
        self.persist()
    }
}

#[async_trait]
impl LengthDeferrer for FjallStore {
    async fn declare_length(&self, upload: &dyn Upload, length: u64) -> Result<()> {
        let mut info = self.load_info(upload.id())?.ok_or(TusError::NotFound)?;
        info.size = length;
        info.size_is_deferred = false;
        self.save_info(&info)
    }
}

fn info_key(id: &str) -> Vec<u8> {
    format!("info:{}", id).into_bytes()
}

fn data_prefix(id: &str) -> Vec<u8> {
    format!("data:{}:", id).into_bytes()
}

fn data_key(id: &str, offset: u64) -> Vec<u8> {
    format!("data:{}:{:020}", id, offset).into_bytes()
}
