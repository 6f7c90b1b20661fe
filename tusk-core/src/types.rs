//! Core data types for tusk

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Protocol version spoken by the engine
pub const TUS_VERSION: &str = "1.0.0";

/// Value of `Upload-Defer-Length` announcing that the size is not known yet
pub const UPLOAD_LENGTH_DEFERRED: &str = "1";

/// Content type marking a request body as an upload chunk
pub const CHUNK_CONTENT_TYPE: &str = "application/offset+octet-stream";

/// Upload metadata, immutable once the upload has been created
pub type MetaData = BTreeMap<String, String>;

/// Snapshot of an upload's state as known by the store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub id: String,
    /// Total size in bytes; meaningless while `size_is_deferred` is set
    pub size: u64,
    pub size_is_deferred: bool,
    /// Bytes received so far
    pub offset: u64,
    pub meta_data: MetaData,
    pub is_partial: bool,
    pub is_final: bool,
    /// IDs of the partial uploads a final upload is made of, in order
    pub partial_uploads: Vec<String>,
}

impl FileInfo {
    /// Info for an upload of known size
    pub fn with_size(size: u64) -> Self {
        FileInfo {
            size,
            ..Default::default()
        }
    }

    /// Info for an upload whose size will be declared later
    pub fn deferred() -> Self {
        FileInfo {
            size_is_deferred: true,
            ..Default::default()
        }
    }

    /// Whether every declared byte has been received
    pub fn is_complete(&self) -> bool {
        !self.size_is_deferred && self.offset == self.size
    }

    /// Bytes still expected, `None` while the size is deferred
    pub fn remaining(&self) -> Option<u64> {
        if self.size_is_deferred {
            None
        } else {
            Some(self.size.saturating_sub(self.offset))
        }
    }
}
