//! Error types for tusk

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TusError {
    #[error("missing or invalid Content-Type header")]
    InvalidContentType,

    #[error("missing or invalid Upload-Length header")]
    InvalidUploadLength,

    #[error("invalid Upload-Defer-Length header")]
    InvalidDeferLength,

    #[error("Upload-Length and Upload-Defer-Length header are mutually exclusive")]
    ConflictingLengthHeaders,

    #[error("missing or invalid Upload-Offset header")]
    InvalidOffset,

    #[error("upload not found")]
    NotFound,

    #[error("file currently locked")]
    AlreadyLocked,

    #[error("mismatched offset")]
    MismatchOffset,

    #[error("upload's size exceeded")]
    SizeExceeded,

    #[error("maximum size exceeded")]
    MaxSizeExceeded,

    #[error("feature not implemented")]
    NotImplemented,

    #[error("one of the partial uploads is not finished")]
    UploadNotFinished,

    #[error("invalid Upload-Concat header")]
    InvalidConcat,

    #[error("modifying a final upload is not allowed")]
    ModifyFinal,

    #[error("invalid Upload-Metadata header: {0}")]
    InvalidMetadata(String),

    #[error("upload has been stopped by server")]
    UploadStoppedByServer,

    #[error("unsupported version")]
    UnsupportedVersion,

    #[error("upload rejected: {0}")]
    Rejected(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TusError {
    /// Status code the transport should answer with
    pub fn status_code(&self) -> u16 {
        match self {
            TusError::InvalidContentType
            | TusError::InvalidUploadLength
            | TusError::InvalidDeferLength
            | TusError::ConflictingLengthHeaders
            | TusError::InvalidOffset
            | TusError::UploadNotFinished
            | TusError::InvalidConcat
            | TusError::InvalidMetadata(_)
            | TusError::UploadStoppedByServer
            | TusError::Rejected(_) => 400,
            TusError::ModifyFinal => 403,
            TusError::NotFound => 404,
            TusError::MismatchOffset => 409,
            TusError::UnsupportedVersion => 412,
            TusError::SizeExceeded | TusError::MaxSizeExceeded => 413,
            TusError::AlreadyLocked => 423,
            TusError::NotImplemented => 501,
            TusError::InvalidConfig(_)
            | TusError::Storage(_)
            | TusError::Serialization(_)
            | TusError::Io(_)
            | TusError::Internal(_) => 500,
        }
    }

    /// Machine-readable reason code
    pub fn reason(&self) -> &'static str {
        match self {
            TusError::InvalidContentType => "ERR_INVALID_CONTENT_TYPE",
            TusError::InvalidUploadLength => "ERR_INVALID_UPLOAD_LENGTH",
            TusError::InvalidDeferLength => "ERR_INVALID_UPLOAD_LENGTH_DEFER",
            TusError::ConflictingLengthHeaders => "ERR_AMBIGUOUS_UPLOAD_LENGTH",
            TusError::InvalidOffset => "ERR_INVALID_OFFSET",
            TusError::NotFound => "ERR_UPLOAD_NOT_FOUND",
            TusError::AlreadyLocked => "ERR_UPLOAD_LOCKED",
            TusError::MismatchOffset => "ERR_MISMATCHED_OFFSET",
            TusError::SizeExceeded => "ERR_UPLOAD_SIZE_EXCEEDED",
            TusError::MaxSizeExceeded => "ERR_MAX_SIZE_EXCEEDED",
            TusError::NotImplemented => "ERR_NOT_IMPLEMENTED",
            TusError::UploadNotFinished => "ERR_UPLOAD_NOT_FINISHED",
            TusError::InvalidConcat => "ERR_INVALID_CONCAT",
            TusError::ModifyFinal => "ERR_MODIFY_FINAL",
            TusError::InvalidMetadata(_) => "ERR_INVALID_METADATA",
            TusError::UploadStoppedByServer => "ERR_UPLOAD_STOPPED",
            TusError::UnsupportedVersion => "ERR_UNSUPPORTED_VERSION",
            TusError::Rejected(_) => "ERR_UPLOAD_REJECTED",
            _ => "ERR_INTERNAL_SERVER_ERROR",
        }
    }
}
