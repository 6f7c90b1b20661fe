//! Transport-agnostic request and response values

use hyper::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH};
use hyper::http::request::Parts;
use hyper::{Method, StatusCode, Uri};
use std::fmt;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};
use tracing::warn;
use tusk_core::UploadReader;

use crate::lock::LockGuard;

/// Inbound request body
pub type Body = Box<dyn AsyncRead + Send + Unpin>;

/// Everything about a request except its body. Hook events carry a copy of it.
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub remote_addr: Option<SocketAddr>,
}

impl RequestHead {
    pub fn new(method: Method, uri: Uri) -> Self {
        RequestHead {
            method,
            uri,
            headers: HeaderMap::new(),
            remote_addr: None,
        }
    }

    /// Header value as a string, empty when absent or not valid text
    pub fn header_str(&self, name: &HeaderName) -> &str {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .unwrap_or("")
    }

    /// Declared body length, if any
    pub fn content_length(&self) -> Option<u64> {
        self.header_str(&CONTENT_LENGTH).parse().ok()
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }
}

impl From<Parts> for RequestHead {
    fn from(parts: Parts) -> Self {
        RequestHead {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            remote_addr: None,
        }
    }
}

/// A request handed to the engine
pub struct UploadRequest {
    pub head: RequestHead,
    pub body: Option<Body>,
}

impl UploadRequest {
    /// Request without a body
    pub fn new(head: impl Into<RequestHead>) -> Self {
        UploadRequest {
            head: head.into(),
            body: None,
        }
    }

    pub fn with_body(mut self, body: impl AsyncRead + Send + Unpin + 'static) -> Self {
        self.body = Some(Box::new(body));
        self
    }

    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.head.remote_addr = Some(addr);
        self
    }
}

impl fmt::Debug for UploadRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadRequest")
            .field("head", &self.head)
            .field("has_body", &self.body.is_some())
            .finish()
    }
}

/// Response body produced by the engine
pub enum ResponseBody {
    Empty,
    Bytes(Vec<u8>),
    /// Upload contents; the upload stays locked until the reader is dropped
    Reader(GuardedReader),
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseBody::Empty => write!(f, "Empty"),
            ResponseBody::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
            ResponseBody::Reader(_) => write!(f, "Reader"),
        }
    }
}

/// Response written by the engine
#[derive(Debug)]
pub struct UploadResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ResponseBody,
}

impl UploadResponse {
    pub(crate) fn new() -> Self {
        UploadResponse {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: ResponseBody::Empty,
        }
    }

    /// Set a header, skipping values that cannot travel in a header
    pub(crate) fn set_header(&mut self, name: HeaderName, value: impl AsRef<str>) {
        match HeaderValue::from_bytes(value.as_ref().as_bytes()) {
            Ok(value) => {
                self.headers.insert(name, value);
            }
            Err(_) => warn!(header = %name, "dropping header with invalid value"),
        }
    }

    /// Header value as a string, if present
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Upload reader that holds the upload's lock while it is being streamed
pub struct GuardedReader {
    inner: UploadReader,
    _guard: Option<LockGuard>,
}

impl GuardedReader {
    pub(crate) fn new(inner: UploadReader, guard: Option<LockGuard>) -> Self {
        GuardedReader {
            inner,
            _guard: guard,
        }
    }
}

impl AsyncRead for GuardedReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_read(cx, buf)
    }
}
