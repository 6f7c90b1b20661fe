//! HTTP request handlers for the tusk server

use bytes::Bytes;
use futures::stream;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::{Body as _, Frame, Incoming};
use hyper::header::CONTENT_TYPE;
use hyper::{Method, Request, Response, StatusCode};
use serde_json::json;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};
use tracing::{debug, error, info};
use tusk_engine::{GuardedReader, Handler, ResponseBody, UploadRequest, UploadResponse};

type BoxBody = UnsyncBoxBody<Bytes, io::Error>;

const DOWNLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// Main request handler
pub async fn handle_request(
    req: Request<Incoming>,
    handler: Arc<Handler>,
    prefix: Arc<str>,
    remote_addr: SocketAddr,
) -> Result<Response<BoxBody>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    debug!("Handling {} {} from {}", method, path, remote_addr);

    if method == Method::GET && path == "/health" {
        return Ok(handle_health(&handler));
    }

    if !is_upload_route(&prefix, &method, &path) {
        let response = json_response(StatusCode::NOT_FOUND, json!({"error": "Not found"}));
        info!("{} {} -> {}", method, path, response.status());
        return Ok(response);
    }

    let (parts, body) = req.into_parts();
    let upload_req = UploadRequest::new(parts)
        .with_body(IncomingReader::new(body))
        .with_remote_addr(remote_addr);

    let response = into_response(handler.handle(upload_req).await);
    info!("{} {} -> {}", method, path, response.status());
    Ok(response)
}

/// Health check with the handler's counters
fn handle_health(handler: &Handler) -> Response<BoxBody> {
    json_response(
        StatusCode::OK,
        json!({
            "status": "healthy",
            "version": env!("CARGO_PKG_VERSION"),
            "service": "tusk",
            "metrics": handler.metrics().snapshot(),
        }),
    )
}

/// Whether a request targets the upload collection or one of its uploads.
/// Creation and discovery address the collection, everything else an upload.
fn is_upload_route(prefix: &str, method: &Method, path: &str) -> bool {
    let collection = prefix.trim_end_matches('/');
    if path == collection || path == prefix {
        return *method == Method::POST || *method == Method::OPTIONS;
    }

    match path.strip_prefix(prefix) {
        Some(rest) => {
            let id = rest.trim_end_matches('/');
            !id.is_empty() && !id.contains('/')
        }
        None => false,
    }
}

fn full(bytes: impl Into<Bytes>) -> BoxBody {
    Full::new(bytes.into())
        .map_err(|never| match never {})
        .boxed_unsync()
}

fn json_response(status: StatusCode, body: serde_json::Value) -> Response<BoxBody> {
    let mut response = Response::new(full(body.to_string()));
    *response.status_mut() = status;
    if let Ok(value) = "application/json".parse() {
        response.headers_mut().insert(CONTENT_TYPE, value);
    }
    response
}

/// Convert an engine response. Downloads are streamed, keeping the upload
/// locked until the last frame is sent.
fn into_response(resp: UploadResponse) -> Response<BoxBody> {
    let body = match resp.body {
        ResponseBody::Empty => full(Bytes::new()),
        ResponseBody::Bytes(bytes) => full(bytes),
        ResponseBody::Reader(reader) => stream_download(reader),
    };

    let mut response = Response::new(body);
    *response.status_mut() = resp.status;
    *response.headers_mut() = resp.headers;
    response
}

fn stream_download(reader: GuardedReader) -> BoxBody {
    let frames = stream::unfold(Some(reader), |state| async move {
        let Some(mut reader) = state else {
            return None;
        };
        let mut buf = vec![0u8; DOWNLOAD_CHUNK_SIZE];
        match reader.read(&mut buf).await {
            Ok(0) => None,
            Ok(n) => {
                buf.truncate(n);
                Some((Ok(Frame::data(Bytes::from(buf))), Some(reader)))
            }
            Err(e) => {
                error!("Failed to read upload for download: {}", e);
                Some((Err(e), None))
            }
        }
    });
    StreamBody::new(frames).boxed_unsync()
}

/// Adapts a hyper body to `AsyncRead` for the engine
pub struct IncomingReader {
    body: Incoming,
    chunk: Bytes,
    done: bool,
}

impl IncomingReader {
    pub fn new(body: Incoming) -> Self {
        IncomingReader {
            body,
            chunk: Bytes::new(),
            done: false,
        }
    }
}

impl AsyncRead for IncomingReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        loop {
            if !this.chunk.is_empty() {
                let n = buf.remaining().min(this.chunk.len());
                buf.put_slice(&this.chunk.split_to(n));
                return Poll::Ready(Ok(()));
            }
            if this.done {
                return Poll::Ready(Ok(()));
            }

            match Pin::new(&mut this.body).poll_frame(cx) {
                Poll::Ready(Some(Ok(frame))) => {
                    // Trailers carry no upload data
                    if let Ok(data) = frame.into_data() {
                        this.chunk = data;
                    }
                }
                Poll::Ready(Some(Err(e))) => {
                    return Poll::Ready(Err(io::Error::new(io::ErrorKind::Other, e)));
                }
                Poll::Ready(None) => this.done = true,
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_routes() {
        let prefix = "/files/";

        assert!(is_upload_route(prefix, &Method::POST, "/files/"));
        assert!(is_upload_route(prefix, &Method::POST, "/files"));
        assert!(is_upload_route(prefix, &Method::OPTIONS, "/files/"));
        assert!(!is_upload_route(prefix, &Method::PATCH, "/files/"));

        assert!(is_upload_route(prefix, &Method::PATCH, "/files/01HX"));
        assert!(is_upload_route(prefix, &Method::HEAD, "/files/01HX/"));
        assert!(!is_upload_route(prefix, &Method::GET, "/files/a/b"));
        assert!(!is_upload_route(prefix, &Method::GET, "/other/01HX"));
    }

    #[tokio::test]
    async fn test_json_body_round_trips() {
        let response = json_response(StatusCode::NOT_FOUND, json!({"error": "Not found"}));
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["error"], "Not found");
    }

    #[test]
    fn test_json_response() {
        let response = json_response(StatusCode::NOT_FOUND, json!({"error": "Not found"}));
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
    }
}
