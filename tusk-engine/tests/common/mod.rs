//! Shared fixtures for the engine integration tests

#![allow(dead_code)]

use hyper::{Method, Request};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tusk_core::StoreComposer;
use tusk_engine::*;
use tusk_store::{MemoryLocker, MemoryStore};

pub const CHUNK: (&str, &str) = ("Content-Type", "application/offset+octet-stream");

/// Memory store wired with every extension and a memory locker
pub fn full_composer() -> (MemoryStore, StoreComposer) {
    let store = MemoryStore::new();
    let shared = Arc::new(store.clone());
    let composer = StoreComposer::new(shared.clone())
        .with_terminater(shared.clone())
        .with_concater(shared.clone())
        .with_length_deferrer(shared)
        .with_locker(Arc::new(MemoryLocker::new()));
    (store, composer)
}

/// Memory store without any extension
pub fn bare_composer() -> (MemoryStore, StoreComposer) {
    let store = MemoryStore::new();
    let composer = StoreComposer::new(Arc::new(store.clone()));
    (store, composer)
}

pub fn handler(config: Config) -> (Handler, HookReceivers) {
    Handler::new(config).unwrap()
}

pub fn request(method: Method, uri: &str, headers: &[(&str, &str)]) -> UploadRequest {
    let mut builder = Request::builder().method(method).uri(uri);
    for &(name, value) in headers {
        builder = builder.header(name, value);
    }
    let (parts, ()) = builder.body(()).unwrap().into_parts();
    UploadRequest::new(parts)
}

/// Create an upload of `length` bytes and return its ID
pub async fn create(handler: &Handler, length: u64) -> String {
    let length = length.to_string();
    let resp = handler
        .post_file(request(
            Method::POST,
            "http://tus.io/files/",
            &[("Upload-Length", length.as_str())],
        ))
        .await;
    assert_eq!(resp.status, 201, "create failed: {:?}", resp);
    upload_id(&resp)
}

pub async fn patch(handler: &Handler, id: &str, offset: u64, data: &'static [u8]) -> UploadResponse {
    let offset = offset.to_string();
    let length = data.len().to_string();
    let req = request(
        Method::PATCH,
        &format!("http://tus.io/files/{}", id),
        &[CHUNK, ("Upload-Offset", offset.as_str()), ("Content-Length", length.as_str())],
    )
    .with_body(data);
    handler.patch_file(req).await
}

pub fn upload_id(resp: &UploadResponse) -> String {
    let location = resp.header("location").expect("location header");
    location.rsplit('/').next().unwrap().to_string()
}

pub async fn body_bytes(resp: UploadResponse) -> Vec<u8> {
    match resp.body {
        ResponseBody::Empty => Vec::new(),
        ResponseBody::Bytes(bytes) => bytes,
        ResponseBody::Reader(mut reader) => {
            let mut out = Vec::new();
            reader.read_to_end(&mut out).await.unwrap();
            out
        }
    }
}

pub async fn error_code(resp: UploadResponse) -> String {
    let body = body_bytes(resp).await;
    let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
    value["code"].as_str().unwrap().to_string()
}
