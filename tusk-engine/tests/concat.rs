//! Integration tests for the concatenation extension

mod common;

use common::*;
use hyper::Method;
use tusk_engine::*;

async fn create_partial(handler: &Handler, data: &'static [u8]) -> String {
    let length = data.len().to_string();
    let req = request(
        Method::POST,
        "http://tus.io/files/",
        &[
            CHUNK,
            ("Upload-Concat", "partial"),
            ("Upload-Length", length.as_str()),
            ("Content-Length", length.as_str()),
        ],
    )
    .with_body(data);
    let resp = handler.post_file(req).await;
    assert_eq!(resp.status, 201);
    upload_id(&resp)
}

fn final_request(ids: &[&str]) -> UploadRequest {
    let urls: Vec<String> = ids
        .iter()
        .map(|id| format!("http://tus.io/files/{}", id))
        .collect();
    let concat = format!("final;{}", urls.join(" "));
    request(
        Method::POST,
        "http://tus.io/files/",
        &[("Upload-Concat", concat.as_str())],
    )
}

#[tokio::test]
async fn final_upload_joins_partials() {
    let (store, composer) = full_composer();
    let mut config = Config::new(composer);
    config.notify_complete_uploads = true;
    let (handler, mut hooks) = handler(config);

    let a = create_partial(&handler, b"abc").await;
    let b = create_partial(&handler, b"de").await;
    let complete = hooks.complete.as_mut().unwrap();
    complete.recv().await.unwrap();
    complete.recv().await.unwrap();

    let resp = handler.post_file(final_request(&[a.as_str(), b.as_str()])).await;
    assert_eq!(resp.status, 201);
    let id = upload_id(&resp);

    let event = complete.recv().await.unwrap();
    assert_eq!(event.upload.id, id);
    assert_eq!(event.upload.size, 5);
    assert_eq!(event.upload.offset, 5);
    assert!(event.upload.is_final);
    assert_eq!(event.upload.partial_uploads, vec![a.clone(), b.clone()]);

    assert_eq!(store.data(&id).await.unwrap(), b"abcde");

    let head = handler
        .head_file(request(Method::HEAD, &format!("http://tus.io/files/{}", id), &[]))
        .await;
    assert_eq!(head.header("upload-length"), Some("5"));
    assert_eq!(head.header("upload-offset"), Some("5"));
    assert_eq!(
        head.header("upload-concat").unwrap(),
        format!("final;http://tus.io/files/{} http://tus.io/files/{}", a, b)
    );

    let head = handler
        .head_file(request(Method::HEAD, &format!("/files/{}", a), &[]))
        .await;
    assert_eq!(head.header("upload-concat"), Some("partial"));
}

#[tokio::test]
async fn empty_final_upload_finishes_once() {
    let (_store, composer) = full_composer();
    let mut config = Config::new(composer);
    config.notify_complete_uploads = true;
    let (handler, mut hooks) = handler(config);

    let a = create_partial(&handler, b"").await;
    let b = create_partial(&handler, b"").await;
    let complete = hooks.complete.as_mut().unwrap();
    complete.recv().await.unwrap();
    complete.recv().await.unwrap();

    let resp = handler.post_file(final_request(&[a.as_str(), b.as_str()])).await;
    assert_eq!(resp.status, 201);
    let id = upload_id(&resp);

    let event = complete.recv().await.unwrap();
    assert_eq!(event.upload.id, id);
    assert_eq!(event.upload.size, 0);
    assert!(event.upload.is_final);
    assert!(complete.try_recv().is_err());
    assert_eq!(handler.metrics().snapshot().uploads_finished, 3);
}

#[tokio::test]
async fn unfinished_partial_blocks_final_upload() {
    let (store, composer) = full_composer();
    let (handler, _hooks) = handler(Config::new(composer));

    let done = create_partial(&handler, b"abc").await;
    let resp = handler
        .post_file(request(
            Method::POST,
            "/files/",
            &[("Upload-Concat", "partial"), ("Upload-Length", "4")],
        ))
        .await;
    let pending = upload_id(&resp);

    let resp = handler.post_file(final_request(&[done.as_str(), pending.as_str()])).await;
    assert_eq!(resp.status, 400);
    assert_eq!(error_code(resp).await, "ERR_UPLOAD_NOT_FINISHED");
    assert_eq!(store.len().await, 2);
}

#[tokio::test]
async fn final_upload_is_read_only() {
    let (_store, composer) = full_composer();
    let (handler, _hooks) = handler(Config::new(composer));

    let a = create_partial(&handler, b"abc").await;

    let concat = format!("final;/files/{}", a);
    let req = request(
        Method::POST,
        "/files/",
        &[CHUNK, ("Upload-Concat", concat.as_str())],
    )
    .with_body(&b"x"[..]);
    let resp = handler.post_file(req).await;
    assert_eq!(resp.status, 403);
    assert_eq!(error_code(resp).await, "ERR_MODIFY_FINAL");

    let resp = handler.post_file(final_request(&[a.as_str()])).await;
    let id = upload_id(&resp);

    let resp = patch(&handler, &id, 3, b"x").await;
    assert_eq!(resp.status, 403);
    assert_eq!(error_code(resp).await, "ERR_MODIFY_FINAL");
}

#[tokio::test]
async fn malformed_concat_header() {
    let (store, composer) = full_composer();
    let (handler, _hooks) = handler(Config::new(composer));

    for value in ["final;", "whole", "final;/ //"] {
        let resp = handler
            .post_file(request(Method::POST, "/files/", &[("Upload-Concat", value)]))
            .await;
        assert_eq!(resp.status, 400, "header {:?}", value);
        assert_eq!(error_code(resp).await, "ERR_INVALID_CONCAT");
    }
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn concat_header_ignored_without_capability() {
    let (_store, composer) = bare_composer();
    let (handler, _hooks) = handler(Config::new(composer));

    let resp = handler
        .post_file(request(
            Method::POST,
            "/files/",
            &[("Upload-Concat", "partial"), ("Upload-Length", "2")],
        ))
        .await;
    assert_eq!(resp.status, 201);

    let id = upload_id(&resp);
    let head = handler
        .head_file(request(Method::HEAD, &format!("/files/{}", id), &[]))
        .await;
    assert_eq!(head.header("upload-concat"), None);
}
