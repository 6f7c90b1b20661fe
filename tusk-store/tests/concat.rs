//! Integration tests for the concatenation and deferred length extensions

use tokio::io::AsyncReadExt;
use tusk_core::*;
use tusk_store::*;

async fn read_all(upload: &dyn Upload) -> Vec<u8> {
    let mut out = Vec::new();
    upload.get_reader().await.unwrap().read_to_end(&mut out).await.unwrap();
    out
}

async fn complete_upload(store: &dyn DataStore, data: &[u8]) -> Box<dyn Upload> {
    let upload = store.new_upload(FileInfo::with_size(data.len() as u64)).await.unwrap();
    let mut body = data;
    upload.write_chunk(0, &mut body).await.unwrap();
    upload
}

#[tokio::test]
async fn fjall_concat_joins_partials_in_order() {
    let (store, _temp) = FjallStore::temp().unwrap();

    let first = complete_upload(&store, b"abc").await;
    let second = complete_upload(&store, b"").await;
    let third = complete_upload(&store, b"defg").await;

    let mut info = FileInfo::with_size(7);
    info.is_final = true;
    let target = store.new_upload(info).await.unwrap();

    store.concat_uploads(target.as_ref(), &[first, second, third]).await.unwrap();

    assert_eq!(read_all(target.as_ref()).await, b"abcdefg");
    let info = target.get_info().await.unwrap();
    assert_eq!(info.offset, 7);
    assert!(info.is_complete());
}

#[tokio::test]
async fn memory_concat_joins_partials_in_order() {
    let store = MemoryStore::new();

    let first = complete_upload(&store, b"12").await;
    let second = complete_upload(&store, b"345").await;

    let target = store.new_upload(FileInfo::with_size(5)).await.unwrap();
    store.concat_uploads(target.as_ref(), &[first, second]).await.unwrap();

    assert_eq!(read_all(target.as_ref()).await, b"12345");
    assert_eq!(store.data(target.id()).await.unwrap(), b"12345");
}

#[tokio::test]
async fn fjall_declare_length_clears_deferred_flag() {
    let (store, _temp) = FjallStore::temp().unwrap();
    let upload = store.new_upload(FileInfo::deferred()).await.unwrap();

    let mut body: &[u8] = b"xy";
    upload.write_chunk(0, &mut body).await.unwrap();
    assert!(upload.get_info().await.unwrap().size_is_deferred);

    store.declare_length(upload.as_ref(), 2).await.unwrap();
    let info = upload.get_info().await.unwrap();
    assert!(!info.size_is_deferred);
    assert_eq!(info.size, 2);
    assert!(info.is_complete());
}

#[tokio::test]
async fn fjall_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let id = {
        let store = FjallStore::new(dir.path()).unwrap();
        let mut info = FileInfo::with_size(5);
        info.meta_data.insert("filename".to_string(), "a.txt".to_string());
        let upload = store.new_upload(info).await.unwrap();
        let mut body: &[u8] = b"hello";
        upload.write_chunk(0, &mut body).await.unwrap();
        upload.finish_upload().await.unwrap();
        upload.id().to_string()
    };

    let store = FjallStore::new(dir.path()).unwrap();
    let upload = store.get_upload(&id).await.unwrap();
    let info = upload.get_info().await.unwrap();
    assert_eq!(info.meta_data["filename"], "a.txt");
    assert_eq!(read_all(upload.as_ref()).await, b"hello");
}
