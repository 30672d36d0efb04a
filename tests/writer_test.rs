use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use email_materialize::*;
use tokio_test::{assert_err, assert_ok};

fn config(part_size: usize) -> WriterConfig {
    WriterConfig { part_size }
}

fn location() -> ObjectLocation {
    ObjectLocation::new("mail", "content/msg/part_0.plain")
}

#[tokio::test]
async fn test_writes_are_committed_in_segments() {
    let store = Arc::new(MemoryObjectStore::new());
    let mut writer = ObjectWriter::create(store.clone(), location(), &config(4))
        .await
        .unwrap();

    writer.write(b"abcdefghij").await.unwrap();
    assert!(store.get(&location()).await.is_none(), "visible before finish");
    writer.write(b"kl").await.unwrap();
    assert_eq!(writer.bytes_written(), 12);

    let written = writer.finish().await.unwrap();
    assert_eq!(written, 12);
    assert_eq!(store.get(&location()).await.unwrap(), Bytes::from_static(b"abcdefghijkl"));
    assert_eq!(store.pending_uploads().await, 0);
    // create + 3 segments + complete
    assert_eq!(store.write_count(), 5);
}

#[tokio::test]
async fn test_remainder_is_flushed_on_finish() {
    let store = Arc::new(MemoryObjectStore::new());
    let stream = futures::stream::iter(vec![
        Ok(Bytes::from_static(b"hello ")),
        Ok(Bytes::from_static(b"world")),
    ]);

    let written = upload_stream(store.clone(), location(), &config(4), stream)
        .await
        .unwrap();

    assert_eq!(written, 11);
    assert_eq!(store.get(&location()).await.unwrap(), Bytes::from_static(b"hello world"));
}

#[tokio::test]
async fn test_empty_stream_creates_empty_object() {
    let store = Arc::new(MemoryObjectStore::new());
    let stream = futures::stream::iter(Vec::<Result<Bytes>>::new());

    assert_ok!(upload_stream(store.clone(), location(), &config(4), stream).await);
    assert_eq!(store.get(&location()).await.unwrap().len(), 0);
}

#[tokio::test]
async fn test_mid_transfer_failure_leaves_no_object() {
    let store = Arc::new(MemoryObjectStore::new());
    let stream = futures::stream::iter(vec![
        Ok(Bytes::from_static(b"0123456789")),
        Ok(Bytes::from_static(b"0123456789")),
        Err(ProcessError::Parse("decode: invalid base64".into())),
    ]);

    let err = upload_stream(store.clone(), location(), &config(4), stream)
        .await
        .unwrap_err();

    assert!(matches!(err, ProcessError::Parse(_)));
    assert!(store.get(&location()).await.is_none());
    assert_eq!(store.pending_uploads().await, 0);
}

#[tokio::test]
async fn test_backend_failure_aborts_upload() {
    let store = Arc::new(MemoryObjectStore::new().with_failing_suffix(".plain"));

    let result = upload_bytes(
        store.clone(),
        location(),
        &config(1024),
        Bytes::from_static(b"payload"),
    )
    .await;

    assert_err!(result);
    assert!(store.get(&location()).await.is_none());
    assert_eq!(store.pending_uploads().await, 0);
}

#[tokio::test]
async fn test_explicit_abort_discards_segments() {
    let store = Arc::new(MemoryObjectStore::new());
    let mut writer = ObjectWriter::create(store.clone(), location(), &config(2))
        .await
        .unwrap();
    writer.write(b"abcdef").await.unwrap();
    assert_eq!(store.pending_uploads().await, 1);

    writer.abort().await;

    assert_eq!(store.pending_uploads().await, 0);
    assert!(store.get(&location()).await.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_dropped_writer_aborts_in_background() {
    let store = Arc::new(MemoryObjectStore::new());
    {
        let mut writer = ObjectWriter::create(store.clone(), location(), &config(2))
            .await
            .unwrap();
        writer.write(b"abc").await.unwrap();
    }

    for _ in 0..50 {
        if store.pending_uploads().await == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(store.pending_uploads().await, 0);
    assert!(store.get(&location()).await.is_none());
}
