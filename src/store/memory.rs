use std::collections::{BTreeMap, HashMap};
use std::ops::Range;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::sync::Mutex;
use tracing::debug;

use super::{CompletedPart, ObjectStore, StoreResult, UploadId};
use crate::error::StorageError;
use crate::types::ObjectLocation;

#[derive(Debug)]
struct PendingUpload {
    location: ObjectLocation,
    parts: BTreeMap<u32, Bytes>,
}

/// In-memory object store for testing or local pipelines.
///
/// Committed objects and pending multi-part uploads are kept in separate
/// tables, so an object only becomes readable once its upload completes.
/// A few knobs make it useful for exercising failure paths:
///
/// - [`with_max_read_len`](Self::with_max_read_len) caps every ranged read,
///   simulating a transport that returns short reads
/// - [`with_failing_suffix`](Self::with_failing_suffix) makes part uploads
///   to matching keys fail
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<ObjectLocation, Bytes>>,
    uploads: Mutex<HashMap<String, PendingUpload>>,
    next_upload: AtomicU64,
    range_requests: AtomicUsize,
    writes: AtomicUsize,
    max_read_len: Option<usize>,
    failing_suffix: Option<String>,
}

impl MemoryObjectStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap the number of bytes returned by a single ranged read
    #[must_use]
    pub const fn with_max_read_len(mut self, len: usize) -> Self {
        self.max_read_len = Some(len);
        self
    }

    /// Fail every part upload whose destination key ends with `suffix`
    #[must_use]
    pub fn with_failing_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.failing_suffix = Some(suffix.into());
        self
    }

    /// Seed an object directly. Not counted as a write.
    pub async fn insert(&self, location: ObjectLocation, data: impl Into<Bytes>) {
        self.objects.lock().await.insert(location, data.into());
    }

    /// Contents of a committed object
    pub async fn get(&self, location: &ObjectLocation) -> Option<Bytes> {
        self.objects.lock().await.get(location).cloned()
    }

    /// Sorted keys of every committed object in `container`
    pub async fn keys(&self, container: &str) -> Vec<String> {
        let objects = self.objects.lock().await;
        let mut keys: Vec<String> = objects
            .keys()
            .filter(|l| l.container == container)
            .map(|l| l.key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Number of multi-part uploads neither completed nor aborted
    pub async fn pending_uploads(&self) -> usize {
        self.uploads.lock().await.len()
    }

    /// Number of ranged reads served so far
    pub fn range_requests(&self) -> usize {
        self.range_requests.load(Ordering::Relaxed)
    }

    /// Number of mutating calls (create, upload part, complete) served so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    fn should_fail(&self, location: &ObjectLocation) -> bool {
        self.failing_suffix
            .as_deref()
            .is_some_and(|suffix| location.key.ends_with(suffix))
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get_range(&self, location: &ObjectLocation, range: Range<u64>) -> StoreResult<Bytes> {
        self.range_requests.fetch_add(1, Ordering::Relaxed);

        let objects = self.objects.lock().await;
        let data = objects
            .get(location)
            .ok_or_else(|| StorageError::NotFound(location.to_string()))?;

        let len = data.len() as u64;
        let start = range.start.min(len);
        let mut end = range.end.clamp(start, len);
        if let Some(max) = self.max_read_len {
            end = end.min(start + max as u64);
        }

        #[allow(clippy::cast_possible_truncation)]
        let slice = data.slice(start as usize..end as usize);
        Ok(slice)
    }

    async fn object_size(&self, location: &ObjectLocation) -> StoreResult<u64> {
        self.objects
            .lock()
            .await
            .get(location)
            .map(|data| data.len() as u64)
            .ok_or_else(|| StorageError::NotFound(location.to_string()))
    }

    async fn create_multipart(&self, location: &ObjectLocation) -> StoreResult<UploadId> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        let id = format!("upload-{}", self.next_upload.fetch_add(1, Ordering::Relaxed));
        self.uploads.lock().await.insert(
            id.clone(),
            PendingUpload {
                location: location.clone(),
                parts: BTreeMap::new(),
            },
        );
        debug!(upload_id = %id, key = %location.key, "Created multi-part upload");
        Ok(UploadId(id))
    }

    async fn upload_part(
        &self,
        location: &ObjectLocation,
        upload: &UploadId,
        part_number: u32,
        data: Bytes,
    ) -> StoreResult<CompletedPart> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        if self.should_fail(location) {
            return Err(StorageError::backend(
                "upload_part",
                format!("injected failure for {location}"),
            ));
        }

        let mut uploads = self.uploads.lock().await;
        let pending = uploads
            .get_mut(upload.as_str())
            .filter(|p| p.location == *location)
            .ok_or_else(|| StorageError::UploadNotFound(upload.0.clone()))?;
        pending.parts.insert(part_number, data);

        Ok(CompletedPart {
            part_number,
            etag: format!("{}-{part_number}", upload.as_str()),
        })
    }

    async fn complete_multipart(
        &self,
        location: &ObjectLocation,
        upload: &UploadId,
        parts: Vec<CompletedPart>,
    ) -> StoreResult<()> {
        self.writes.fetch_add(1, Ordering::Relaxed);

        let pending = {
            let mut uploads = self.uploads.lock().await;
            match uploads.get(upload.as_str()) {
                Some(p) if p.location == *location => uploads.remove(upload.as_str()),
                _ => None,
            }
        }
        .ok_or_else(|| StorageError::UploadNotFound(upload.0.clone()))?;

        let mut assembled = BytesMut::new();
        for part in &parts {
            let data = pending.parts.get(&part.part_number).ok_or_else(|| {
                StorageError::backend(
                    "complete_multipart",
                    format!("part {} was never uploaded", part.part_number),
                )
            })?;
            assembled.extend_from_slice(data);
        }

        self.objects
            .lock()
            .await
            .insert(location.clone(), assembled.freeze());
        Ok(())
    }

    async fn abort_multipart(&self, location: &ObjectLocation, upload: &UploadId) -> StoreResult<()> {
        let removed = self.uploads.lock().await.remove(upload.as_str());
        debug!(upload_id = %upload.as_str(), key = %location.key, "Aborted multi-part upload");
        removed
            .map(|_| ())
            .ok_or_else(|| StorageError::UploadNotFound(upload.0.clone()))
    }
}
