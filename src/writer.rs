//! Streaming writer backed by a multi-part upload.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use tracing::{debug, warn};

use crate::config::WriterConfig;
use crate::error::{ProcessError, Result};
use crate::store::{CompletedPart, ObjectStore, UploadId};
use crate::types::ObjectLocation;

/// Stream sink that commits data to the store in segments.
///
/// At most one upload unit (`part_size` bytes) is buffered; when the buffer
/// fills it is uploaded as the next segment. [`finish`](Self::finish)
/// uploads the remainder and completes the upload, which is the only point
/// at which the destination object becomes visible. [`abort`](Self::abort)
/// discards everything. A writer dropped without either schedules an abort
/// on the current runtime, so an upload is never left dangling.
pub struct ObjectWriter {
    store: Arc<dyn ObjectStore>,
    location: ObjectLocation,
    upload: Option<UploadId>,
    part_size: usize,
    buffer: BytesMut,
    parts: Vec<CompletedPart>,
    bytes_written: u64,
}

impl ObjectWriter {
    /// Start a multi-part upload at `location`.
    pub async fn create(
        store: Arc<dyn ObjectStore>,
        location: ObjectLocation,
        config: &WriterConfig,
    ) -> Result<Self> {
        let upload = store.create_multipart(&location).await?;
        let part_size = config.part_size.max(1);
        Ok(Self {
            store,
            location,
            upload: Some(upload),
            part_size,
            buffer: BytesMut::with_capacity(part_size),
            parts: Vec::new(),
            bytes_written: 0,
        })
    }

    #[must_use]
    pub const fn location(&self) -> &ObjectLocation {
        &self.location
    }

    /// Bytes accepted so far, buffered or uploaded
    #[must_use]
    pub const fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Append data, uploading a segment each time the buffer fills.
    pub async fn write(&mut self, mut data: &[u8]) -> Result<()> {
        while !data.is_empty() {
            let take = (self.part_size - self.buffer.len()).min(data.len());
            self.buffer.extend_from_slice(&data[..take]);
            self.bytes_written += take as u64;
            data = &data[take..];

            if self.buffer.len() == self.part_size {
                let segment = self.buffer.split().freeze();
                self.upload_segment(segment).await?;
            }
        }
        Ok(())
    }

    /// Flush the remainder and complete the upload.
    ///
    /// On failure the upload is aborted before the error is returned.
    pub async fn finish(mut self) -> Result<u64> {
        match self.complete().await {
            Ok(()) => {
                debug!(
                    key = %self.location.key,
                    bytes = self.bytes_written,
                    parts = self.parts.len(),
                    "Committed object"
                );
                Ok(self.bytes_written)
            }
            Err(err) => {
                self.abort_upload().await;
                Err(err)
            }
        }
    }

    /// Discard the upload; nothing becomes visible at the destination.
    pub async fn abort(mut self) {
        self.abort_upload().await;
    }

    async fn complete(&mut self) -> Result<()> {
        if !self.buffer.is_empty() || self.parts.is_empty() {
            let segment = self.buffer.split().freeze();
            self.upload_segment(segment).await?;
        }

        let upload = self
            .upload
            .clone()
            .ok_or_else(|| ProcessError::Task("upload already finished".into()))?;
        self.store
            .complete_multipart(&self.location, &upload, self.parts.clone())
            .await?;
        self.upload = None;
        Ok(())
    }

    async fn upload_segment(&mut self, segment: Bytes) -> Result<()> {
        let upload = self
            .upload
            .as_ref()
            .ok_or_else(|| ProcessError::Task("upload already finished".into()))?;
        let part_number = u32::try_from(self.parts.len() + 1)
            .map_err(|_| ProcessError::Task("too many upload segments".into()))?;

        let len = segment.len();
        let part = self
            .store
            .upload_part(&self.location, upload, part_number, segment)
            .await?;
        debug!(key = %self.location.key, part_number, bytes = len, "Uploaded segment");
        self.parts.push(part);
        Ok(())
    }

    async fn abort_upload(&mut self) {
        if let Some(upload) = self.upload.take() {
            if let Err(err) = self.store.abort_multipart(&self.location, &upload).await {
                warn!(key = %self.location.key, error = %err, "Failed to abort upload");
            } else {
                debug!(key = %self.location.key, "Aborted upload");
            }
        }
    }
}

impl Drop for ObjectWriter {
    fn drop(&mut self) {
        let Some(upload) = self.upload.take() else {
            return;
        };
        warn!(key = %self.location.key, "Writer dropped before completion, aborting upload");

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let store = Arc::clone(&self.store);
            let location = self.location.clone();
            handle.spawn(async move {
                if let Err(err) = store.abort_multipart(&location, &upload).await {
                    warn!(key = %location.key, error = %err, "Failed to abort dropped upload");
                }
            });
        }
    }
}

/// Copy a byte stream end-to-end into a new object at `location`.
///
/// The object is committed only if the whole stream was consumed without
/// error; otherwise the upload is aborted and the first error returned.
pub async fn upload_stream<S>(
    store: Arc<dyn ObjectStore>,
    location: ObjectLocation,
    config: &WriterConfig,
    mut stream: S,
) -> Result<u64>
where
    S: Stream<Item = Result<Bytes>> + Send + Unpin,
{
    let mut writer = ObjectWriter::create(store, location, config).await?;

    while let Some(item) = stream.next().await {
        let written = match item {
            Ok(data) => writer.write(&data).await,
            Err(err) => Err(err),
        };
        if let Err(err) = written {
            writer.abort().await;
            return Err(err);
        }
    }

    writer.finish().await
}

/// Upload an in-memory buffer as one object.
pub async fn upload_bytes(
    store: Arc<dyn ObjectStore>,
    location: ObjectLocation,
    config: &WriterConfig,
    data: Bytes,
) -> Result<u64> {
    upload_stream(store, location, config, futures::stream::iter([Ok(data)])).await
}
