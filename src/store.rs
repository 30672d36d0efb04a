//! Object-store capability used by the reader and writer adapters.
//!
//! The pipeline never talks to a concrete network client. Everything goes
//! through [`ObjectStore`], which models the three capabilities the
//! decomposition needs:
//!
//! - ranged reads of an existing object
//! - multi-part uploads (create, upload part, complete, abort)
//! - a size probe used only for end-relative seeks
//!
//! [`MemoryObjectStore`] is an in-process implementation used by tests and
//! local pipelines.

mod memory;

use std::ops::Range;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::StorageError;
use crate::types::ObjectLocation;

pub use memory::MemoryObjectStore;

/// Result type for store operations
pub type StoreResult<T> = std::result::Result<T, StorageError>;

/// Handle to an in-progress multi-part upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadId(pub String);

impl UploadId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Receipt for one uploaded segment, needed to complete the upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPart {
    /// 1-based part number
    pub part_number: u32,

    /// Opaque tag the backend returned for this segment
    pub etag: String,
}

/// Remote key-addressed binary storage.
///
/// Implementations apply their own retry policy; an `Err` returned from any
/// method is treated as final by the caller.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch bytes in `range` from the object.
    ///
    /// A backend may return fewer bytes than requested (a short read). A
    /// range starting at or past the end of the object yields an empty
    /// buffer rather than an error, which is how readers detect EOF.
    async fn get_range(&self, location: &ObjectLocation, range: Range<u64>) -> StoreResult<Bytes>;

    /// Total size of the object in bytes
    async fn object_size(&self, location: &ObjectLocation) -> StoreResult<u64>;

    /// Start a multi-part upload. Nothing is visible at `location` until
    /// [`complete_multipart`](Self::complete_multipart) succeeds.
    async fn create_multipart(&self, location: &ObjectLocation) -> StoreResult<UploadId>;

    /// Upload one segment
    async fn upload_part(
        &self,
        location: &ObjectLocation,
        upload: &UploadId,
        part_number: u32,
        data: Bytes,
    ) -> StoreResult<CompletedPart>;

    /// Assemble the uploaded segments into the destination object
    async fn complete_multipart(
        &self,
        location: &ObjectLocation,
        upload: &UploadId,
        parts: Vec<CompletedPart>,
    ) -> StoreResult<()>;

    /// Discard an in-progress upload and every segment uploaded so far
    async fn abort_multipart(&self, location: &ObjectLocation, upload: &UploadId) -> StoreResult<()>;
}
