// Enforce at crate level
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]
#![allow(clippy::significant_drop_tightening)]

//! Email Materializer
//!
//! Decomposes a raw email stored as one object in an object store into
//! independently stored parts, plus a JSON metadata document that points
//! at them.
//!
//! # Features
//!
//! - Chunk-cached random-access reads over the remote source
//! - Lazy, per-part transfer decoding
//! - Streaming multi-part uploads that are committed or aborted, never partial
//! - Collision-free destination naming within a message
//! - All-or-nothing completion: metadata is written last
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use email_materialize::{
//!     MemoryObjectStore, MessageProcessor, MessageRequest, ObjectLocation, ProcessorConfig,
//! };
//!
//! # tokio_test::block_on(async {
//! let store = Arc::new(MemoryObjectStore::new());
//! let raw = b"From: sender@example.com\r\nSubject: Hello\r\n\r\nBody";
//! store.insert(ObjectLocation::new("mail", "inbox/msg-1"), raw.to_vec()).await;
//!
//! let processor = MessageProcessor::new(store.clone(), ProcessorConfig::default()).unwrap();
//! let doc = processor
//!     .process(&MessageRequest::new("mail", "inbox/msg-1"))
//!     .await
//!     .unwrap();
//!
//! assert_eq!(doc.message_id.as_str(), "msg-1");
//! assert_eq!(
//!     doc.content.text.as_deref(),
//!     Some("s3://mail/content/msg-1/_body.txt")
//! );
//! # });
//! ```

mod config;
mod error;
mod event;
mod materialize;
mod metadata;
mod parser;
mod pipeline;
mod reader;
mod store;
mod task_group;
mod types;
mod writer;

pub use config::{LayoutConfig, MIN_PART_SIZE, ProcessorConfig, ReaderConfig, WriterConfig};
pub use error::{ProcessError, Result, StorageError};
pub use event::{BucketRef, EventDetail, ObjectCreatedEvent, ObjectRef};
pub use materialize::{
    ContentLayout, MaterializedPart, NameAllocator, PartMaterializer, preferred_name,
};
pub use metadata::{CanonicalBodies, MetadataAssembler, format_date, recipients, snapshot};
pub use parser::{
    ByteStream, DECODED_CHUNK_SIZE, MailparseParser, MessageHeaders, MessagePart, MimeParser,
    ParsedMessage, PartContent, parse_message,
};
pub use pipeline::MessageProcessor;
pub use reader::{SeekableObjectReader, SeekableSource, SliceSource};
pub use store::{CompletedPart, MemoryObjectStore, ObjectStore, StoreResult, UploadId};
pub use task_group::TaskGroup;
pub use types::*;
pub use writer::{ObjectWriter, upload_bytes, upload_stream};
