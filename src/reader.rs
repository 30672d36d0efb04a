//! Seekable, chunk-cached reader over a remote object.

use std::io::SeekFrom;
use std::num::NonZeroUsize;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use lru::LruCache;
use tracing::debug;

use crate::config::ReaderConfig;
use crate::error::{Result, StorageError};
use crate::store::ObjectStore;
use crate::types::ObjectLocation;

/// A byte source that supports random access.
///
/// This is the interface the MIME parser consumes; it does not care whether
/// the bytes come from a remote object or from memory.
#[async_trait]
pub trait SeekableSource: Send {
    /// Read up to `buf.len()` bytes at the current position. `Ok(0)` means EOF.
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Move the cursor and return the new absolute position.
    async fn seek(&mut self, pos: SeekFrom) -> Result<u64>;

    /// Current absolute position.
    fn position(&self) -> u64;

    /// Read from the current position until EOF, appending to `out`.
    async fn read_to_end(&mut self, out: &mut Vec<u8>) -> Result<usize> {
        let mut buf = vec![0u8; 64 * 1024];
        let mut total = 0;
        loop {
            let n = self.read(&mut buf).await?;
            if n == 0 {
                return Ok(total);
            }
            out.extend_from_slice(&buf[..n]);
            total += n;
        }
    }
}

/// Reads a remote object through a bounded LRU cache of fixed-size chunks.
///
/// The object size is never needed up front: the end of the object is
/// discovered when a chunk fetch comes back shorter than `chunk_size`. Each
/// chunk is fetched with one logical range request on first access; if the
/// transport returns a short read, the fetch resumes where it stopped until
/// the chunk is full or the object ends. At most `max_cached_chunks` chunks
/// are held, and the least recently used one is evicted on a miss.
///
/// Only one sequential consumer is supported.
pub struct SeekableObjectReader {
    store: Arc<dyn ObjectStore>,
    location: ObjectLocation,
    chunk_size: usize,
    cache: LruCache<u64, Bytes>,
    position: u64,
    len: Option<u64>,
    fetches: usize,
}

impl SeekableObjectReader {
    pub fn new(store: Arc<dyn ObjectStore>, location: ObjectLocation, config: &ReaderConfig) -> Self {
        let capacity = NonZeroUsize::new(config.max_cached_chunks).unwrap_or(NonZeroUsize::MIN);
        Self {
            store,
            location,
            chunk_size: config.chunk_size.max(1),
            cache: LruCache::new(capacity),
            position: 0,
            len: None,
            fetches: 0,
        }
    }

    #[must_use]
    pub const fn location(&self) -> &ObjectLocation {
        &self.location
    }

    /// Object size, once it has been discovered
    #[must_use]
    pub const fn len_hint(&self) -> Option<u64> {
        self.len
    }

    /// Number of chunk fetches performed (cache misses)
    #[must_use]
    pub const fn fetch_count(&self) -> usize {
        self.fetches
    }

    /// Number of chunks currently cached
    #[must_use]
    pub fn cached_chunks(&self) -> usize {
        self.cache.len()
    }

    async fn chunk(&mut self, index: u64) -> Result<Bytes> {
        if let Some(chunk) = self.cache.get(&index) {
            return Ok(chunk.clone());
        }

        let chunk = self.fetch_chunk(index).await?;
        self.cache.put(index, chunk.clone());
        Ok(chunk)
    }

    async fn fetch_chunk(&mut self, index: u64) -> Result<Bytes> {
        let chunk_size = self.chunk_size as u64;
        let start = index * chunk_size;
        let end = start.saturating_add(chunk_size);
        self.fetches += 1;

        let first = self.store.get_range(&self.location, start..end).await?;
        let mut got = first.len() as u64;
        let chunk = if got == chunk_size || got == 0 {
            first
        } else {
            let mut buf = BytesMut::with_capacity(self.chunk_size);
            buf.extend_from_slice(&first);
            while got < chunk_size {
                let more = self
                    .store
                    .get_range(&self.location, start + got..end)
                    .await?;
                if more.is_empty() {
                    break;
                }
                got += more.len() as u64;
                buf.extend_from_slice(&more);
            }
            buf.freeze()
        };

        // an empty fetch only pins the size when the previous chunk was full
        let ends_here = got > 0
            || index == 0
            || self
                .cache
                .peek(&(index - 1))
                .is_some_and(|prev| prev.len() as u64 == chunk_size);
        if got < chunk_size && ends_here {
            self.len = Some(start + got);
        }

        debug!(
            key = %self.location.key,
            chunk = index,
            bytes = chunk.len(),
            "Fetched source chunk"
        );
        Ok(chunk)
    }

    async fn object_len(&mut self) -> Result<u64> {
        if let Some(len) = self.len {
            return Ok(len);
        }
        let len = self.store.object_size(&self.location).await?;
        self.len = Some(len);
        Ok(len)
    }
}

#[async_trait]
impl SeekableSource for SeekableObjectReader {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() || self.len.is_some_and(|len| self.position >= len) {
            return Ok(0);
        }

        let chunk_size = self.chunk_size as u64;
        let index = self.position / chunk_size;
        #[allow(clippy::cast_possible_truncation)]
        let offset = (self.position % chunk_size) as usize;

        let chunk = self.chunk(index).await?;
        if offset >= chunk.len() {
            return Ok(0);
        }

        let n = buf.len().min(chunk.len() - offset);
        buf[..n].copy_from_slice(&chunk[offset..offset + n]);
        self.position += n as u64;
        Ok(n)
    }

    async fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let target = match pos {
            SeekFrom::Start(n) => Some(n),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
            SeekFrom::End(delta) => self.object_len().await?.checked_add_signed(delta),
        };

        let target = target.ok_or_else(|| {
            StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "seek to a negative or overflowing position",
            ))
        })?;
        self.position = target;
        Ok(target)
    }

    fn position(&self) -> u64 {
        self.position
    }
}

/// In-memory [`SeekableSource`], handy for parsing bytes already at hand.
pub struct SliceSource {
    data: Bytes,
    position: u64,
}

impl SliceSource {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            position: 0,
        }
    }
}

#[async_trait]
impl SeekableSource for SliceSource {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let len = self.data.len() as u64;
        if self.position >= len {
            return Ok(0);
        }
        #[allow(clippy::cast_possible_truncation)]
        let start = self.position as usize;
        let n = buf.len().min(self.data.len() - start);
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        self.position += n as u64;
        Ok(n)
    }

    async fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let target = match pos {
            SeekFrom::Start(n) => Some(n),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
            SeekFrom::End(delta) => (self.data.len() as u64).checked_add_signed(delta),
        };
        self.position = target.ok_or_else(|| {
            StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "seek to a negative or overflowing position",
            ))
        })?;
        Ok(self.position)
    }

    fn position(&self) -> u64 {
        self.position
    }
}
