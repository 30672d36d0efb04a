//! Processor configuration.
//!
//! Every field has a built-in default, so an empty TOML document is a valid
//! configuration. Values can be overridden from a TOML string or file:
//!
//! ```toml
//! [reader]
//! chunk_size = 1048576
//! max_cached_chunks = 100
//!
//! [writer]
//! part_size = 5242880
//!
//! [layout]
//! source_prefix = "inbox/"
//! content_prefix = "content/"
//! content_map_mode = "per_part"
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ProcessError, Result};
use crate::types::ContentMapMode;

/// Smallest segment most object stores accept for a non-final part
pub const MIN_PART_SIZE: usize = 5 * 1024 * 1024;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProcessorConfig {
    /// Source reader cache settings.
    pub reader: ReaderConfig,
    /// Destination upload settings.
    pub writer: WriterConfig,
    /// Key layout and result-document shape.
    pub layout: LayoutConfig,
}

/// Cache geometry for the seekable source reader.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReaderConfig {
    /// Bytes fetched per range request (default: 1 MiB).
    pub chunk_size: usize,
    /// Maximum number of chunks kept in memory (default: 100).
    pub max_cached_chunks: usize,
}

/// Multi-part upload settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WriterConfig {
    /// Bytes buffered before a segment is uploaded (default: 5 MiB).
    pub part_size: usize,
}

/// Destination naming and result-document options.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LayoutConfig {
    /// URI scheme used in `payload_uri` and the content map.
    pub scheme: String,
    /// Prefix every source key must start with.
    pub source_prefix: String,
    /// Replacement for `source_prefix` when deriving the content prefix.
    pub content_prefix: String,
    /// Name of the decoded text/plain body object.
    pub text_body_name: String,
    /// Name of the decoded text/html body object.
    pub html_body_name: String,
    /// Name of the metadata document object.
    pub metadata_name: String,
    /// Shape of the `content` map.
    pub content_map_mode: ContentMapMode,
    /// Truncate the inline `text` field to this many characters.
    pub text_snapshot_chars: Option<usize>,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1024 * 1024,
            max_cached_chunks: 100,
        }
    }
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            part_size: MIN_PART_SIZE,
        }
    }
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            scheme: "s3".to_string(),
            source_prefix: "inbox/".to_string(),
            content_prefix: "content/".to_string(),
            text_body_name: "_body.txt".to_string(),
            html_body_name: "_body.html".to_string(),
            metadata_name: "_meta.json".to_string(),
            content_map_mode: ContentMapMode::Canonical,
            text_snapshot_chars: None,
        }
    }
}

impl ProcessorConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| ProcessError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ProcessError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    /// Reject values that would make the pipeline misbehave.
    pub fn validate(&self) -> Result<()> {
        if self.reader.chunk_size == 0 {
            return Err(ProcessError::Config("reader.chunk_size must be > 0".into()));
        }
        if self.reader.max_cached_chunks == 0 {
            return Err(ProcessError::Config(
                "reader.max_cached_chunks must be > 0".into(),
            ));
        }
        if self.writer.part_size == 0 {
            return Err(ProcessError::Config("writer.part_size must be > 0".into()));
        }
        if self.layout.source_prefix.is_empty() || self.layout.content_prefix.is_empty() {
            return Err(ProcessError::Config(
                "layout prefixes must not be empty".into(),
            ));
        }
        if self.layout.source_prefix == self.layout.content_prefix {
            return Err(ProcessError::Config(
                "layout.content_prefix must differ from layout.source_prefix".into(),
            ));
        }

        let reserved = [
            &self.layout.text_body_name,
            &self.layout.html_body_name,
            &self.layout.metadata_name,
        ];
        if reserved.iter().any(|name| name.is_empty() || name.contains('/')) {
            return Err(ProcessError::Config(
                "reserved object names must be non-empty single path segments".into(),
            ));
        }
        if reserved[0] == reserved[1] || reserved[0] == reserved[2] || reserved[1] == reserved[2] {
            return Err(ProcessError::Config(
                "reserved object names must be distinct".into(),
            ));
        }
        Ok(())
    }

    /// Names a part must never be materialized under.
    #[must_use]
    pub fn reserved_names(&self) -> [&str; 3] {
        [
            &self.layout.text_body_name,
            &self.layout.html_body_name,
            &self.layout.metadata_name,
        ]
    }
}
