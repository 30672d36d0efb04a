//! Destination naming and part transfer

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::{LayoutConfig, WriterConfig};
use crate::error::{ProcessError, Result};
use crate::parser::MessagePart;
use crate::store::ObjectStore;
use crate::types::ObjectLocation;
use crate::writer::upload_stream;

/// Where a message's content objects live
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentLayout {
    pub container: String,

    /// Key prefix shared by every content object, without trailing slash
    pub prefix: String,

    /// URI scheme, e.g. `s3`
    pub scheme: String,
}

impl ContentLayout {
    /// Derive the content prefix by swapping the source prefix for the
    /// content prefix, e.g. `inbox/abc` → `content/abc`.
    pub fn derive(source: &ObjectLocation, layout: &LayoutConfig) -> Result<Self> {
        let rest = source
            .key
            .strip_prefix(&layout.source_prefix)
            .filter(|rest| !rest.is_empty())
            .ok_or_else(|| ProcessError::KeyOutsidePrefix {
                key: source.key.clone(),
                prefix: layout.source_prefix.clone(),
            })?;

        Ok(Self {
            container: source.container.clone(),
            prefix: format!("{}{rest}", layout.content_prefix)
                .trim_end_matches('/')
                .to_string(),
            scheme: layout.scheme.clone(),
        })
    }

    #[must_use]
    pub fn location(&self, name: &str) -> ObjectLocation {
        ObjectLocation::new(self.container.clone(), format!("{}/{name}", self.prefix))
    }

    #[must_use]
    pub fn uri(&self, name: &str) -> String {
        self.location(name).uri(&self.scheme)
    }
}

/// Name a part would get before collision handling.
///
/// Precedence: disposition filename, then content-id, then
/// `part_<index>.<subtype>`.
#[must_use]
pub fn preferred_name(part: &MessagePart) -> String {
    part.filename
        .as_deref()
        .and_then(sanitize)
        .or_else(|| part.content_id.as_deref().and_then(sanitize))
        .unwrap_or_else(|| format!("part_{}.{}", part.index, part.subtype()))
}

/// Reduce a header-supplied name to a single safe path segment
fn sanitize(name: &str) -> Option<String> {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| {
            if c == '/' || c == '\\' || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();

    match cleaned.as_str() {
        "" | "." | ".." => None,
        _ => Some(cleaned),
    }
}

/// Hands out destination names that are unique within one message.
#[derive(Debug, Default)]
pub struct NameAllocator {
    taken: HashSet<String>,
}

impl NameAllocator {
    /// Start with `reserved` names already taken
    pub fn new<'a>(reserved: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            taken: reserved.into_iter().map(str::to_string).collect(),
        }
    }

    /// Assign a name to `part`, prefixing its index if the preferred name is taken
    pub fn assign(&mut self, part: &MessagePart) -> String {
        let preferred = preferred_name(part);
        let mut candidate = preferred.clone();
        let mut attempt = 0usize;

        while self.taken.contains(&candidate) {
            candidate = if attempt == 0 {
                format!("{}_{preferred}", part.index)
            } else {
                format!("{}_{attempt}_{preferred}", part.index)
            };
            attempt += 1;
        }

        if attempt > 0 {
            debug!(index = part.index, name = %candidate, "Renamed colliding part");
        }
        self.taken.insert(candidate.clone());
        candidate
    }
}

/// A part whose destination object is committed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializedPart {
    pub index: usize,
    pub name: String,
    pub uri: String,
    pub is_attachment: bool,
    pub bytes: u64,
}

/// Streams decoded parts into their destination objects
#[derive(Clone)]
pub struct PartMaterializer {
    store: Arc<dyn ObjectStore>,
    layout: ContentLayout,
    writer: WriterConfig,
}

impl PartMaterializer {
    pub fn new(store: Arc<dyn ObjectStore>, layout: ContentLayout, writer: WriterConfig) -> Self {
        Self {
            store,
            layout,
            writer,
        }
    }

    #[must_use]
    pub const fn layout(&self) -> &ContentLayout {
        &self.layout
    }

    /// Transfer the part's decoded stream to `<prefix>/<name>`.
    ///
    /// Returns only after the object is committed; any read or write error
    /// is reported as a transfer failure and leaves no object behind.
    pub async fn materialize(&self, part: MessagePart, name: String) -> Result<MaterializedPart> {
        let location = self.layout.location(&name);
        let bytes = upload_stream(
            Arc::clone(&self.store),
            location.clone(),
            &self.writer,
            part.decoded_stream(),
        )
        .await
        .map_err(|e| ProcessError::transfer(location.key.clone(), e))?;

        info!(index = part.index, key = %location.key, bytes, "Materialized part");

        Ok(MaterializedPart {
            index: part.index,
            uri: location.uri(&self.layout.scheme),
            name,
            is_attachment: part.is_attachment,
            bytes,
        })
    }

    /// Upload an in-memory body under a fixed name
    pub async fn materialize_text(&self, name: &str, text: String) -> Result<String> {
        let location = self.layout.location(name);
        let bytes = crate::writer::upload_bytes(
            Arc::clone(&self.store),
            location.clone(),
            &self.writer,
            text.into(),
        )
        .await
        .map_err(|e| ProcessError::transfer(location.key.clone(), e))?;

        info!(key = %location.key, bytes, "Materialized body");
        Ok(location.uri(&self.layout.scheme))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("report.pdf").as_deref(), Some("report.pdf"));
        assert_eq!(sanitize("../etc/passwd").as_deref(), Some(".._etc_passwd"));
        assert_eq!(sanitize("a\\b\r\n").as_deref(), Some("a_b"));
        assert_eq!(sanitize(" .. "), None);
        assert_eq!(sanitize(""), None);
    }

    #[test]
    fn test_derive_layout() {
        let source = ObjectLocation::new("mail", "inbox/abc123");
        let layout = ContentLayout::derive(&source, &LayoutConfig::default()).unwrap();
        assert_eq!(layout.prefix, "content/abc123");
        assert_eq!(layout.uri("_meta.json"), "s3://mail/content/abc123/_meta.json");
    }

    #[test]
    fn test_derive_layout_rejects_foreign_key() {
        let source = ObjectLocation::new("mail", "archive/abc123");
        let err = ContentLayout::derive(&source, &LayoutConfig::default()).unwrap_err();
        assert!(matches!(err, ProcessError::KeyOutsidePrefix { .. }));

        let bare = ObjectLocation::new("mail", "inbox/");
        assert!(ContentLayout::derive(&bare, &LayoutConfig::default()).is_err());
    }
}
