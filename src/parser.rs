//! MIME structure parsing over a seekable source

use std::fmt;
use std::io::SeekFrom;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use mailparse::{DispositionType, MailHeader, ParsedMail};
use tracing::debug;

use crate::error::{ProcessError, Result};
use crate::reader::SeekableSource;
use crate::types::EmailAddress;

/// Largest item a decoded part stream yields
pub const DECODED_CHUNK_SIZE: usize = 64 * 1024;

/// Stream of decoded bytes for one part
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// Lazily decoded content of a part.
///
/// Nothing is decoded until [`open`](Self::open) is called and the stream
/// polled, so parts that are never transferred cost nothing.
pub trait PartContent: Send + Sync {
    fn open(&self) -> ByteStream;
}

/// One leaf of the message's content tree
#[derive(Clone)]
pub struct MessagePart {
    /// Position among the message's body parts, strictly increasing
    pub index: usize,

    /// Lower-cased media type, e.g. `text/plain`
    pub content_type: String,

    /// Content-Transfer-Encoding, if declared
    pub transfer_encoding: Option<String>,

    /// Filename from Content-Disposition
    pub filename: Option<String>,

    /// Content-ID without angle brackets
    pub content_id: Option<String>,

    /// Disposition marks this part as an attachment
    pub is_attachment: bool,

    content: Arc<dyn PartContent>,
}

impl MessagePart {
    pub fn new(index: usize, content_type: impl Into<String>, content: Arc<dyn PartContent>) -> Self {
        Self {
            index,
            content_type: content_type.into().to_lowercase(),
            transfer_encoding: None,
            filename: None,
            content_id: None,
            is_attachment: false,
            content,
        }
    }

    #[must_use]
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    #[must_use]
    pub fn with_content_id(mut self, content_id: impl Into<String>) -> Self {
        self.content_id = Some(content_id.into());
        self
    }

    #[must_use]
    pub const fn as_attachment(mut self) -> Self {
        self.is_attachment = true;
        self
    }

    /// Media subtype, e.g. `plain` for `text/plain`
    #[must_use]
    pub fn subtype(&self) -> &str {
        self.content_type
            .split_once('/')
            .map_or("octet-stream", |(_, sub)| sub)
    }

    /// Open the decoded byte stream for this part
    #[must_use]
    pub fn decoded_stream(&self) -> ByteStream {
        self.content.open()
    }
}

impl fmt::Debug for MessagePart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessagePart")
            .field("index", &self.index)
            .field("content_type", &self.content_type)
            .field("filename", &self.filename)
            .field("content_id", &self.content_id)
            .field("is_attachment", &self.is_attachment)
            .finish_non_exhaustive()
    }
}

/// Message-level headers the result document needs
#[derive(Debug, Clone, Default)]
pub struct MessageHeaders {
    pub message_id: Option<String>,
    pub from: Vec<EmailAddress>,
    pub to: Vec<EmailAddress>,
    pub cc: Vec<EmailAddress>,
    pub bcc: Vec<EmailAddress>,
    pub subject: Option<String>,
    pub date: Option<DateTime<Utc>>,
}

/// Output of a [`MimeParser`]
#[derive(Debug, Clone, Default)]
pub struct ParsedMessage {
    pub headers: MessageHeaders,

    /// Every leaf part in document order
    pub parts: Vec<MessagePart>,

    /// Decoded text/plain body
    pub text_body: Option<String>,

    /// Decoded text/html body
    pub html_body: Option<String>,
}

impl ParsedMessage {
    /// Parts whose disposition marks them as attachments
    pub fn attachments(&self) -> impl Iterator<Item = &MessagePart> {
        self.parts.iter().filter(|p| p.is_attachment)
    }
}

/// Parses message headers and the flattened part list from a byte source.
#[async_trait]
pub trait MimeParser: Send + Sync {
    async fn parse(&self, source: &mut dyn SeekableSource) -> Result<ParsedMessage>;
}

/// [`MimeParser`] backed by the `mailparse` crate.
///
/// `mailparse` works on a contiguous slice, so the source is drained into
/// one shared buffer. Each part keeps a zero-copy slice of its own raw
/// bytes; transfer-decoding of that slice runs on a blocking thread only
/// when the part's stream is polled, and the decoded body is yielded in
/// chunks of at most [`DECODED_CHUNK_SIZE`] bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct MailparseParser;

#[async_trait]
impl MimeParser for MailparseParser {
    async fn parse(&self, source: &mut dyn SeekableSource) -> Result<ParsedMessage> {
        source.seek(SeekFrom::Start(0)).await?;
        let mut buf = Vec::new();
        source.read_to_end(&mut buf).await?;
        if buf.is_empty() {
            return Err(ProcessError::Parse("message is empty".into()));
        }

        parse_message(Bytes::from(buf))
    }
}

/// Parse raw message bytes into headers and lazily decoded parts
pub fn parse_message(raw: Bytes) -> Result<ParsedMessage> {
    let parsed = mailparse::parse_mail(&raw).map_err(|e| ParseError::structure(&e))?;

    let headers = MessageHeaders {
        message_id: header_value(&parsed.headers, "message-id"),
        from: extract_addresses(&parsed.headers, "from"),
        to: extract_addresses(&parsed.headers, "to"),
        cc: extract_addresses(&parsed.headers, "cc"),
        bcc: extract_addresses(&parsed.headers, "bcc"),
        subject: header_value(&parsed.headers, "subject"),
        date: extract_date(&parsed.headers),
    };

    let mut leaves = Vec::new();
    collect_leaves(&parsed, &mut leaves);

    let mut parts = Vec::with_capacity(leaves.len());
    let mut text_body = None;
    let mut html_body = None;

    for (index, leaf) in leaves.into_iter().enumerate() {
        let disposition = leaf.get_content_disposition();
        let is_attachment = matches!(disposition.disposition, DispositionType::Attachment);
        let content_type = leaf.ctype.mimetype.to_lowercase();

        if !is_attachment {
            if content_type == "text/plain" && text_body.is_none() {
                text_body = Some(leaf.get_body().map_err(|e| ParseError::decode(&e))?);
            } else if content_type == "text/html" && html_body.is_none() {
                html_body = Some(leaf.get_body().map_err(|e| ParseError::decode(&e))?);
            }
        }

        let content = Arc::new(MailparseContent {
            raw: leaf_bytes(&raw, leaf.raw_bytes),
        });
        parts.push(MessagePart {
            index,
            content_type,
            transfer_encoding: header_value(&leaf.headers, "content-transfer-encoding"),
            filename: disposition
                .params
                .get("filename")
                .map(|f| f.trim().to_string())
                .filter(|f| !f.is_empty()),
            content_id: header_value(&leaf.headers, "content-id")
                .map(|id| id.trim_start_matches('<').trim_end_matches('>').to_string())
                .filter(|id| !id.is_empty()),
            is_attachment,
            content,
        });
    }

    debug!(
        parts = parts.len(),
        attachments = parts.iter().filter(|p| p.is_attachment).count(),
        "Parsed message structure"
    );

    Ok(ParsedMessage {
        headers,
        parts,
        text_body,
        html_body,
    })
}

struct ParseError;

impl ParseError {
    fn structure(err: &mailparse::MailParseError) -> ProcessError {
        ProcessError::Parse(format!("structure: {err}"))
    }

    fn decode(err: &mailparse::MailParseError) -> ProcessError {
        ProcessError::Parse(format!("decode: {err}"))
    }
}

/// Raw bytes (headers and encoded body) of one leaf part
struct MailparseContent {
    raw: Bytes,
}

impl PartContent for MailparseContent {
    fn open(&self) -> ByteStream {
        let raw = self.raw.clone();
        futures::stream::once(async move {
            tokio::task::spawn_blocking(move || decode_leaf(&raw))
                .await
                .map_err(|e| ProcessError::Task(e.to_string()))?
        })
        .map_ok(|body| {
            let chunks = split_chunks(body, DECODED_CHUNK_SIZE);
            futures::stream::iter(chunks.into_iter().map(Ok::<Bytes, ProcessError>))
        })
        .try_flatten()
        .boxed()
    }
}

/// Zero-copy handle on `leaf` when it lies inside `raw`, a copy otherwise
fn leaf_bytes(raw: &Bytes, leaf: &[u8]) -> Bytes {
    let start = (leaf.as_ptr() as usize).checked_sub(raw.as_ptr() as usize);
    match start {
        Some(start) if start + leaf.len() <= raw.len() => raw.slice(start..start + leaf.len()),
        _ => Bytes::copy_from_slice(leaf),
    }
}

/// Transfer-decode a single part given its own raw bytes
fn decode_leaf(leaf: &[u8]) -> Result<Bytes> {
    let parsed = mailparse::parse_mail(leaf).map_err(|e| ParseError::structure(&e))?;
    let body = parsed.get_body_raw().map_err(|e| ParseError::decode(&e))?;
    Ok(Bytes::from(body))
}

fn split_chunks(mut body: Bytes, size: usize) -> Vec<Bytes> {
    let size = size.max(1);
    let mut chunks = Vec::with_capacity(body.len().div_ceil(size));
    while body.len() > size {
        chunks.push(body.split_to(size));
    }
    if !body.is_empty() {
        chunks.push(body);
    }
    chunks
}

fn collect_leaves<'a, 'b>(node: &'b ParsedMail<'a>, out: &mut Vec<&'b ParsedMail<'a>>) {
    if node.subparts.is_empty() {
        if !node.ctype.mimetype.to_lowercase().starts_with("multipart/") {
            out.push(node);
        }
        return;
    }

    for child in &node.subparts {
        collect_leaves(child, out);
    }
}

fn header_value(headers: &[MailHeader], name: &str) -> Option<String> {
    headers
        .iter()
        .find(|h| h.get_key().to_lowercase() == name)
        .map(|h| h.get_value().trim().to_string())
        .filter(|v| !v.is_empty())
}

fn extract_addresses(headers: &[MailHeader], name: &str) -> Vec<EmailAddress> {
    headers
        .iter()
        .find(|h| h.get_key().to_lowercase() == name)
        .and_then(|h| mailparse::addrparse_header(h).ok())
        .map(|list| EmailAddress::from_addr_list(&list))
        .unwrap_or_default()
}

fn extract_date(headers: &[MailHeader]) -> Option<DateTime<Utc>> {
    let value = header_value(headers, "date")?;
    DateTime::parse_from_rfc2822(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            mailparse::dateparse(&value)
                .ok()
                .and_then(|ts| DateTime::from_timestamp(ts, 0))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const NESTED: &[u8] = b"Content-Type: multipart/mixed; boundary=\"b\"\r\n\r\n\
                    --b\r\nContent-Type: text/plain\r\n\r\nhello\r\n\
                    --b\r\nContent-Type: multipart/alternative; boundary=\"c\"\r\n\r\n\
                    --c\r\nContent-Type: application/octet-stream\r\n\
                    Content-Transfer-Encoding: base64\r\n\r\naGVsbG8=\r\n--c--\r\n\
                    --b--\r\n";

    #[test]
    fn test_collect_leaves_skips_multipart_containers() {
        let parsed = mailparse::parse_mail(NESTED).unwrap();
        let mut leaves = Vec::new();
        collect_leaves(&parsed, &mut leaves);

        let types: Vec<&str> = leaves.iter().map(|l| l.ctype.mimetype.as_str()).collect();
        assert_eq!(types, ["text/plain", "application/octet-stream"]);
    }

    #[test]
    fn test_leaf_bytes_share_the_message_buffer() {
        let raw = Bytes::from_static(NESTED);
        let parsed = mailparse::parse_mail(&raw).unwrap();
        let mut leaves = Vec::new();
        collect_leaves(&parsed, &mut leaves);

        let leaf = leaf_bytes(&raw, leaves[1].raw_bytes);
        assert_eq!(leaf.as_ptr(), leaves[1].raw_bytes.as_ptr());
        assert!(leaf.len() < raw.len());
        assert_eq!(&decode_leaf(&leaf).unwrap()[..], b"hello");
    }

    #[test]
    fn test_leaf_bytes_outside_buffer_are_copied() {
        let raw = Bytes::from_static(b"abc");
        let leaf = leaf_bytes(&raw, b"xyz");
        assert_eq!(&leaf[..], b"xyz");
    }

    #[test]
    fn test_split_chunks_bounds_items() {
        let chunks = split_chunks(Bytes::from(vec![7u8; 10]), 4);
        let lens: Vec<usize> = chunks.iter().map(Bytes::len).collect();
        assert_eq!(lens, [4, 4, 2]);
        assert!(split_chunks(Bytes::new(), 4).is_empty());
    }

    #[test]
    fn test_header_value_is_case_insensitive() {
        let parsed = mailparse::parse_mail(b"SUBJECT: Hi\r\n\r\n").unwrap();
        assert_eq!(header_value(&parsed.headers, "subject").as_deref(), Some("Hi"));
        assert_eq!(header_value(&parsed.headers, "date"), None);
    }
}
