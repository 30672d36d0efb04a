//! Result-document assembly

use chrono::{DateTime, Utc};
use tracing::info;

use crate::config::LayoutConfig;
use crate::error::Result;
use crate::materialize::{MaterializedPart, PartMaterializer};
use crate::parser::MessageHeaders;
use crate::types::{
    ContentMap, ContentMapMode, EmailAddress, MessageId, ObjectLocation, ResultDocument, Status,
};

/// URIs of the two canonical full-message bodies
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CanonicalBodies {
    pub text: Option<String>,
    pub html: Option<String>,
}

/// Builds the result document once every destination URI is known
#[derive(Debug, Clone)]
pub struct MetadataAssembler {
    layout: LayoutConfig,
}

impl MetadataAssembler {
    #[must_use]
    pub const fn new(layout: LayoutConfig) -> Self {
        Self { layout }
    }

    /// Assemble the document from committed parts only.
    ///
    /// `parts` must be in part order; the attachments array follows it.
    #[must_use]
    pub fn assemble(
        &self,
        message_id: MessageId,
        source: &ObjectLocation,
        headers: &MessageHeaders,
        text_body: Option<&str>,
        bodies: CanonicalBodies,
        parts: &[MaterializedPart],
    ) -> ResultDocument {
        let attachments = parts
            .iter()
            .filter(|p| p.is_attachment)
            .map(|p| p.uri.clone())
            .collect();

        let body = match self.layout.content_map_mode {
            ContentMapMode::Canonical => None,
            ContentMapMode::PerPart => Some(parts.iter().map(|p| p.uri.clone()).collect()),
        };

        ResultDocument {
            result: Status::Ok,
            message_id,
            payload_uri: source.uri(&self.layout.scheme),
            from: join_display(&headers.from),
            to: display_list(&headers.to),
            cc: display_list(&headers.cc),
            bcc: display_list(&headers.bcc),
            recipients: recipients(&headers.to, &headers.cc, &headers.bcc),
            subject: headers.subject.clone(),
            date: headers.date.map(format_date),
            text: text_body.map(|t| snapshot(t, self.layout.text_snapshot_chars)),
            content: ContentMap {
                text: bodies.text,
                html: bodies.html,
                body,
                attachments,
            },
        }
    }

    /// Upload the document as JSON under the metadata name
    pub async fn publish(
        &self,
        materializer: &PartMaterializer,
        document: &ResultDocument,
    ) -> Result<String> {
        let json = serde_json::to_string_pretty(document)?;
        let uri = materializer
            .materialize_text(&self.layout.metadata_name, json)
            .await?;
        info!(uri = %uri, message_id = %document.message_id, "Published metadata document");
        Ok(uri)
    }
}

/// Union of To, Cc and Bcc addresses, first occurrence wins.
///
/// Addresses are compared exactly as written.
#[must_use]
pub fn recipients(to: &[EmailAddress], cc: &[EmailAddress], bcc: &[EmailAddress]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    to.iter()
        .chain(cc)
        .chain(bcc)
        .filter(|a| seen.insert(a.address.as_str()))
        .map(|a| a.address.clone())
        .collect()
}

/// ISO-8601 UTC with second precision, e.g. `2025-01-01T12:00:00Z`
#[must_use]
pub fn format_date(date: DateTime<Utc>) -> String {
    date.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Truncate to `limit` characters, ending with `...` when shortened
#[must_use]
pub fn snapshot(text: &str, limit: Option<usize>) -> String {
    const ELLIPSIS: &str = "...";

    let Some(limit) = limit else {
        return text.to_string();
    };
    if text.chars().count() <= limit {
        return text.to_string();
    }

    let keep = limit.saturating_sub(ELLIPSIS.len());
    let cut: String = text.chars().take(keep).collect();
    format!("{}{ELLIPSIS}", cut.trim_end())
}

fn display_list(addresses: &[EmailAddress]) -> Vec<String> {
    addresses.iter().map(ToString::to_string).collect()
}

fn join_display(addresses: &[EmailAddress]) -> String {
    display_list(addresses).join(", ")
}
