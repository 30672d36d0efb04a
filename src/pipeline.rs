//! Message processing pipeline
//!
//! One call to [`MessageProcessor::process`] handles one message:
//!
//! 1. validate the request and derive the content prefix
//! 2. parse the source object through a [`SeekableObjectReader`]
//! 3. materialize every part plus the canonical bodies concurrently
//! 4. join all transfers; stop on the first failure
//! 5. assemble and upload the metadata document, then return it
//!
//! The metadata document is the completion marker: it is written only
//! after every other object is committed, so a failed or interrupted run
//! leaves no metadata behind and is safe to retry.

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::ProcessorConfig;
use crate::error::Result;
use crate::event::ObjectCreatedEvent;
use crate::materialize::{ContentLayout, MaterializedPart, NameAllocator, PartMaterializer};
use crate::metadata::{CanonicalBodies, MetadataAssembler};
use crate::parser::{MailparseParser, MimeParser};
use crate::reader::SeekableObjectReader;
use crate::store::ObjectStore;
use crate::task_group::TaskGroup;
use crate::types::{MessageId, MessageRequest, ResultDocument};

enum Materialized {
    Part(MaterializedPart),
    TextBody(String),
    HtmlBody(String),
}

/// Decomposes raw messages into content objects and a metadata document.
///
/// The store and parser are injected so the pipeline can run against any
/// backend, including [`MemoryObjectStore`](crate::MemoryObjectStore).
pub struct MessageProcessor {
    store: Arc<dyn ObjectStore>,
    parser: Arc<dyn MimeParser>,
    config: ProcessorConfig,
}

impl MessageProcessor {
    /// Build a processor using the `mailparse`-backed parser
    pub fn new(store: Arc<dyn ObjectStore>, config: ProcessorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            parser: Arc::new(MailparseParser),
            config,
        })
    }

    #[must_use]
    pub fn with_parser(mut self, parser: Arc<dyn MimeParser>) -> Self {
        self.parser = parser;
        self
    }

    #[must_use]
    pub const fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Handle a raw notification payload and return the result as JSON
    pub async fn handle_event(&self, payload: serde_json::Value) -> Result<serde_json::Value> {
        let request = ObjectCreatedEvent::from_json(payload)?.to_request();
        self.process(&request).await?.to_json()
    }

    /// Process one message end to end
    pub async fn process(&self, request: &MessageRequest) -> Result<ResultDocument> {
        let source = request.validate()?;
        let layout = ContentLayout::derive(&source, &self.config.layout)?;
        info!(container = %source.container, key = %source.key, "Processing message");

        let mut reader =
            SeekableObjectReader::new(Arc::clone(&self.store), source.clone(), &self.config.reader);
        let parsed = self.parser.parse(&mut reader).await?;
        debug!(
            fetches = reader.fetch_count(),
            size = ?reader.len_hint(),
            "Finished reading source"
        );
        drop(reader);

        let message_id = parsed
            .headers
            .message_id
            .as_deref()
            .and_then(MessageId::from_header)
            .unwrap_or_else(|| MessageId::from_source(&source));
        info!(
            message_id = %message_id,
            parts = parsed.parts.len(),
            attachments = parsed.attachments().count(),
            "Parsed message"
        );

        let materializer =
            PartMaterializer::new(Arc::clone(&self.store), layout, self.config.writer.clone());
        let mut names = NameAllocator::new(self.config.reserved_names());
        let mut group = TaskGroup::new();

        for part in &parsed.parts {
            let name = names.assign(part);
            let materializer = materializer.clone();
            let part = part.clone();
            group.spawn(async move {
                materializer
                    .materialize(part, name)
                    .await
                    .map(Materialized::Part)
            });
        }

        if let Some(text) = parsed.text_body.clone() {
            let materializer = materializer.clone();
            let name = self.config.layout.text_body_name.clone();
            group.spawn(async move {
                materializer
                    .materialize_text(&name, text)
                    .await
                    .map(Materialized::TextBody)
            });
        }

        if let Some(html) = parsed.html_body.clone() {
            let materializer = materializer.clone();
            let name = self.config.layout.html_body_name.clone();
            group.spawn(async move {
                materializer
                    .materialize_text(&name, html)
                    .await
                    .map(Materialized::HtmlBody)
            });
        }

        let transfers = group.len();
        let outputs = group.join().await?;
        debug!(transfers, "All transfers committed");

        let mut parts = Vec::with_capacity(parsed.parts.len());
        let mut bodies = CanonicalBodies::default();
        for output in outputs {
            match output {
                Materialized::Part(part) => parts.push(part),
                Materialized::TextBody(uri) => bodies.text = Some(uri),
                Materialized::HtmlBody(uri) => bodies.html = Some(uri),
            }
        }

        let assembler = MetadataAssembler::new(self.config.layout.clone());
        let document = assembler.assemble(
            message_id,
            &source,
            &parsed.headers,
            parsed.text_body.as_deref(),
            bodies,
            &parts,
        );
        assembler.publish(&materializer, &document).await?;

        Ok(document)
    }
}
