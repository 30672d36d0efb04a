//! Core types shared across the pipeline

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ProcessError, Result};

/// A `(container, key)` pair addressing one object in the store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectLocation {
    /// Bucket / container name
    pub container: String,

    /// Object key inside the container
    pub key: String,
}

impl ObjectLocation {
    pub fn new(container: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            key: key.into(),
        }
    }

    /// Fully-qualified URI, e.g. `s3://bucket/key`
    #[must_use]
    pub fn uri(&self, scheme: &str) -> String {
        format!("{scheme}://{}/{}", self.container, self.key)
    }

    /// Last path segment of the key
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }
}

impl fmt::Display for ObjectLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.container, self.key)
    }
}

/// The two fields the processor needs from a delivery notification
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageRequest {
    /// Container holding the raw message
    pub container: Option<String>,

    /// Key of the raw message object
    pub key: Option<String>,
}

impl MessageRequest {
    pub fn new(container: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            container: Some(container.into()),
            key: Some(key.into()),
        }
    }

    /// Check both fields are present and non-empty
    pub fn validate(&self) -> Result<ObjectLocation> {
        let container = match self.container.as_deref() {
            Some(c) if !c.is_empty() => c,
            Some(_) => {
                return Err(ProcessError::InvalidInput(
                    "container name is empty".into(),
                ));
            }
            None => {
                return Err(ProcessError::InvalidInput(
                    "container name is missing".into(),
                ));
            }
        };

        let key = match self.key.as_deref() {
            Some(k) if !k.is_empty() => k,
            Some(_) => return Err(ProcessError::InvalidInput("object key is empty".into())),
            None => return Err(ProcessError::InvalidInput("object key is missing".into())),
        };

        Ok(ObjectLocation::new(container, key))
    }
}

/// Message ID wrapper type
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl MessageId {
    /// Build from a Message-ID header value, dropping surrounding angle brackets
    #[must_use]
    pub fn from_header(value: &str) -> Option<Self> {
        let trimmed = value.trim().trim_start_matches('<').trim_end_matches('>').trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    /// Identity derived from the source object when the header is absent
    #[must_use]
    pub fn from_source(location: &ObjectLocation) -> Self {
        Self(location.file_name().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Email address with optional display name
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmailAddress {
    /// Display name (e.g., "John Doe")
    pub name: Option<String>,

    /// Email address (e.g., "john@example.com")
    pub address: String,
}

impl EmailAddress {
    pub fn new(name: Option<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.filter(|n| !n.trim().is_empty()),
            address: address.into(),
        }
    }

    /// Flatten a parsed address list, expanding groups into their members
    #[must_use]
    pub fn from_addr_list(list: &mailparse::MailAddrList) -> Vec<Self> {
        let mut out = Vec::new();
        for addr in list.iter() {
            match addr {
                mailparse::MailAddr::Single(single) => {
                    out.push(Self::new(single.display_name.clone(), single.addr.clone()));
                }
                mailparse::MailAddr::Group(group) => {
                    out.extend(
                        group
                            .addrs
                            .iter()
                            .map(|s| Self::new(s.display_name.clone(), s.addr.clone())),
                    );
                }
            }
        }
        out
    }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} <{}>", name, self.address),
            None => write!(f, "{}", self.address),
        }
    }
}

/// Which labels the content map carries
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ContentMapMode {
    /// `text`, `html` and `attachments`
    #[default]
    Canonical,

    /// Canonical labels plus a `body` array with every body part
    PerPart,
}

/// Label → URI map of materialized content
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContentMap {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Vec<String>>,

    pub attachments: Vec<String>,
}

/// Processing status reported in the result document
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum Status {
    #[default]
    #[serde(rename = "OK")]
    Ok,
}

/// The metadata document written next to the materialized parts
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResultDocument {
    pub result: Status,
    pub message_id: MessageId,
    pub payload_uri: String,
    pub from: String,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub recipients: Vec<String>,
    pub subject: Option<String>,
    pub date: Option<String>,
    pub text: Option<String>,
    pub content: ContentMap,
}

impl ResultDocument {
    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}
