//! Storage delivery-notification envelope

use serde::{Deserialize, Serialize};

use crate::error::{ProcessError, Result};
use crate::types::MessageRequest;

/// "Object Created" notification as delivered by the storage event bus.
///
/// Only `detail.bucket.name` and `detail.object.key` are read; every field
/// is optional so that a malformed envelope surfaces as a validation error
/// from [`MessageRequest::validate`] rather than a deserialization error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectCreatedEvent {
    pub detail: Option<EventDetail>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EventDetail {
    pub bucket: Option<BucketRef>,
    pub object: Option<ObjectRef>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BucketRef {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectRef {
    pub key: Option<String>,
    pub size: Option<u64>,
}

impl ObjectCreatedEvent {
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| ProcessError::InvalidInput(format!("malformed notification: {e}")))
    }

    /// Project the envelope onto the two fields the processor needs
    #[must_use]
    pub fn to_request(&self) -> MessageRequest {
        let detail = self.detail.as_ref();
        MessageRequest {
            container: detail
                .and_then(|d| d.bucket.as_ref())
                .and_then(|b| b.name.clone()),
            key: detail
                .and_then(|d| d.object.as_ref())
                .and_then(|o| o.key.clone()),
        }
    }
}

impl From<ObjectCreatedEvent> for MessageRequest {
    fn from(event: ObjectCreatedEvent) -> Self {
        event.to_request()
    }
}
