//! Storage notification envelopes as delivered through the queue
//!
//! The queue body is untrusted JSON. It is either a synthetic test event
//! (`{"Event": "s3:TestEvent", ...}`) or an object of the form
//! `{"Records": [{"eventName": ..., "s3": {"bucket": {...}, "object": {...}}}]}`.
//! Only the first record is read; one upload is one message.

use crate::error::{AppError, Result};
use crate::services::thumbnail::QueueMessage;
use percent_encoding::percent_decode_str;
use serde::Deserialize;
use serde_json::Value;

/// Discriminator value of the verification event sent when a bucket
/// notification is first configured
pub const TEST_EVENT: &str = "s3:TestEvent";

const OBJECT_CREATED_PREFIX: &str = "ObjectCreated:";

#[derive(Debug, Deserialize)]
pub struct NotificationEnvelope {
    #[serde(rename = "Event", default)]
    pub event: Option<String>,
    /// Kept untyped so that a malformed trailing record cannot reject an
    /// envelope whose first record is fine
    #[serde(rename = "Records", default)]
    pub records: Option<Vec<Value>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageEventRecord {
    #[serde(rename = "eventName", default)]
    pub event_name: Option<String>,
    pub s3: S3Entity,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3Entity {
    pub bucket: S3Bucket,
    pub object: S3Object,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3Bucket {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3Object {
    /// Transport-encoded key: `+` for space, `%XX` escapes
    pub key: String,
}

/// A batch of queue messages in the JSON shape the queue passes to a
/// function invocation. Used to replay captured batches.
#[derive(Debug, Deserialize)]
pub struct QueueBatchEvent {
    #[serde(rename = "Records", default)]
    pub records: Vec<QueueEventRecord>,
}

#[derive(Debug, Deserialize)]
pub struct QueueEventRecord {
    #[serde(rename = "messageId")]
    pub message_id: String,
    #[serde(rename = "receiptHandle", default)]
    pub receipt_handle: Option<String>,
    #[serde(default)]
    pub body: String,
}

impl QueueBatchEvent {
    pub fn into_messages(self) -> Vec<QueueMessage> {
        self.records
            .into_iter()
            .map(|r| QueueMessage {
                message_id: r.message_id,
                receipt_handle: r.receipt_handle,
                body: r.body,
            })
            .collect()
    }
}

/// Envelope after classification
#[derive(Debug, Clone)]
pub enum Classified {
    TestEvent,
    NoRecords,
    /// A record for an operation other than object creation
    NotObjectCreated { event_name: String },
    Upload(StorageEventRecord),
}

pub fn parse_envelope(body: &str) -> Result<NotificationEnvelope> {
    Ok(serde_json::from_str::<NotificationEnvelope>(body)?)
}

pub fn classify(envelope: NotificationEnvelope) -> Result<Classified> {
    if envelope.event.as_deref() == Some(TEST_EVENT) {
        return Ok(Classified::TestEvent);
    }

    let first = match envelope.records.and_then(|records| records.into_iter().next()) {
        Some(first) => first,
        None => return Ok(Classified::NoRecords),
    };

    let record: StorageEventRecord = serde_json::from_value(first)
        .map_err(|e| AppError::MalformedMessage(format!("invalid storage event record: {e}")))?;

    if let Some(event_name) = &record.event_name {
        if !event_name.starts_with(OBJECT_CREATED_PREFIX) {
            return Ok(Classified::NotObjectCreated {
                event_name: event_name.clone(),
            });
        }
    }

    Ok(Classified::Upload(record))
}

/// Decode a transport-encoded object key: `+` becomes a space, then `%XX`
/// escapes are decoded as UTF-8.
///
/// Escapes that are not valid hex are left as-is.
pub fn decode_object_key(raw: &str) -> Result<String> {
    let spaced = raw.replace('+', " ");
    percent_decode_str(&spaced)
        .decode_utf8()
        .map(|key| key.into_owned())
        .map_err(|e| AppError::MalformedMessage(format!("object key is not valid UTF-8: {e}")))
}
