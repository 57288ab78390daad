//! Thumbnail service - turns one queue message into one derived object
//!
//! Per message:
//! 1. Parse and classify the notification envelope
//! 2. Decode the object key and refuse keys under the thumbnail prefix
//! 3. Download the original
//! 4. Generate the thumbnail
//! 5. Upload it next to the original under the derived key
//!
//! The derived key depends only on the source key, so a redelivered or
//! concurrently duplicated message rewrites the same object.

use super::keys::{is_thumbnail_key, thumbnail_format, thumbnail_key};
use super::processor::{ThumbnailConfig, ThumbnailProcessor};
use crate::error::{AppError, FailureKind, Result};
use crate::events::{classify, decode_object_key, parse_envelope, Classified};
use chrono::{SecondsFormat, Utc};
use s3_utils::{ObjectStorage, PutObjectRequest};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub const META_PROCESSED_BY: &str = "processed-by";
pub const META_PROCESSED_AT: &str = "processed-at";
pub const META_ORIGINAL_FILE: &str = "original-file";
pub const META_ORIGINAL_SIZE: &str = "original-size";

/// How a batch reports failures back to the queue
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BatchReportingMode {
    /// Attempt every message and report failed ones individually
    #[default]
    PartialBatch,
    /// Stop at the first failure; the whole batch is redelivered
    FailFast,
}

impl std::str::FromStr for BatchReportingMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "partial" | "partial-batch" | "partial_batch" => Ok(Self::PartialBatch),
            "fail-fast" | "fail_fast" | "failfast" => Ok(Self::FailFast),
            other => Err(AppError::Config(format!(
                "unknown batch reporting mode '{other}' (expected partial or fail-fast)"
            ))),
        }
    }
}

/// Thumbnail service configuration
#[derive(Clone, Debug)]
pub struct ThumbnailServiceConfig {
    /// Thumbnail processing config
    pub thumbnail: ThumbnailConfig,
    /// Value written to the `processed-by` metadata key
    pub processor_tag: String,
    pub reporting_mode: BatchReportingMode,
}

impl Default for ThumbnailServiceConfig {
    fn default() -> Self {
        Self {
            thumbnail: ThumbnailConfig::default(),
            processor_tag: "thumbnail-worker".to_string(),
            reporting_mode: BatchReportingMode::PartialBatch,
        }
    }
}

/// One message handed over by the queue
#[derive(Debug, Clone, PartialEq)]
pub struct QueueMessage {
    pub message_id: String,
    /// Needed to acknowledge the message; absent for replayed events
    pub receipt_handle: Option<String>,
    pub body: String,
}

/// A thumbnail that was written
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThumbnailArtifact {
    pub bucket: String,
    pub source_key: String,
    pub thumbnail_key: String,
    pub content_type: String,
    pub original_size: usize,
    pub thumbnail_size: usize,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    TestEvent,
    NoRecords,
    NotObjectCreated { event_name: String },
    AlreadyThumbnail { key: String },
}

/// Successful handling of a message
#[derive(Debug, Clone, PartialEq)]
pub enum MessageOutcome {
    Processed(ThumbnailArtifact),
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MessageStatus {
    Processed(ThumbnailArtifact),
    Skipped(SkipReason),
    Failed { kind: FailureKind, error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageReport {
    pub message_id: String,
    #[serde(flatten)]
    pub status: MessageStatus,
}

impl MessageReport {
    pub fn is_failure(&self) -> bool {
        matches!(self.status, MessageStatus::Failed { .. })
    }
}

/// Per-message results of one batch, in delivery order
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub messages: Vec<MessageReport>,
}

impl BatchReport {
    pub fn processed(&self) -> usize {
        self.count(|s| matches!(s, MessageStatus::Processed(_)))
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, MessageStatus::Skipped(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, MessageStatus::Failed { .. }))
    }

    pub fn failed_ids(&self) -> impl Iterator<Item = &str> {
        self.messages
            .iter()
            .filter(|m| m.is_failure())
            .map(|m| m.message_id.as_str())
    }

    /// Partial batch response in the shape the queue's function
    /// integration expects
    pub fn batch_item_failures(&self) -> SqsBatchResponse {
        SqsBatchResponse {
            batch_item_failures: self
                .failed_ids()
                .map(|id| BatchItemFailure {
                    item_identifier: id.to_string(),
                })
                .collect(),
        }
    }

    fn count(&self, pred: impl Fn(&MessageStatus) -> bool) -> usize {
        self.messages.iter().filter(|m| pred(&m.status)).count()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SqsBatchResponse {
    pub batch_item_failures: Vec<BatchItemFailure>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemFailure {
    pub item_identifier: String,
}

/// Thumbnail service
pub struct ThumbnailService {
    storage: Arc<dyn ObjectStorage>,
    processor: Arc<ThumbnailProcessor>,
    config: ThumbnailServiceConfig,
}

impl ThumbnailService {
    /// Create a new thumbnail service
    pub fn new(storage: Arc<dyn ObjectStorage>, config: ThumbnailServiceConfig) -> Self {
        let processor = Arc::new(ThumbnailProcessor::new(config.thumbnail.clone()));

        info!(
            max_width = config.thumbnail.max_width,
            max_height = config.thumbnail.max_height,
            reporting_mode = ?config.reporting_mode,
            "Thumbnail service initialized"
        );

        Self {
            storage,
            processor,
            config,
        }
    }

    /// Process a batch sequentially. A failed message never stops the others
    /// in `PartialBatch` mode; in `FailFast` mode it aborts the batch.
    pub async fn process_batch(&self, messages: &[QueueMessage]) -> Result<BatchReport> {
        let mut report = BatchReport {
            messages: Vec::with_capacity(messages.len()),
        };

        for message in messages {
            let status = match self.process_message(&message.body).await {
                Ok(MessageOutcome::Processed(artifact)) => MessageStatus::Processed(artifact),
                Ok(MessageOutcome::Skipped(reason)) => MessageStatus::Skipped(reason),
                Err(e) => {
                    if e.likely_transient() {
                        warn!(message_id = %message.message_id, error = %e, "Message failed, leaving for redelivery");
                    } else {
                        error!(
                            message_id = %message.message_id,
                            error = %e,
                            "Message failed, redelivery is unlikely to help"
                        );
                    }

                    if self.config.reporting_mode == BatchReportingMode::FailFast {
                        return Err(AppError::BatchAborted {
                            message_id: message.message_id.clone(),
                            reason: e.to_string(),
                        });
                    }

                    MessageStatus::Failed {
                        kind: e.kind(),
                        error: e.to_string(),
                    }
                }
            };

            report.messages.push(MessageReport {
                message_id: message.message_id.clone(),
                status,
            });
        }

        info!(
            total = messages.len(),
            processed = report.processed(),
            skipped = report.skipped(),
            failed = report.failed(),
            "Batch complete"
        );

        Ok(report)
    }

    /// Handle a single message body end to end
    pub async fn process_message(&self, body: &str) -> Result<MessageOutcome> {
        let envelope = parse_envelope(body)?;

        let record = match classify(envelope)? {
            Classified::TestEvent => {
                info!("Skipping storage test event");
                return Ok(MessageOutcome::Skipped(SkipReason::TestEvent));
            }
            Classified::NoRecords => {
                info!("No records in message body, skipping");
                return Ok(MessageOutcome::Skipped(SkipReason::NoRecords));
            }
            Classified::NotObjectCreated { event_name } => {
                info!(event_name = %event_name, "Ignoring non-create storage event");
                return Ok(MessageOutcome::Skipped(SkipReason::NotObjectCreated {
                    event_name,
                }));
            }
            Classified::Upload(record) => record,
        };

        let bucket = record.s3.bucket.name;
        let key = decode_object_key(&record.s3.object.key)?;

        if is_thumbnail_key(&key) {
            info!(key = %key, "Skipping object already in thumbnail namespace");
            return Ok(MessageOutcome::Skipped(SkipReason::AlreadyThumbnail { key }));
        }

        info!(bucket = %bucket, key = %key, "Processing image");

        let artifact = self.generate_thumbnail(&bucket, &key).await?;

        info!(
            bucket = %artifact.bucket,
            source_key = %artifact.source_key,
            thumbnail_key = %artifact.thumbnail_key,
            original_size = artifact.original_size,
            thumbnail_size = artifact.thumbnail_size,
            width = artifact.width,
            height = artifact.height,
            "Thumbnail uploaded"
        );

        Ok(MessageOutcome::Processed(artifact))
    }

    /// Fetch, derive and store the thumbnail for `bucket/key`
    async fn generate_thumbnail(&self, bucket: &str, key: &str) -> Result<ThumbnailArtifact> {
        let original = self
            .storage
            .get_object(bucket, key)
            .await
            .map_err(|source| AppError::Fetch {
                bucket: bucket.to_string(),
                key: key.to_string(),
                source,
            })?;

        if original.body.is_empty() {
            return Err(AppError::EmptyObject {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
        }

        let original_size = original.body.len();
        debug!(
            bucket = %bucket,
            key = %key,
            size = original_size,
            content_type = ?original.content_type,
            "Downloaded original"
        );

        let thumb_key = thumbnail_key(key);
        let thumbnail = self
            .processor
            .clone()
            .generate_async(original.body, thumbnail_format(key))
            .await?;

        // The declared type is kept only when it names the format written
        let content_type = match original.content_type {
            Some(declared) if declared.trim().eq_ignore_ascii_case(thumbnail.mime_type()) => {
                declared
            }
            declared => {
                if let Some(declared) = declared {
                    debug!(
                        declared = %declared,
                        written = thumbnail.mime_type(),
                        "Declared content type does not match thumbnail format"
                    );
                }
                thumbnail.mime_type().to_string()
            }
        };

        let request = PutObjectRequest {
            body: thumbnail.data.clone(),
            content_type: content_type.clone(),
            metadata: self.metadata_for(key, original_size),
        };

        self.storage
            .put_object(bucket, &thumb_key, request)
            .await
            .map_err(|source| AppError::Write {
                bucket: bucket.to_string(),
                key: thumb_key.clone(),
                source,
            })?;

        Ok(ThumbnailArtifact {
            bucket: bucket.to_string(),
            source_key: key.to_string(),
            thumbnail_key: thumb_key,
            content_type,
            original_size,
            thumbnail_size: thumbnail.data.len(),
            width: thumbnail.width,
            height: thumbnail.height,
        })
    }

    fn metadata_for(&self, source_key: &str, original_size: usize) -> HashMap<String, String> {
        HashMap::from([
            (
                META_PROCESSED_BY.to_string(),
                self.config.processor_tag.clone(),
            ),
            (
                META_PROCESSED_AT.to_string(),
                Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            ),
            (META_ORIGINAL_FILE.to_string(), source_key.to_string()),
            (META_ORIGINAL_SIZE.to_string(), original_size.to_string()),
        ])
    }
}
