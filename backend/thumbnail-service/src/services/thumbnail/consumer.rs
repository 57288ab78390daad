//! SQS consumer for thumbnail generation
//!
//! Long-polls the queue, hands each received batch to the thumbnail service
//! and deletes the messages that did not fail. Failed messages are left
//! alone: they become visible again once the queue's visibility timeout
//! expires and the queue's redrive policy decides when to dead-letter them.

use super::service::{BatchReport, QueueMessage, ThumbnailService};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use aws_sdk_sqs::error::DisplayErrorContext;
use aws_sdk_sqs::types::{DeleteMessageBatchRequestEntry, Message};
use aws_sdk_sqs::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Upper bound imposed by SQS on receive and delete batches
pub const SQS_MAX_BATCH: usize = 10;

const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Source of message batches with explicit acknowledgement
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Wait for the next batch; an empty batch means the wait timed out
    async fn receive(&self) -> Result<Vec<QueueMessage>>;

    /// Remove handled messages from the queue
    async fn acknowledge(&self, messages: &[QueueMessage]) -> Result<()>;
}

/// SQS consumer configuration
#[derive(Clone, Debug)]
pub struct ThumbnailConsumerConfig {
    pub queue_url: String,
    /// Messages per receive call (1-10)
    pub max_messages: i32,
    /// Long-poll wait (0-20 seconds)
    pub wait_time_secs: i32,
    /// Overrides the queue's default visibility timeout when set
    pub visibility_timeout_secs: Option<i32>,
}

impl ThumbnailConsumerConfig {
    pub fn new(queue_url: impl Into<String>) -> Self {
        Self {
            queue_url: queue_url.into(),
            max_messages: SQS_MAX_BATCH as i32,
            wait_time_secs: 20,
            visibility_timeout_secs: None,
        }
    }
}

pub struct SqsMessageQueue {
    client: Client,
    config: ThumbnailConsumerConfig,
}

impl SqsMessageQueue {
    pub fn new(client: Client, config: ThumbnailConsumerConfig) -> Self {
        info!(
            queue_url = %config.queue_url,
            max_messages = config.max_messages,
            wait_time_secs = config.wait_time_secs,
            "SQS queue initialized"
        );
        Self { client, config }
    }
}

#[async_trait]
impl MessageQueue for SqsMessageQueue {
    async fn receive(&self) -> Result<Vec<QueueMessage>> {
        let output = self
            .client
            .receive_message()
            .queue_url(&self.config.queue_url)
            .max_number_of_messages(self.config.max_messages)
            .wait_time_seconds(self.config.wait_time_secs)
            .set_visibility_timeout(self.config.visibility_timeout_secs)
            .send()
            .await
            .map_err(|e| AppError::Queue(format!("receive failed: {}", DisplayErrorContext(&e))))?;

        Ok(output.messages().iter().filter_map(queue_message).collect())
    }

    async fn acknowledge(&self, messages: &[QueueMessage]) -> Result<()> {
        let handles: Vec<&str> = messages
            .iter()
            .filter_map(|m| m.receipt_handle.as_deref())
            .collect();

        for chunk in handles.chunks(SQS_MAX_BATCH) {
            let entries = chunk
                .iter()
                .enumerate()
                .map(|(i, handle)| {
                    DeleteMessageBatchRequestEntry::builder()
                        .id(i.to_string())
                        .receipt_handle(*handle)
                        .build()
                })
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| AppError::Internal(format!("invalid delete entry: {e}")))?;

            let output = self
                .client
                .delete_message_batch()
                .queue_url(&self.config.queue_url)
                .set_entries(Some(entries))
                .send()
                .await
                .map_err(|e| AppError::Queue(format!("delete failed: {}", DisplayErrorContext(&e))))?;

            for failed in output.failed() {
                // The message reappears after its visibility timeout and is
                // reprocessed into the same thumbnail key
                warn!(
                    entry_id = %failed.id(),
                    code = %failed.code(),
                    message = ?failed.message(),
                    "Failed to delete handled message"
                );
            }
        }

        Ok(())
    }
}

/// Messages without an id cannot be reported individually and are left
/// to the queue's visibility timeout
fn queue_message(message: &Message) -> Option<QueueMessage> {
    let Some(message_id) = message.message_id() else {
        warn!(
            receipt_handle = ?message.receipt_handle(),
            "Received message without id, leaving it on the queue"
        );
        return None;
    };

    Some(QueueMessage {
        message_id: message_id.to_string(),
        receipt_handle: message.receipt_handle().map(str::to_string),
        body: message.body().unwrap_or_default().to_string(),
    })
}

/// Queue consumer for thumbnail generation
pub struct ThumbnailConsumer {
    queue: Arc<dyn MessageQueue>,
    thumbnail_service: Arc<ThumbnailService>,
    shutdown_rx: watch::Receiver<bool>,
}

impl ThumbnailConsumer {
    /// Create a new thumbnail consumer
    pub fn new(
        queue: Arc<dyn MessageQueue>,
        thumbnail_service: Arc<ThumbnailService>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            queue,
            thumbnail_service,
            shutdown_rx,
        }
    }

    /// Run the consumer loop until shutdown is signalled
    pub async fn run(&mut self) -> Result<()> {
        info!("Starting thumbnail consumer loop");

        loop {
            if *self.shutdown_rx.borrow() {
                break;
            }

            tokio::select! {
                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping consumer");
                        break;
                    }
                }

                batch = self.queue.receive() => {
                    match batch {
                        Ok(messages) if messages.is_empty() => {
                            debug!("No messages received");
                        }
                        Ok(messages) => {
                            if let Err(e) = self.handle_batch(messages).await {
                                error!(error = %e, "Batch handling failed");
                            }
                        }
                        Err(e) => {
                            error!(error = %e, "Queue receive error");
                            tokio::time::sleep(RECEIVE_ERROR_BACKOFF).await;
                        }
                    }
                }
            }
        }

        info!("Thumbnail consumer stopped");
        Ok(())
    }

    /// Receive and handle at most one batch
    pub async fn poll_once(&self) -> Result<Option<BatchReport>> {
        let messages = self.queue.receive().await?;
        if messages.is_empty() {
            return Ok(None);
        }
        self.handle_batch(messages).await.map(Some)
    }

    /// Process a batch and acknowledge every message that did not fail
    async fn handle_batch(&self, messages: Vec<QueueMessage>) -> Result<BatchReport> {
        debug!(count = messages.len(), "Received batch");

        let report = match self.thumbnail_service.process_batch(&messages).await {
            Ok(report) => report,
            Err(e) => {
                warn!(
                    count = messages.len(),
                    error = %e,
                    "Batch aborted, leaving every message for redelivery"
                );
                return Err(e);
            }
        };

        // Reports are in delivery order, one per message
        let handled: Vec<QueueMessage> = messages
            .into_iter()
            .zip(&report.messages)
            .filter(|(_, outcome)| !outcome.is_failure())
            .map(|(message, _)| message)
            .collect();

        if !handled.is_empty() {
            self.queue.acknowledge(&handled).await?;
        }

        Ok(report)
    }
}
