//! Thumbnail generation pipeline
//!
//! This module provides:
//! - Derived key layout and loop prevention
//! - Image processor for resizing and re-encoding
//! - Service for turning one queue message into one thumbnail
//! - SQS consumer for real-time processing

pub mod consumer;
pub mod keys;
pub mod processor;
pub mod service;

pub use consumer::{MessageQueue, SqsMessageQueue, ThumbnailConsumer, ThumbnailConsumerConfig};
pub use keys::{is_thumbnail_key, thumbnail_key, THUMBNAIL_PREFIX};
pub use processor::{ThumbnailConfig, ThumbnailProcessor, ThumbnailResult};
pub use service::{
    BatchItemFailure, BatchReport, BatchReportingMode, MessageOutcome, MessageReport,
    MessageStatus, QueueMessage, SkipReason, SqsBatchResponse, ThumbnailArtifact,
    ThumbnailService, ThumbnailServiceConfig,
};
