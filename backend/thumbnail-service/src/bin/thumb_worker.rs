//! Thumbnail Worker - SQS consumer for real-time thumbnail generation
//!
//! This worker long-polls the upload notification queue and writes a
//! thumbnail for every uploaded image next to its original.
//!
//! Environment variables:
//! - SQS_QUEUE_URL: Queue carrying storage upload notifications (required)
//! - SQS_ENDPOINT: Custom SQS endpoint (optional, e.g. LocalStack)
//! - SQS_MAX_MESSAGES: Messages per receive (default: 10)
//! - SQS_WAIT_TIME_SECS: Long-poll wait (default: 20)
//! - SQS_VISIBILITY_TIMEOUT_SECS: Per-receive visibility timeout (optional)
//! - AWS_REGION: AWS region (default: "us-east-1")
//! - S3_ENDPOINT / S3_PATH_STYLE: S3-compatible storage overrides (optional)
//! - THUMB_MAX_WIDTH / THUMB_MAX_HEIGHT: Bounding box (default: 300x300)
//! - THUMB_JPEG_QUALITY: JPEG quality 1-100 (default: 80)
//! - THUMB_PROCESSOR_TAG: Value of the `processed-by` metadata (default: "thumbnail-worker")
//! - BATCH_REPORTING_MODE: "partial" or "fail-fast" (default: "partial")

use aws_config::BehaviorVersion;
use aws_sdk_sqs::config::Region;
use s3_utils::S3ObjectStorage;
use std::sync::Arc;
use thumbnail_service::services::thumbnail::{
    SqsMessageQueue, ThumbnailConsumer, ThumbnailService,
};
use thumbnail_service::WorkerConfig;
use tokio::sync::watch;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("thumb_worker=info".parse()?)
                .add_directive("thumbnail_service=info".parse()?),
        )
        .init();

    info!("Starting Thumbnail Worker");

    // Load configuration
    dotenvy::dotenv().ok();
    let config = WorkerConfig::from_env()?;
    let consumer_config = config.consumer_config()?;
    info!(
        queue_url = %consumer_config.queue_url,
        region = %config.s3.region,
        reporting_mode = ?config.reporting_mode,
        "Configuration loaded"
    );

    let sdk_config = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(config.s3.region.clone()))
        .load()
        .await;

    let storage = Arc::new(S3ObjectStorage::from_sdk_config(&sdk_config, &config.s3));

    let mut sqs_builder = aws_sdk_sqs::config::Builder::from(&sdk_config);
    if let Some(endpoint) = &config.sqs.endpoint {
        sqs_builder = sqs_builder.endpoint_url(endpoint);
    }
    let queue = Arc::new(SqsMessageQueue::new(
        aws_sdk_sqs::Client::from_conf(sqs_builder.build()),
        consumer_config,
    ));

    let thumbnail_service = Arc::new(ThumbnailService::new(storage, config.service_config()));

    // Setup shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received"),
            Err(e) => error!(error = %e, "Failed to listen for ctrl+c, shutting down"),
        }
        let _ = shutdown_tx.send(true);
    });

    let mut consumer = ThumbnailConsumer::new(queue, thumbnail_service, shutdown_rx);

    // Run the consumer (blocks until shutdown)
    if let Err(e) = consumer.run().await {
        error!(error = %e, "Consumer error");
        return Err(e.into());
    }

    info!("Thumbnail Worker stopped");
    Ok(())
}
