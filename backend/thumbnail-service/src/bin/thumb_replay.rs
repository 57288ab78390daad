//! Replay a captured queue batch through the thumbnail pipeline
//!
//! Reads a batch event (`{"Records": [{"messageId": ..., "body": ...}]}`)
//! from stdin, processes it against the configured storage and prints the
//! partial batch response (`{"batchItemFailures": [...]}`) on stdout.
//! Messages are not deleted from any queue.
//!
//! Uses the same environment variables as `thumb-worker`, except that
//! SQS_QUEUE_URL is not needed. Pass `--report` to print the full
//! per-message report instead.

use anyhow::Context;
use s3_utils::S3ObjectStorage;
use std::io::Read;
use std::sync::Arc;
use thumbnail_service::events::QueueBatchEvent;
use thumbnail_service::services::thumbnail::ThumbnailService;
use thumbnail_service::WorkerConfig;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout stays machine readable
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("thumbnail_service=info".parse()?),
        )
        .init();

    let full_report = std::env::args().skip(1).any(|arg| arg == "--report");

    dotenvy::dotenv().ok();
    let config = WorkerConfig::from_env()?;

    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .context("Failed to read batch event from stdin")?;
    let event: QueueBatchEvent =
        serde_json::from_str(&input).context("stdin is not a queue batch event")?;
    let messages = event.into_messages();
    info!(count = messages.len(), "Replaying batch");

    let storage = Arc::new(S3ObjectStorage::from_config(&config.s3).await);
    let service = ThumbnailService::new(storage, config.service_config());

    let report = service.process_batch(&messages).await?;

    let output = if full_report {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string_pretty(&report.batch_item_failures())?
    };
    println!("{output}");

    Ok(())
}
