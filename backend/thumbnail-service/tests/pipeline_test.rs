//! Integration tests for the thumbnail pipeline
//!
//! These tests drive `ThumbnailService` end to end against in-memory object
//! storage:
//! 1. Upload notification -> thumbnail written under `thumbnails/`
//! 2. Redelivery rewrites the same derived object
//! 3. Thumbnail uploads, test events and empty envelopes are skipped
//! 4. Fetch, decode and write failures are reported per message
//! 5. Partial batches keep going after a failure
//! 6. Output format and content type follow the derived key's extension
//! 7. Concurrent duplicate deliveries converge on one derived object
//!
//! Run tests:
//! ```bash
//! cargo test --package thumbnail-service --test pipeline_test
//! ```

use image::{DynamicImage, GenericImageView, ImageOutputFormat, RgbImage};
use s3_utils::{InMemoryObjectStorage, StorageError};
use serde_json::json;
use std::io::Cursor;
use std::sync::Arc;
use thumbnail_service::events::QueueBatchEvent;
use thumbnail_service::services::thumbnail::{
    BatchReportingMode, MessageOutcome, MessageStatus, QueueMessage, SkipReason, ThumbnailConfig,
    ThumbnailService, ThumbnailServiceConfig,
};
use thumbnail_service::{AppError, FailureKind};

const BUCKET: &str = "images-bucket";

fn encode(width: u32, height: u32, format: ImageOutputFormat) -> Vec<u8> {
    let mut out = Vec::new();
    DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, image::Rgb([200, 80, 40])))
        .write_to(&mut Cursor::new(&mut out), format)
        .unwrap();
    out
}

fn png(width: u32, height: u32) -> Vec<u8> {
    encode(width, height, ImageOutputFormat::Png)
}

fn upload_body(key: &str) -> String {
    json!({
        "Records": [{
            "eventVersion": "2.1",
            "eventSource": "aws:s3",
            "eventName": "ObjectCreated:Put",
            "s3": {
                "bucket": { "name": BUCKET },
                "object": { "key": key, "size": 1024 }
            }
        }]
    })
    .to_string()
}

fn message(id: &str, body: &str) -> QueueMessage {
    QueueMessage {
        message_id: id.to_string(),
        receipt_handle: None,
        body: body.to_string(),
    }
}

fn service(storage: Arc<InMemoryObjectStorage>) -> ThumbnailService {
    ThumbnailService::new(storage, ThumbnailServiceConfig::default())
}

async fn storage_with(key: &str, body: Vec<u8>, content_type: Option<&str>) -> Arc<InMemoryObjectStorage> {
    let storage = Arc::new(InMemoryObjectStorage::new());
    storage.insert(BUCKET, key, body, content_type).await;
    storage
}

fn location(key: &str) -> (String, String) {
    (BUCKET.to_string(), key.to_string())
}

/// Test: Upload notification produces a thumbnail next to the original
#[tokio::test]
async fn test_upload_produces_thumbnail() {
    let original = png(1200, 800);
    let original_len = original.len();
    let storage = storage_with("photos/cat.png", original, Some("image/png")).await;

    let outcome = service(storage.clone())
        .process_message(&upload_body("photos/cat.png"))
        .await;
    let outcome = tokio_test::assert_ok!(outcome);

    let artifact = match outcome {
        MessageOutcome::Processed(artifact) => artifact,
        other => panic!("expected processed outcome, got {other:?}"),
    };
    assert_eq!(artifact.thumbnail_key, "thumbnails/photos/cat_thumb.png");
    assert_eq!((artifact.width, artifact.height), (300, 200));
    assert_eq!(artifact.original_size, original_len);

    // exactly one read of the original, one write of the derivative
    assert_eq!(storage.reads().await, vec![location("photos/cat.png")]);
    assert_eq!(
        storage.writes().await,
        vec![location("thumbnails/photos/cat_thumb.png")]
    );

    let thumb = storage
        .object(BUCKET, "thumbnails/photos/cat_thumb.png")
        .await
        .unwrap();
    assert_eq!(thumb.content_type.as_deref(), Some("image/png"));
    assert_eq!(thumb.metadata["original-file"], "photos/cat.png");
    assert_eq!(thumb.metadata["original-size"], original_len.to_string());
    assert_eq!(thumb.metadata["processed-by"], "thumbnail-worker");
    assert!(chrono::DateTime::parse_from_rfc3339(&thumb.metadata["processed-at"]).is_ok());

    let decoded = image::load_from_memory(&thumb.body).unwrap();
    assert_eq!(decoded.dimensions(), (300, 200));
    assert_eq!(
        image::guess_format(&thumb.body).unwrap(),
        image::ImageFormat::Png
    );
}

/// Test: Processing the same notification twice rewrites the same key
#[tokio::test]
async fn test_redelivery_is_idempotent() {
    let storage = storage_with("photos/cat.png", png(640, 480), Some("image/png")).await;
    let service = service(storage.clone());
    let body = upload_body("photos/cat.png");

    service.process_message(&body).await.unwrap();
    let first = storage
        .object(BUCKET, "thumbnails/photos/cat_thumb.png")
        .await
        .unwrap();
    service.process_message(&body).await.unwrap();
    let second = storage
        .object(BUCKET, "thumbnails/photos/cat_thumb.png")
        .await
        .unwrap();

    assert_eq!(first.body, second.body);
    assert_eq!(
        storage.writes().await,
        vec![
            location("thumbnails/photos/cat_thumb.png"),
            location("thumbnails/photos/cat_thumb.png"),
        ]
    );
}

/// Test: A notification for a thumbnail never triggers another thumbnail
#[tokio::test]
async fn test_thumbnail_upload_is_skipped() {
    let storage = storage_with("thumbnails/photos/cat_thumb.png", png(300, 200), Some("image/png")).await;

    let outcome = service(storage.clone())
        .process_message(&upload_body("thumbnails/photos/cat_thumb.png"))
        .await
        .unwrap();

    assert_eq!(
        outcome,
        MessageOutcome::Skipped(SkipReason::AlreadyThumbnail {
            key: "thumbnails/photos/cat_thumb.png".into()
        })
    );
    assert!(storage.reads().await.is_empty());
    assert!(storage.writes().await.is_empty());
}

/// Test: Verification events and empty envelopes are acknowledged without I/O
#[tokio::test]
async fn test_test_event_and_empty_envelopes_are_skipped() {
    let storage = Arc::new(InMemoryObjectStorage::new());
    let service = service(storage.clone());

    let test_event = json!({
        "Service": "Amazon S3",
        "Event": "s3:TestEvent",
        "Bucket": BUCKET
    })
    .to_string();
    assert_eq!(
        service.process_message(&test_event).await.unwrap(),
        MessageOutcome::Skipped(SkipReason::TestEvent)
    );

    for body in [r#"{}"#, r#"{"Records": []}"#, r#"{"Records": null}"#] {
        assert_eq!(
            service.process_message(body).await.unwrap(),
            MessageOutcome::Skipped(SkipReason::NoRecords),
            "body {body}"
        );
    }

    assert!(storage.reads().await.is_empty());
    assert!(storage.writes().await.is_empty());
}

/// Test: Delete notifications are not thumbnailed
#[tokio::test]
async fn test_non_create_event_is_skipped() {
    let storage = Arc::new(InMemoryObjectStorage::new());
    let body = json!({
        "Records": [{
            "eventName": "ObjectRemoved:Delete",
            "s3": { "bucket": { "name": BUCKET }, "object": { "key": "photos/cat.png" } }
        }]
    })
    .to_string();

    let outcome = service(storage.clone()).process_message(&body).await.unwrap();

    assert!(matches!(
        outcome,
        MessageOutcome::Skipped(SkipReason::NotObjectCreated { ref event_name })
            if event_name == "ObjectRemoved:Delete"
    ));
    assert!(storage.reads().await.is_empty());
}

/// Test: Unparseable bodies fail as malformed
#[tokio::test]
async fn test_malformed_body_fails() {
    let storage = Arc::new(InMemoryObjectStorage::new());
    let service = service(storage.clone());

    let err = service.process_message("{not json").await.unwrap_err();
    assert!(matches!(err, AppError::MalformedMessage(_)));
    assert_eq!(err.kind(), FailureKind::Malformed);

    // record present but without an s3 entity
    let err = service
        .process_message(r#"{"Records": [{"eventName": "ObjectCreated:Put"}]}"#)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::MalformedMessage(_)));
    assert!(storage.reads().await.is_empty());
}

/// Test: Transport-encoded keys are decoded before fetching
#[tokio::test]
async fn test_encoded_key_is_decoded() {
    let storage = storage_with("folder/my file name.png", png(50, 50), Some("image/png")).await;

    let outcome = service(storage.clone())
        .process_message(&upload_body("folder/my+file%20name.png"))
        .await
        .unwrap();

    assert!(matches!(outcome, MessageOutcome::Processed(_)));
    assert_eq!(storage.reads().await, vec![location("folder/my file name.png")]);
    assert!(storage
        .object(BUCKET, "thumbnails/folder/my file name_thumb.png")
        .await
        .is_some());
}

/// Test: A missing original is a fetch failure and nothing is written
#[tokio::test]
async fn test_missing_object_fails_fetch() {
    let storage = Arc::new(InMemoryObjectStorage::new());

    let err = service(storage.clone())
        .process_message(&upload_body("photos/gone.png"))
        .await
        .unwrap_err();

    match err {
        AppError::Fetch { ref key, ref source, .. } => {
            assert_eq!(key, "photos/gone.png");
            assert_eq!(*source, StorageError::not_found(BUCKET, "photos/gone.png"));
        }
        other => panic!("expected fetch error, got {other:?}"),
    }
    assert!(storage.writes().await.is_empty());
}

/// Test: An original without a payload is rejected before decoding
#[tokio::test]
async fn test_empty_object_fails() {
    let storage = storage_with("photos/empty.png", Vec::new(), Some("image/png")).await;

    let err = service(storage.clone())
        .process_message(&upload_body("photos/empty.png"))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::EmptyObject { .. }));
    assert_eq!(err.kind(), FailureKind::Fetch);
    assert!(storage.writes().await.is_empty());
}

/// Test: Bytes that are not an image fail processing
#[tokio::test]
async fn test_corrupt_image_fails_processing() {
    let storage = storage_with("docs/readme.png", b"definitely not a png".to_vec(), Some("image/png")).await;

    let err = service(storage.clone())
        .process_message(&upload_body("docs/readme.png"))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Processing(_)));
    assert!(storage.writes().await.is_empty());
}

/// Test: A rejected write is reported as a write failure
#[tokio::test]
async fn test_write_failure_is_reported() {
    let storage = storage_with("photos/cat.png", png(400, 400), Some("image/png")).await;
    storage
        .fail_writes_with(Some(StorageError::access_denied(
            BUCKET,
            "thumbnails/photos/cat_thumb.png",
        )))
        .await;

    let err = service(storage.clone())
        .process_message(&upload_body("photos/cat.png"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        AppError::Write { ref key, .. } if key == "thumbnails/photos/cat_thumb.png"
    ));
    assert_eq!(err.kind(), FailureKind::Write);
    assert!(storage
        .object(BUCKET, "thumbnails/photos/cat_thumb.png")
        .await
        .is_none());
}

/// Test: One bad message does not stop the rest of a partial batch
#[tokio::test]
async fn test_partial_batch_continues_after_failure() {
    let storage = storage_with("photos/cat.png", png(400, 400), Some("image/png")).await;
    storage
        .insert(BUCKET, "photos/dog.png", png(900, 300), Some("image/png"))
        .await;

    let batch = vec![
        message("m-1", &upload_body("photos/cat.png")),
        message("m-2", "{not json"),
        message("m-3", &upload_body("photos/missing.png")),
        message("m-4", &upload_body("photos/dog.png")),
    ];

    let report = service(storage.clone()).process_batch(&batch).await.unwrap();

    assert_eq!(report.processed(), 2);
    assert_eq!(report.failed(), 2);
    assert_eq!(report.failed_ids().collect::<Vec<_>>(), vec!["m-2", "m-3"]);
    assert!(matches!(
        report.messages[1].status,
        MessageStatus::Failed { kind: FailureKind::Malformed, .. }
    ));
    assert_eq!(
        serde_json::to_value(report.batch_item_failures()).unwrap(),
        json!({ "batchItemFailures": [
            { "itemIdentifier": "m-2" },
            { "itemIdentifier": "m-3" }
        ]})
    );
    assert_eq!(storage.writes().await.len(), 2);
}

/// Test: Fail-fast batches stop at the first failure
#[tokio::test]
async fn test_fail_fast_batch_aborts() {
    let storage = storage_with("photos/cat.png", png(400, 400), Some("image/png")).await;
    let service = ThumbnailService::new(
        storage.clone(),
        ThumbnailServiceConfig {
            reporting_mode: BatchReportingMode::FailFast,
            ..ThumbnailServiceConfig::default()
        },
    );

    let batch = vec![
        message("m-1", &upload_body("photos/missing.png")),
        message("m-2", &upload_body("photos/cat.png")),
    ];

    let err = service.process_batch(&batch).await.unwrap_err();

    assert!(matches!(err, AppError::BatchAborted { ref message_id, .. } if message_id == "m-1"));
    assert!(storage.writes().await.is_empty());
}

/// Test: Replayed batch events map onto queue messages
#[tokio::test]
async fn test_replayed_batch_event() {
    let storage = storage_with("photos/cat.png", png(400, 400), Some("image/png")).await;
    let event: QueueBatchEvent = serde_json::from_value(json!({
        "Records": [
            { "messageId": "a", "receiptHandle": "rh-a", "body": upload_body("photos/cat.png") },
            { "messageId": "b", "body": "not json" }
        ]
    }))
    .unwrap();

    let report = service(storage)
        .process_batch(&event.into_messages())
        .await
        .unwrap();

    assert_eq!(report.processed(), 1);
    assert_eq!(report.failed_ids().collect::<Vec<_>>(), vec!["b"]);
}

/// Test: Large images shrink into the box, small ones keep their size
#[tokio::test]
async fn test_resize_policy() {
    let storage = storage_with("big.png", png(2000, 500), Some("image/png")).await;
    storage
        .insert(BUCKET, "small.png", png(120, 80), Some("image/png"))
        .await;
    let service = service(storage.clone());

    service.process_message(&upload_body("big.png")).await.unwrap();
    service.process_message(&upload_body("small.png")).await.unwrap();

    let big = storage.object(BUCKET, "thumbnails/big_thumb.png").await.unwrap();
    let small = storage.object(BUCKET, "thumbnails/small_thumb.png").await.unwrap();
    assert_eq!(image::load_from_memory(&big.body).unwrap().dimensions(), (300, 75));
    assert_eq!(image::load_from_memory(&small.body).unwrap().dimensions(), (120, 80));
}

/// Test: Custom bounding box and JPEG output
#[tokio::test]
async fn test_custom_box_keeps_jpeg_format() {
    let storage = storage_with(
        "uploads/IMG_0001.JPG",
        encode(800, 1600, ImageOutputFormat::Jpeg(95)),
        Some("image/jpeg"),
    )
    .await;
    let service = ThumbnailService::new(
        storage.clone(),
        ThumbnailServiceConfig {
            thumbnail: ThumbnailConfig {
                max_width: 100,
                max_height: 100,
                jpeg_quality: 70,
            },
            processor_tag: "replay".into(),
            ..ThumbnailServiceConfig::default()
        },
    );

    service
        .process_message(&upload_body("uploads/IMG_0001.JPG"))
        .await
        .unwrap();

    let thumb = storage
        .object(BUCKET, "thumbnails/uploads/IMG_0001_thumb.jpg")
        .await
        .unwrap();
    assert_eq!(thumb.content_type.as_deref(), Some("image/jpeg"));
    assert_eq!(thumb.metadata["processed-by"], "replay");
    assert_eq!(
        image::guess_format(&thumb.body).unwrap(),
        image::ImageFormat::Jpeg
    );
    assert_eq!(image::load_from_memory(&thumb.body).unwrap().dimensions(), (50, 100));
}

/// Test: Missing source content type is taken from the output format
#[tokio::test]
async fn test_content_type_fallback() {
    let storage = storage_with("raw/upload.png", png(64, 64), None).await;

    let outcome = service(storage.clone())
        .process_message(&upload_body("raw/upload.png"))
        .await
        .unwrap();

    match outcome {
        MessageOutcome::Processed(artifact) => {
            assert_eq!(artifact.thumbnail_key, "thumbnails/raw/upload_thumb.png");
            assert_eq!(artifact.content_type, "image/png");
        }
        other => panic!("expected processed outcome, got {other:?}"),
    }
}

/// Test: Keys without an extension get a JPEG at a `.jpg` key
#[tokio::test]
async fn test_extensionless_key_is_encoded_as_jpeg() {
    let storage = storage_with("raw/upload", png(64, 64), Some("image/png")).await;

    service(storage.clone())
        .process_message(&upload_body("raw/upload"))
        .await
        .unwrap();

    let thumb = storage
        .object(BUCKET, "thumbnails/raw/upload_thumb.jpg")
        .await
        .unwrap();
    assert_eq!(thumb.content_type.as_deref(), Some("image/jpeg"));
    assert_eq!(
        image::guess_format(&thumb.body).unwrap(),
        image::ImageFormat::Jpeg
    );
}

/// Test: PNG bytes uploaded under a `.jpg` name produce a real JPEG
#[tokio::test]
async fn test_mislabelled_upload_follows_key_extension() {
    let storage = storage_with("photos/cat.jpg", png(600, 400), Some("image/jpeg")).await;
    storage
        .insert(BUCKET, "photos/dog.jpg", png(600, 400), Some("image/png"))
        .await;
    let service = service(storage.clone());

    service.process_message(&upload_body("photos/cat.jpg")).await.unwrap();
    service.process_message(&upload_body("photos/dog.jpg")).await.unwrap();

    for key in ["thumbnails/photos/cat_thumb.jpg", "thumbnails/photos/dog_thumb.jpg"] {
        let thumb = storage.object(BUCKET, key).await.unwrap();
        assert_eq!(thumb.content_type.as_deref(), Some("image/jpeg"), "key {key}");
        assert_eq!(
            image::guess_format(&thumb.body).unwrap(),
            image::ImageFormat::Jpeg,
            "key {key}"
        );
        assert_eq!(image::load_from_memory(&thumb.body).unwrap().dimensions(), (300, 200));
    }
}

/// Test: An extension naming no known format keeps the detected format
#[tokio::test]
async fn test_unknown_extension_keeps_detected_format() {
    let storage = storage_with("scans/page.dat", png(50, 50), None).await;

    service(storage.clone())
        .process_message(&upload_body("scans/page.dat"))
        .await
        .unwrap();

    let thumb = storage
        .object(BUCKET, "thumbnails/scans/page_thumb.dat")
        .await
        .unwrap();
    assert_eq!(thumb.content_type.as_deref(), Some("image/png"));
    assert_eq!(
        image::guess_format(&thumb.body).unwrap(),
        image::ImageFormat::Png
    );
}

/// Test: Duplicate deliveries processed concurrently converge on one object
#[tokio::test]
async fn test_concurrent_duplicate_deliveries() {
    let storage = storage_with("photos/cat.png", png(800, 600), Some("image/png")).await;
    let service = service(storage.clone());
    let body = upload_body("photos/cat.png");

    let (first, second) = tokio::join!(
        service.process_message(&body),
        service.process_message(&body)
    );
    let (first, second) = (first.unwrap(), second.unwrap());

    // same key, same encoded size and dimensions
    assert_eq!(first, second);
    assert_eq!(
        storage.writes().await,
        vec![
            location("thumbnails/photos/cat_thumb.png"),
            location("thumbnails/photos/cat_thumb.png"),
        ]
    );
    let thumb = storage
        .object(BUCKET, "thumbnails/photos/cat_thumb.png")
        .await
        .unwrap();
    assert_eq!(image::load_from_memory(&thumb.body).unwrap().dimensions(), (300, 225));
}

/// Test: The reserved prefix is recognised after key decoding
#[tokio::test]
async fn test_encoded_thumbnail_key_is_skipped() {
    let storage = Arc::new(InMemoryObjectStorage::new());
    let service = service(storage.clone());

    for (raw, decoded) in [
        ("thumbnails%2Fcat_thumb.png", "thumbnails/cat_thumb.png"),
        ("thumbnails/my+cat_thumb.png", "thumbnails/my cat_thumb.png"),
    ] {
        let outcome = service.process_message(&upload_body(raw)).await.unwrap();
        assert_eq!(
            outcome,
            MessageOutcome::Skipped(SkipReason::AlreadyThumbnail {
                key: decoded.into()
            })
        );
    }

    assert!(storage.reads().await.is_empty());
    assert!(storage.writes().await.is_empty());
}
