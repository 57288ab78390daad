/// S3-backed implementation of [`ObjectStorage`]
use crate::config::S3Config;
use crate::error::{StorageError, StorageResult};
use crate::{ObjectStorage, PutObjectRequest, StoredObject};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, SdkConfig};
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Clone)]
pub struct S3ObjectStorage {
    client: Arc<Client>,
}

impl S3ObjectStorage {
    /// Wrap an already configured client
    pub fn new(client: Client) -> Self {
        Self {
            client: Arc::new(client),
        }
    }

    /// Build a client from shared AWS configuration plus S3-specific overrides
    pub fn from_sdk_config(sdk_config: &SdkConfig, config: &S3Config) -> Self {
        let mut builder =
            aws_sdk_s3::config::Builder::from(sdk_config).region(Region::new(config.region.clone()));

        if let Some((access_key_id, secret_access_key)) = config.static_credentials() {
            let credentials = Credentials::new(
                access_key_id,
                secret_access_key,
                None,
                None,
                "s3_utils_static",
            );
            builder = builder.credentials_provider(credentials);
        }

        // Custom endpoint for S3-compatible storage like MinIO
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }
        if config.path_style {
            builder = builder.force_path_style(true);
        }

        info!(
            region = %config.region,
            endpoint = ?config.endpoint,
            path_style = config.path_style,
            "S3 client initialized"
        );

        Self::new(Client::from_conf(builder.build()))
    }

    /// Load the default AWS configuration chain and build a client from it
    pub async fn from_config(config: &S3Config) -> Self {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .load()
            .await;

        Self::from_sdk_config(&sdk_config, config)
    }
}

#[async_trait]
impl ObjectStorage for S3ObjectStorage {
    async fn get_object(&self, bucket: &str, key: &str) -> StorageResult<StoredObject> {
        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| {
                let not_found = err
                    .as_service_error()
                    .map(|e| e.is_no_such_key())
                    .unwrap_or(false);
                classify_sdk_error(bucket, key, not_found, err)
            })?;

        let content_type = response.content_type().map(str::to_string);
        let metadata = response.metadata().cloned().unwrap_or_default();

        let body = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Body(e.to_string()))?
            .into_bytes();

        debug!(
            bucket = %bucket,
            key = %key,
            size = body.len(),
            content_type = ?content_type,
            "Fetched object"
        );

        Ok(StoredObject {
            body,
            content_type,
            metadata,
        })
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        request: PutObjectRequest,
    ) -> StorageResult<()> {
        let size = request.body.len();

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(request.content_type)
            .set_metadata(Some(request.metadata))
            .body(ByteStream::from(request.body))
            .send()
            .await
            .map_err(|err| classify_sdk_error(bucket, key, false, err))?;

        debug!(bucket = %bucket, key = %key, size, "Stored object");

        Ok(())
    }
}

fn classify_sdk_error<E>(bucket: &str, key: &str, not_found: bool, err: SdkError<E>) -> StorageError
where
    E: std::error::Error + Send + Sync + 'static,
{
    if not_found {
        return StorageError::not_found(bucket, key);
    }

    match err.raw_response().map(|response| response.status().as_u16()) {
        Some(404) => StorageError::not_found(bucket, key),
        Some(403) => StorageError::access_denied(bucket, key),
        _ => StorageError::Request(DisplayErrorContext(&err).to_string()),
    }
}
