/// Configuration management for the thumbnail worker
///
/// Loads configuration from environment variables with sensible defaults.
use crate::error::{AppError, Result};
use crate::services::thumbnail::{
    BatchReportingMode, ThumbnailConfig, ThumbnailConsumerConfig, ThumbnailServiceConfig,
};
use s3_utils::S3Config;
use std::str::FromStr;

#[derive(Clone, Debug)]
pub struct WorkerConfig {
    pub s3: S3Config,
    pub sqs: SqsConfig,
    pub thumbnail: ThumbnailConfig,
    pub processor_tag: String,
    pub reporting_mode: BatchReportingMode,
}

#[derive(Clone, Debug)]
pub struct SqsConfig {
    /// Required by the long-running worker, unused by replay
    pub queue_url: Option<String>,
    /// Custom endpoint (LocalStack, ElasticMQ)
    pub endpoint: Option<String>,
    pub max_messages: i32,
    pub wait_time_secs: i32,
    pub visibility_timeout_secs: Option<i32>,
}

impl WorkerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let thumbnail = ThumbnailConfig {
            max_width: parse_var("THUMB_MAX_WIDTH", 300)?,
            max_height: parse_var("THUMB_MAX_HEIGHT", 300)?,
            jpeg_quality: parse_var("THUMB_JPEG_QUALITY", 80)?,
        };

        let sqs = SqsConfig {
            queue_url: optional_var("SQS_QUEUE_URL"),
            endpoint: optional_var("SQS_ENDPOINT"),
            max_messages: parse_var("SQS_MAX_MESSAGES", 10)?,
            wait_time_secs: parse_var("SQS_WAIT_TIME_SECS", 20)?,
            visibility_timeout_secs: optional_var("SQS_VISIBILITY_TIMEOUT_SECS")
                .map(|v| parse_value("SQS_VISIBILITY_TIMEOUT_SECS", &v))
                .transpose()?,
        };

        let reporting_mode = match optional_var("BATCH_REPORTING_MODE") {
            Some(mode) => mode.parse()?,
            None => BatchReportingMode::default(),
        };

        let config = Self {
            s3: S3Config::from_env(),
            sqs,
            thumbnail,
            processor_tag: optional_var("THUMB_PROCESSOR_TAG")
                .unwrap_or_else(|| "thumbnail-worker".to_string()),
            reporting_mode,
        };
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.thumbnail.max_width == 0 || self.thumbnail.max_height == 0 {
            return Err(AppError::Config(
                "THUMB_MAX_WIDTH and THUMB_MAX_HEIGHT must be positive".into(),
            ));
        }
        if !(1..=100).contains(&self.thumbnail.jpeg_quality) {
            return Err(AppError::Config(
                "THUMB_JPEG_QUALITY must be between 1 and 100".into(),
            ));
        }
        if !(1..=10).contains(&self.sqs.max_messages) {
            return Err(AppError::Config(
                "SQS_MAX_MESSAGES must be between 1 and 10".into(),
            ));
        }
        if !(0..=20).contains(&self.sqs.wait_time_secs) {
            return Err(AppError::Config(
                "SQS_WAIT_TIME_SECS must be between 0 and 20".into(),
            ));
        }
        Ok(())
    }

    pub fn service_config(&self) -> ThumbnailServiceConfig {
        ThumbnailServiceConfig {
            thumbnail: self.thumbnail.clone(),
            processor_tag: self.processor_tag.clone(),
            reporting_mode: self.reporting_mode,
        }
    }

    pub fn consumer_config(&self) -> Result<ThumbnailConsumerConfig> {
        let queue_url = self
            .sqs
            .queue_url
            .clone()
            .ok_or_else(|| AppError::Config("SQS_QUEUE_URL not set".into()))?;

        Ok(ThumbnailConsumerConfig {
            queue_url,
            max_messages: self.sqs.max_messages,
            wait_time_secs: self.sqs.wait_time_secs,
            visibility_timeout_secs: self.sqs.visibility_timeout_secs,
        })
    }
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T> {
    match optional_var(name) {
        Some(raw) => parse_value(name, &raw),
        None => Ok(default),
    }
}

fn parse_value<T: FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.parse()
        .map_err(|_| AppError::Config(format!("{name} has invalid value '{raw}'")))
}
