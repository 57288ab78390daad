//! Thumbnail Service
//!
//! Queue-driven image thumbnailing: an upload notification arrives on the
//! queue, the original is fetched from object storage, and a bounded-size
//! derivative is written back under `thumbnails/`.

pub mod config;
pub mod error;
pub mod events;
pub mod services;

// Public re-exports
pub use config::WorkerConfig;
pub use error::{AppError, FailureKind, Result};
