/// Service layer for the thumbnail pipeline
pub mod thumbnail;
