//! Delivery of accumulated records to the ingestion endpoint.

use async_trait::async_trait;

use super::storage::entities::LogRecord;

pub mod http;

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("failed to reach ingestion endpoint: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("ingestion endpoint answered {status}: {body}")]
    Status { status: u16, body: String },
}

/// Sends one batch of records. A batch is delivered as a whole or not at all, there is no partial
/// success.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LogUploader: Send + Sync {
    async fn upload(&self, records: Vec<LogRecord>) -> Result<(), UploadError>;
}
