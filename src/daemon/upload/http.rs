use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, info_span, Instrument};
use url::Url;

use crate::daemon::storage::entities::LogRecord;

use super::{LogUploader, UploadError};

/// Posts batches as a JSON array. Any 2xx answer counts as delivered.
pub struct HttpUploader {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpUploader {
    pub fn new(endpoint: Url, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, endpoint })
    }

    async fn post(&self, records: &[LogRecord]) -> Result<(), UploadError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(records)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            debug!("Endpoint accepted batch with {status}");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(UploadError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl LogUploader for HttpUploader {
    async fn upload(&self, records: Vec<LogRecord>) -> Result<(), UploadError> {
        let span = info_span!("Uploading records", count = records.len());
        self.post(&records).instrument(span).await
    }
}
