use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;

use crate::models::{ReadLogResponse, SyncLogEntry};
use crate::settings::TrackerConfig;

use super::SyncError;

const ENABLE_LOGS: bool = true;

use crate::log_debug;

/// Request/response channel to the engagement aggregator.
#[async_trait]
pub trait ReadLogClient: Send + Sync {
    async fn log_read(&self, entry: &SyncLogEntry) -> Result<ReadLogResponse, SyncError>;
}

#[derive(Clone, Debug)]
pub struct HttpReadLogClient {
    client: reqwest::Client,
    url: String,
}

impl HttpReadLogClient {
    pub fn new(config: &TrackerConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .context("failed to build HTTP client for log_read")?;
        Ok(Self::with_client(client, config.log_read_url()))
    }

    pub fn with_client(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    fn map_error(err: reqwest::Error) -> SyncError {
        if err.is_timeout() {
            SyncError::Timeout
        } else {
            SyncError::Network(err.to_string())
        }
    }
}

#[async_trait]
impl ReadLogClient for HttpReadLogClient {
    async fn log_read(&self, entry: &SyncLogEntry) -> Result<ReadLogResponse, SyncError> {
        log_debug!(
            "POST {} article={} status={} session={:?}",
            self.url,
            entry.content_id,
            entry.status.as_str(),
            entry.session_id
        );

        let response = self
            .client
            .post(&self.url)
            .json(entry)
            .send()
            .await
            .map_err(Self::map_error)?;

        let status = response.status();
        if status == StatusCode::CONFLICT {
            return Err(SyncError::SessionConflict);
        }

        let body = response.text().await.map_err(Self::map_error)?;
        if !status.is_success() {
            return Err(SyncError::Http {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str::<ReadLogResponse>(&body)
            .map_err(|err| SyncError::MalformedResponse(err.to_string()))
    }
}
