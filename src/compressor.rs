//! Lossy compression through the Kraken.io URL API.
//!
//! We hand Kraken a public URL to the original object and ask it to `wait`, so the response
//! carries the final URL of the optimized image rather than a job id we would have to poll.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::event::StorageEvent;

pub const KRAKEN_API_URL: &str = "https://api.kraken.io/v1/url";
pub const SOURCE_URL_BASE: &str = "https://storage.googleapis.com";

#[derive(Debug, Error)]
pub enum CompressError {
    #[error("failed to reach compression provider: {0}")]
    Transport(String),
    #[error("compression provider rejected request: {0}")]
    ProviderRejected(String),
}

#[async_trait]
pub trait Compressor: Send + Sync {
    /// Compresses the object the event refers to, returns the URL of the optimized result.
    async fn compress(&self, event: &StorageEvent) -> Result<String, CompressError>;
}

#[derive(Clone, Debug)]
pub struct KrakenConfig {
    pub api_key: String,
    pub api_secret: String,
    pub api_url: String,
    /// Public base the provider downloads originals from, `{base}/{bucket}/{name}`.
    pub source_url_base: String,
}

/// The object name is joined as-is, names are expected to already be URL safe.
pub fn source_url(base: &str, event: &StorageEvent) -> String {
    format!(
        "{}/{}/{}",
        base.trim_end_matches('/'),
        event.bucket,
        event.name
    )
}

#[derive(Debug, Serialize)]
struct KrakenAuth<'a> {
    api_key: &'a str,
    api_secret: &'a str,
}

#[derive(Debug, Serialize)]
struct KrakenUrlRequest<'a> {
    auth: KrakenAuth<'a>,
    url: &'a str,
    wait: bool,
    lossy: bool,
}

#[derive(Debug, Deserialize)]
struct KrakenResponse {
    #[serde(default)]
    success: bool,
    message: Option<String>,
    kraked_url: Option<String>,
}

impl KrakenResponse {
    fn into_result_url(self) -> Result<String, CompressError> {
        if !self.success {
            let message = self.message.unwrap_or_else(|| "unknown error".to_string());
            return Err(CompressError::ProviderRejected(message));
        }

        self.kraked_url.ok_or_else(|| {
            CompressError::ProviderRejected("response missing kraked_url".to_string())
        })
    }
}

pub struct KrakenCompressor {
    client: reqwest::Client,
    config: KrakenConfig,
}

impl KrakenCompressor {
    pub fn new(client: reqwest::Client, config: KrakenConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl Compressor for KrakenCompressor {
    #[instrument(skip_all, fields(bucket = %event.bucket, name = %event.name))]
    async fn compress(&self, event: &StorageEvent) -> Result<String, CompressError> {
        info!("processing file");

        let url = source_url(&self.config.source_url_base, event);
        let request = KrakenUrlRequest {
            auth: KrakenAuth {
                api_key: &self.config.api_key,
                api_secret: &self.config.api_secret,
            },
            url: &url,
            wait: true,
            lossy: true,
        };

        // Kraken answers failures with a non-2xx status and a regular JSON body, so we read the
        // body whatever the status.
        let response = self
            .client
            .post(&self.config.api_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| CompressError::Transport(e.to_string()))?;

        let status = response.status();
        let kraken_response: KrakenResponse = response
            .json()
            .await
            .map_err(|e| CompressError::Transport(format!("status {status}, {e}")))?;

        debug!(%status, success = kraken_response.success, "kraken responded");

        kraken_response.into_result_url()
    }
}
