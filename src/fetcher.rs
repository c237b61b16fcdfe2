use std::path::Path;

use async_trait::async_trait;
use futures::TryStreamExt;
use thiserror::Error;
use tokio::{fs, io::AsyncWriteExt};
use tracing::{debug, instrument};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to download optimized image: {0}")]
    Network(#[from] reqwest::Error),
    #[error("failed to stage optimized image: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Downloads `url` into `destination`, creating missing parent directories.
    async fn fetch(&self, url: &str, destination: &Path) -> Result<(), FetchError>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    #[instrument(skip(self))]
    async fn fetch(&self, url: &str, destination: &Path) -> Result<(), FetchError> {
        let response = self.client.get(url).send().await?.error_for_status()?;

        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = fs::File::create(destination).await?;
        let mut body = response.bytes_stream();
        let mut size = 0;

        while let Some(chunk) = body.try_next().await? {
            size += chunk.len();
            file.write_all(&chunk).await?;
        }

        // Flush before the handle drops, tokio files write in the background otherwise.
        file.flush().await?;

        debug!(size, "staged optimized image");

        Ok(())
    }
}
