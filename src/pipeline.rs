//! Runs one storage event through guard, filter, compress, fetch and republish.
//!
//! Stages run strictly one after the other, each needs the output of the previous one. Nothing is
//! shared between invocations except the compressed marker we leave on the object, so two
//! invocations racing on the same unprocessed object may both compress it. That wastes a
//! compression but never corrupts the object.

use std::{
    fmt::{self, Display, Formatter},
    path::{Path, PathBuf},
    sync::Arc,
};

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::{
    compressor::{CompressError, Compressor},
    event::{is_allowed_content_type, StorageEvent},
    fetcher::{FetchError, Fetcher},
    object_stores::BucketStores,
    republisher::{PublishError, Republisher},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    AlreadyProcessed,
    UnsupportedContentType,
}

/// Both outcomes are successes to whoever invoked us.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Skipped(SkipReason),
    Done,
}

impl Display for Outcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Skipped(SkipReason::AlreadyProcessed) => write!(f, "skipped_already_processed"),
            Outcome::Skipped(SkipReason::UnsupportedContentType) => {
                write!(f, "skipped_unsupported_content_type")
            }
            Outcome::Done => write!(f, "done"),
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Compress(#[from] CompressError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Publish(#[from] PublishError),
}

impl PipelineError {
    /// Whether redelivering the same event could succeed. A provider rejection or an object name
    /// we can't address will fail the same way again, everything else is transport or storage
    /// trouble.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            PipelineError::Compress(CompressError::ProviderRejected(_))
                | PipelineError::Publish(PublishError::InvalidName { .. })
        )
    }
}

/// The staged file inside an invocation's directory. Object names can be longer than a file
/// name may be, so they never end up on disk.
const STAGED_FILE_NAME: &str = "object";

pub struct ImageOptimizer<C: Compressor, F: Fetcher, S: BucketStores + ?Sized> {
    compressor: C,
    fetcher: F,
    republisher: Republisher<S>,
    staging_root: PathBuf,
}

impl<C: Compressor, F: Fetcher, S: BucketStores + ?Sized> ImageOptimizer<C, F, S> {
    pub fn new(compressor: C, fetcher: F, stores: Arc<S>, staging_root: PathBuf) -> Self {
        Self {
            compressor,
            fetcher,
            republisher: Republisher::new(stores),
            staging_root,
        }
    }

    #[instrument(skip_all, fields(bucket = %event.bucket, name = %event.name))]
    pub async fn handle(&self, event: &StorageEvent) -> Result<Outcome, PipelineError> {
        // Our own replace produces a new event for the same object, this is where it ends.
        if event.is_already_processed() {
            info!("not processing file, already compressed");
            return Ok(Outcome::Skipped(SkipReason::AlreadyProcessed));
        }

        if !is_allowed_content_type(&event.content_type) {
            info!(content_type = %event.content_type, "not accepted content-type");
            return Ok(Outcome::Skipped(SkipReason::UnsupportedContentType));
        }

        let result_url = self.compressor.compress(event).await?;
        debug!(%result_url, "compressed");

        // Every invocation gets its own directory so concurrent invocations for the same object
        // never share a staged file.
        let invocation_dir = self.staging_root.join(nanoid::nanoid!());
        let result = self
            .fetch_and_republish(event, &result_url, &invocation_dir)
            .await;

        match tokio::fs::remove_dir_all(&invocation_dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(dir = %invocation_dir.display(), %e, "failed to clean up staging"),
        }

        result?;

        Ok(Outcome::Done)
    }

    async fn fetch_and_republish(
        &self,
        event: &StorageEvent,
        result_url: &str,
        invocation_dir: &Path,
    ) -> Result<(), PipelineError> {
        let staged = invocation_dir.join(STAGED_FILE_NAME);

        self.fetcher.fetch(result_url, &staged).await?;
        debug!(staged = %staged.display(), "fetched");

        self.republisher.republish(event, &staged).await?;

        Ok(())
    }
}
