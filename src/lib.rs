//! # Image Optimizer
//! Listens for object-finalize events on a storage bucket, has Kraken.io lossy-compress the image,
//! and replaces the original object with the result.
//!
//! ## Pipeline
//! - Skip objects that carry our `compressed: yes` marker.
//! - Skip anything that isn't one of a handful of raster image content types.
//! - Have Kraken compress the public URL of the object, waiting for the result URL.
//! - Download the result into a per-invocation staging directory.
//! - Overwrite the original object with the result, keeping its headers and metadata and adding
//!   the marker.
//!
//! Overwriting the object triggers another event for it. That event carries the marker and is
//! skipped, which is what keeps the function from compressing its own output forever.
pub mod compressor;
pub mod env;
pub mod event;
pub mod fetcher;
pub mod log;
pub mod object_stores;
pub mod pipeline;
pub mod republisher;
pub mod server;

use std::sync::Arc;

use compressor::KrakenCompressor;
use env::EnvConfig;
use fetcher::HttpFetcher;
use object_stores::BucketStores;
use pipeline::ImageOptimizer;

pub use event::StorageEvent;
pub use pipeline::{Outcome, PipelineError, SkipReason};

pub type EnvOptimizer = ImageOptimizer<KrakenCompressor, HttpFetcher, dyn BucketStores>;

/// The optimizer as deployed, Kraken for compression, plain HTTP for fetching, env picked stores.
pub fn build_env_based_optimizer(env_config: &EnvConfig) -> EnvOptimizer {
    let client = reqwest::Client::new();
    let stores: Arc<dyn BucketStores> = object_stores::build_env_based_stores(env_config);
    ImageOptimizer::new(
        KrakenCompressor::new(client.clone(), env_config.kraken.clone()),
        HttpFetcher::new(client),
        stores,
        env_config.staging_root.clone(),
    )
}
