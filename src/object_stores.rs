//! Events can name any bucket, `object_store` stores are bound to one. These build or hand out a
//! store per bucket.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use anyhow::{anyhow, Result};
use object_store::{gcp::GoogleCloudStorageBuilder, memory::InMemory, ObjectStore};
use tracing::{debug, info};

use crate::env::EnvConfig;

pub trait BucketStores: Send + Sync {
    fn store_for(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>>;
}

/// Google Cloud Storage, credentials come from the usual `GOOGLE_*` env vars or the metadata
/// server when running on GCP.
#[derive(Debug, Default)]
pub struct GcsStores;

impl BucketStores for GcsStores {
    fn store_for(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>> {
        debug!(bucket, "building gcs store");
        let store = GoogleCloudStorageBuilder::from_env()
            .with_bucket_name(bucket)
            .build()?;
        Ok(Arc::new(store))
    }
}

/// One in-memory store per bucket, handed out again on every call. For local runs and tests.
#[derive(Debug, Default)]
pub struct MemoryStores {
    stores: Mutex<HashMap<String, Arc<InMemory>>>,
}

impl MemoryStores {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bucket(&self, bucket: &str) -> Result<Arc<InMemory>> {
        let mut stores = self
            .stores
            .lock()
            .map_err(|_| anyhow!("memory stores lock poisoned"))?;
        let store = stores
            .entry(bucket.to_string())
            .or_insert_with(|| Arc::new(InMemory::new()));
        Ok(store.clone())
    }
}

impl BucketStores for MemoryStores {
    fn store_for(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>> {
        Ok(self.bucket(bucket)?)
    }
}

pub fn build_env_based_stores(env_config: &EnvConfig) -> Arc<dyn BucketStores> {
    if env_config.use_memory_store {
        info!("using in-memory object stores");
        return Arc::new(MemoryStores::new());
    }

    info!("using google cloud storage");
    Arc::new(GcsStores)
}
