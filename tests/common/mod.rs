#![allow(dead_code)]

use std::{
    net::{SocketAddr, TcpListener},
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use anyhow::Result;
use axum::{
    extract::{Path as UrlPath, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router, Server,
};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{future, stream::BoxStream};
use image_optimizer::{
    compressor::{KrakenCompressor, KrakenConfig},
    fetcher::HttpFetcher,
    object_stores::{BucketStores, MemoryStores},
    pipeline::ImageOptimizer,
    StorageEvent,
};
use object_store::{
    memory::InMemory, path::Path as ObjectPath, GetOptions, GetResult, ListResult,
    MultipartUpload, ObjectMeta, ObjectStore, PutMultipartOpts, PutOptions, PutPayload,
    PutResult, UploadPart,
};
use serde_json::{json, Value};

pub const OPTIMIZED_BYTES: &[u8] = b"\x89PNG optimized";

/// Plays both Kraken's URL API and the host Kraken serves results from.
pub struct FakeKraken {
    pub compress_calls: AtomicUsize,
    pub fetch_calls: AtomicUsize,
    pub last_request: Mutex<Option<Value>>,
    response: Mutex<(StatusCode, Value)>,
    result_status: Mutex<StatusCode>,
    result_body: Mutex<Bytes>,
}

impl FakeKraken {
    pub fn compress_calls(&self) -> usize {
        self.compress_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn respond_with(&self, status: StatusCode, body: Value) {
        *self.response.lock().unwrap() = (status, body);
    }

    pub fn fail_results_with(&self, status: StatusCode) {
        *self.result_status.lock().unwrap() = status;
    }

    pub fn serve_result_body(&self, body: Bytes) {
        *self.result_body.lock().unwrap() = body;
    }
}

async fn post_url(
    State(fake): State<Arc<FakeKraken>>,
    Json(request): Json<Value>,
) -> impl IntoResponse {
    fake.compress_calls.fetch_add(1, Ordering::SeqCst);
    fake.last_request.lock().unwrap().replace(request);
    let (status, body) = fake.response.lock().unwrap().clone();
    (status, Json(body))
}

async fn get_result(
    State(fake): State<Arc<FakeKraken>>,
    UrlPath(_name): UrlPath<String>,
) -> impl IntoResponse {
    fake.fetch_calls.fetch_add(1, Ordering::SeqCst);
    let status = *fake.result_status.lock().unwrap();
    if status.is_success() {
        (status, fake.result_body.lock().unwrap().clone())
    } else {
        (status, Bytes::from_static(b"internal error"))
    }
}

pub fn spawn_router(router: Router) -> Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;
    let server = Server::from_tcp(listener)?.serve(router.into_make_service());
    tokio::spawn(server);
    Ok(addr)
}

/// Starts a fake that answers every compression with a result URL pointing back at itself.
pub fn spawn_fake_kraken() -> Result<(Arc<FakeKraken>, String)> {
    let fake = Arc::new(FakeKraken {
        compress_calls: AtomicUsize::new(0),
        fetch_calls: AtomicUsize::new(0),
        last_request: Mutex::new(None),
        response: Mutex::new((StatusCode::OK, json!({}))),
        result_status: Mutex::new(StatusCode::OK),
        result_body: Mutex::new(Bytes::from_static(OPTIMIZED_BYTES)),
    });

    let router = Router::new()
        .route("/v1/url", post(post_url))
        .route("/results/:name", get(get_result))
        .with_state(fake.clone());

    let base = format!("http://{}", spawn_router(router)?);

    fake.respond_with(
        StatusCode::OK,
        json!({
            "success": true,
            "file_name": "a.png",
            "kraked_url": format!("{base}/results/a.png"),
        }),
    );

    Ok((fake, base))
}

pub fn kraken_config(base: &str) -> KrakenConfig {
    KrakenConfig {
        api_key: "test-key".to_string(),
        api_secret: "test-secret".to_string(),
        api_url: format!("{base}/v1/url"),
        source_url_base: "https://storage.googleapis.com".to_string(),
    }
}

pub fn staging_root() -> PathBuf {
    std::env::temp_dir().join(format!("image-optimizer-test-{}", nanoid::nanoid!()))
}

pub fn is_empty_dir(path: &Path) -> bool {
    match std::fs::read_dir(path) {
        Ok(mut entries) => entries.next().is_none(),
        Err(_) => true,
    }
}

pub type TestOptimizer = ImageOptimizer<KrakenCompressor, HttpFetcher, MemoryStores>;

pub fn build_optimizer(base: &str, stores: Arc<MemoryStores>, staging_root: PathBuf) -> TestOptimizer {
    let client = reqwest::Client::new();
    ImageOptimizer::new(
        KrakenCompressor::new(client.clone(), kraken_config(base)),
        HttpFetcher::new(client),
        stores,
        staging_root,
    )
}

pub fn png_event() -> StorageEvent {
    StorageEvent {
        bucket: "b".to_string(),
        name: "a.png".to_string(),
        content_type: "image/png".to_string(),
        ..StorageEvent::default()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UploadFailure {
    None,
    Part,
    Complete,
}

fn injected_error() -> object_store::Error {
    object_store::Error::Generic {
        store: "UploadTracking",
        source: "injected upload failure".into(),
    }
}

/// Counts what happens to multipart uploads and can fail them at a chosen step.
#[derive(Debug, Default)]
pub struct UploadLog {
    pub parts: AtomicUsize,
    pub aborts: AtomicUsize,
    pub completes: AtomicUsize,
}

#[derive(Debug)]
struct TrackedUpload {
    inner: Box<dyn MultipartUpload>,
    failure: UploadFailure,
    log: Arc<UploadLog>,
}

#[async_trait]
impl MultipartUpload for TrackedUpload {
    fn put_part(&mut self, data: PutPayload) -> UploadPart {
        self.log.parts.fetch_add(1, Ordering::SeqCst);
        if self.failure == UploadFailure::Part {
            return Box::pin(future::ready(Err(injected_error())));
        }
        self.inner.put_part(data)
    }

    async fn complete(&mut self) -> object_store::Result<PutResult> {
        self.log.completes.fetch_add(1, Ordering::SeqCst);
        if self.failure == UploadFailure::Complete {
            return Err(injected_error());
        }
        self.inner.complete().await
    }

    async fn abort(&mut self) -> object_store::Result<()> {
        self.log.aborts.fetch_add(1, Ordering::SeqCst);
        self.inner.abort().await
    }
}

/// An in-memory store whose multipart uploads go through `TrackedUpload`.
#[derive(Debug)]
pub struct TrackingStore {
    inner: InMemory,
    failure: UploadFailure,
    log: Arc<UploadLog>,
}

impl std::fmt::Display for TrackingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TrackingStore({})", self.inner)
    }
}

#[async_trait]
impl ObjectStore for TrackingStore {
    async fn put_opts(
        &self,
        location: &ObjectPath,
        payload: PutPayload,
        opts: PutOptions,
    ) -> object_store::Result<PutResult> {
        self.inner.put_opts(location, payload, opts).await
    }

    async fn put_multipart_opts(
        &self,
        location: &ObjectPath,
        opts: PutMultipartOpts,
    ) -> object_store::Result<Box<dyn MultipartUpload>> {
        let inner = self.inner.put_multipart_opts(location, opts).await?;
        Ok(Box::new(TrackedUpload {
            inner,
            failure: self.failure,
            log: self.log.clone(),
        }))
    }

    async fn get_opts(
        &self,
        location: &ObjectPath,
        options: GetOptions,
    ) -> object_store::Result<GetResult> {
        self.inner.get_opts(location, options).await
    }

    async fn delete(&self, location: &ObjectPath) -> object_store::Result<()> {
        self.inner.delete(location).await
    }

    fn list(&self, prefix: Option<&ObjectPath>) -> BoxStream<'_, object_store::Result<ObjectMeta>> {
        self.inner.list(prefix)
    }

    async fn list_with_delimiter(
        &self,
        prefix: Option<&ObjectPath>,
    ) -> object_store::Result<ListResult> {
        self.inner.list_with_delimiter(prefix).await
    }

    async fn copy(&self, from: &ObjectPath, to: &ObjectPath) -> object_store::Result<()> {
        self.inner.copy(from, to).await
    }

    async fn copy_if_not_exists(
        &self,
        from: &ObjectPath,
        to: &ObjectPath,
    ) -> object_store::Result<()> {
        self.inner.copy_if_not_exists(from, to).await
    }
}

/// Every bucket is the same `TrackingStore`.
pub struct TrackingStores {
    pub store: Arc<TrackingStore>,
    pub log: Arc<UploadLog>,
}

impl TrackingStores {
    pub fn new(failure: UploadFailure) -> Self {
        let log = Arc::new(UploadLog::default());
        let store = Arc::new(TrackingStore {
            inner: InMemory::new(),
            failure,
            log: log.clone(),
        });
        Self { store, log }
    }
}

impl BucketStores for TrackingStores {
    fn store_for(&self, _bucket: &str) -> Result<Arc<dyn ObjectStore>> {
        Ok(self.store.clone())
    }
}

pub async fn list_keys(store: &dyn ObjectStore) -> Result<Vec<String>> {
    use futures::TryStreamExt;

    let mut keys: Vec<String> = store
        .list(None)
        .map_ok(|meta| meta.location.to_string())
        .try_collect()
        .await?;
    keys.sort();
    Ok(keys)
}
