use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router, Server,
};
use serde_json::json;
use tracing::{error, info};

use crate::{
    compressor::Compressor,
    env::{Env, EnvConfig},
    event::StorageEvent,
    fetcher::Fetcher,
    object_stores::BucketStores,
    pipeline::ImageOptimizer,
};

async fn get_livez() -> StatusCode {
    StatusCode::OK
}

/// Retryable failures answer 503 so the trigger redelivers, provider rejections answer 422 so it
/// doesn't.
async fn post_event<C, F, S>(
    State(optimizer): State<Arc<ImageOptimizer<C, F, S>>>,
    Json(event): Json<StorageEvent>,
) -> impl IntoResponse
where
    C: Compressor + 'static,
    F: Fetcher + 'static,
    S: BucketStores + ?Sized + 'static,
{
    match optimizer.handle(&event).await {
        Ok(outcome) => (
            StatusCode::OK,
            Json(json!({ "outcome": outcome.to_string() })),
        ),
        Err(e) => {
            let retryable = e.is_retryable();
            error!(bucket = %event.bucket, name = %event.name, retryable, "{e}");
            let status = if retryable {
                StatusCode::SERVICE_UNAVAILABLE
            } else {
                StatusCode::UNPROCESSABLE_ENTITY
            };
            (
                status,
                Json(json!({ "error": e.to_string(), "retryable": retryable })),
            )
        }
    }
}

pub fn router<C, F, S>(optimizer: Arc<ImageOptimizer<C, F, S>>) -> Router
where
    C: Compressor + 'static,
    F: Fetcher + 'static,
    S: BucketStores + ?Sized + 'static,
{
    Router::new()
        .route("/", post(post_event::<C, F, S>))
        .route("/livez", get(get_livez))
        .with_state(optimizer)
}

pub async fn serve(router: Router, env_config: &EnvConfig) -> Result<()> {
    let address = match env_config.env {
        // Developing locally we don't want to expose our server to the world.
        // This also avoids the macOS firewall prompt.
        Env::Dev => "127.0.0.1",
        Env::Stag | Env::Prod => "0.0.0.0",
    };

    let port = &env_config.port;
    info!(address, %port, "server listening");

    let socket_addr: SocketAddr = format!("{address}:{port}")
        .parse()
        .context("invalid listen address")?;

    Server::bind(&socket_addr)
        .serve(router.into_make_service())
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(%e, "failed to listen for shutdown signal");
            }
        })
        .await
        .context("running server")
}
