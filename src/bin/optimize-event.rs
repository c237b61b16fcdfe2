//! Runs a single storage event through the optimizer and exits.
//!
//! Usage: `optimize-event [event.json]`, reads the event from stdin when no path is given.

use anyhow::{Context, Result};
use image_optimizer::{build_env_based_optimizer, env::ENV_CONFIG, log, StorageEvent};
use tokio::io::AsyncReadExt;
use tracing::info;

#[tokio::main]
pub async fn main() -> Result<()> {
    log::init(&ENV_CONFIG)?;

    let event_json = match std::env::args().nth(1) {
        Some(path) => tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("failed to read event from {path}"))?,
        None => {
            let mut event_json = String::new();
            tokio::io::stdin()
                .read_to_string(&mut event_json)
                .await
                .context("failed to read event from stdin")?;
            event_json
        }
    };

    let event: StorageEvent =
        serde_json::from_str(&event_json).context("failed to parse storage event")?;

    let optimizer = build_env_based_optimizer(&ENV_CONFIG);
    let outcome = optimizer.handle(&event).await?;

    info!(%outcome, bucket = %event.bucket, name = %event.name, "finished");

    Ok(())
}
