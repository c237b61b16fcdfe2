use std::sync::Arc;

use anyhow::Result;
use image_optimizer::{build_env_based_optimizer, env::ENV_CONFIG, log, server};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    log::init(&ENV_CONFIG)?;

    info!("starting image optimizer");

    let optimizer = Arc::new(build_env_based_optimizer(&ENV_CONFIG));

    server::serve(server::router(optimizer), &ENV_CONFIG).await?;

    info!("image optimizer exiting");

    Ok(())
}
