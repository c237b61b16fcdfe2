use anyhow::{anyhow, Result};
use tracing_subscriber::{fmt, EnvFilter};

use crate::env::{Env, EnvConfig};

/// Used when `RUST_LOG` is unset. Every invocation logs whether it skipped or replaced its object,
/// at info.
const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, PartialEq, Eq)]
enum LogFormat {
    Pretty,
    Json,
}

/// Humans read dev logs, the log collector reads stag and prod logs. `PRETTY_PRINT` overrides.
fn log_format(env_config: &EnvConfig) -> LogFormat {
    match (env_config.pretty_print, &env_config.env) {
        (true, _) | (false, Env::Dev) => LogFormat::Pretty,
        (false, Env::Stag | Env::Prod) => LogFormat::Json,
    }
}

pub fn init(env_config: &EnvConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let builder = fmt::Subscriber::builder().with_env_filter(env_filter);

    match log_format(env_config) {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    }
    .map_err(|e| anyhow!("failed to set global default subscriber: {e}"))
}
