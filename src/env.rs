//! Fns to read variables from the environment more conveniently and help other functions figure
//! out what environment they're running in.

use std::{env, path::PathBuf};

use lazy_static::lazy_static;
use tracing::{debug, warn};

use crate::compressor::{KrakenConfig, KRAKEN_API_URL, SOURCE_URL_BASE};

const SECRET_LOG_BLACKLIST: [&str; 2] = ["KRAKEN_API_KEY", "KRAKEN_SECRET_KEY"];

fn obfuscate_if_secret(blacklist: &[&str], key: &str, value: &str) -> String {
    if blacklist.contains(&key) {
        let mut last_four = value.to_string();
        last_four.drain(0..value.len().saturating_sub(4));
        format!("****{last_four}")
    } else {
        value.to_string()
    }
}

/// Get an environment variable, encoding found or missing as Option, and panic otherwise.
pub fn get_env_var(key: &str) -> Option<String> {
    let var = match env::var(key) {
        Err(env::VarError::NotPresent) => None,
        Err(err) => panic!("{err}"),
        Ok(var) => Some(var),
    };

    if let Some(ref existing_var) = var {
        let output = obfuscate_if_secret(&SECRET_LOG_BLACKLIST, key, existing_var);
        debug!("env var {key}: {output}");
    } else {
        debug!("env var {key} requested but not found")
    };

    var
}

/// Get an environment variable we can't run without.
pub fn get_env_var_unsafe(key: &str) -> String {
    get_env_var(key).unwrap_or_else(|| panic!("{key} should be in env"))
}

pub fn get_env_bool(key: &str) -> bool {
    let flag = get_env_var(key).map_or(false, |var| var.to_lowercase() == "true");
    debug!("env flag {key}: {flag}");
    flag
}

/// Some things are different between environments. Log formats, addresses we bind to, stores we
/// write to. This enum is the main way to create these branches in our logic.
#[derive(Debug, PartialEq, Eq)]
pub enum Env {
    Dev,
    Prod,
    Stag,
}

pub fn get_env() -> Env {
    let env_str = get_env_var("ENV");
    match env_str {
        None => {
            warn!("no ENV in env, assuming Dev");
            Env::Dev
        }
        Some(str) => match str.as_ref() {
            "dev" => Env::Dev,
            "development" => Env::Dev,
            "stag" => Env::Stag,
            "staging" => Env::Stag,
            "prod" => Env::Prod,
            "production" => Env::Prod,
            _ => {
                panic!("ENV present: {str}, but not one of dev, stag, prod, panicking!")
            }
        },
    }
}

#[derive(Debug)]
pub struct EnvConfig {
    pub env: Env,
    pub kraken: KrakenConfig,
    pub port: String,
    pub pretty_print: bool,
    pub staging_root: PathBuf,
    pub use_memory_store: bool,
}

impl EnvConfig {
    /// Reads the config once. Kraken credentials are required; everything else has a default.
    pub fn from_env() -> Self {
        let kraken = KrakenConfig {
            api_key: get_env_var_unsafe("KRAKEN_API_KEY"),
            api_secret: get_env_var_unsafe("KRAKEN_SECRET_KEY"),
            api_url: get_env_var("KRAKEN_API_URL").unwrap_or_else(|| KRAKEN_API_URL.to_string()),
            source_url_base: get_env_var("SOURCE_URL_BASE")
                .unwrap_or_else(|| SOURCE_URL_BASE.to_string()),
        };

        Self {
            env: get_env(),
            kraken,
            port: get_env_var("PORT").unwrap_or_else(|| "3003".to_string()),
            pretty_print: get_env_bool("PRETTY_PRINT"),
            staging_root: get_env_var("STAGING_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(env::temp_dir),
            use_memory_store: get_env_bool("USE_MEMORY_STORE"),
        }
    }
}

lazy_static! {
    pub static ref ENV_CONFIG: EnvConfig = EnvConfig::from_env();
}
