//! Logging setup
//!
//! Logs go to stderr so the container's stdout can be forwarded untouched.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: filter directives (default: `styx_singularity=warn`,
//!   `styx_singularity=debug` with `--verbose`)
//! - `STYX_LOG_FORMAT`: `pretty` (default) or `json`

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_FORMAT_ENV: &str = "STYX_LOG_FORMAT";

pub fn init_logging(verbose: bool) -> Result<()> {
    let default_directive = if verbose {
        "styx_singularity=debug"
    } else {
        "styx_singularity=warn"
    };
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive))
        .context("Failed to create env filter")?;

    let log_format = std::env::var(LOG_FORMAT_ENV).unwrap_or_else(|_| "pretty".to_string());

    let installed = match log_format.as_str() {
        "json" => {
            // Machine-readable structured logging
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .try_init()
        }
        _ => {
            // Human-readable formatting with colors
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty().with_writer(std::io::stderr))
                .try_init()
        }
    };

    installed.context("Failed to install tracing subscriber")
}
