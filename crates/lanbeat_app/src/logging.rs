use std::path::Path;

use anyhow::Result;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Default filter: quiet enough not to drown the interactive console.
pub fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "debug,lanbeat_network=debug,lanbeat_app=debug"
    } else {
        "warn"
    }
}

/// Initializes logging to stderr, plus a daily-rotated `lanbeat.<date>` file
/// when `logs_dir` is given. `RUST_LOG` overrides the default filter.
///
/// The returned guard (if any) must be kept alive for the duration of the
/// process so buffered file output is flushed.
pub fn init_logging(verbose: bool, logs_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));

    let (file_layer, guard) = match logs_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;

            // File appender: daily rotation
            let file_appender = tracing_appender::rolling::daily(dir, "lanbeat");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            let layer = fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_ansi(false)
                .with_writer(non_blocking);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(
            fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_writer(std::io::stderr)
                .compact(),
        )
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {e}"))?;

    Ok(guard)
}
