use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

pub const LOG_FILE_NAME: &str = "k8s-keeper.log";

/// Log to stderr and to `<work_dir>/k8s-keeper.log`.
///
/// `RUST_LOG` overrides the level; otherwise `info`, or `debug` with `--debug`.
/// The returned guard flushes the file writer when dropped.
pub fn init(work_dir: &Path, debug: bool) -> std::io::Result<WorkerGuard> {
    std::fs::create_dir_all(work_dir)?;
    let file_appender = tracing_appender::rolling::never(work_dir, LOG_FILE_NAME);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let default_level = if debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false),
        )
        .init();

    Ok(guard)
}
