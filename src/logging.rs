use anyhow::Result;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Keeps the non-blocking file writer alive; dropping it flushes any
/// buffered log lines.
#[must_use]
pub struct LogGuard {
    _file_guard: WorkerGuard,
}

/// Initialize logging to stdout and to an append-mode log file.
///
/// The default level is INFO (DEBUG with `verbose`); a `RUST_LOG` directive
/// overrides it. The file is appended across restarts, rotation is left to
/// the deployment.
pub fn init_logging(log_file: &str, verbose: bool) -> Result<LogGuard> {
    let path = Path::new(log_file);
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("carblur.log");

    let (file_writer, file_guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));

    let default_level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .init();

    Ok(LogGuard {
        _file_guard: file_guard,
    })
}
