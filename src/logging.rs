use std::path::Path;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, writer::BoxMakeWriter},
    layer::SubscriberExt,
    EnvFilter, Layer,
};

pub const LOG_ENV: &str = "LINKUP_LOG";
pub const LOG_DIR_ENV: &str = "LINKUP_LOG_DIR";
pub const DEFAULT_FILTER: &str = "linkup=info,sqlx=warn,tower_http=info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Where console log lines go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Console {
    /// The server logs to stdout.
    Stdout,
    /// CLI subcommands keep stdout for their own output.
    Stderr,
}

impl Console {
    fn writer(self) -> BoxMakeWriter {
        match self {
            Console::Stdout => BoxMakeWriter::new(std::io::stdout),
            Console::Stderr => BoxMakeWriter::new(std::io::stderr),
        }
    }
}

/// Install the global subscriber: JSON lines on the console, plus a daily
/// rolling file under `LINKUP_LOG_DIR` when that is set.
///
/// The returned guard flushes the file sink on drop and must be held for the
/// lifetime of the process.
pub fn init(console: Console) -> anyhow::Result<Option<WorkerGuard>> {
    let _ = tracing_log::LogTracer::init();

    let console_layer = fmt::layer()
        .json()
        .with_target(true)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_writer(console.writer())
        .with_filter(env_filter());

    let (file_layer, guard) = match std::env::var_os(LOG_DIR_ENV) {
        Some(dir) => {
            let (layer, guard) = file_layer(Path::new(&dir))?;
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let subscriber = tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer);
    tracing::subscriber::set_global_default(subscriber)
        .context("install tracing subscriber")?;

    Ok(guard)
}

type BoxedLayer = Box<dyn Layer<tracing_subscriber::Registry> + Send + Sync>;

fn file_layer(dir: &Path) -> anyhow::Result<(BoxedLayer, WorkerGuard)> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("create log directory {}", dir.display()))?;
    let appender = tracing_appender::rolling::daily(dir, "linkup.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let layer = fmt::layer()
        .json()
        .with_target(true)
        .with_ansi(false)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_writer(writer)
        .with_filter(env_filter())
        .boxed();
    Ok((layer, guard))
}
