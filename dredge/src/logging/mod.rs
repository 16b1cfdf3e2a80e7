//! Logging setup.
//!
//! Console output (plain or JSON) plus an optional daily rolling file.
//! Timestamps use the local timezone.

use chrono::Local;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    fmt::{self, format::Writer, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::config::LogConfig;
use crate::{Error, Result};

/// Default log filter directive.
pub const DEFAULT_LOG_FILTER: &str = "dredge=info,twitch_irc=info,sqlx=warn,tower_http=warn";

/// Prefix of rolling log file names (`dredge.log.YYYY-MM-DD`).
const LOG_FILE_PREFIX: &str = "dredge.log";

#[derive(Debug, Clone, Copy)]
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

/// Resolve the filter: `RUST_LOG` first, then the config file, then the default.
fn build_filter(config: &LogConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let directive = config.filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER);
    EnvFilter::try_new(directive)
        .map_err(|e| Error::config(format!("invalid log filter '{directive}': {e}")))
}

/// Install the global subscriber.
///
/// The returned guard flushes the file writer on drop and must be kept alive
/// for the lifetime of the process.
pub fn init(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let filter = build_filter(config)?;

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    if config.json {
        layers.push(fmt::layer().json().with_timer(LocalTimer).boxed());
    } else {
        layers.push(fmt::layer().with_timer(LocalTimer).boxed());
    }

    let guard = match config.directory.as_deref() {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            layers.push(
                fmt::layer()
                    .with_ansi(false)
                    .with_timer(LocalTimer)
                    .with_writer(writer)
                    .boxed(),
            );
            Some(guard)
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(layers.with_filter(filter))
        .try_init()
        .map_err(|e| Error::Other(format!("failed to install tracing subscriber: {e}")))?;

    Ok(guard)
}
