//! Tracing setup for the CLI.
//!
//! Console output goes to stderr so it never interleaves with command output
//! on stdout. When the project has a log directory, a daily-rolling JSON log
//! is written there as well, at debug level for waypoint's own crates.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Variable consulted before `RUST_LOG` for the console filter.
pub const LOG_ENV: &str = "WAYPOINT_LOG";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

fn console_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| {
            EnvFilter::new(if verbose {
                "waypoint=debug,waypoint_common=debug,warn"
            } else {
                "warn"
            })
        })
}

/// Install the global subscriber.
///
/// The returned guard flushes the file writer on drop; hold it until the
/// process exits. Calling this twice is harmless: the second call is ignored.
pub fn init(format: LogFormat, verbose: bool, log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let console = match format {
        LogFormat::Text => fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_filter(console_filter(verbose))
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(console_filter(verbose))
            .boxed(),
    };

    let (file, guard) = match log_dir.filter(|dir| dir.is_dir()) {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "waypoint.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .json()
                .with_writer(writer)
                .with_filter(EnvFilter::new("waypoint=debug,waypoint_common=debug,info"))
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let _ = tracing_subscriber::registry()
        .with(console)
        .with(file)
        .try_init();
    guard
}
