//! # Structured Logging
//!
//! `tracing` subscriber setup for the server binary. Filtering follows
//! `RUST_LOG` when set, otherwise the per-command defaults passed by
//! `main`. All log lines go to stderr: stdout belongs to command output
//! (the `balances` table, `version` info).

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable output for terminals.
    Pretty,
    /// One JSON object per line, for log aggregation.
    Json,
}

impl LogFormat {
    /// Accepts "json" (any casing) for JSON; everything else is pretty.
    pub fn from_str_lossy(s: &str) -> Self {
        if s.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        }
    }
}

/// Installs the global subscriber. Call once from `main`; a second call
/// panics.
///
/// `default_directives` is the `EnvFilter` directive string used when
/// `RUST_LOG` is absent, e.g. `"tracker_server=info,scholar_tracker=info"`.
pub fn init_logging(default_directives: &str, format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));
    let base = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Pretty => base
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .init(),
        LogFormat::Json => base
            .with(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_writer(std::io::stderr)
                    .with_target(true),
            )
            .init(),
    }

    tracing::debug!(?format, "logging initialized");
}
