//! Structured logging setup and helpers
//!
//! The server logs through `tracing`. Each connection runs inside a `session`
//! span so every event from a dispatcher carries the session id and peer.

use clap::ValueEnum;
use std::net::SocketAddr;
use tracing::{Span, info_span};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Maximum number of characters of a wire line included in a log event
pub const PREVIEW_CHARS: usize = 200;

/// Output format of the log subscriber
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Single-line human readable output
    #[default]
    Plain,
    /// Multi-line output with file and line numbers
    Pretty,
    /// One JSON object per event
    Json,
}

/// Install the global tracing subscriber.
///
/// `level` is an `EnvFilter` directive; an invalid directive falls back to `info`.
pub fn init_logging(level: &str, format: LogFormat) {
    let env_filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));

    match format {
        LogFormat::Json => {
            let fmt_layer = fmt::layer().json().with_target(false);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt_layer)
                .init();
        }
        LogFormat::Pretty => {
            let fmt_layer = fmt::layer()
                .pretty()
                .with_target(false)
                .with_file(true)
                .with_line_number(true);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt_layer)
                .init();
        }
        LogFormat::Plain => {
            let fmt_layer = fmt::layer().with_target(false);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt_layer)
                .init();
        }
    }
}

/// Span wrapping the lifetime of one client connection
pub fn session_span(session_id: &str, peer: SocketAddr) -> Span {
    info_span!("session", id = %session_id, peer = %peer)
}

/// Truncate a wire line for logging, respecting char boundaries
pub fn preview(line: &str) -> &str {
    match line.char_indices().nth(PREVIEW_CHARS) {
        Some((idx, _)) => &line[..idx],
        None => line,
    }
}
