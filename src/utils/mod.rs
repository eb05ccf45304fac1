//! Utility functions and helpers

pub mod logging;

pub use logging::{LogFormat, init_logging};

use std::time::{SystemTime, UNIX_EPOCH};

/// Get current timestamp in seconds since the Unix epoch.
///
/// A clock set before the epoch reads as zero.
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
