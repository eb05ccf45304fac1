//! Cross-session server state
//!
//! All sessions share one [`ServerState`] through an `Arc`. Counters are
//! independent atomics; no operation needs more than one of them at a time.

use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Height the first job is generated for
pub const DEFAULT_START_HEIGHT: u64 = 100;

/// Shared counters and the current block height
#[derive(Debug)]
pub struct ServerState {
    height: AtomicU64,
    shares_accepted: AtomicU64,
    shares_rejected: AtomicU64,
    active_sessions: AtomicUsize,
}

/// Point-in-time copy of the server counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ServerStats {
    /// Current block height
    pub height: u64,
    /// Shares accepted across all sessions
    pub shares_accepted: u64,
    /// Shares rejected across all sessions
    pub shares_rejected: u64,
    /// Live connections
    pub active_sessions: usize,
}

impl ServerState {
    /// Create state starting at `start_height`
    pub fn new(start_height: u64) -> Self {
        Self {
            height: AtomicU64::new(start_height),
            shares_accepted: AtomicU64::new(0),
            shares_rejected: AtomicU64::new(0),
            active_sessions: AtomicUsize::new(0),
        }
    }

    /// Current block height
    pub fn height(&self) -> u64 {
        self.height.load(Ordering::Relaxed)
    }

    /// Move to the next block height, returning it
    pub fn advance_height(&self) -> u64 {
        self.height.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Count an accepted share, returning the new total
    pub fn record_accepted(&self) -> u64 {
        self.shares_accepted.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Shares accepted so far
    pub fn shares_accepted(&self) -> u64 {
        self.shares_accepted.load(Ordering::Relaxed)
    }

    /// Shares rejected so far.
    ///
    /// Every submission is accepted, so this stays at zero.
    pub fn shares_rejected(&self) -> u64 {
        self.shares_rejected.load(Ordering::Relaxed)
    }

    /// Number of live sessions
    pub fn active_sessions(&self) -> usize {
        self.active_sessions.load(Ordering::Relaxed)
    }

    /// Register a live session; it is released when the guard drops
    pub fn open_session(self: &Arc<Self>) -> SessionGuard {
        self.active_sessions.fetch_add(1, Ordering::Relaxed);
        SessionGuard {
            state: Arc::clone(self),
        }
    }

    /// Copy all counters
    pub fn snapshot(&self) -> ServerStats {
        ServerStats {
            height: self.height(),
            shares_accepted: self.shares_accepted(),
            shares_rejected: self.shares_rejected(),
            active_sessions: self.active_sessions(),
        }
    }
}

impl Default for ServerState {
    fn default() -> Self {
        Self::new(DEFAULT_START_HEIGHT)
    }
}

/// Keeps a session counted in [`ServerState::active_sessions`]
#[derive(Debug)]
pub struct SessionGuard {
    state: Arc<ServerState>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.state.active_sessions.fetch_sub(1, Ordering::Relaxed);
    }
}
