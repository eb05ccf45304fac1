//! Pool session management

use std::fmt;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Session ID type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Create a new session ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// First eight characters, for log lines
    pub fn short(&self) -> String {
        let mut s = self.0.simple().to_string();
        s.truncate(8);
        s
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Protocol family a session speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// XMRig JSON-RPC (`login`/`submit`)
    XMRig,
    /// Stratum v1 (`mining.*`)
    Stratum,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::XMRig => write!(f, "xmrig"),
            Protocol::Stratum => write!(f, "stratum"),
        }
    }
}

/// State of one client connection
#[derive(Debug)]
pub struct PoolSession {
    /// Session ID
    pub id: SessionId,
    /// Remote address
    pub peer: SocketAddr,
    /// Protocol family, set by `login` or `mining.subscribe`
    pub protocol: Option<Protocol>,
    /// Worker identity announced by the miner
    pub worker: Option<String>,
    /// Shares accepted on this connection
    pub shares_accepted: u64,
    /// When the connection was accepted
    pub connected_at: Instant,
}

impl PoolSession {
    /// Create a new session
    pub fn new(peer: SocketAddr) -> Self {
        Self {
            id: SessionId::new(),
            peer,
            protocol: None,
            worker: None,
            shares_accepted: 0,
            connected_at: Instant::now(),
        }
    }

    /// Record the protocol family.
    ///
    /// Methods from the other family are still served afterwards.
    pub fn mark_protocol(&mut self, protocol: Protocol) {
        if let Some(previous) = self.protocol {
            if previous != protocol {
                tracing::debug!("Session switched protocol from {} to {}", previous, protocol);
            }
        }
        self.protocol = Some(protocol);
    }

    /// Remember the worker identity announced by the miner
    pub fn set_worker(&mut self, worker: impl Into<String>) {
        self.worker = Some(worker.into());
    }

    /// Worker identity for log lines, `-` until one is announced
    pub fn worker_name(&self) -> &str {
        self.worker.as_deref().unwrap_or("-")
    }

    /// Protocol family for log lines, `-` until `login` or `mining.subscribe`
    pub fn protocol_name(&self) -> String {
        self.protocol
            .map_or_else(|| "-".to_string(), |protocol| protocol.to_string())
    }

    /// Count one accepted share
    pub fn record_share(&mut self) {
        self.shares_accepted += 1;
    }

    /// Time since the connection was accepted
    pub fn uptime(&self) -> Duration {
        self.connected_at.elapsed()
    }
}
