//! # Mock Stratum Server
//!
//! A test double for mining pools. Miners connect over TCP and speak either the
//! XMRig JSON-RPC dialect (`login`, `submit`, `getjob`, `keepalived`) or
//! Stratum v1 (`mining.subscribe`, `mining.authorize`, `mining.submit`). The
//! pool hands out deterministic synthetic jobs and accepts every share, so a
//! miner client can be exercised without a real pool or node.
//!
//! ## Architecture
//!
//! [`PoolServer`](stratum::PoolServer) accepts connections and runs one
//! [`Dispatcher`](stratum::Dispatcher) task per connection on a single Tokio
//! runtime. Sessions share only the counters in
//! [`ServerState`](stratum::ServerState).

#![warn(
    missing_docs,
    rust_2018_idioms,
    unused_lifetimes,
    unused_qualifications,
    clippy::all
)]
#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod stratum;
pub mod utils;

pub use crate::error::{Error, Result};
pub use config::{Args, ServerConfig};
pub use stratum::{Job, PoolServer, ServerState, make_job};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
