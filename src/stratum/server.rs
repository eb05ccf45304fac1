//! Pool server: listener, per-connection tasks and the height ticker

use super::dispatcher::{Dispatcher, DispatcherConfig};
use super::session::PoolSession;
use super::state::{ServerState, ServerStats};
use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::utils::logging::session_span;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, warn};

/// Pause after a failed `accept` before trying again
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Mock pool accepting XMRig and Stratum v1 miners on one port
pub struct PoolServer {
    config: ServerConfig,
    state: Arc<ServerState>,
    listener: TcpListener,
}

impl PoolServer {
    /// Validate `config` and bind its listen address
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        config.validate()?;

        let addr = config.listen_addr();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::network(format!("Failed to bind to {}: {}", addr, e)))?;

        info!("Pool server listening on {}", listener.local_addr()?);

        Ok(Self {
            state: Arc::new(ServerState::new(config.start_height)),
            config,
            listener,
        })
    }

    /// Address actually bound, useful with port 0
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Shared counters
    pub fn state(&self) -> Arc<ServerState> {
        Arc::clone(&self.state)
    }

    /// Accept connections until `shutdown` is cancelled.
    ///
    /// On shutdown the ticker and every session are stopped and awaited, and
    /// the final counters are returned.
    pub async fn run(self, shutdown: CancellationToken) -> Result<ServerStats> {
        let ticker = spawn_height_ticker(
            Arc::clone(&self.state),
            self.config.height_interval(),
            shutdown.clone(),
        );

        let dispatcher_config = DispatcherConfig {
            idle_timeout: self.config.idle_timeout(),
            notify_delay: self.config.notify_delay(),
            max_line_length: self.config.max_line_length,
        };
        let mut sessions = JoinSet::new();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Shutting down pool server");
                    break;
                }

                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        sessions.spawn(serve_connection(
                            stream,
                            peer,
                            Arc::clone(&self.state),
                            dispatcher_config,
                            shutdown.clone(),
                        ));
                    }
                    Err(e) => {
                        warn!("Failed to accept connection: {}", e);
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },

                Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                    if let Err(e) = joined {
                        error!("Session task failed: {}", e);
                    }
                }
            }
        }

        while let Some(joined) = sessions.join_next().await {
            if let Err(e) = joined {
                error!("Session task failed: {}", e);
            }
        }
        if let Err(e) = ticker.await {
            error!("Height ticker failed: {}", e);
        }

        Ok(self.state.snapshot())
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    state: Arc<ServerState>,
    config: DispatcherConfig,
    shutdown: CancellationToken,
) {
    let session = PoolSession::new(peer);
    let span = session_span(&session.id.short(), peer);

    async move {
        let _guard = state.open_session();
        info!("New connection, session={}", session.id);

        let mut dispatcher = Dispatcher::new(session, Arc::clone(&state), config);
        match dispatcher.run(stream, shutdown).await {
            Ok(()) => {}
            Err(Error::Timeout(reason)) => info!("Read timeout: {}", reason),
            Err(e) if e.is_connection_reset() => info!("Connection reset"),
            Err(e) => warn!("Session error: {}", e),
        }

        let session = dispatcher.session();
        info!(
            "Disconnected after {:.1}s (protocol={}, worker={}, session_shares={}, accepted={}, rejected={})",
            session.uptime().as_secs_f64(),
            session.protocol_name(),
            session.worker_name(),
            session.shares_accepted,
            state.shares_accepted(),
            state.shares_rejected()
        );
    }
    .instrument(span)
    .await
}

/// Advance the block height every `period` until `shutdown` is cancelled.
///
/// Connected sessions are not sent the new job.
fn spawn_height_ticker(
    state: Arc<ServerState>,
    period: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("Height ticker stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let height = state.advance_height();
                    info!("New block template height={}", height);
                }
            }
        }
    })
}
