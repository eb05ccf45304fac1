//! Per-connection request dispatcher
//!
//! A [`Dispatcher`] owns one client connection. It reads newline-delimited
//! JSON, decodes each line into a [`Request`], answers it, and writes any
//! deferred `mining.notify` messages on the same socket. Requests are handled
//! strictly in arrival order and every reply is flushed before the next read.

use super::job::make_job;
use super::protocol::{
    LoginResult, PoolNotification, PoolRequest, PoolResponse, Request, StatusResult,
    subscribe_result,
};
use super::session::{PoolSession, Protocol};
use super::state::ServerState;
use crate::error::{Error, Result};
use crate::utils::logging::preview;
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::time::{Instant, sleep};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Timing and framing limits for one connection
#[derive(Debug, Clone, Copy)]
pub struct DispatcherConfig {
    /// Close the connection after this long without an inbound line
    pub idle_timeout: Duration,
    /// Delay between an authorize reply and its `mining.notify`
    pub notify_delay: Duration,
    /// Longest inbound line accepted, in bytes
    pub max_line_length: usize,
}

type LineSink = FramedWrite<OwnedWriteHalf, LinesCodec>;

/// Protocol state machine for one connection
pub struct Dispatcher {
    session: PoolSession,
    state: Arc<ServerState>,
    config: DispatcherConfig,
    pending_notifies: VecDeque<Instant>,
}

impl Dispatcher {
    /// Create a dispatcher for a freshly accepted session
    pub fn new(session: PoolSession, state: Arc<ServerState>, config: DispatcherConfig) -> Self {
        Self {
            session,
            state,
            config,
            pending_notifies: VecDeque::new(),
        }
    }

    /// Session served by this dispatcher
    pub fn session(&self) -> &PoolSession {
        &self.session
    }

    /// Number of `mining.notify` messages scheduled but not yet written
    pub fn pending_notifies(&self) -> usize {
        self.pending_notifies.len()
    }

    /// Serve the connection until the peer closes it, it idles out, an I/O
    /// error occurs, or `shutdown` is cancelled.
    ///
    /// Peer close and shutdown return `Ok`. Idle expiry returns
    /// [`Error::Timeout`] without writing anything to the peer. Scheduled
    /// notifies that have not fired are dropped with the session.
    pub async fn run(&mut self, stream: TcpStream, shutdown: CancellationToken) -> Result<()> {
        let (reader, writer) = stream.into_split();
        let mut lines = FramedRead::new(
            reader,
            LinesCodec::new_with_max_length(self.config.max_line_length),
        );
        let mut sink = FramedWrite::new(writer, LinesCodec::new());

        let idle_timeout = self.config.idle_timeout;
        let idle = sleep(idle_timeout);
        tokio::pin!(idle);
        let notify_timer = sleep(Duration::ZERO);
        tokio::pin!(notify_timer);

        loop {
            if let Some(deadline) = self.pending_notifies.front() {
                notify_timer.as_mut().reset(*deadline);
            }

            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    debug!("Closing session for server shutdown");
                    return Ok(());
                }

                () = &mut notify_timer, if !self.pending_notifies.is_empty() => {
                    self.pending_notifies.pop_front();
                    self.send_notify(&mut sink).await?;
                }

                line = lines.next() => {
                    let line = match line {
                        Some(line) => line?,
                        None => {
                            debug!("Peer closed connection");
                            return Ok(());
                        }
                    };
                    idle.as_mut().reset(Instant::now() + idle_timeout);

                    if let Some(reply) = self.process_line(&line)? {
                        send_line(&mut sink, &reply).await?;
                    }
                }

                () = &mut idle => {
                    return Err(Error::timeout(format!(
                        "no request for {}s",
                        idle_timeout.as_secs()
                    )));
                }
            }
        }
    }

    /// Decode and answer one raw line.
    ///
    /// Blank and malformed lines produce no reply.
    pub fn process_line(&mut self, raw: &str) -> Result<Option<PoolResponse>> {
        let line = raw.trim();
        if line.is_empty() {
            return Ok(None);
        }
        debug!("<- {}", preview(line));

        match Request::from_json(line) {
            Ok(request) => self.handle(request).map(Some),
            Err(e) if e.is_recoverable() => {
                warn!("Discarding malformed line: {}", e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Answer one decoded request
    pub fn handle(&mut self, request: Request) -> Result<PoolResponse> {
        let Request { id, call } = request;
        debug!("Dispatching {}", call.method().as_str());

        let response = match call {
            PoolRequest::Login(params) => {
                self.session.mark_protocol(Protocol::XMRig);
                self.session.set_worker(params.worker_id());
                info!(
                    "XMRig login: wallet={}, worker={}, agent={}, algo={}",
                    params.login.as_deref().unwrap_or("unknown"),
                    params.rigid.as_deref().unwrap_or("default"),
                    params.agent.as_deref().unwrap_or("unknown"),
                    params.pass.as_deref().unwrap_or(""),
                );

                let result = LoginResult {
                    id: self.session.id.to_string(),
                    job: make_job(self.state.height()),
                    status: "OK".to_string(),
                };
                PoolResponse::success(id, serde_json::to_value(result)?)
            }

            PoolRequest::Submit(params) => {
                let total = self.accept_share();
                info!(
                    "XMRig submit: worker={}, job={}, nonce={}, result={}, shares_accepted={}",
                    self.session.worker_name(),
                    params.job_id.as_deref().unwrap_or("?"),
                    params.nonce.as_deref().unwrap_or("?"),
                    params.result.as_deref().unwrap_or("?"),
                    total
                );
                PoolResponse::success(id, serde_json::to_value(StatusResult::ok())?)
            }

            PoolRequest::Subscribe => {
                self.session.mark_protocol(Protocol::Stratum);
                info!("Stratum subscribe");
                PoolResponse::success(id, subscribe_result(&self.session.id.to_string()))
            }

            PoolRequest::Authorize(params) => {
                let username = params.username.as_deref().unwrap_or("?");
                info!(
                    "Stratum authorize: user={}, pass={}",
                    username,
                    params.password.as_deref().unwrap_or("")
                );
                self.session.set_worker(username);
                self.pending_notifies
                    .push_back(Instant::now() + self.config.notify_delay);
                PoolResponse::success(id, Value::Bool(true))
            }

            PoolRequest::MiningSubmit(params) => {
                let total = self.accept_share();
                info!(
                    "Stratum submit: worker={}, params={:?}, shares_accepted={}",
                    self.session.worker_name(),
                    params.0,
                    total
                );
                PoolResponse::success(id, Value::Bool(true))
            }

            PoolRequest::KeepAlive => {
                PoolResponse::success(id, serde_json::to_value(StatusResult::keepalived())?)
            }

            PoolRequest::GetJob => {
                PoolResponse::success(id, serde_json::to_value(make_job(self.state.height()))?)
            }

            PoolRequest::Unknown(method) => {
                warn!("Unknown method: {}", method);
                PoolResponse::unknown_method(id, &method)
            }
        };

        Ok(response)
    }

    fn accept_share(&mut self) -> u64 {
        self.session.record_share();
        self.state.record_accepted()
    }

    async fn send_notify(&self, sink: &mut LineSink) -> Result<()> {
        let job = make_job(self.state.height());
        info!("mining.notify: job={}", job.job_id);
        send_line(sink, &PoolNotification::mining_notify(&job)).await
    }
}

async fn send_line<T: Serialize>(sink: &mut LineSink, message: &T) -> Result<()> {
    let line = serde_json::to_string(message)?;
    debug!("-> {}", preview(&line));
    sink.send(line).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stratum::job::ALGORITHM;
    use serde_json::json;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};

    fn dispatcher() -> Dispatcher {
        let peer = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 40000);
        Dispatcher::new(
            PoolSession::new(peer),
            Arc::new(ServerState::default()),
            DispatcherConfig {
                idle_timeout: Duration::from_secs(120),
                notify_delay: Duration::from_millis(100),
                max_line_length: 1024,
            },
        )
    }

    fn reply(dispatcher: &mut Dispatcher, line: &str) -> Value {
        let response = dispatcher.process_line(line).unwrap().unwrap();
        serde_json::to_value(response).unwrap()
    }

    #[test]
    fn test_login() {
        let mut d = dispatcher();
        let value = reply(
            &mut d,
            r#"{"id":1,"method":"login","params":{"login":"wallet1","rigid":"rig1"}}"#,
        );

        assert_eq!(value["jsonrpc"], "2.0");
        assert_eq!(value["id"], 1);
        assert_eq!(value["result"]["status"], "OK");
        assert_eq!(value["result"]["id"], d.session().id.to_string());
        assert_eq!(value["result"]["job"]["algo"], ALGORITHM);
        assert_eq!(value["result"]["job"]["height"], 100);
        assert_eq!(d.session().protocol, Some(Protocol::XMRig));
        assert_eq!(d.session().worker.as_deref(), Some("wallet1.rig1"));
    }

    #[test]
    fn test_submit_counts_share() {
        let mut d = dispatcher();
        let value = reply(
            &mut d,
            r#"{"id":2,"method":"submit","params":{"nonce":"ab12","job_id":"x"}}"#,
        );

        assert_eq!(value["result"], json!({"status": "OK"}));
        assert_eq!(d.state.shares_accepted(), 1);
        assert_eq!(d.session().shares_accepted, 1);
    }

    #[test]
    fn test_subscribe() {
        let mut d = dispatcher();
        let value = reply(&mut d, r#"{"id":3,"method":"mining.subscribe","params":[]}"#);

        let sid = d.session().id.to_string();
        assert_eq!(
            value["result"],
            json!([[["mining.notify", sid], ["mining.set_difficulty", sid]], "", 4])
        );
        assert_eq!(d.session().protocol, Some(Protocol::Stratum));
    }

    #[test]
    fn test_authorize_schedules_notify() {
        let mut d = dispatcher();
        let value = reply(
            &mut d,
            r#"{"id":4,"method":"mining.authorize","params":["user","pass"]}"#,
        );

        assert_eq!(value["result"], json!(true));
        assert_eq!(d.pending_notifies(), 1);
        assert_eq!(d.session().worker.as_deref(), Some("user"));

        reply(&mut d, r#"{"id":5,"method":"mining.authorize","params":["user","pass"]}"#);
        assert_eq!(d.pending_notifies(), 2);
    }

    #[test]
    fn test_mining_submit_counts_share() {
        let mut d = dispatcher();
        let value = reply(
            &mut d,
            r#"{"id":6,"method":"mining.submit","params":["user","job","00000000","00","ff"]}"#,
        );

        assert_eq!(value["result"], json!(true));
        assert_eq!(d.state.shares_accepted(), 1);
    }

    #[test]
    fn test_keepalived_is_idempotent() {
        let mut d = dispatcher();
        let before = d.state.snapshot();

        for i in 0..5 {
            let value = reply(&mut d, &format!(r#"{{"id":{},"method":"keepalived"}}"#, i));
            assert_eq!(value["result"], json!({"status": "KEEPALIVED"}));
        }

        assert_eq!(d.state.snapshot(), before);
    }

    #[test]
    fn test_getjob() {
        let mut d = dispatcher();
        d.state.advance_height();
        let value = reply(&mut d, r#"{"id":7,"method":"getjob"}"#);

        assert_eq!(value["result"]["height"], 101);
        assert_eq!(value["result"]["target"], "000003e8");
        assert_eq!(value["result"]["blob"].as_str().unwrap().len(), 152);
    }

    #[test]
    fn test_unknown_method() {
        let mut d = dispatcher();
        let value = reply(&mut d, r#"{"id":5,"method":"totally_unknown"}"#);

        assert_eq!(value["error"]["code"], -1);
        assert!(value["error"]["message"]
            .as_str()
            .unwrap()
            .contains("totally_unknown"));
        assert!(value.get("result").is_none());
    }

    #[test]
    fn test_non_string_method_gets_error_reply() {
        let mut d = dispatcher();
        let value = reply(&mut d, r#"{"id":7,"method":5}"#);

        assert_eq!(value["id"], 7);
        assert_eq!(
            value["error"],
            json!({"code": -1, "message": "Unknown method: 5"})
        );
    }

    #[test]
    fn test_mistyped_params_are_not_counted() {
        let mut d = dispatcher();

        assert!(d
            .process_line(r#"{"id":1,"method":"submit","params":{"nonce":17}}"#)
            .unwrap()
            .is_none());
        assert!(d
            .process_line(r#"{"id":2,"method":"mining.authorize","params":["user",123]}"#)
            .unwrap()
            .is_none());

        assert_eq!(d.state.shares_accepted(), 0);
        assert_eq!(d.pending_notifies(), 0);
    }

    #[test]
    fn test_blank_and_malformed_lines_are_skipped() {
        let mut d = dispatcher();

        assert!(d.process_line("   \t").unwrap().is_none());
        assert!(d.process_line("{not json").unwrap().is_none());
        assert!(d.process_line(r#"{"id":1,"method":"login","params":[1]}"#).unwrap().is_none());
        assert!(d.session().protocol.is_none());
    }

    #[test]
    fn test_mixed_protocols_are_served() {
        let mut d = dispatcher();
        reply(&mut d, r#"{"id":1,"method":"login","params":{}}"#);
        let value = reply(&mut d, r#"{"id":2,"method":"mining.submit","params":[]}"#);

        assert_eq!(value["result"], json!(true));
        assert_eq!(d.session().protocol, Some(Protocol::XMRig));
    }

    #[test]
    fn test_id_echoed_verbatim() {
        let mut d = dispatcher();
        let value = reply(&mut d, r#"{"id":"req-abc","method":"keepalived"}"#);
        assert_eq!(value["id"], "req-abc");

        let value = reply(&mut d, r#"{"method":"keepalived"}"#);
        assert_eq!(value["id"], Value::Null);
    }
}
