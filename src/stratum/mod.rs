//! Mock pool server speaking XMRig login and Stratum v1

pub mod dispatcher;
pub mod job;
pub mod protocol;
pub mod server;
pub mod session;
pub mod state;

pub use dispatcher::{Dispatcher, DispatcherConfig};
pub use job::{ALGORITHM, BLOB_HEX_LEN, DIFFICULTY, Job, make_job, make_job_at};
pub use protocol::{
    AuthorizeParams, LoginParams, LoginResult, MiningSubmitParams, PoolMethod,
    PoolNotification, PoolRequest, PoolResponse, Request, RpcError, StatusResult,
    SubmitParams,
};
pub use server::PoolServer;
pub use session::{PoolSession, Protocol, SessionId};
pub use state::{ServerState, ServerStats};
