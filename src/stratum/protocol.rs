//! Pool protocol message definitions
//!
//! Both XMRig-style (`login`/`submit`/`getjob`/`keepalived`) and Stratum v1
//! (`mining.*`) requests arrive on the same socket with the same framing. A
//! line is decoded once into a [`Request`] whose [`PoolRequest`] variant carries
//! the typed parameters of its method.

use super::job::Job;
use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC version tag carried by every reply
pub const JSONRPC_VERSION: &str = "2.0";

/// Error code returned for methods the pool does not know
pub const UNKNOWN_METHOD_CODE: i32 = -1;

/// Size in bytes of the miner-controlled extranonce
pub const EXTRANONCE2_SIZE: u64 = 4;

/// Methods understood by the pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolMethod {
    /// XMRig login
    Login,
    /// XMRig share submission
    Submit,
    /// Stratum subscription
    Subscribe,
    /// Stratum worker authorization
    Authorize,
    /// Stratum share submission
    MiningSubmit,
    /// XMRig keepalive
    KeepAlive,
    /// XMRig job poll
    GetJob,
    /// Unknown method
    Unknown(String),
}

impl PoolMethod {
    /// Parse method from string
    pub fn parse_method(s: &str) -> Self {
        match s {
            "login" => Self::Login,
            "submit" => Self::Submit,
            "mining.subscribe" => Self::Subscribe,
            "mining.authorize" => Self::Authorize,
            "mining.submit" => Self::MiningSubmit,
            "keepalived" => Self::KeepAlive,
            "getjob" => Self::GetJob,
            _ => Self::Unknown(s.to_string()),
        }
    }

    /// Convert to string representation
    pub fn as_str(&self) -> &str {
        match self {
            Self::Login => "login",
            Self::Submit => "submit",
            Self::Subscribe => "mining.subscribe",
            Self::Authorize => "mining.authorize",
            Self::MiningSubmit => "mining.submit",
            Self::KeepAlive => "keepalived",
            Self::GetJob => "getjob",
            Self::Unknown(s) => s,
        }
    }
}

/// `login` parameters
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoginParams {
    /// Wallet address
    pub login: Option<String>,
    /// Password, used by miners as an algorithm hint
    pub pass: Option<String>,
    /// Miner user agent
    pub agent: Option<String>,
    /// Rig (worker) name
    pub rigid: Option<String>,
}

impl LoginParams {
    /// Worker identity in `wallet.rig` form
    pub fn worker_id(&self) -> String {
        let wallet = self.login.as_deref().unwrap_or("unknown");
        match self.rigid.as_deref() {
            Some(rig) if !rig.is_empty() => format!("{}.{}", wallet, rig),
            _ => wallet.to_string(),
        }
    }
}

/// XMRig `submit` parameters
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SubmitParams {
    /// Job the share was found for
    pub job_id: Option<String>,
    /// Winning nonce, hex
    pub nonce: Option<String>,
    /// Resulting hash, hex
    pub result: Option<String>,
}

/// `mining.authorize` parameters, `[username, password]`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizeParams {
    /// Worker user name
    pub username: Option<String>,
    /// Worker password
    pub password: Option<String>,
}

impl AuthorizeParams {
    fn from_positional(method: &str, params: Vec<Value>) -> Result<Self> {
        let mut fields = params.into_iter().map(|v| match v {
            Value::String(s) => Ok(Some(s)),
            Value::Null => Ok(None),
            other => Err(Error::malformed(format!(
                "{} expects string params, got {}",
                method, other
            ))),
        });

        let username = fields.next().transpose()?.flatten();
        let password = fields.next().transpose()?.flatten();

        Ok(Self { username, password })
    }
}

/// `mining.submit` parameters, kept verbatim for logging
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MiningSubmitParams(pub Vec<Value>);

/// A decoded request, one variant per known method
#[derive(Debug, Clone, PartialEq)]
pub enum PoolRequest {
    /// XMRig login
    Login(LoginParams),
    /// XMRig share submission
    Submit(SubmitParams),
    /// Stratum subscription
    Subscribe,
    /// Stratum worker authorization
    Authorize(AuthorizeParams),
    /// Stratum share submission
    MiningSubmit(MiningSubmitParams),
    /// XMRig keepalive
    KeepAlive,
    /// XMRig job poll
    GetJob,
    /// Any other method name
    Unknown(String),
}

impl PoolRequest {
    /// Method this request was decoded from
    pub fn method(&self) -> PoolMethod {
        match self {
            Self::Login(_) => PoolMethod::Login,
            Self::Submit(_) => PoolMethod::Submit,
            Self::Subscribe => PoolMethod::Subscribe,
            Self::Authorize(_) => PoolMethod::Authorize,
            Self::MiningSubmit(_) => PoolMethod::MiningSubmit,
            Self::KeepAlive => PoolMethod::KeepAlive,
            Self::GetJob => PoolMethod::GetJob,
            Self::Unknown(name) => PoolMethod::Unknown(name.clone()),
        }
    }
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    method: Option<Value>,
    #[serde(default)]
    params: Option<Value>,
}

/// Inbound request with its echoed id
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Request ID, echoed verbatim in the reply
    pub id: Value,
    /// Decoded method and parameters
    pub call: PoolRequest,
}

impl Request {
    /// Decode one wire line.
    ///
    /// Fails with [`Error::Json`] when the line is not JSON and with
    /// [`Error::MalformedRequest`] when it is not an object or the params do
    /// not fit the method. Unknown method names are not an error.
    pub fn from_json(line: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(line)?;
        if !value.is_object() {
            return Err(Error::malformed("request must be a JSON object"));
        }

        let envelope: Envelope = serde_json::from_value(value)?;
        let method = match envelope.method {
            Some(Value::String(name)) => name,
            None | Some(Value::Null) => String::new(),
            Some(other) => other.to_string(),
        };
        let params = envelope.params;

        let call = match PoolMethod::parse_method(&method) {
            PoolMethod::Login => PoolRequest::Login(object_params(&method, params)?),
            PoolMethod::Submit => PoolRequest::Submit(object_params(&method, params)?),
            PoolMethod::Subscribe => PoolRequest::Subscribe,
            PoolMethod::Authorize => PoolRequest::Authorize(AuthorizeParams::from_positional(
                &method,
                positional_params(params),
            )?),
            PoolMethod::MiningSubmit => {
                PoolRequest::MiningSubmit(MiningSubmitParams(positional_params(params)))
            }
            PoolMethod::KeepAlive => PoolRequest::KeepAlive,
            PoolMethod::GetJob => PoolRequest::GetJob,
            PoolMethod::Unknown(name) => PoolRequest::Unknown(name),
        };

        Ok(Self {
            id: envelope.id,
            call,
        })
    }
}

fn object_params<T: DeserializeOwned + Default>(method: &str, params: Option<Value>) -> Result<T> {
    match params {
        None | Some(Value::Null) => Ok(T::default()),
        Some(value @ Value::Object(_)) => serde_json::from_value(value)
            .map_err(|e| Error::malformed(format!("{} params: {}", method, e))),
        Some(other) => Err(Error::malformed(format!(
            "{} params must be an object, got {}",
            method, other
        ))),
    }
}

// Positional methods treat anything but an array as "no params".
fn positional_params(params: Option<Value>) -> Vec<Value> {
    match params {
        Some(Value::Array(values)) => values,
        _ => Vec::new(),
    }
}

/// JSON-RPC error object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcError {
    /// Error code
    pub code: i32,
    /// Human readable message
    pub message: String,
}

/// Reply to a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolResponse {
    /// Always `"2.0"`
    pub jsonrpc: String,
    /// Request ID this responds to
    pub id: Value,
    /// Result if successful
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error if failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl PoolResponse {
    /// Create a successful response
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response
    pub fn error(id: Value, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
            }),
        }
    }

    /// Error response for a method the pool does not implement
    pub fn unknown_method(id: Value, method: &str) -> Self {
        Self::error(id, UNKNOWN_METHOD_CODE, format!("Unknown method: {}", method))
    }
}

/// `result` of a successful `login`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResult {
    /// Session ID
    pub id: String,
    /// First job for the miner
    pub job: Job,
    /// Always `"OK"`
    pub status: String,
}

/// `result` carrying only a status string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResult {
    /// `"OK"` or `"KEEPALIVED"`
    pub status: String,
}

impl StatusResult {
    /// `{"status":"OK"}`
    pub fn ok() -> Self {
        Self {
            status: "OK".to_string(),
        }
    }

    /// `{"status":"KEEPALIVED"}`
    pub fn keepalived() -> Self {
        Self {
            status: "KEEPALIVED".to_string(),
        }
    }
}

/// `result` of `mining.subscribe`:
/// `[[["mining.notify", sid], ["mining.set_difficulty", sid]], extranonce1, extranonce2_size]`
pub fn subscribe_result(session_id: &str) -> Value {
    Value::Array(vec![
        Value::Array(vec![
            Value::Array(vec![
                Value::String("mining.notify".to_string()),
                Value::String(session_id.to_string()),
            ]),
            Value::Array(vec![
                Value::String("mining.set_difficulty".to_string()),
                Value::String(session_id.to_string()),
            ]),
        ]),
        Value::String(String::new()),
        Value::Number(EXTRANONCE2_SIZE.into()),
    ])
}

/// Server-initiated message (no ID)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolNotification {
    /// Always null for notifications
    pub id: Value,
    /// Method name
    pub method: String,
    /// Method parameters
    pub params: Vec<Value>,
}

impl PoolNotification {
    /// Create a new notification
    pub fn new(method: &str, params: Vec<Value>) -> Self {
        Self {
            id: Value::Null,
            method: method.to_string(),
            params,
        }
    }

    /// `mining.notify` announcing `job`
    pub fn mining_notify(job: &Job) -> Self {
        Self::new("mining.notify", job.notify_params())
    }
}
