//! Synthetic job generation
//!
//! Jobs are derived from a height and a wall-clock second only, so two jobs
//! built for the same height within the same second are identical.

use crate::utils::current_timestamp;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Fixed share difficulty handed to every miner
pub const DIFFICULTY: u64 = 1000;

/// Algorithm tag carried by every job
pub const ALGORITHM: &str = "cosmic_harmony_v3";

/// Length of a job blob in hex characters (76 bytes)
pub const BLOB_HEX_LEN: usize = 152;

/// Seed hash carried by every job
pub const SEED_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Byte order of the hashing state, announced to XMRig-style clients
pub const STATE_ENDIANNESS: &str = "little";

/// One unit of synthetic mining work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// `h{height}-{epoch secs as 8 hex}-{algo}`
    pub job_id: String,
    /// Hex template the miner hashes against
    pub blob: String,
    /// Difficulty as 8 zero-padded hex digits
    pub target: String,
    /// Share difficulty
    pub difficulty: u64,
    /// Block height this job belongs to
    pub height: u64,
    /// Algorithm tag
    pub algo: String,
    /// Seed hash
    pub seed_hash: String,
    /// Endianness hint for the algorithm's initial state
    #[serde(rename = "cosmic_state0_endian")]
    pub state_endianness: String,
}

impl Job {
    /// Parameters of a `mining.notify` announcing this job.
    ///
    /// The trailing clean-jobs flag is always set.
    pub fn notify_params(&self) -> Vec<Value> {
        vec![
            Value::String(self.job_id.clone()),
            Value::String(self.blob.clone()),
            Value::String(self.target.clone()),
            Value::Number(self.height.into()),
            Value::String(self.algo.clone()),
            Value::String(self.seed_hash.clone()),
            Value::Bool(true),
        ]
    }
}

/// Build a job for `height` stamped with the current time
pub fn make_job(height: u64) -> Job {
    make_job_at(height, current_timestamp())
}

/// Build a job for `height` stamped with `epoch_secs`
pub fn make_job_at(height: u64, epoch_secs: u64) -> Job {
    let digest = Sha256::digest(format!("zion-test-{}-{}", epoch_secs, height).as_bytes());
    let digest_hex = hex::encode(digest);

    let mut blob = digest_hex.repeat(BLOB_HEX_LEN.div_ceil(digest_hex.len()));
    blob.truncate(BLOB_HEX_LEN);

    Job {
        job_id: format!("h{}-{:08x}-{}", height, epoch_secs, ALGORITHM),
        blob,
        target: format!("{:08x}", DIFFICULTY),
        difficulty: DIFFICULTY,
        height,
        algo: ALGORITHM.to_string(),
        seed_hash: SEED_HASH.to_string(),
        state_endianness: STATE_ENDIANNESS.to_string(),
    }
}
