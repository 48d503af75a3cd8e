//! JSON operation scripts replayed against one lock service
//!
//! A script is a JSON array of operations:
//!
//! ```json
//! [
//!   {"op": "acquire", "requests": [{"SessionID": "S1", "HMCID": "C1", ...}]},
//!   {"op": "release", "ids": [1], "owner": {"SessionID": "S1", "HMCID": "C1"}},
//!   {"op": "release_session", "owner": {"SessionID": "S1", "HMCID": "C1"}},
//!   {"op": "list"},
//!   {"op": "list", "ids": [1, 2]},
//!   {"op": "list", "owner": {"SessionID": "S1", "HMCID": "C1"}}
//! ]
//! ```
//!
//! Lock requests are decoded one acquire at a time, so a request with an
//! unknown literal turns into an `Invalid` outcome instead of failing the
//! whole script.

use serde::Deserialize;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::lock_service::{AcquireResult, LockFilter, LockService, ReleaseResult};
use crate::request::{LockRequest, Owner, TransactionId};
use crate::validator::ValidationError;

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("malformed script: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("operation {index}: list takes either ids or owner, not both")]
    AmbiguousFilter { index: usize },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ScriptOp {
    Acquire {
        requests: Vec<serde_json::Value>,
    },
    Release {
        ids: Vec<TransactionId>,
        owner: Owner,
    },
    ReleaseSession {
        owner: Owner,
    },
    List {
        #[serde(default)]
        ids: Option<Vec<TransactionId>>,
        #[serde(default)]
        owner: Option<Owner>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptOutcome {
    Acquire(AcquireResult),
    Release(ReleaseResult),
    ReleaseSession(Vec<TransactionId>),
    List(BTreeMap<TransactionId, Vec<LockRequest>>),
}

pub fn parse_script(json: &str) -> Result<Vec<ScriptOp>, ScriptError> {
    let ops: Vec<ScriptOp> = serde_json::from_str(json)?;

    for (index, op) in ops.iter().enumerate() {
        if let ScriptOp::List { ids: Some(_), owner: Some(_) } = op {
            return Err(ScriptError::AmbiguousFilter { index });
        }
    }

    Ok(ops)
}

/// Decode raw request objects, reporting the first undecodable one
pub fn decode_requests(values: &[serde_json::Value]) -> Result<Vec<LockRequest>, ValidationError> {
    values
        .iter()
        .map(|value| {
            LockRequest::deserialize(value).map_err(|e| ValidationError::Malformed(e.to_string()))
        })
        .collect()
}

pub fn run_op(service: &LockService, op: &ScriptOp) -> ScriptOutcome {
    match op {
        ScriptOp::Acquire { requests } => match decode_requests(requests) {
            Ok(requests) => ScriptOutcome::Acquire(service.acquire(&requests)),
            Err(reason) => {
                log::debug!("Bad lock request in script: {}", reason);
                ScriptOutcome::Acquire(AcquireResult::Invalid(reason))
            }
        },
        ScriptOp::Release { ids, owner } => ScriptOutcome::Release(service.release(ids, owner)),
        ScriptOp::ReleaseSession { owner } => ScriptOutcome::ReleaseSession(service.release_session(owner)),
        ScriptOp::List { ids, owner } => {
            let filter = match (ids, owner) {
                (Some(ids), _) => LockFilter::ByTransactionIds(ids.clone()),
                (None, Some(owner)) => LockFilter::BySession(owner.clone()),
                (None, None) => LockFilter::All,
            };
            ScriptOutcome::List(service.list_locks(&filter))
        }
    }
}

pub fn run_script(service: &LockService, ops: &[ScriptOp]) -> Vec<ScriptOutcome> {
    ops.iter().map(|op| run_op(service, op)).collect()
}
