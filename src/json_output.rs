use serde_json::{json, Value};
use std::collections::BTreeMap;

use crate::lock_service::{AcquireResult, LockStats, RejectReason, ReleaseResult};
use crate::request::{LockRequest, TransactionId};
use crate::script::ScriptOutcome;

/// JSON output formatter for CLI commands
pub struct JsonOutput;

impl JsonOutput {
    pub fn acquire(result: &AcquireResult) -> Value {
        match result {
            AcquireResult::Granted { transaction_id } => json!({
                "status": "granted",
                "TransactionID": transaction_id
            }),
            AcquireResult::Rejected(RejectReason::SelfConflict) => json!({
                "status": "rejected",
                "reason": "self_conflict"
            }),
            AcquireResult::Rejected(RejectReason::TableConflict { transaction_id, conflicting_request }) => json!({
                "status": "rejected",
                "reason": "table_conflict",
                "TransactionID": transaction_id,
                "ConflictingRequest": conflicting_request
            }),
            AcquireResult::Invalid(reason) => json!({
                "status": "invalid",
                "reason": reason.to_string()
            }),
        }
    }

    pub fn release(result: &ReleaseResult) -> Value {
        match result {
            ReleaseResult::Released => json!({ "status": "released" }),
            ReleaseResult::InvalidIds => json!({ "status": "invalid_ids" }),
            ReleaseResult::NotOwner { transaction_id, lock_request } => json!({
                "status": "not_owner",
                "TransactionID": transaction_id,
                "LockRequest": lock_request
            }),
        }
    }

    pub fn released_session(ids: &[TransactionId]) -> Value {
        json!({
            "status": "released",
            "TransactionIDs": ids
        })
    }

    pub fn lock_list(locks: &BTreeMap<TransactionId, Vec<LockRequest>>) -> Value {
        let records: Vec<Value> = locks
            .iter()
            .map(|(id, requests)| json!({ "TransactionID": id, "Locks": requests }))
            .collect();
        json!({ "Records": records })
    }

    pub fn outcome(outcome: &ScriptOutcome) -> Value {
        match outcome {
            ScriptOutcome::Acquire(result) => Self::acquire(result),
            ScriptOutcome::Release(result) => Self::release(result),
            ScriptOutcome::ReleaseSession(ids) => Self::released_session(ids),
            ScriptOutcome::List(locks) => Self::lock_list(locks),
        }
    }

    pub fn stats(stats: &LockStats) -> Value {
        json!({
            "transactions": stats.transactions,
            "requests": stats.requests,
            "next_transaction_id": stats.next_transaction_id,
            "timestamp": chrono::Utc::now().to_rfc3339()
        })
    }

    /// Format error as JSON
    pub fn error(message: &str, code: i32) -> String {
        json!({
            "error": {
                "message": message,
                "code": code
            },
            "timestamp": chrono::Utc::now().to_rfc3339()
        }).to_string()
    }
}
