//! Lock service: the two public operations (acquire, release) plus queries
//!
//! The lock table and the transaction id counter live together behind one
//! `RwLock`. Every acquire and release holds the write guard across the full
//! scan-then-mutate step, so no two acquires can both pass the conflict scan
//! before either inserts. Share the service between dispatchers with `Arc`.

use serde_json::json;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

use crate::config::Config;
use crate::conflict::{conflicts_with_table, has_internal_conflict, TableConflict};
use crate::lock_table::{LockTable, TransactionIdGenerator};
use crate::logging::{AuditEvent, AuditLog, AuditOperation, AuditOutcome, AuditStats};
use crate::ownership::{check_ownership, missing_ids, OwnershipOutcome};
use crate::request::{LockRequest, Owner, TransactionId};
use crate::validator::{validate_batch, ValidationError};

/// Why an otherwise valid batch was not granted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Two requests of the batch conflict with each other
    SelfConflict,
    /// A request conflicts with an existing grant
    TableConflict {
        transaction_id: TransactionId,
        conflicting_request: LockRequest,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireResult {
    Granted { transaction_id: TransactionId },
    Rejected(RejectReason),
    Invalid(ValidationError),
}

impl AcquireResult {
    pub fn is_granted(&self) -> bool {
        matches!(self, AcquireResult::Granted { .. })
    }
}

impl fmt::Display for AcquireResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AcquireResult::Granted { transaction_id } => write!(f, "granted, transaction {}", transaction_id),
            AcquireResult::Rejected(RejectReason::SelfConflict) => write!(f, "rejected, requests conflict with each other"),
            AcquireResult::Rejected(RejectReason::TableConflict { transaction_id, conflicting_request }) => write!(
                f,
                "rejected, conflicts with transaction {} held by {}",
                transaction_id,
                conflicting_request.owner()
            ),
            AcquireResult::Invalid(reason) => write!(f, "invalid, {}", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseResult {
    Released,
    /// At least one id is not in the table; nothing was released
    InvalidIds,
    /// The requester does not own this transaction; nothing was released
    NotOwner {
        transaction_id: TransactionId,
        lock_request: LockRequest,
    },
}

impl fmt::Display for ReleaseResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReleaseResult::Released => write!(f, "released"),
            ReleaseResult::InvalidIds => write!(f, "invalid transaction id(s), nothing released"),
            ReleaseResult::NotOwner { transaction_id, lock_request } => write!(
                f,
                "transaction {} is owned by {}, nothing released",
                transaction_id,
                lock_request.owner()
            ),
        }
    }
}

/// Selection for `list_locks`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockFilter {
    All,
    ByTransactionIds(Vec<TransactionId>),
    BySession(Owner),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockStats {
    pub transactions: usize,
    pub requests: usize,
    pub next_transaction_id: TransactionId,
}

#[derive(Debug, Default)]
struct LockState {
    table: LockTable,
    ids: TransactionIdGenerator,
}

impl LockState {
    /// Next id not held by a live grant; ids still in use after a wrap are skipped
    fn allocate_id(&mut self) -> TransactionId {
        loop {
            let id = self.ids.next_id();
            if !self.table.contains(id) {
                return id;
            }
            log::warn!("Transaction id {} still held, skipping", id);
        }
    }
}

pub struct LockService {
    state: RwLock<LockState>,
    max_batch_size: usize,
    audit: Option<Mutex<AuditLog>>,
    instance_id: Uuid,
}

impl LockService {
    pub fn new() -> Self {
        Self::with_config(&Config::default())
    }

    pub fn with_config(config: &Config) -> Self {
        let audit = config.logging.enable_audit_log.then(|| {
            Mutex::new(AuditLog::new(
                config.logging.max_audit_events,
                config.logging.audit_min_level,
            ))
        });

        LockService {
            state: RwLock::new(LockState::default()),
            max_batch_size: config.service.max_batch_size,
            audit,
            instance_id: Uuid::new_v4(),
        }
    }

    /// Grant a batch of lock requests as one transaction, or nothing at all
    pub fn acquire(&self, requests: &[LockRequest]) -> AcquireResult {
        if let Err(reason) = validate_batch(requests, self.max_batch_size) {
            log::debug!("Invalid lock request: {}", reason);
            self.record(
                AuditEvent::new(AuditOperation::Acquire, AuditOutcome::Invalid, self.service_id())
                    .detail(json!({ "reason": reason.to_string(), "requests": requests.len() })),
            );
            return AcquireResult::Invalid(reason);
        }

        if has_internal_conflict(requests) {
            log::debug!("Lock batch conflicts with itself");
            self.record(
                AuditEvent::new(AuditOperation::Acquire, AuditOutcome::Rejected, self.service_id())
                    .requester(&requests[0].owner())
                    .detail(json!({ "reason": "self_conflict", "requests": requests.len() })),
            );
            return AcquireResult::Rejected(RejectReason::SelfConflict);
        }

        let mut state = self.write_state();

        if let Some(TableConflict { transaction_id, request }) = conflicts_with_table(&state.table, requests) {
            log::debug!("Lock batch conflicts with transaction {}", transaction_id);
            self.record(
                AuditEvent::new(AuditOperation::Acquire, AuditOutcome::Rejected, self.service_id())
                    .requester(&requests[0].owner())
                    .transactions(&[transaction_id])
                    .detail(json!({ "reason": "table_conflict", "holder": request.owner().to_string() })),
            );
            return AcquireResult::Rejected(RejectReason::TableConflict {
                transaction_id,
                conflicting_request: request,
            });
        }

        let transaction_id = state.allocate_id();
        state.table.insert(transaction_id, requests.to_vec());
        drop(state);

        log::info!("Granted {} lock(s) as transaction {}", requests.len(), transaction_id);
        self.record(
            AuditEvent::new(AuditOperation::Acquire, AuditOutcome::Granted, self.service_id())
                .requester(&requests[0].owner())
                .transactions(&[transaction_id])
                .detail(json!({ "requests": requests.len() })),
        );

        AcquireResult::Granted { transaction_id }
    }

    /// Release transactions owned by `requester`; all named ids or none
    pub fn release(&self, ids: &[TransactionId], requester: &Owner) -> ReleaseResult {
        let mut state = self.write_state();

        let missing = missing_ids(&state.table, ids);
        if !missing.is_empty() {
            drop(state);
            log::debug!("Release names unknown transaction ids {:?}", missing);
            self.record(
                AuditEvent::new(AuditOperation::Release, AuditOutcome::Invalid, self.service_id())
                    .requester(requester)
                    .transactions(ids)
                    .detail(json!({ "missing": missing })),
            );
            return ReleaseResult::InvalidIds;
        }

        if let OwnershipOutcome::NotOwner { transaction_id, lock_request } =
            check_ownership(&state.table, ids, requester)
        {
            drop(state);
            self.record(
                AuditEvent::new(AuditOperation::Release, AuditOutcome::Refused, self.service_id())
                    .requester(requester)
                    .transactions(&[transaction_id])
                    .detail(json!({ "holder": lock_request.owner().to_string() })),
            );
            return ReleaseResult::NotOwner { transaction_id, lock_request };
        }

        for id in ids {
            state.table.remove(*id);
        }
        drop(state);

        log::info!("Released transaction(s) {:?} for {}", ids, requester);
        self.record(
            AuditEvent::new(AuditOperation::Release, AuditOutcome::Released, self.service_id())
                .requester(requester)
                .transactions(ids),
        );

        ReleaseResult::Released
    }

    /// Release every transaction held by one console session
    ///
    /// Intended for the session manager on logout or timeout. Returns the
    /// released ids in ascending order.
    pub fn release_session(&self, owner: &Owner) -> Vec<TransactionId> {
        let mut state = self.write_state();
        let ids = state.table.ids_owned_by(owner);
        for id in &ids {
            state.table.remove(*id);
        }
        drop(state);

        if !ids.is_empty() {
            log::info!("Released {} transaction(s) held by session {}", ids.len(), owner);
        }
        self.record(
            AuditEvent::new(AuditOperation::ReleaseSession, AuditOutcome::Released, self.service_id())
                .requester(owner)
                .transactions(&ids),
        );

        ids
    }

    /// Read-only snapshot of granted transactions matching `filter`
    pub fn list_locks(&self, filter: &LockFilter) -> BTreeMap<TransactionId, Vec<LockRequest>> {
        let state = self.read_state();

        match filter {
            LockFilter::All => state
                .table
                .iter()
                .map(|(id, requests)| (id, requests.to_vec()))
                .collect(),
            LockFilter::ByTransactionIds(ids) => ids
                .iter()
                .filter_map(|id| state.table.get(*id).map(|requests| (*id, requests.to_vec())))
                .collect(),
            LockFilter::BySession(owner) => state
                .table
                .ids_owned_by(owner)
                .into_iter()
                .filter_map(|id| state.table.get(id).map(|requests| (id, requests.to_vec())))
                .collect(),
        }
    }

    pub fn stats(&self) -> LockStats {
        let state = self.read_state();
        LockStats {
            transactions: state.table.len(),
            requests: state.table.request_count(),
            next_transaction_id: state.ids.peek(),
        }
    }

    /// Audit events recorded so far (empty if the audit log is disabled)
    pub fn audit_events(&self) -> Vec<AuditEvent> {
        self.audit
            .as_ref()
            .map(|audit| lock_audit(audit).events())
            .unwrap_or_default()
    }

    pub fn export_audit_jsonl(&self) -> String {
        self.audit
            .as_ref()
            .map(|audit| lock_audit(audit).export_jsonl())
            .unwrap_or_default()
    }

    pub fn export_audit_text(&self) -> String {
        self.audit
            .as_ref()
            .map(|audit| lock_audit(audit).export_text())
            .unwrap_or_default()
    }

    /// `None` when the audit log is disabled
    pub fn audit_stats(&self) -> Option<AuditStats> {
        self.audit.as_ref().map(|audit| lock_audit(audit).stats())
    }

    fn service_id(&self) -> String {
        self.instance_id.to_string()
    }

    fn record(&self, event: AuditEvent) {
        if let Some(audit) = &self.audit {
            lock_audit(audit).record(event);
        }
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, LockState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_state(&self) -> RwLockReadGuard<'_, LockState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for LockService {
    fn default() -> Self {
        Self::new()
    }
}

fn lock_audit(audit: &Mutex<AuditLog>) -> MutexGuard<'_, AuditLog> {
    audit.lock().unwrap_or_else(PoisonError::into_inner)
}
