use crate::lock_table::LockTable;
use crate::request::{LockRequest, Owner, TransactionId};

/// Result of checking a release request against the stored grants
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnershipOutcome {
    /// Every named transaction belongs to the requester
    Owned,
    /// First transaction (in request order) held by someone else
    NotOwner {
        transaction_id: TransactionId,
        lock_request: LockRequest,
    },
}

/// Ids that are not present in the table, in request order
pub fn missing_ids(table: &LockTable, ids: &[TransactionId]) -> Vec<TransactionId> {
    ids.iter().copied().filter(|id| !table.contains(*id)).collect()
}

/// Verify the requester owns every named transaction
///
/// Only the first request of each transaction is compared; all requests of a
/// transaction share the owner fixed at grant time. Ids absent from the table
/// are skipped, callers check existence first.
pub fn check_ownership(table: &LockTable, ids: &[TransactionId], requester: &Owner) -> OwnershipOutcome {
    for &id in ids {
        let Some(first) = table.get(id).and_then(|requests| requests.first()) else {
            continue;
        };

        if !first.is_owned_by(requester) {
            log::debug!("Transaction {} is not owned by {}", id, requester);
            return OwnershipOutcome::NotOwner {
                transaction_id: id,
                lock_request: first.clone(),
            };
        }
    }

    OwnershipOutcome::Owned
}
