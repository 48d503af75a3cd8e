use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use crate::request::{LockRequest, Owner, TransactionId};

/// Issues transaction ids: 1, 2, 3, ...
///
/// After `u32::MAX` the counter wraps to 0. The generator itself does not
/// know which ids are live; the lock service skips ids still present in the
/// table, and `LockTable::insert` never replaces a stored grant.
#[derive(Debug, Default)]
pub struct TransactionIdGenerator {
    last: TransactionId,
}

impl TransactionIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> TransactionId {
        if self.last == TransactionId::MAX {
            log::warn!("Transaction id counter wrapped around");
        }
        self.last = self.last.wrapping_add(1);
        self.last
    }

    /// Value the next call to `next_id` will return
    pub fn peek(&self) -> TransactionId {
        self.last.wrapping_add(1)
    }
}

/// Granted transactions keyed by id, iterated in ascending id order
///
/// Every request stored under one id shares the `(session_id, console_id)`
/// of the batch that created it.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LockTable {
    entries: BTreeMap<TransactionId, Vec<LockRequest>>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of transactions
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Number of individual lock requests across all transactions
    pub fn request_count(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn contains(&self, id: TransactionId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn get(&self, id: TransactionId) -> Option<&[LockRequest]> {
        self.entries.get(&id).map(Vec::as_slice)
    }

    /// Owner of a transaction, taken from its first request
    pub fn owner_of(&self, id: TransactionId) -> Option<Owner> {
        self.entries
            .get(&id)
            .and_then(|requests| requests.first())
            .map(LockRequest::owner)
    }

    /// Store a new grant; an occupied id keeps its existing grant and returns false
    pub fn insert(&mut self, id: TransactionId, requests: Vec<LockRequest>) -> bool {
        match self.entries.entry(id) {
            Entry::Vacant(slot) => {
                slot.insert(requests);
                true
            }
            Entry::Occupied(_) => {
                log::warn!("Transaction id {} already held, grant not stored", id);
                false
            }
        }
    }

    pub fn remove(&mut self, id: TransactionId) -> Option<Vec<LockRequest>> {
        let removed = self.entries.remove(&id);
        if removed.is_some() {
            log::debug!("Removed locks with transaction id {}", id);
        }
        removed
    }

    pub fn iter(&self) -> impl Iterator<Item = (TransactionId, &[LockRequest])> {
        self.entries.iter().map(|(id, requests)| (*id, requests.as_slice()))
    }

    /// Ids whose first request belongs to `owner`
    pub fn ids_owned_by(&self, owner: &Owner) -> Vec<TransactionId> {
        self.entries
            .iter()
            .filter(|(_, requests)| requests.first().map_or(false, |r| r.is_owned_by(owner)))
            .map(|(id, _)| *id)
            .collect()
    }
}
