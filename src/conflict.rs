//! Conflict detection between lock requests
//!
//! The resource id is viewed as its big-endian byte array so that the
//! coarsest path level is byte 0 on every platform. A segment of length `n`
//! compares bytes `0..n` of that view; the byte index restarts for every
//! segment rather than advancing by the preceding segment lengths.

use crate::lock_table::LockTable;
use crate::request::{LockFlag, LockRequest, LockType, TransactionId};

/// Byte view of a resource id, most significant byte first
pub fn resource_bytes(resource_id: u64) -> [u8; 8] {
    resource_id.to_be_bytes()
}

/// Compare the leading `length` bytes of two resource ids
fn leading_bytes_match(a: u64, b: u64, length: u32) -> bool {
    let n = (length as usize).min(8);
    resource_bytes(a)[..n] == resource_bytes(b)[..n]
}

/// Pairwise conflict predicate
pub fn conflicts(a: &LockRequest, b: &LockRequest) -> bool {
    if a.lock_type == LockType::Read && b.lock_type == LockType::Read {
        return false;
    }

    for (sa, sb) in a.segments.iter().zip(&b.segments) {
        if sa.flag == LockFlag::LockAll || sb.flag == LockFlag::LockAll {
            log::debug!("LockAll at this level, conflict");
            return true;
        }

        let same_length = sa.length == sb.length;

        if (sa.flag == LockFlag::LockSame || sb.flag == LockFlag::LockSame) && same_length {
            return true;
        }

        if !same_length {
            // different granularity, the paths cannot overlap
            return false;
        }

        if !leading_bytes_match(a.resource_id, b.resource_id, sa.length) {
            return false;
        }
    }

    // Identical DontLock paths fall through as non-conflicting, even for two writers.
    false
}

/// True if any two requests of one batch conflict with each other
pub fn has_internal_conflict(requests: &[LockRequest]) -> bool {
    if requests.len() <= 1 {
        return false;
    }

    for (i, a) in requests.iter().enumerate() {
        for b in &requests[i + 1..] {
            if conflicts(a, b) {
                return true;
            }
        }
    }

    false
}

/// The stored grant an incoming request collided with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableConflict {
    pub transaction_id: TransactionId,
    pub request: LockRequest,
}

/// Check a batch against every granted transaction
///
/// Incoming requests are tried in order against transactions in ascending
/// id order; the first conflicting stored request is reported.
pub fn conflicts_with_table(table: &LockTable, requests: &[LockRequest]) -> Option<TableConflict> {
    if table.is_empty() {
        return None;
    }

    for incoming in requests {
        for (transaction_id, stored) in table.iter() {
            if let Some(request) = stored.iter().find(|s| conflicts(incoming, s)) {
                return Some(TableConflict {
                    transaction_id,
                    request: request.clone(),
                });
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{Owner, Segment};

    const RID: u64 = 0x0102030405060708;

    fn req(lock_type: LockType, resource_id: u64, segments: &[(LockFlag, u32)]) -> LockRequest {
        LockRequest::new(
            &Owner::new("S1", "C1"),
            lock_type,
            resource_id,
            segments.iter().map(|&(f, l)| Segment::new(f, l)).collect(),
        )
    }

    #[test]
    fn test_byte_view_is_big_endian() {
        assert_eq!(resource_bytes(RID), [1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_read_read_never_conflicts() {
        let a = req(LockType::Read, RID, &[(LockFlag::LockAll, 1), (LockFlag::DontLock, 1)]);
        let b = req(LockType::Read, RID, &[(LockFlag::LockSame, 1), (LockFlag::DontLock, 1)]);
        assert!(!conflicts(&a, &b));
        assert!(!conflicts(&b, &a));
    }

    #[test]
    fn test_lock_all_first_segment_conflicts() {
        let a = req(LockType::Write, RID, &[(LockFlag::LockAll, 1), (LockFlag::DontLock, 1)]);
        let b = req(LockType::Read, 0xFF00000000000000, &[(LockFlag::DontLock, 3), (LockFlag::DontLock, 1)]);
        assert!(conflicts(&a, &b));
        assert!(conflicts(&b, &a));
    }

    #[test]
    fn test_lock_same_needs_equal_length() {
        let a = req(LockType::Write, RID, &[(LockFlag::LockSame, 1), (LockFlag::DontLock, 1)]);
        let b = req(LockType::Write, 0xAA, &[(LockFlag::DontLock, 1), (LockFlag::DontLock, 1)]);
        assert!(conflicts(&a, &b));

        let c = req(LockType::Write, RID, &[(LockFlag::DontLock, 2), (LockFlag::DontLock, 1)]);
        assert!(!conflicts(&a, &c));
    }

    #[test]
    fn test_different_lengths_stop_the_walk() {
        let a = req(LockType::Write, RID, &[(LockFlag::DontLock, 1), (LockFlag::LockAll, 1)]);
        let b = req(LockType::Write, RID, &[(LockFlag::DontLock, 2), (LockFlag::DontLock, 1)]);
        assert!(!conflicts(&a, &b));
    }

    #[test]
    fn test_different_path_bytes_do_not_conflict() {
        let a = req(LockType::Write, 0x0102000000000000, &[(LockFlag::DontLock, 2), (LockFlag::LockSame, 1)]);
        let b = req(LockType::Write, 0x01FF000000000000, &[(LockFlag::DontLock, 2), (LockFlag::LockSame, 1)]);
        assert!(!conflicts(&a, &b));
    }

    #[test]
    fn test_matching_prefix_reaches_next_segment() {
        let a = req(LockType::Write, 0x0102000000000000, &[(LockFlag::DontLock, 2), (LockFlag::LockSame, 1)]);
        let b = req(LockType::Read, 0x0102990000000000, &[(LockFlag::DontLock, 2), (LockFlag::DontLock, 1)]);
        assert!(conflicts(&a, &b));
    }

    #[test]
    fn test_byte_index_restarts_per_segment() {
        // byte 2 differs but no segment ever compares past byte 1
        let a = req(LockType::Write, 0x0102030000000000, &[(LockFlag::DontLock, 2), (LockFlag::DontLock, 2), (LockFlag::LockAll, 1)]);
        let b = req(LockType::Write, 0x0102330000000000, &[(LockFlag::DontLock, 2), (LockFlag::DontLock, 2), (LockFlag::DontLock, 1)]);
        assert!(conflicts(&a, &b));
    }

    #[test]
    fn test_identical_dont_lock_writers_fall_through() {
        // Two writers on the same DontLock path are not reported as conflicting.
        let a = req(LockType::Write, RID, &[(LockFlag::DontLock, 1), (LockFlag::DontLock, 4)]);
        let b = a.clone();
        assert!(!conflicts(&a, &b));
    }

    #[test]
    fn test_shorter_segment_list_ends_the_walk() {
        let a = req(LockType::Write, RID, &[(LockFlag::DontLock, 1), (LockFlag::DontLock, 1)]);
        let b = req(LockType::Write, RID, &[(LockFlag::DontLock, 1), (LockFlag::DontLock, 1), (LockFlag::LockAll, 1)]);
        assert!(!conflicts(&a, &b));
    }

    #[test]
    fn test_internal_conflict() {
        let read = req(LockType::Read, RID, &[(LockFlag::LockSame, 1), (LockFlag::DontLock, 1)]);
        let write = req(LockType::Write, RID, &[(LockFlag::LockSame, 1), (LockFlag::DontLock, 1)]);

        assert!(!has_internal_conflict(&[]));
        assert!(!has_internal_conflict(&[write.clone()]));
        assert!(!has_internal_conflict(&[read.clone(), read.clone()]));
        assert!(has_internal_conflict(&[read.clone(), read, write]));
    }

    #[test]
    fn test_table_conflict_reports_first_culprit() {
        let mut table = LockTable::new();
        let incoming = req(LockType::Write, RID, &[(LockFlag::LockSame, 1), (LockFlag::DontLock, 1)]);
        assert!(conflicts_with_table(&table, &[incoming.clone()]).is_none());

        let unrelated = req(LockType::Write, RID, &[(LockFlag::DontLock, 3), (LockFlag::DontLock, 1)]);
        let held = req(LockType::Read, RID, &[(LockFlag::DontLock, 1), (LockFlag::DontLock, 1)]);
        table.insert(1, vec![unrelated.clone()]);
        table.insert(2, vec![unrelated, held.clone()]);
        table.insert(3, vec![held.clone()]);

        let found = conflicts_with_table(&table, &[incoming]).unwrap();
        assert_eq!(found.transaction_id, 2);
        assert_eq!(found.request, held);
    }

    #[test]
    fn test_table_without_conflict() {
        let mut table = LockTable::new();
        let read = req(LockType::Read, RID, &[(LockFlag::LockAll, 1), (LockFlag::DontLock, 1)]);
        table.insert(1, vec![read.clone()]);
        assert!(conflicts_with_table(&table, &[read]).is_none());
    }
}
