use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;

use mclock::{
    AcquireResult, LockFilter, LockFlag, LockRequest, LockService, LockType, Owner, RejectReason,
    ReleaseResult, Segment, ValidationError,
};

const RID: u64 = 0x0102030405060708;

fn scenario_request(session: &str, console: &str) -> LockRequest {
    LockRequest::new(
        &Owner::new(session, console),
        LockType::Write,
        RID,
        vec![Segment::new(LockFlag::LockSame, 1), Segment::new(LockFlag::DontLock, 1)],
    )
}

fn service_with_first_grant() -> LockService {
    let service = LockService::new();
    assert_eq!(
        service.acquire(&[scenario_request("S1", "C1")]),
        AcquireResult::Granted { transaction_id: 1 }
    );
    service
}

#[test]
fn test_first_acquire_is_granted_as_transaction_one() {
    service_with_first_grant();
}

#[test]
fn test_second_console_hits_table_conflict() {
    let service = service_with_first_grant();

    assert_eq!(
        service.acquire(&[scenario_request("S2", "C2")]),
        AcquireResult::Rejected(RejectReason::TableConflict {
            transaction_id: 1,
            conflicting_request: scenario_request("S1", "C1"),
        })
    );
}

#[test]
fn test_owner_release_empties_table() {
    let service = service_with_first_grant();

    assert_eq!(service.release(&[1], &Owner::new("S1", "C1")), ReleaseResult::Released);
    assert!(service.list_locks(&LockFilter::All).is_empty());
}

#[test]
fn test_foreign_release_is_refused() {
    let service = service_with_first_grant();
    let before = service.list_locks(&LockFilter::All);

    assert_eq!(
        service.release(&[1], &Owner::new("S9", "C9")),
        ReleaseResult::NotOwner {
            transaction_id: 1,
            lock_request: scenario_request("S1", "C1"),
        }
    );
    assert_eq!(service.list_locks(&LockFilter::All), before);
}

fn path_request(session: &str, console: &str, resource_id: u64) -> LockRequest {
    LockRequest::new(
        &Owner::new(session, console),
        LockType::Write,
        resource_id,
        vec![Segment::new(LockFlag::DontLock, 1), Segment::new(LockFlag::DontLock, 1)],
    )
}

#[test]
fn test_mixed_owner_batch_is_invalid() {
    let service = LockService::new();
    let batch = [
        path_request("S1", "C1", 0x0100000000000000),
        path_request("S2", "C1", 0x0200000000000000),
    ];

    assert_eq!(
        service.acquire(&batch),
        AcquireResult::Invalid(ValidationError::MixedOwners)
    );
    assert!(service.list_locks(&LockFilter::All).is_empty());
    assert_eq!(service.stats().next_transaction_id, 1);
}

#[test]
fn test_release_with_one_foreign_id_removes_nothing() {
    let service = LockService::new();
    let foreign = path_request("S2", "C2", 0x0300000000000000);

    for (id, request) in [
        (1, path_request("S1", "C1", 0x0100000000000000)),
        (2, path_request("S1", "C1", 0x0200000000000000)),
        (3, foreign.clone()),
    ] {
        assert_eq!(
            service.acquire(&[request]),
            AcquireResult::Granted { transaction_id: id }
        );
    }
    let before = service.list_locks(&LockFilter::All);

    assert_eq!(
        service.release(&[1, 2, 3], &Owner::new("S1", "C1")),
        ReleaseResult::NotOwner {
            transaction_id: 3,
            lock_request: foreign,
        }
    );
    assert_eq!(service.list_locks(&LockFilter::All), before);
}

#[test]
fn test_seven_segments_is_invalid() {
    let service = LockService::new();
    let request = LockRequest::new(
        &Owner::new("S1", "C1"),
        LockType::Write,
        RID,
        vec![Segment::new(LockFlag::DontLock, 1); 7],
    );

    assert_eq!(
        service.acquire(&[request]),
        AcquireResult::Invalid(ValidationError::SegmentCount(7))
    );
    assert_eq!(service.stats().transactions, 0);
}

#[test]
fn test_unknown_id_leaves_table_unchanged() {
    let service = service_with_first_grant();
    let before = service.list_locks(&LockFilter::All);

    assert_eq!(service.release(&[2], &Owner::new("S1", "C1")), ReleaseResult::InvalidIds);
    assert_eq!(service.release(&[1, 2], &Owner::new("S1", "C1")), ReleaseResult::InvalidIds);
    assert_eq!(service.list_locks(&LockFilter::All), before);
}

#[test]
fn test_readers_share_and_writer_waits() {
    let service = LockService::new();
    let read = |s: &str| {
        LockRequest::new(
            &Owner::new(s, "C1"),
            LockType::Read,
            RID,
            vec![Segment::new(LockFlag::LockAll, 1), Segment::new(LockFlag::DontLock, 1)],
        )
    };

    assert!(service.acquire(&[read("S1")]).is_granted());
    assert!(service.acquire(&[read("S2")]).is_granted());

    let write = LockRequest::new(
        &Owner::new("S3", "C3"),
        LockType::Write,
        RID,
        vec![Segment::new(LockFlag::DontLock, 2), Segment::new(LockFlag::DontLock, 1)],
    );
    assert!(matches!(
        service.acquire(&[write.clone()]),
        AcquireResult::Rejected(RejectReason::TableConflict { transaction_id: 1, .. })
    ));

    assert_eq!(service.release_session(&Owner::new("S1", "C1")), vec![1]);
    assert_eq!(service.release_session(&Owner::new("S2", "C1")), vec![2]);
    assert_eq!(service.acquire(&[write]), AcquireResult::Granted { transaction_id: 3 });
}

#[test]
fn test_concurrent_writers_get_exactly_one_grant() {
    let service = Arc::new(LockService::new());

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let service = Arc::clone(&service);
            thread::spawn(move || service.acquire(&[scenario_request(&format!("S{}", i), "C")]))
        })
        .collect();

    let results: Vec<AcquireResult> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let granted: Vec<_> = results.iter().filter(|r| r.is_granted()).collect();
    assert_eq!(granted, vec![&AcquireResult::Granted { transaction_id: 1 }]);
    assert_eq!(
        results.iter().filter(|r| matches!(r, AcquireResult::Rejected(_))).count(),
        15
    );
    assert_eq!(service.stats().transactions, 1);
}

#[test]
fn test_concurrent_disjoint_grants_get_unique_ids() {
    let service = Arc::new(LockService::new());

    let handles: Vec<_> = (0..8u64)
        .map(|i| {
            let service = Arc::clone(&service);
            thread::spawn(move || {
                let request = LockRequest::new(
                    &Owner::new(format!("S{}", i), "C"),
                    LockType::Write,
                    (i + 1) << 56,
                    vec![Segment::new(LockFlag::DontLock, 1), Segment::new(LockFlag::DontLock, 1)],
                );
                service.acquire(&[request])
            })
        })
        .collect();

    let mut ids: Vec<u32> = handles
        .into_iter()
        .map(|h| match h.join().unwrap() {
            AcquireResult::Granted { transaction_id } => transaction_id,
            other => panic!("unexpected {:?}", other),
        })
        .collect();
    ids.sort_unstable();

    assert_eq!(ids, (1..=8).collect::<Vec<_>>());
    let all: BTreeMap<_, _> = service.list_locks(&LockFilter::All);
    assert_eq!(all.len(), 8);
}
