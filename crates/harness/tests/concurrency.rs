use std::collections::BTreeSet;
use std::thread;

use contactlink_core::{ContactId, IdentifyRequest};
use contactlink_harness::{check_invariants, SharedDatabase};
use contactlink_storage::ContactStore;

type TestResult = Result<(), Box<dyn std::error::Error>>;

const WORKERS: usize = 8;

#[test]
fn workers_do_not_cache_between_calls() -> TestResult {
    let db = SharedDatabase::new()?;
    let mut a = db.worker()?;
    let mut b = db.worker()?;

    let created = a.identify(IdentifyRequest::new(Some("a@x.com"), None))?;
    let seen = b.identify(IdentifyRequest::new(Some("a@x.com"), Some("1")))?;
    let again = a.identify(IdentifyRequest::new(None, Some("1")))?;

    assert_eq!(seen.primary_contact_id, created.primary_contact_id);
    assert_eq!(again, seen);
    Ok(())
}

#[test]
fn concurrent_first_contact_creates_one_primary() -> TestResult {
    let db = SharedDatabase::new()?;
    db.worker()?;

    let primaries: Vec<ContactId> = thread::scope(|scope| {
        let handles: Vec<_> = (0..WORKERS)
            .map(|_| {
                let db = &db;
                scope.spawn(move || {
                    let mut engine = db.worker().expect("open worker");
                    engine
                        .identify(IdentifyRequest::new(Some("new@x.com"), Some("42")))
                        .expect("identify")
                        .primary_contact_id
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().expect("worker panicked")).collect()
    });

    let distinct: BTreeSet<ContactId> = primaries.into_iter().collect();
    assert_eq!(distinct.len(), 1);

    let rows = db.worker()?.storage().all_contacts()?;
    assert_eq!(rows.len(), 1);
    Ok(())
}

#[test]
fn concurrent_bridges_converge_on_one_primary() -> TestResult {
    let db = SharedDatabase::new()?;
    let mut setup = db.worker()?;
    let p1 = setup.identify(IdentifyRequest::new(Some("a"), Some("1")))?;
    let p2 = setup.identify(IdentifyRequest::new(Some("b"), Some("2")))?;
    assert_ne!(p1.primary_contact_id, p2.primary_contact_id);

    let results: Vec<ContactId> = thread::scope(|scope| {
        let handles: Vec<_> = (0..WORKERS)
            .map(|i| {
                let db = &db;
                scope.spawn(move || {
                    let request = if i % 2 == 0 {
                        IdentifyRequest::new(Some("a"), Some("2"))
                    } else {
                        IdentifyRequest::new(Some("b"), Some("1"))
                    };
                    db.worker()
                        .expect("open worker")
                        .identify(request)
                        .expect("identify")
                        .primary_contact_id
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().expect("worker panicked")).collect()
    });

    assert!(results.iter().all(|id| *id == p1.primary_contact_id));

    let rows = setup.storage().all_contacts()?;
    assert_eq!(rows.len(), 2);
    check_invariants(&rows)?;
    Ok(())
}
