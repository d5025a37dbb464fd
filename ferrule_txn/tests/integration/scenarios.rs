//! Integration test: end-to-end call scenarios.

use std::cell::Cell;

use ferrule::fault::{BusinessFault, ContainerFault, Fault};
use ferrule::txn::TxStatus;
use ferrule_testkit::TxEvent;

use super::support::{Harness, method, runtime_fault};

/// REQUIRED, no caller transaction, normal return.
#[test]
fn required_call_begins_and_commits() {
    let h = Harness::new();

    h.invoker
        .invoke(&method("Ledger", "required"), None, |_| Ok(()))
        .unwrap();

    let events = h.tm.events();
    let begun: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            TxEvent::Begin(tx) => Some(*tx),
            _ => None,
        })
        .collect();
    assert_eq!(begun.len(), 1);
    assert!(events.contains(&TxEvent::Commit(begun[0])));
    assert_eq!(h.tm.current(), None);
}

/// REQUIRED, container-started transaction, rollback application fault.
#[test]
fn rollback_application_fault_rolls_back_and_propagates_unchanged() {
    let h = Harness::new();
    let frozen: Fault = BusinessFault::checked("Frozen", "account 7 frozen").into();
    let mut inner = None;

    let err = h
        .invoker
        .invoke(&method("Ledger", "required"), None, |ctx| -> Result<(), Fault> {
            inner = ctx.ambient().current().unwrap();
            Err(frozen.clone())
        })
        .unwrap_err();

    let inner = inner.unwrap();
    assert_eq!(err, frozen);
    assert_eq!(h.tm.status_of(inner), Some(TxStatus::RolledBack));
    assert_eq!(h.tm.count(|e| matches!(e, TxEvent::Commit(_))), 0);
    assert!(h.pool.discarded().is_empty());
}

/// NOT_SUPPORTED while T1 is ambient: suspended before, resumed after,
/// whatever the outcome.
#[test]
fn not_supported_suspends_and_always_resumes() {
    for fail in [false, true] {
        let h = Harness::new();
        let t1 = h.tm.begin_ambient();

        let result = h
            .invoker
            .invoke(&method("Ledger", "not_supported"), None, |ctx| {
                assert_eq!(ctx.ambient().current().unwrap(), None);
                if fail { Err(runtime_fault()) } else { Ok(()) }
            });

        assert_eq!(result.is_err(), fail);
        assert_eq!(h.tm.current(), Some(t1));
        assert_eq!(h.tm.status_of(t1), Some(TxStatus::Active));
        assert_eq!(
            h.tm.events(),
            vec![TxEvent::Suspend(t1), TxEvent::Resume(t1)]
        );
    }
}

/// NOT_SUPPORTED resumes the caller even if the method panics.
#[test]
fn not_supported_resumes_after_panic() {
    let h = Harness::new();
    let t1 = h.tm.begin_ambient();

    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        h.invoker
            .invoke(&method("Ledger", "not_supported"), None, |_| -> Result<(), Fault> {
                panic!("method crashed")
            })
    }));

    assert!(outcome.is_err());
    assert_eq!(h.tm.current(), Some(t1));
}

fn panic_in(h: &Harness, name: &str) -> Option<ferrule::txn::TransactionHandle> {
    let mut inside = None;
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        h.invoker
            .invoke(&method("Ledger", name), None, |ctx| -> Result<(), Fault> {
                inside = ctx.ambient().current().unwrap();
                panic!("method crashed")
            })
    }));
    assert!(outcome.is_err());
    inside
}

/// REQUIRES_NEW rolls back its own transaction and restores T1 after a panic.
#[test]
fn requires_new_panic_rolls_back_and_restores_caller() {
    let h = Harness::new();
    let t1 = h.tm.begin_ambient();

    let t2 = panic_in(&h, "requires_new").unwrap();

    assert_ne!(t1, t2);
    assert_eq!(h.tm.status_of(t2), Some(TxStatus::RolledBack));
    assert_eq!(h.tm.current(), Some(t1));
    assert_eq!(h.tm.status_of(t1), Some(TxStatus::Active));
}

/// A panic in a container-started REQUIRED transaction leaves the thread
/// clean for the next unrelated call.
#[test]
fn required_panic_does_not_leak_transaction_to_next_call() {
    let h = Harness::new();

    let crashed = panic_in(&h, "required").unwrap();
    assert_eq!(h.tm.status_of(crashed), Some(TxStatus::RolledBack));
    assert_eq!(h.tm.current(), None);

    let next = h
        .invoker
        .invoke(&method("Ledger", "required"), None, |ctx| {
            Ok(ctx.ambient().current().unwrap())
        })
        .unwrap()
        .unwrap();
    assert_ne!(next, crashed);
    assert_eq!(h.tm.status_of(next), Some(TxStatus::Committed));
}

/// A panic while joined to the caller's transaction leaves that transaction
/// to the caller.
#[test]
fn required_panic_in_caller_transaction_keeps_it() {
    let h = Harness::new();
    let t1 = h.tm.begin_ambient();

    let inside = panic_in(&h, "required");

    assert_eq!(inside, Some(t1));
    assert_eq!(h.tm.current(), Some(t1));
    assert_eq!(h.tm.status_of(t1), Some(TxStatus::Active));
}

/// NEVER while a transaction is ambient: rejected, body never runs.
#[test]
fn never_with_transaction_is_rejected() {
    let h = Harness::new();
    let t1 = h.tm.begin_ambient();
    let ran = Cell::new(false);

    let err = h
        .invoker
        .invoke(&method("Ledger", "never"), None, |_| {
            ran.set(true);
            Ok(())
        })
        .unwrap_err();

    assert!(!ran.get());
    assert!(matches!(
        err,
        Fault::Container(ContainerFault::TransactionNotAllowed { .. })
    ));
    assert_eq!(h.tm.current(), Some(t1));
    assert_eq!(h.tm.status_of(t1), Some(TxStatus::Active));
}
