//! Integration test: container-managed attribute matrix.

use std::cell::Cell;
use std::time::Duration;

use ferrule::fault::{ContainerFault, Fault};
use ferrule::txn::{TxError, TxStatus};
use ferrule_testkit::{TxEvent, TxOp};

use super::support::{Harness, checked_fault, method, runtime_fault};

fn begins(h: &Harness) -> usize {
    h.tm.count(|e| matches!(e, TxEvent::Begin(_)))
}

// ── REQUIRED ────────────────────────────────────────────────────────

#[test]
fn required_without_caller_begins_and_commits() {
    let h = Harness::new();
    let inner = h
        .invoker
        .invoke(&method("Ledger", "required"), None, |ctx| {
            Ok(ctx.ambient().current().unwrap())
        })
        .unwrap()
        .expect("method ran in a transaction");

    assert_eq!(h.tm.status_of(inner), Some(TxStatus::Committed));
    assert_eq!(h.tm.current(), None);
}

#[test]
fn required_joins_caller_transaction() {
    let h = Harness::new();
    let caller = h.tm.begin_ambient();
    let inner = h
        .invoker
        .invoke(&method("Ledger", "required"), None, |ctx| {
            Ok(ctx.ambient().current().unwrap())
        })
        .unwrap();

    assert_eq!(inner, Some(caller));
    assert_eq!(h.tm.current(), Some(caller));
    assert_eq!(h.tm.status_of(caller), Some(TxStatus::Active));
    assert_eq!(begins(&h), 0);
}

#[test]
fn required_honours_set_rollback_only() {
    let h = Harness::new();
    let inner = h
        .invoker
        .invoke(&method("Ledger", "required"), None, |ctx| {
            ctx.set_rollback_only()?;
            Ok(ctx.ambient().current().unwrap())
        })
        .unwrap()
        .unwrap();

    assert_eq!(h.tm.status_of(inner), Some(TxStatus::RolledBack));
}

#[test]
fn declared_checked_fault_still_commits() {
    let h = Harness::new();
    let err = h
        .invoker
        .invoke(&method("Ledger", "required"), None, |_| -> Result<(), Fault> {
            Err(checked_fault("Overdrawn"))
        })
        .unwrap_err();

    assert_eq!(err, checked_fault("Overdrawn"));
    assert_eq!(h.tm.count(|e| matches!(e, TxEvent::Commit(_))), 1);
}

// ── REQUIRES_NEW ────────────────────────────────────────────────────

#[test]
fn requires_new_runs_in_fresh_transaction() {
    let h = Harness::new();
    let caller = h.tm.begin_ambient();
    let inner = h
        .invoker
        .invoke(&method("Ledger", "requires_new"), None, |ctx| {
            Ok(ctx.ambient().current().unwrap())
        })
        .unwrap()
        .unwrap();

    assert_ne!(inner, caller);
    assert_eq!(h.tm.status_of(inner), Some(TxStatus::Committed));
    assert_eq!(h.tm.current(), Some(caller));
    assert_eq!(
        h.tm.events(),
        vec![
            TxEvent::Suspend(caller),
            TxEvent::Timeout(Duration::from_secs(120)),
            TxEvent::Begin(inner),
            TxEvent::Timeout(Duration::ZERO),
            TxEvent::Commit(inner),
            TxEvent::Resume(caller),
        ]
    );
}

#[test]
fn method_timeout_overrides_engine_default() {
    let h = Harness::new();
    let inner = h
        .invoker
        .invoke(&method("Ledger", "timed"), None, |ctx| {
            Ok(ctx.ambient().current().unwrap())
        })
        .unwrap()
        .unwrap();

    assert_eq!(h.tm.timeout_of(inner), Some(Duration::from_secs(30)));
}

#[test]
fn begin_failure_resumes_caller() {
    let h = Harness::new();
    let caller = h.tm.begin_ambient();
    h.tm.fail_next(TxOp::Begin, TxError::System("no capacity".into()));
    let ran = Cell::new(false);

    let err = h
        .invoker
        .invoke(&method("Ledger", "requires_new"), None, |_| {
            ran.set(true);
            Ok(())
        })
        .unwrap_err();

    assert!(!ran.get());
    assert_eq!(err.type_name(), "TransactionFailure");
    assert_eq!(h.tm.current(), Some(caller));
}

// ── MANDATORY / NEVER ───────────────────────────────────────────────

#[test]
fn mandatory_joins_caller_transaction() {
    let h = Harness::new();
    let caller = h.tm.begin_ambient();
    let inner = h
        .invoker
        .invoke(&method("Ledger", "mandatory"), None, |ctx| {
            Ok(ctx.ambient().current().unwrap())
        })
        .unwrap();

    assert_eq!(inner, Some(caller));
    assert_eq!(begins(&h), 0);
}

#[test]
fn never_without_caller_runs_without_transaction() {
    let h = Harness::new();
    let inner = h
        .invoker
        .invoke(&method("Ledger", "never"), None, |ctx| {
            Ok(ctx.ambient().current().unwrap())
        })
        .unwrap();

    assert_eq!(inner, None);
    assert!(h.tm.events().is_empty());
}

// ── NOT_SUPPORTED / SUPPORTS ────────────────────────────────────────

#[test]
fn not_supported_runs_without_transaction() {
    let h = Harness::new();
    let caller = h.tm.begin_ambient();
    let inner = h
        .invoker
        .invoke(&method("Ledger", "not_supported"), None, |ctx| {
            Ok(ctx.ambient().current().unwrap())
        })
        .unwrap();

    assert_eq!(inner, None);
    assert_eq!(h.tm.current(), Some(caller));
}

#[test]
fn supports_follows_caller() {
    let h = Harness::new();

    let alone = h
        .invoker
        .invoke(&method("Ledger", "supports"), None, |ctx| {
            Ok(ctx.ambient().current().unwrap())
        })
        .unwrap();
    assert_eq!(alone, None);

    let caller = h.tm.begin_ambient();
    let joined = h
        .invoker
        .invoke(&method("Ledger", "supports"), None, |ctx| {
            Ok(ctx.ambient().current().unwrap())
        })
        .unwrap();
    assert_eq!(joined, Some(caller));
    assert_eq!(begins(&h), 0);
}

#[test]
fn system_fault_in_supports_dooms_caller() {
    let h = Harness::new();
    let caller = h.tm.begin_ambient();
    let err = h
        .invoker
        .invoke(&method("Ledger", "supports"), None, |_| -> Result<(), Fault> {
            Err(runtime_fault())
        })
        .unwrap_err();

    assert!(matches!(
        err,
        Fault::Container(ContainerFault::TransactionRolledBack { .. })
    ));
    assert_eq!(h.tm.status_of(caller), Some(TxStatus::MarkedRollback));
    assert_eq!(h.tm.current(), Some(caller));
}

#[test]
fn system_fault_without_transaction_is_wrapped() {
    let h = Harness::new();
    let err = h
        .invoker
        .invoke(&method("Ledger", "supports"), None, |_| -> Result<(), Fault> {
            Err(runtime_fault())
        })
        .unwrap_err();

    assert!(matches!(err, Fault::Container(ContainerFault::Failed { .. })));
    assert_eq!(err.root_cause(), &runtime_fault());
}

// ── Completion failures ─────────────────────────────────────────────

#[test]
fn commit_failure_surfaces_as_system_failure() {
    let h = Harness::new();
    h.tm.fail_next(
        TxOp::Commit,
        TxError::System("log device full".into()),
    );
    let err = h
        .invoker
        .invoke(&method("Ledger", "required"), None, |_| Ok(()))
        .unwrap_err();

    assert!(matches!(
        err,
        Fault::Container(ContainerFault::Transaction { .. })
    ));
    assert_eq!(h.tm.current(), None);
}

#[test]
fn unknown_method_is_rejected() {
    let h = Harness::new();
    let err = h
        .invoker
        .invoke(&method("Ledger", "audit"), None, |_| Ok(()))
        .unwrap_err();

    assert!(matches!(
        err,
        Fault::Container(ContainerFault::IllegalState { .. })
    ));
    assert!(h.tm.events().is_empty());
}
