//! Integration test: bean-managed demarcation, stateless and stateful.

use std::time::Duration;

use ferrule::fault::{ContainerFault, Fault};
use ferrule::txn::TxStatus;
use ferrule_testkit::TxEvent;

use super::support::{Harness, checked_fault, instance, method, runtime_fault};

// ── Stateless ───────────────────────────────────────────────────────

#[test]
fn stateless_runs_own_transaction_with_caller_suspended() {
    let h = Harness::new();
    let caller = h.tm.begin_ambient();

    let (seen_on_entry, own) = h
        .invoker
        .invoke(&method("Job", "run"), None, |ctx| {
            let on_entry = ctx.ambient().current().unwrap();
            let utx = ctx.user_transaction()?;
            let own = utx.begin()?;
            utx.commit()?;
            Ok((on_entry, own))
        })
        .unwrap();

    assert_eq!(seen_on_entry, None);
    assert_eq!(h.tm.status_of(own), Some(TxStatus::Committed));
    assert_eq!(h.tm.current(), Some(caller));
    assert_eq!(h.tm.status_of(caller), Some(TxStatus::Active));
}

#[test]
fn stateless_open_transaction_is_an_error() {
    let h = Harness::new();
    let caller = h.tm.begin_ambient();
    let mut leaked = None;

    let err = h
        .invoker
        .invoke(&method("Job", "run"), None, |ctx| {
            leaked = Some(ctx.user_transaction()?.begin()?);
            Ok(())
        })
        .unwrap_err();

    let leaked = leaked.unwrap();
    assert!(matches!(
        err,
        Fault::Container(ContainerFault::TransactionLeftOpen { handle, .. }) if handle == leaked
    ));
    assert_eq!(h.tm.status_of(leaked), Some(TxStatus::RolledBack));
    assert_eq!(h.tm.current(), Some(caller));
}

#[test]
fn stateless_failure_rolls_back_open_transaction_and_keeps_fault() {
    let h = Harness::new();
    let mut leaked = None;

    let err = h
        .invoker
        .invoke(&method("Job", "run"), None, |ctx| -> Result<(), Fault> {
            leaked = Some(ctx.user_transaction()?.begin()?);
            Err(checked_fault("Retry"))
        })
        .unwrap_err();

    assert_eq!(err, checked_fault("Retry"));
    assert_eq!(h.tm.status_of(leaked.unwrap()), Some(TxStatus::RolledBack));
    assert_eq!(h.tm.current(), None);
}

#[test]
fn stateless_system_failure_marks_then_rolls_back() {
    let h = Harness::new();
    let mut leaked = None;

    let err = h
        .invoker
        .invoke(&method("Job", "run"), None, |ctx| -> Result<(), Fault> {
            leaked = Some(ctx.user_transaction()?.begin()?);
            Err(runtime_fault())
        })
        .unwrap_err();

    let leaked = leaked.unwrap();
    assert!(matches!(err, Fault::Container(ContainerFault::Failed { .. })));
    assert_eq!(h.tm.count(|e| *e == TxEvent::SetRollbackOnly(leaked)), 1);
    assert_eq!(h.tm.status_of(leaked), Some(TxStatus::RolledBack));
}

#[test]
fn configured_timeout_seeds_user_transaction() {
    let h = Harness::new();

    let (configured, overridden) = h
        .invoker
        .invoke(&method("Job", "batch"), None, |ctx| {
            let mut utx = ctx.user_transaction()?;
            let configured = utx.begin()?;
            utx.commit()?;
            utx.set_transaction_timeout(Duration::from_secs(5));
            let overridden = utx.begin()?;
            utx.commit()?;
            Ok((configured, overridden))
        })
        .unwrap();

    assert_eq!(h.tm.timeout_of(configured), Some(Duration::from_secs(45)));
    assert_eq!(h.tm.timeout_of(overridden), Some(Duration::from_secs(5)));

    let plain = h
        .invoker
        .invoke(&method("Job", "run"), None, |ctx| {
            let utx = ctx.user_transaction()?;
            let own = utx.begin()?;
            utx.commit()?;
            Ok(own)
        })
        .unwrap();
    assert_eq!(h.tm.timeout_of(plain), None);
}

#[test]
fn container_rollback_api_is_unavailable() {
    let h = Harness::new();
    let err = h
        .invoker
        .invoke(&method("Job", "run"), None, |ctx| ctx.set_rollback_only())
        .unwrap_err();

    assert!(matches!(
        err,
        Fault::Container(ContainerFault::IllegalState { .. })
    ));
}

// ── Stateful ────────────────────────────────────────────────────────

#[test]
fn stateful_transaction_spans_calls() {
    let h = Harness::new();
    let wizard = instance("wizard-1");
    let step = method("Wizard", "step");

    let begun = h
        .invoker
        .invoke(&step, Some(&wizard), |ctx| ctx.user_transaction()?.begin())
        .unwrap();
    assert_eq!(h.tm.current(), None);
    assert_eq!(h.tm.status_of(begun), Some(TxStatus::Active));
    assert_eq!(h.invoker.engine().affinity().lookup(wizard.id()), Some(begun));
    assert!(wizard.is_in_transaction());

    let resumed = h
        .invoker
        .invoke(&step, Some(&wizard), |ctx| {
            let current = ctx.ambient().current().unwrap();
            ctx.user_transaction()?.commit()?;
            Ok(current)
        })
        .unwrap();

    assert_eq!(resumed, Some(begun));
    assert_eq!(h.tm.status_of(begun), Some(TxStatus::Committed));
    assert!(h.invoker.engine().affinity().is_empty());
    assert!(!wizard.is_in_transaction());
}

#[test]
fn stateful_caller_transaction_is_restored_around_held_one() {
    let h = Harness::new();
    let wizard = instance("wizard-1");
    let step = method("Wizard", "step");
    let caller = h.tm.begin_ambient();

    let begun = h
        .invoker
        .invoke(&step, Some(&wizard), |ctx| ctx.user_transaction()?.begin())
        .unwrap();

    assert_ne!(begun, caller);
    assert_eq!(h.tm.current(), Some(caller));
    assert_eq!(h.tm.status_of(begun), Some(TxStatus::Active));
}

#[test]
fn stateful_system_failure_discards_and_rolls_back_held_transaction() {
    let h = Harness::new();
    let wizard = instance("wizard-1");
    let step = method("Wizard", "step");

    let begun = h
        .invoker
        .invoke(&step, Some(&wizard), |ctx| ctx.user_transaction()?.begin())
        .unwrap();

    let err = h
        .invoker
        .invoke(&step, Some(&wizard), |_| -> Result<(), Fault> {
            Err(runtime_fault())
        })
        .unwrap_err();

    assert!(matches!(err, Fault::Container(ContainerFault::Failed { .. })));
    assert_eq!(h.discards(&wizard), 1);
    assert_eq!(h.tm.status_of(begun), Some(TxStatus::RolledBack));
    assert!(h.invoker.engine().affinity().is_empty());
    assert_eq!(h.tm.current(), None);

    let again = h.invoker.invoke(&step, Some(&wizard), |_| Ok(()));
    assert!(matches!(
        again,
        Err(Fault::Container(ContainerFault::NoSuchInstance { .. }))
    ));
}

#[test]
fn stateful_application_fault_keeps_held_transaction() {
    let h = Harness::new();
    let wizard = instance("wizard-1");
    let step = method("Wizard", "step");

    let mut begun = None;
    let err = h
        .invoker
        .invoke(&step, Some(&wizard), |ctx| -> Result<(), Fault> {
            begun = Some(ctx.user_transaction()?.begin()?);
            Err(checked_fault("Retry"))
        })
        .unwrap_err();

    assert_eq!(err, checked_fault("Retry"));
    assert_eq!(h.invoker.engine().affinity().lookup(wizard.id()), begun);
    assert_eq!(h.discards(&wizard), 0);
}

#[test]
fn released_instance_rolls_back_held_transaction() {
    let h = Harness::new();
    let wizard = instance("wizard-1");

    let begun = h
        .invoker
        .invoke(&method("Wizard", "step"), Some(&wizard), |ctx| {
            ctx.user_transaction()?.begin()
        })
        .unwrap();

    h.invoker.release(&wizard);

    assert_eq!(h.tm.status_of(begun), Some(TxStatus::RolledBack));
    assert!(h.invoker.engine().affinity().is_empty());
}

#[test]
fn stateful_panic_rolls_back_held_transaction_and_restores_caller() {
    let h = Harness::new();
    let wizard = instance("wizard-1");
    let step = method("Wizard", "step");

    let begun = h
        .invoker
        .invoke(&step, Some(&wizard), |ctx| ctx.user_transaction()?.begin())
        .unwrap();
    let caller = h.tm.begin_ambient();

    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        h.invoker
            .invoke(&step, Some(&wizard), |_| -> Result<(), Fault> {
                panic!("step crashed")
            })
    }));

    assert!(outcome.is_err());
    assert_eq!(h.tm.status_of(begun), Some(TxStatus::RolledBack));
    assert!(h.invoker.engine().affinity().is_empty());
    assert_eq!(h.tm.current(), Some(caller));
    assert_eq!(h.tm.status_of(caller), Some(TxStatus::Active));
}

#[test]
fn stateless_panic_rolls_back_bean_transaction() {
    let h = Harness::new();
    let caller = h.tm.begin_ambient();
    let mut leaked = None;

    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        h.invoker
            .invoke(&method("Job", "run"), None, |ctx| -> Result<(), Fault> {
                leaked = Some(ctx.user_transaction()?.begin()?);
                panic!("job crashed")
            })
    }));

    assert!(outcome.is_err());
    assert_eq!(h.tm.status_of(leaked.unwrap()), Some(TxStatus::RolledBack));
    assert_eq!(h.tm.current(), Some(caller));
}
