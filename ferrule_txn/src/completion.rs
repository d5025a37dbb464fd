//! Completion and discard policy.
//!
//! Runs after the business method returned or failed. Ends container-started
//! transactions, applies the classification of a fault to the transaction the
//! call ran in, and discards stateful instances hit by a SYSTEM failure.
//!
//! | Context     | Success             | APPLICATION (rollback) | SYSTEM                       |
//! |-------------|---------------------|------------------------|------------------------------|
//! | Caller      | nothing             | mark rollback-only     | mark, `TransactionRolledBack` |
//! | Container   | commit / rollback   | mark, then end         | end (rollback), wrap         |
//! | Unspecified | nothing             | nothing                | wrap                         |
//! | BeanManaged | nothing             | nothing                | mark open tx, wrap           |
//!
//! Cleanup failures while a fault is already propagating are logged and
//! swallowed; the original fault wins.

use ferrule::fault::{ContainerFault, Fault};
use ferrule::policy::MethodId;
use ferrule::txn::{TransactionHandle, TxError, TxStatus};
use tracing::{debug, error, warn};

use crate::affinity::AffinityStore;
use crate::ambient::AmbientContext;
use crate::classify::FaultKind;
use crate::context::{InvocationContext, transaction_fault};

/// Transaction context a business method ran in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionContext {
    /// Joined the caller's transaction.
    Caller(TransactionHandle),
    /// Ran in a transaction this frame started.
    Container(TransactionHandle),
    /// Ran without a transaction.
    Unspecified,
    /// Demarcated by the component itself.
    BeanManaged,
}

// ─── Success Path ───────────────────────────────────────────────────

/// Finish a successful call. Fails only when ending a container-started
/// transaction fails, which is a SYSTEM failure.
pub(crate) fn complete_success(
    ctx: &InvocationContext,
    affinity: &AffinityStore,
    exec: ExecutionContext,
) -> Result<(), Fault> {
    let ExecutionContext::Container(handle) = exec else {
        return Ok(());
    };
    end_transaction(ctx, handle).map_err(|fault| fail_system(ctx, affinity, fault))
}

/// Commit `handle` if it is still active, roll it back otherwise.
pub(crate) fn end_transaction(ctx: &InvocationContext, handle: TransactionHandle) -> Result<(), Fault> {
    let ambient = ctx.ambient();
    let method = ctx.method();
    let found = ambient.current().map_err(|e| transaction_fault(method, e))?;
    if found != Some(handle) {
        return Err(ContainerFault::WrongTransaction {
            method: method.clone(),
            expected: handle,
            found,
        }
        .into());
    }

    let status = ambient.status().map_err(|e| transaction_fault(method, e))?;
    match status {
        TxStatus::Active => {
            debug!("{method}: committing {handle}");
            ambient.commit().map_err(|e| match e {
                TxError::RolledBack(_) => rolled_back(method, None),
                source => transaction_fault(method, source),
            })
        }
        TxStatus::MarkedRollback => {
            debug!("{method}: rolling back {handle} (marked rollback-only)");
            ambient.rollback().map_err(|e| transaction_fault(method, e))
        }
        other => {
            // Completed behind our back (e.g. timed out) but still associated.
            warn!("{method}: {handle} is {other:?} at end of call");
            if let Err(e) = ambient.rollback() {
                debug!("{method}: clearing {handle} failed: {e}");
            }
            Err(rolled_back(method, None))
        }
    }
}

// ─── Failure Path ───────────────────────────────────────────────────

/// Apply the classification of `fault` and return the fault to surface.
pub(crate) fn complete_failure(
    ctx: &InvocationContext,
    affinity: &AffinityStore,
    exec: ExecutionContext,
    fault: Fault,
) -> Fault {
    let method = ctx.method();
    let ambient = ctx.ambient();
    let classification = ctx.component().classifier().classify(ctx.policy(), &fault);

    match classification.kind {
        FaultKind::Application => {
            debug!(
                "{method}: application fault {} (rollback: {})",
                fault.type_name(),
                classification.rollback
            );
            match exec {
                ExecutionContext::Caller(_) if classification.rollback => {
                    ambient.mark_rollback_only_quietly();
                }
                ExecutionContext::Container(handle) => {
                    if classification.rollback {
                        ambient.mark_rollback_only_quietly();
                    }
                    end_quietly(ctx, handle);
                }
                _ => {}
            }
            fault
        }
        FaultKind::System => {
            error!("{method}: system failure in {exec:?}: {fault}");
            let surfaced = match exec {
                ExecutionContext::Caller(_) => {
                    ambient.mark_rollback_only_quietly();
                    rolled_back_by(method, fault)
                }
                ExecutionContext::Container(handle) => {
                    ambient.mark_rollback_only_quietly();
                    end_quietly(ctx, handle);
                    wrap_system(method, fault)
                }
                ExecutionContext::Unspecified => wrap_system(method, fault),
                ExecutionContext::BeanManaged => {
                    if matches!(ambient.status(), Ok(status) if status.is_open()) {
                        ambient.mark_rollback_only_quietly();
                    }
                    wrap_system(method, fault)
                }
            };
            discard(ctx, affinity);
            surfaced
        }
    }
}

/// SYSTEM failure raised by the engine itself outside of any business
/// outcome: log, discard and return it.
pub(crate) fn fail_system(ctx: &InvocationContext, affinity: &AffinityStore, fault: Fault) -> Fault {
    error!("{}: system failure: {fault}", ctx.method());
    discard(ctx, affinity);
    fault
}

fn end_quietly(ctx: &InvocationContext, handle: TransactionHandle) {
    if let Err(e) = end_transaction(ctx, handle) {
        warn!("{}: ending {handle} during failure handling: {e}", ctx.method());
    }
}

/// Wrap a business fault as a container failure. Container faults pass through.
fn wrap_system(method: &MethodId, fault: Fault) -> Fault {
    match fault {
        Fault::Container(_) => fault,
        Fault::Business(_) => ContainerFault::Failed {
            method: method.clone(),
            cause: Box::new(fault),
        }
        .into(),
    }
}

/// Tell a caller its transaction is doomed, without double wrapping.
fn rolled_back_by(method: &MethodId, fault: Fault) -> Fault {
    match fault {
        Fault::Container(ContainerFault::TransactionRolledBack { .. }) => fault,
        cause => rolled_back(method, Some(cause)),
    }
}

fn rolled_back(method: &MethodId, cause: Option<Fault>) -> Fault {
    ContainerFault::TransactionRolledBack {
        method: method.clone(),
        cause: cause.map(Box::new),
    }
    .into()
}

// ─── Discard ────────────────────────────────────────────────────────

/// Evict the stateful instance of `ctx`, at most once per instance.
///
/// Any transaction the instance left in the affinity store is forgotten and
/// rolled back. Stateless calls have nothing to discard.
pub(crate) fn discard(ctx: &InvocationContext, affinity: &AffinityStore) {
    let Some(instance) = ctx.instance() else {
        return;
    };
    if !instance.mark_discarded() {
        return;
    }
    let id = instance.id();
    warn!("{}: discarding instance {id}", ctx.method());
    if let Err(e) = ctx.component().pool().discard(id) {
        error!("{}: pool refused to discard {id}: {e}", ctx.method());
    }
    if let Some(orphan) = affinity.forget(id) {
        rollback_detached(ctx.ambient(), orphan);
    }
}

/// Roll back a transaction that is not associated with any thread.
pub(crate) fn rollback_detached(ambient: &AmbientContext, handle: TransactionHandle) {
    let outer = match ambient.suspend() {
        Ok(outer) => outer,
        Err(e) => {
            warn!("cannot detach thread to roll back {handle}: {e}");
            return;
        }
    };
    match ambient.resume_handle(handle) {
        Ok(()) => {
            if let Err(e) = ambient.rollback() {
                warn!("rolling back orphaned {handle}: {e}");
            } else {
                debug!("rolled back orphaned {handle}");
            }
        }
        Err(e) => warn!("cannot resume orphaned {handle}: {e}"),
    }
    if let Some(outer) = outer {
        ambient.resume_quietly(outer);
    }
}
