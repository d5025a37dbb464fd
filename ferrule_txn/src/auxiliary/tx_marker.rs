//! Stateful in-transaction marker.
//!
//! Flags a stateful instance as enlisted while any transaction it was called
//! in (or began itself) is still active. The flag is cleared by a completion
//! listener, so it also covers transactions that outlive the call.

use std::sync::Arc;

use ferrule::fault::Fault;
use ferrule::txn::{Synchronization, TransactionHandle, TxError, TxStatus};
use tracing::{trace, warn};

use crate::component::StatefulInstance;
use crate::context::InvocationContext;

#[derive(Debug, Default, Clone, Copy)]
pub struct TransactionMarker;

impl TransactionMarker {
    pub fn invoke<T, F>(&self, ctx: &mut InvocationContext, next: F) -> Result<T, Fault>
    where
        F: FnOnce(&mut InvocationContext) -> Result<T, Fault>,
    {
        let Some(instance) = ctx.instance().cloned() else {
            return next(ctx);
        };
        mark(ctx, &instance);
        let result = next(ctx);
        // Bean-managed code may have begun a transaction during the call.
        mark(ctx, &instance);
        result
    }
}

fn mark(ctx: &InvocationContext, instance: &Arc<StatefulInstance>) {
    let ambient = ctx.ambient();
    let handle = match (ambient.current(), ambient.status()) {
        (Ok(Some(handle)), Ok(status)) if status.is_open() => handle,
        (Err(e), _) | (_, Err(e)) => {
            warn!("{}: cannot read transaction for marker: {e}", ctx.method());
            return;
        }
        _ => return,
    };
    if !instance.claim_marker(handle) {
        return;
    }
    trace!("{}: instance {} enlisted in {handle}", ctx.method(), instance.id());
    let clear = Arc::new(ClearMarker {
        instance: Arc::clone(instance),
        handle,
    });
    if let Err(e) = ambient.register_synchronization(clear) {
        warn!("{}: marker listener not registered: {e}", ctx.method());
        instance.release_marker(handle);
    }
}

struct ClearMarker {
    instance: Arc<StatefulInstance>,
    handle: TransactionHandle,
}

impl Synchronization for ClearMarker {
    fn before_completion(&self) -> Result<(), TxError> {
        Ok(())
    }

    fn after_completion(&self, _status: TxStatus) {
        self.instance.release_marker(self.handle);
    }
}
