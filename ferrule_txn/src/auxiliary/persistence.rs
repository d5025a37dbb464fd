//! Extended persistence join.
//!
//! Enlists the extended resources of a stateful instance in the transaction
//! of each call, so state cached across calls is flushed by whichever
//! transaction the instance happens to run in.

use ferrule::fault::Fault;
use tracing::trace;

use crate::context::{InvocationContext, transaction_fault};

#[derive(Debug, Default, Clone, Copy)]
pub struct PersistenceJoin;

impl PersistenceJoin {
    pub fn invoke<T, F>(&self, ctx: &mut InvocationContext, next: F) -> Result<T, Fault>
    where
        F: FnOnce(&mut InvocationContext) -> Result<T, Fault>,
    {
        let resources = match ctx.instance() {
            Some(instance) => instance.resources(),
            None => return next(ctx),
        };
        if resources.is_empty() {
            return next(ctx);
        }

        let current = ctx
            .ambient()
            .current()
            .map_err(|e| transaction_fault(ctx.method(), e))?;
        if let Some(handle) = current {
            for resource in &resources {
                trace!("{}: joining {} to {handle}", ctx.method(), resource.name());
                resource.join_transaction(handle)?;
            }
        }
        next(ctx)
    }
}
