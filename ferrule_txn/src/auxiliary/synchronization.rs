//! Session synchronization.
//!
//! The first time a synchronized stateful instance is called inside a
//! transaction, its `after_begin` callback runs and a listener is registered
//! with the transaction manager for `before_completion` / `after_completion`.
//! Every callback is dispatched through the propagation engine with a
//! callback phase, so it inherits the boundary's context untouched.

use std::sync::Arc;

use ferrule::fault::Fault;
use ferrule::txn::{Synchronization, TransactionHandle, TxError, TxStatus};
use tracing::{debug, warn};

use crate::component::{SessionSynchronization, StatefulInstance};
use crate::context::{InvocationContext, InvocationPhase, transaction_fault};
use crate::propagation::TransactionInterceptor;

pub struct SessionSynchronizationInterceptor {
    engine: Arc<TransactionInterceptor>,
}

impl SessionSynchronizationInterceptor {
    pub fn new(engine: Arc<TransactionInterceptor>) -> Self {
        Self { engine }
    }

    pub fn invoke<T, F>(&self, ctx: &mut InvocationContext, next: F) -> Result<T, Fault>
    where
        F: FnOnce(&mut InvocationContext) -> Result<T, Fault>,
    {
        if ctx.phase().is_lifecycle_callback() {
            return next(ctx);
        }
        let Some(instance) = ctx.instance().cloned() else {
            return next(ctx);
        };
        let Some(sync) = instance.synchronization().cloned() else {
            return next(ctx);
        };

        let current = ctx
            .ambient()
            .current()
            .map_err(|e| transaction_fault(ctx.method(), e))?;
        if let Some(handle) = current {
            if instance.claim_sync_registration(handle) {
                if let Err(fault) = self.register(ctx, &instance, &sync, handle) {
                    instance.release_sync_registration(handle);
                    return Err(fault);
                }
            }
        }
        next(ctx)
    }

    fn register(
        &self,
        ctx: &InvocationContext,
        instance: &StatefulInstance,
        sync: &Arc<dyn SessionSynchronization>,
        handle: TransactionHandle,
    ) -> Result<(), Fault> {
        debug!("{}: instance {} joins {handle}", ctx.method(), instance.id());
        let mut callback = ctx.with_phase(InvocationPhase::AfterBegin);
        self.engine.invoke(&mut callback, |_| sync.after_begin())?;

        let listener = SessionListener {
            engine: Arc::clone(&self.engine),
            ctx: ctx.clone(),
            sync: Arc::clone(sync),
            handle,
        };
        ctx.ambient()
            .register_synchronization(Arc::new(listener))
            .map_err(|e| transaction_fault(ctx.method(), e))
    }
}

/// Completion listener bridging the transaction manager to the instance.
struct SessionListener {
    engine: Arc<TransactionInterceptor>,
    ctx: InvocationContext,
    sync: Arc<dyn SessionSynchronization>,
    handle: TransactionHandle,
}

impl Synchronization for SessionListener {
    fn before_completion(&self) -> Result<(), TxError> {
        let mut callback = self.ctx.with_phase(InvocationPhase::BeforeCompletion);
        self.engine
            .invoke(&mut callback, |_| self.sync.before_completion())
            .map_err(|fault| {
                warn!(
                    "{}: before_completion failed, {} will roll back: {fault}",
                    self.ctx.method(),
                    self.handle
                );
                TxError::System(fault.to_string())
            })
    }

    fn after_completion(&self, status: TxStatus) {
        if let Some(instance) = self.ctx.instance() {
            instance.release_sync_registration(self.handle);
        }
        let committed = status == TxStatus::Committed;
        let mut callback = self.ctx.with_phase(InvocationPhase::AfterCompletion);
        if let Err(fault) = self
            .engine
            .invoke(&mut callback, |_| self.sync.after_completion(committed))
        {
            warn!("{}: after_completion failed: {fault}", self.ctx.method());
        }
    }
}
