//! Ambient transaction context.
//!
//! Thin synchronous wrapper over the external [`TransactionManager`]. The
//! ambient transaction is whatever the manager associates with the calling
//! thread; this wrapper adds the suspend/resume bookkeeping the engine relies
//! on:
//!
//! - `begin` refuses to nest: the caller must suspend first.
//! - `suspend` hands out a [`SuspendedTransaction`] token that cannot leave
//!   the thread (`!Send`) and must be given back to `resume`.
//! - [`SuspendScope`] resumes its token on drop, so a panic inside the
//!   business method still restores the caller's transaction. A transaction
//!   the frame itself left on the thread is rolled back first.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use ferrule::txn::{Synchronization, TransactionHandle, TransactionManager, TxError, TxStatus};
use tracing::{debug, trace, warn};

/// Handle of a transaction detached from the calling thread.
///
/// Owned by the frame that suspended it; resume it on the same thread.
#[must_use = "a suspended transaction must be resumed"]
#[derive(Debug)]
pub struct SuspendedTransaction {
    handle: TransactionHandle,
    // Tokens never cross threads.
    _thread_bound: PhantomData<*const ()>,
}

impl SuspendedTransaction {
    fn new(handle: TransactionHandle) -> Self {
        Self {
            handle,
            _thread_bound: PhantomData,
        }
    }

    /// Handle of the suspended transaction.
    pub fn handle(&self) -> TransactionHandle {
        self.handle
    }

    /// Give up frame ownership, e.g. to park the transaction in the affinity store.
    pub(crate) fn into_handle(self) -> TransactionHandle {
        self.handle
    }
}

/// Ambient transaction operations against one transaction manager.
#[derive(Clone)]
pub struct AmbientContext {
    manager: Arc<dyn TransactionManager>,
}

impl AmbientContext {
    pub fn new(manager: Arc<dyn TransactionManager>) -> Self {
        Self { manager }
    }

    /// Transaction associated with the calling thread, if any.
    pub fn current(&self) -> Result<Option<TransactionHandle>, TxError> {
        self.manager.transaction()
    }

    /// Status of the ambient transaction (`NoTransaction` if absent).
    pub fn status(&self) -> Result<TxStatus, TxError> {
        self.manager.status()
    }

    /// Begin a transaction and associate it with the calling thread.
    ///
    /// # Errors
    ///
    /// `TxError::AlreadyAssociated` if the thread already carries a
    /// transaction; any manager failure otherwise.
    pub fn begin(&self, timeout: Option<Duration>) -> Result<TransactionHandle, TxError> {
        if let Some(existing) = self.manager.transaction()? {
            debug!(%existing, "refusing nested begin");
            return Err(TxError::AlreadyAssociated);
        }

        if let Some(timeout) = timeout {
            self.manager.set_transaction_timeout(timeout)?;
        }
        let begun = self.manager.begin();
        if timeout.is_some() {
            if let Err(e) = self.manager.set_transaction_timeout(Duration::ZERO) {
                warn!(error = %e, "failed to restore default transaction timeout");
            }
        }
        begun?;

        let handle = self.manager.transaction()?.ok_or(TxError::NoTransaction)?;
        trace!(%handle, "began");
        Ok(handle)
    }

    /// Detach the ambient transaction. `None` if the thread had none.
    pub fn suspend(&self) -> Result<Option<SuspendedTransaction>, TxError> {
        let suspended = self.manager.suspend()?;
        if let Some(handle) = suspended {
            trace!(%handle, "suspended");
        }
        Ok(suspended.map(SuspendedTransaction::new))
    }

    /// Re-attach a suspended transaction.
    pub fn resume(&self, token: SuspendedTransaction) -> Result<(), TxError> {
        self.resume_handle(token.handle)
    }

    /// Re-attach a suspended transaction during cleanup; failures are logged.
    pub fn resume_quietly(&self, token: SuspendedTransaction) {
        let handle = token.handle;
        if let Err(e) = self.resume(token) {
            warn!(%handle, error = %e, "failed to resume suspended transaction during cleanup");
        }
    }

    /// Re-attach a transaction parked outside of any frame.
    pub(crate) fn resume_handle(&self, handle: TransactionHandle) -> Result<(), TxError> {
        self.manager.resume(handle)?;
        trace!(%handle, "resumed");
        Ok(())
    }

    pub fn commit(&self) -> Result<(), TxError> {
        self.manager.commit()
    }

    pub fn rollback(&self) -> Result<(), TxError> {
        self.manager.rollback()
    }

    /// Active → MarkedRollback. Idempotent on an already marked transaction.
    pub fn mark_rollback_only(&self) -> Result<(), TxError> {
        match self.manager.status()? {
            TxStatus::MarkedRollback => Ok(()),
            TxStatus::NoTransaction => Err(TxError::NoTransaction),
            _ => self.manager.set_rollback_only(),
        }
    }

    /// Mark rollback-only during cleanup; failures are logged.
    pub(crate) fn mark_rollback_only_quietly(&self) {
        if let Err(e) = self.mark_rollback_only() {
            warn!(error = %e, "failed to mark transaction rollback-only");
        }
    }

    pub fn register_synchronization(&self, sync: Arc<dyn Synchronization>) -> Result<(), TxError> {
        self.manager.register_synchronization(sync)
    }

    /// Roll back and detach whatever transaction the thread carries. Used when
    /// a frame unwinds without completing its own transaction.
    pub(crate) fn abandon_current(&self) {
        let handle = match self.current() {
            Ok(Some(handle)) => handle,
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, "cannot inspect thread while unwinding");
                return;
            }
        };
        warn!(%handle, "rolling back transaction abandoned by unwinding frame");
        if let Err(e) = self.manager.rollback() {
            warn!(%handle, error = %e, "rollback of abandoned transaction failed");
        }
        if matches!(self.current(), Ok(Some(_))) {
            if let Err(e) = self.manager.suspend() {
                warn!(%handle, error = %e, "cannot detach abandoned transaction");
            }
        }
    }

    /// Drop the association of a transaction that already completed.
    pub(crate) fn clear_completed(&self) -> Result<(), TxError> {
        if self.manager.status()?.is_completed() {
            if let Some(token) = self.suspend()? {
                debug!(handle = %token.handle(), "cleared completed transaction from thread");
            }
        }
        Ok(())
    }
}

/// Frame-scoped suspension.
///
/// Holds the caller's transaction (if any) for the duration of one
/// interceptor frame. `exit` resumes it and reports failures; dropping the
/// scope without `exit` resumes it quietly.
///
/// Once the frame has suspended the caller or begun through [`begin`](Self::begin),
/// whatever the thread carries when the scope is dropped without `exit`
/// belongs to the frame and is rolled back before the caller comes back.
pub struct SuspendScope<'a> {
    ambient: &'a AmbientContext,
    token: Option<SuspendedTransaction>,
    owns_thread: bool,
}

impl<'a> SuspendScope<'a> {
    /// Suspend whatever transaction the thread carries.
    pub fn enter(ambient: &'a AmbientContext) -> Result<Self, TxError> {
        Ok(Self {
            ambient,
            token: ambient.suspend()?,
            owns_thread: true,
        })
    }

    /// Scope that suspended nothing.
    pub fn empty(ambient: &'a AmbientContext) -> Self {
        Self {
            ambient,
            token: None,
            owns_thread: false,
        }
    }

    /// Handle of the suspended caller transaction.
    pub fn suspended(&self) -> Option<TransactionHandle> {
        self.token.as_ref().map(SuspendedTransaction::handle)
    }

    /// Begin a transaction owned by this frame.
    pub fn begin(&mut self, timeout: Option<Duration>) -> Result<TransactionHandle, TxError> {
        let handle = self.ambient.begin(timeout)?;
        self.owns_thread = true;
        Ok(handle)
    }

    /// Resume the caller's transaction.
    pub fn exit(mut self) -> Result<(), TxError> {
        self.owns_thread = false;
        match self.token.take() {
            Some(token) => self.ambient.resume(token),
            None => Ok(()),
        }
    }

    /// Resume the caller's transaction, logging failures.
    pub fn exit_quietly(mut self) {
        self.owns_thread = false;
        if let Some(token) = self.token.take() {
            self.ambient.resume_quietly(token);
        }
    }
}

impl Drop for SuspendScope<'_> {
    fn drop(&mut self) {
        if self.owns_thread {
            self.ambient.abandon_current();
        }
        if let Some(token) = self.token.take() {
            self.ambient.resume_quietly(token);
        }
    }
}
