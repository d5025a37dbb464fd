//! Journaled in-memory transaction manager.
//!
//! Transactions are associated per OS thread. Completion listeners are called
//! without holding the internal lock, so listeners may call back into the
//! manager (as the engine's synchronization callbacks do).

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Duration;

use ferrule_common::txn::{
    Synchronization, TransactionHandle, TransactionManager, TxError, TxStatus,
};
use parking_lot::Mutex;
use tracing::trace;

/// Manager operation, used to target failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxOp {
    Begin,
    Transaction,
    Suspend,
    Resume,
    Commit,
    Rollback,
    SetRollbackOnly,
    Status,
    SetTimeout,
    RegisterSynchronization,
}

/// Journal entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxEvent {
    Begin(TransactionHandle),
    Suspend(TransactionHandle),
    Resume(TransactionHandle),
    Commit(TransactionHandle),
    Rollback(TransactionHandle),
    SetRollbackOnly(TransactionHandle),
    Timeout(Duration),
    Registered(TransactionHandle),
}

struct TxRecord {
    status: TxStatus,
    timeout: Option<Duration>,
    syncs: Vec<Arc<dyn Synchronization>>,
}

#[derive(Default)]
struct State {
    next_id: u64,
    transactions: HashMap<TransactionHandle, TxRecord>,
    threads: HashMap<ThreadId, TransactionHandle>,
    timeouts: HashMap<ThreadId, Duration>,
    journal: Vec<TxEvent>,
    failures: HashMap<TxOp, TxError>,
}

impl State {
    fn take_failure(&mut self, op: TxOp) -> Result<(), TxError> {
        match self.failures.remove(&op) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn current(&self) -> Option<TransactionHandle> {
        self.threads.get(&thread::current().id()).copied()
    }
}

/// Thread-associating transaction manager kept entirely in memory.
#[derive(Default)]
pub struct InMemoryTransactionManager {
    state: Mutex<State>,
}

impl InMemoryTransactionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next call of `op` fail with `err`.
    ///
    /// Failures have no side effects, except that a failed commit or rollback
    /// leaves the transaction rolled back and detached from the thread.
    pub fn fail_next(&self, op: TxOp, err: TxError) {
        self.state.lock().failures.insert(op, err);
    }

    /// Begin a transaction on the calling thread, outside of any engine frame.
    pub fn begin_ambient(&self) -> TransactionHandle {
        let mut state = self.state.lock();
        state.next_id += 1;
        let handle = TransactionHandle::new(state.next_id);
        state.transactions.insert(
            handle,
            TxRecord {
                status: TxStatus::Active,
                timeout: None,
                syncs: Vec::new(),
            },
        );
        state.threads.insert(thread::current().id(), handle);
        handle
    }

    /// Transaction associated with the calling thread.
    pub fn current(&self) -> Option<TransactionHandle> {
        self.state.lock().current()
    }

    /// Status of any transaction ever begun.
    pub fn status_of(&self, handle: TransactionHandle) -> Option<TxStatus> {
        self.state.lock().transactions.get(&handle).map(|r| r.status)
    }

    /// Timeout the transaction was begun with.
    pub fn timeout_of(&self, handle: TransactionHandle) -> Option<Duration> {
        self.state
            .lock()
            .transactions
            .get(&handle)
            .and_then(|r| r.timeout)
    }

    /// Snapshot of the journal.
    pub fn events(&self) -> Vec<TxEvent> {
        self.state.lock().journal.clone()
    }

    /// Number of journal entries matching `pred`.
    pub fn count(&self, pred: impl Fn(&TxEvent) -> bool) -> usize {
        self.state.lock().journal.iter().filter(|e| pred(e)).count()
    }

    /// Drop the journal and every completed transaction record.
    pub fn reset_history(&self) {
        let mut state = self.state.lock();
        state.journal.clear();
        state.transactions.retain(|_, record| !record.status.is_completed());
    }

    /// Complete the thread's transaction. Listeners run outside the lock.
    fn complete(&self, commit_requested: bool) -> Result<(), TxError> {
        let (handle, syncs, marked) = {
            let mut state = self.state.lock();
            let handle = state.current().ok_or(TxError::NoTransaction)?;
            let op = if commit_requested {
                TxOp::Commit
            } else {
                TxOp::Rollback
            };
            if let Err(err) = state.take_failure(op) {
                // A failed completion still ends the transaction.
                if let Some(record) = state.transactions.get_mut(&handle) {
                    record.status = TxStatus::RolledBack;
                }
                state.threads.remove(&thread::current().id());
                return Err(err);
            }
            let record = state
                .transactions
                .get(&handle)
                .ok_or(TxError::InvalidHandle(handle))?;
            (
                handle,
                record.syncs.clone(),
                record.status == TxStatus::MarkedRollback,
            )
        };

        let mut commit = commit_requested && !marked;
        if commit {
            for sync in &syncs {
                if sync.before_completion().is_err() {
                    commit = false;
                    break;
                }
            }
        }

        let outcome = {
            let mut state = self.state.lock();
            let outcome = if commit {
                TxStatus::Committed
            } else {
                TxStatus::RolledBack
            };
            if let Some(record) = state.transactions.get_mut(&handle) {
                record.status = outcome;
            }
            state.threads.remove(&thread::current().id());
            state.journal.push(if commit {
                TxEvent::Commit(handle)
            } else {
                TxEvent::Rollback(handle)
            });
            outcome
        };
        trace!(%handle, ?outcome, "completed");

        for sync in &syncs {
            sync.after_completion(outcome);
        }

        if commit_requested && outcome == TxStatus::RolledBack {
            return Err(TxError::RolledBack(handle));
        }
        Ok(())
    }
}

impl TransactionManager for InMemoryTransactionManager {
    fn begin(&self) -> Result<(), TxError> {
        let mut state = self.state.lock();
        state.take_failure(TxOp::Begin)?;
        if state.current().is_some() {
            return Err(TxError::AlreadyAssociated);
        }
        state.next_id += 1;
        let handle = TransactionHandle::new(state.next_id);
        let timeout = state.timeouts.get(&thread::current().id()).copied();
        state.transactions.insert(
            handle,
            TxRecord {
                status: TxStatus::Active,
                timeout,
                syncs: Vec::new(),
            },
        );
        state.threads.insert(thread::current().id(), handle);
        state.journal.push(TxEvent::Begin(handle));
        trace!(%handle, "begin");
        Ok(())
    }

    fn transaction(&self) -> Result<Option<TransactionHandle>, TxError> {
        let mut state = self.state.lock();
        state.take_failure(TxOp::Transaction)?;
        Ok(state.current())
    }

    fn suspend(&self) -> Result<Option<TransactionHandle>, TxError> {
        let mut state = self.state.lock();
        state.take_failure(TxOp::Suspend)?;
        let handle = state.threads.remove(&thread::current().id());
        if let Some(handle) = handle {
            state.journal.push(TxEvent::Suspend(handle));
        }
        Ok(handle)
    }

    fn resume(&self, handle: TransactionHandle) -> Result<(), TxError> {
        let mut state = self.state.lock();
        state.take_failure(TxOp::Resume)?;
        if state.current().is_some() {
            return Err(TxError::AlreadyAssociated);
        }
        match state.transactions.get(&handle) {
            Some(record) if record.status.is_open() => {}
            _ => return Err(TxError::InvalidHandle(handle)),
        }
        state.threads.insert(thread::current().id(), handle);
        state.journal.push(TxEvent::Resume(handle));
        Ok(())
    }

    fn commit(&self) -> Result<(), TxError> {
        self.complete(true)
    }

    fn rollback(&self) -> Result<(), TxError> {
        self.complete(false)
    }

    fn set_rollback_only(&self) -> Result<(), TxError> {
        let mut state = self.state.lock();
        state.take_failure(TxOp::SetRollbackOnly)?;
        let handle = state.current().ok_or(TxError::NoTransaction)?;
        if let Some(record) = state.transactions.get_mut(&handle) {
            if record.status == TxStatus::Active {
                record.status = TxStatus::MarkedRollback;
            }
        }
        state.journal.push(TxEvent::SetRollbackOnly(handle));
        Ok(())
    }

    fn status(&self) -> Result<TxStatus, TxError> {
        let mut state = self.state.lock();
        state.take_failure(TxOp::Status)?;
        Ok(match state.current() {
            Some(handle) => state
                .transactions
                .get(&handle)
                .map(|r| r.status)
                .unwrap_or(TxStatus::Unknown),
            None => TxStatus::NoTransaction,
        })
    }

    fn set_transaction_timeout(&self, timeout: Duration) -> Result<(), TxError> {
        let mut state = self.state.lock();
        state.take_failure(TxOp::SetTimeout)?;
        let tid = thread::current().id();
        if timeout.is_zero() {
            state.timeouts.remove(&tid);
        } else {
            state.timeouts.insert(tid, timeout);
        }
        state.journal.push(TxEvent::Timeout(timeout));
        Ok(())
    }

    fn register_synchronization(&self, sync: Arc<dyn Synchronization>) -> Result<(), TxError> {
        let mut state = self.state.lock();
        state.take_failure(TxOp::RegisterSynchronization)?;
        let handle = state.current().ok_or(TxError::NoTransaction)?;
        if let Some(record) = state.transactions.get_mut(&handle) {
            record.syncs.push(sync);
        }
        state.journal.push(TxEvent::Registered(handle));
        Ok(())
    }
}
