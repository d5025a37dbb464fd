//! Transaction manager contract.
//!
//! The engine never implements transactions itself. It drives an external
//! [`TransactionManager`] that associates at most one transaction with the
//! calling thread, in the manner of a JTA-style manager. Every call is
//! blocking and may take non-trivial time (two-phase commit across resource
//! managers); none of them is retried by the engine.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Opaque handle of a transaction, minted by the transaction manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionHandle(u64);

impl TransactionHandle {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx#{}", self.0)
    }
}

/// Status of the transaction associated with the calling thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxStatus {
    /// Running; may commit.
    Active,
    /// Running; can only roll back.
    MarkedRollback,
    /// Committed.
    Committed,
    /// Rolled back.
    RolledBack,
    /// No transaction is associated with the thread.
    NoTransaction,
    /// Status cannot be determined.
    Unknown,
}

impl TxStatus {
    /// Returns true while the transaction can still be completed.
    #[inline]
    pub const fn is_open(&self) -> bool {
        matches!(self, Self::Active | Self::MarkedRollback)
    }

    /// Returns true once the transaction reached a final outcome.
    #[inline]
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Committed | Self::RolledBack)
    }
}

/// Failures reported at the transaction manager boundary.
///
/// All of them are SYSTEM-level from the engine's point of view.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TxError {
    /// `begin` while a transaction is already associated with the thread.
    #[error("a transaction is already associated with the current thread")]
    AlreadyAssociated,

    /// Operation needs a transaction but the thread has none.
    #[error("no transaction is associated with the current thread")]
    NoTransaction,

    /// Commit found the transaction marked or forced to roll back.
    #[error("{0} was rolled back")]
    RolledBack(TransactionHandle),

    /// Some resources committed and some rolled back.
    #[error("heuristic outcome for {handle}: {detail}")]
    Heuristic {
        handle: TransactionHandle,
        detail: String,
    },

    /// Handle unknown to the manager or not resumable.
    #[error("invalid transaction handle {0}")]
    InvalidHandle(TransactionHandle),

    /// Any other manager failure.
    #[error("transaction manager failure: {0}")]
    System(String),
}

/// Completion listener registered with a transaction.
pub trait Synchronization: Send + Sync {
    /// Called on the committing thread before the two-phase commit starts.
    ///
    /// Returning an error forces the transaction to roll back.
    fn before_completion(&self) -> Result<(), TxError>;

    /// Called once the outcome is known.
    fn after_completion(&self, status: TxStatus);
}

/// External, thread-associating transaction manager.
pub trait TransactionManager: Send + Sync {
    /// Begin a transaction and associate it with the calling thread.
    fn begin(&self) -> Result<(), TxError>;

    /// Transaction associated with the calling thread, if any.
    fn transaction(&self) -> Result<Option<TransactionHandle>, TxError>;

    /// Detach the thread's transaction and return it (`None` if there was none).
    fn suspend(&self) -> Result<Option<TransactionHandle>, TxError>;

    /// Re-associate a previously suspended transaction with the calling thread.
    fn resume(&self, handle: TransactionHandle) -> Result<(), TxError>;

    /// Commit the thread's transaction and disassociate it.
    fn commit(&self) -> Result<(), TxError>;

    /// Roll back the thread's transaction and disassociate it.
    fn rollback(&self) -> Result<(), TxError>;

    /// Mark the thread's transaction so that its only outcome is rollback.
    fn set_rollback_only(&self) -> Result<(), TxError>;

    /// Status of the thread's transaction.
    fn status(&self) -> Result<TxStatus, TxError>;

    /// Timeout applied to transactions subsequently begun on this thread.
    /// `Duration::ZERO` restores the manager default.
    fn set_transaction_timeout(&self, timeout: Duration) -> Result<(), TxError>;

    /// Register a completion listener with the thread's transaction.
    fn register_synchronization(&self, sync: Arc<dyn Synchronization>) -> Result<(), TxError>;
}
