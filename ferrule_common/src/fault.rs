//! Faults raised through an invocation chain.
//!
//! A [`Fault`] is either a [`BusinessFault`] thrown by component code or a
//! [`ContainerFault`] raised by the container itself. Business faults carry
//! the type information the exception classifier needs (type name, ancestor
//! types, checked/unchecked). Container faults are always unchecked and share
//! the [`CONTAINER_FAILURE`] supertype, so a caller sees a single type for
//! "the container itself failed".

use thiserror::Error;

use crate::consts::CONTAINER_FAILURE;
use crate::policy::MethodId;
use crate::pool::InstanceId;
use crate::txn::{TransactionHandle, TxError};

// ─── Business Faults ────────────────────────────────────────────────

/// A failure thrown by business code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{type_name}: {message}")]
pub struct BusinessFault {
    type_name: String,
    ancestors: Vec<String>,
    checked: bool,
    message: String,
}

impl BusinessFault {
    /// A checked failure: only an application outcome if declared or configured.
    pub fn checked(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            ancestors: Vec::new(),
            checked: true,
            message: message.into(),
        }
    }

    /// An unchecked (runtime) failure: a system failure unless configured otherwise.
    pub fn unchecked(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            ancestors: Vec::new(),
            checked: false,
            message: message.into(),
        }
    }

    /// Add a supertype, nearest first.
    pub fn extends(mut self, ancestor: impl Into<String>) -> Self {
        self.ancestors.push(ancestor.into());
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Supertypes, nearest first.
    pub fn ancestors(&self) -> &[String] {
        &self.ancestors
    }

    pub fn is_checked(&self) -> bool {
        self.checked
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns true if this fault is an instance of `type_name`.
    pub fn is_assignable_to(&self, type_name: &str) -> bool {
        self.type_name == type_name || self.ancestors.iter().any(|a| a == type_name)
    }
}

// ─── Container Faults ───────────────────────────────────────────────

/// A failure raised by the container.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContainerFault {
    /// MANDATORY method invoked without a transaction.
    #[error("{method}: a transaction is required but none is active")]
    TransactionRequired { method: MethodId },

    /// NEVER method invoked with a transaction.
    #[error("{method}: invoked with an active transaction")]
    TransactionNotAllowed { method: MethodId },

    /// Bean-managed stateless method returned leaving its transaction open.
    #[error("{method}: bean-managed stateless method returned with {handle} still open")]
    TransactionLeftOpen {
        method: MethodId,
        handle: TransactionHandle,
    },

    /// The transaction the call ran in has been (or will be) rolled back.
    #[error("{method}: transaction rolled back")]
    TransactionRolledBack {
        method: MethodId,
        #[source]
        cause: Option<Box<Fault>>,
    },

    /// The transaction manager failed.
    #[error("{method}: transaction manager failure")]
    Transaction {
        method: MethodId,
        #[source]
        source: TxError,
    },

    /// The thread does not carry the transaction this frame started.
    #[error("{method}: expected {expected} on the thread, found {found:?}")]
    WrongTransaction {
        method: MethodId,
        expected: TransactionHandle,
        found: Option<TransactionHandle>,
    },

    /// A system failure of the invocation, wrapping its cause.
    #[error("{method}: invocation failed")]
    Failed {
        method: MethodId,
        #[source]
        cause: Box<Fault>,
    },

    /// A stateful instance was entered by a second call.
    #[error("instance {instance} is already serving a call")]
    ConcurrentAccess { instance: InstanceId },

    /// The instance was discarded after a system failure.
    #[error("instance {instance} was discarded")]
    NoSuchInstance { instance: InstanceId },

    /// An operation was used where the component's contract forbids it.
    #[error("{method}: {reason}")]
    IllegalState {
        method: MethodId,
        reason: &'static str,
    },
}

impl ContainerFault {
    /// Type name used for application-exception matching and logging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::TransactionRequired { .. } => "TransactionRequired",
            Self::TransactionNotAllowed { .. } => "TransactionNotAllowed",
            Self::TransactionLeftOpen { .. } => "TransactionLeftOpen",
            Self::TransactionRolledBack { .. } => "TransactionRolledBack",
            Self::Transaction { .. } => "TransactionFailure",
            Self::WrongTransaction { .. } => "WrongTransaction",
            Self::Failed { .. } => CONTAINER_FAILURE,
            Self::ConcurrentAccess { .. } => "ConcurrentAccess",
            Self::NoSuchInstance { .. } => "NoSuchInstance",
            Self::IllegalState { .. } => "IllegalState",
        }
    }

    /// Method the fault was raised for, if known.
    pub fn method(&self) -> Option<&MethodId> {
        match self {
            Self::TransactionRequired { method }
            | Self::TransactionNotAllowed { method }
            | Self::TransactionLeftOpen { method, .. }
            | Self::TransactionRolledBack { method, .. }
            | Self::Transaction { method, .. }
            | Self::WrongTransaction { method, .. }
            | Self::Failed { method, .. }
            | Self::IllegalState { method, .. } => Some(method),
            Self::ConcurrentAccess { .. } | Self::NoSuchInstance { .. } => None,
        }
    }

    /// Wrapped cause, if this fault wraps another one.
    pub fn cause(&self) -> Option<&Fault> {
        match self {
            Self::Failed { cause, .. } => Some(cause.as_ref()),
            Self::TransactionRolledBack { cause, .. } => cause.as_deref(),
            _ => None,
        }
    }
}

// ─── Fault ──────────────────────────────────────────────────────────

/// Anything an invocation chain link may fail with.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Fault {
    #[error(transparent)]
    Business(#[from] BusinessFault),

    #[error(transparent)]
    Container(#[from] ContainerFault),
}

impl Fault {
    pub fn type_name(&self) -> &str {
        match self {
            Self::Business(b) => b.type_name(),
            Self::Container(c) => c.type_name(),
        }
    }

    /// Container faults are always unchecked.
    pub fn is_checked(&self) -> bool {
        match self {
            Self::Business(b) => b.is_checked(),
            Self::Container(_) => false,
        }
    }

    /// Returns true if this fault is an instance of `type_name`.
    pub fn is_assignable_to(&self, type_name: &str) -> bool {
        match self {
            Self::Business(b) => b.is_assignable_to(type_name),
            Self::Container(c) => type_name == c.type_name() || type_name == CONTAINER_FAILURE,
        }
    }

    pub fn as_container(&self) -> Option<&ContainerFault> {
        match self {
            Self::Container(c) => Some(c),
            Self::Business(_) => None,
        }
    }

    pub fn as_business(&self) -> Option<&BusinessFault> {
        match self {
            Self::Business(b) => Some(b),
            Self::Container(_) => None,
        }
    }

    /// Innermost fault of a wrapping chain.
    pub fn root_cause(&self) -> &Fault {
        let mut current = self;
        while let Some(cause) = current.as_container().and_then(ContainerFault::cause) {
            current = cause;
        }
        current
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
