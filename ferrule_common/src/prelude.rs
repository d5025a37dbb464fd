//! Prelude module for common re-exports.
//!
//! ```rust
//! use ferrule_common::prelude::*;
//! ```

// ─── Logging ────────────────────────────────────────────────────────
pub use crate::config::LogLevel;
pub use crate::logging::init_tracing;

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, EngineConfig, SharedConfig};
pub use crate::descriptor::{ApplicationExceptionConfig, ComponentConfig, DeploymentConfig};

// ─── Policy ─────────────────────────────────────────────────────────
pub use crate::policy::{
    ComponentKind, ManagementMode, MethodId, MethodPolicy, PolicyError, PolicySource,
    PolicyTable, TransactionAttribute,
};

// ─── Faults ─────────────────────────────────────────────────────────
pub use crate::fault::{BusinessFault, ContainerFault, Fault};

// ─── Collaborators ──────────────────────────────────────────────────
pub use crate::pool::{InstanceId, InstancePool, PoolError};
pub use crate::txn::{Synchronization, TransactionHandle, TransactionManager, TxError, TxStatus};
