//! Instance pool contract.
//!
//! Pooling itself lives outside the engine. The engine only needs to tell the
//! owning pool that a stateful instance is faulty and must never serve
//! another call.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identity of a component instance (e.g. a stateful session id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceId(String);

impl InstanceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for InstanceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for InstanceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Errors reported by an [`InstancePool`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    /// The pool does not own this instance.
    #[error("instance {0} is not owned by this pool")]
    UnknownInstance(InstanceId),

    /// Any other pool failure.
    #[error("instance pool failure: {0}")]
    Other(String),
}

/// Owner of component instances.
pub trait InstancePool: Send + Sync {
    /// Permanently evict `instance`; it must never be handed out again.
    fn discard(&self, instance: &InstanceId) -> Result<(), PoolError>;
}
