//! # Ferrule Testkit
//!
//! In-memory collaborators for exercising the propagation engine:
//!
//! - [`InMemoryTransactionManager`]: thread-associating transaction manager
//!   with an event journal and one-shot failure injection.
//! - [`RecordingPool`]: instance pool that records every discard.
//!
//! Nothing here is durable or distributed; it only models the association and
//! status bookkeeping the engine relies on.

mod manager;
mod pool;

pub use manager::{InMemoryTransactionManager, TxEvent, TxOp};
pub use pool::RecordingPool;
