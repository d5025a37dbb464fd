//! Engine-wide constants.

use crate::policy::TransactionAttribute;

/// Upper bound for a configured transaction timeout [s] (24h).
pub const TIMEOUT_SECS_MAX: u64 = 86_400;

/// Default transaction timeout [s] when neither the method nor the engine
/// configures one. Zero means "use the transaction manager's own default".
pub const DEFAULT_TIMEOUT_SECS: u64 = 0;

/// Attributes a message-driven component may declare.
pub const MESSAGE_DRIVEN_ATTRIBUTES: [TransactionAttribute; 2] =
    [TransactionAttribute::Required, TransactionAttribute::NotSupported];

/// Common supertype name of every container-raised fault.
pub const CONTAINER_FAILURE: &str = "ContainerFailure";
