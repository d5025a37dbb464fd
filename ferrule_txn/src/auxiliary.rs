//! Auxiliary interceptors.
//!
//! Run inside the propagation engine, in the transaction context it
//! established, and only act on stateful instances.

pub mod persistence;
pub mod synchronization;
pub mod tx_marker;

pub use persistence::PersistenceJoin;
pub use synchronization::SessionSynchronizationInterceptor;
pub use tx_marker::TransactionMarker;
