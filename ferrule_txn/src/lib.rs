//! # Ferrule Transaction Engine
//!
//! Declarative transaction propagation for managed components. Every business
//! call passes through an interceptor chain that, based on the method's
//! policy, joins, suspends, starts or forbids the caller's transaction,
//! classifies whatever the method fails with, and decides commit, rollback
//! and instance discard.
//!
//! ## Building Blocks
//!
//! - [`ambient`] - thread-associated transaction context and suspend tokens
//! - [`classify`] - APPLICATION vs SYSTEM fault classification
//! - [`affinity`] - transactions held by bean-managed stateful instances
//! - [`propagation`] - the propagation engine and its policy table
//! - [`completion`] - commit / rollback / discard after the call
//! - [`auxiliary`] - persistence join, session synchronization, tx marker
//! - [`invoker`] - full chain assembly for deployed components
//!
//! ## Threading
//!
//! The engine is synchronous. A transaction is associated with the thread
//! executing the call; suspend tokens are `!Send` and never leave that
//! thread. Components, instances and the engine itself are `Send + Sync`
//! and shared through `Arc`.

pub mod affinity;
pub mod ambient;
pub mod auxiliary;
pub mod classify;
pub mod completion;
pub mod component;
pub mod context;
pub mod invoker;
pub mod propagation;

pub use affinity::AffinityStore;
pub use ambient::{AmbientContext, SuspendScope, SuspendedTransaction};
pub use classify::{Classification, ExceptionClassifier, FaultKind};
pub use completion::ExecutionContext;
pub use component::{Component, ExtendedResource, SessionSynchronization, StatefulInstance};
pub use context::{InvocationContext, InvocationPhase, UserTransaction};
pub use invoker::ComponentInvoker;
pub use propagation::{Propagation, TransactionInterceptor};
