//! Ferrule Common Library
//!
//! Shared vocabulary for the Ferrule transaction propagation engine and the
//! collaborators it talks to.
//!
//! # Module Structure
//!
//! - [`policy`] - Transaction attributes, management modes and resolved method policies
//! - [`fault`] - Business and container faults raised through an invocation chain
//! - [`txn`] - Transaction manager contract, handles and status
//! - [`pool`] - Instance pool contract used to discard faulty stateful instances
//! - [`config`] - Configuration loading traits and types
//! - [`descriptor`] - Deployment descriptor (components, methods, application exceptions)
//! - [`logging`] - `tracing` subscriber setup
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! Add to your `Cargo.toml` with alias for shorter imports:
//! ```toml
//! [dependencies]
//! ferrule = { package = "ferrule_common", path = "../ferrule_common" }
//! ```
//!
//! Then import:
//! ```rust
//! use ferrule_common::policy::{MethodPolicy, TransactionAttribute};
//! use ferrule_common::config::{ConfigLoader, SharedConfig};
//! ```

pub mod config;
pub mod consts;
pub mod descriptor;
pub mod fault;
pub mod logging;
pub mod policy;
pub mod pool;
pub mod prelude;
pub mod txn;
