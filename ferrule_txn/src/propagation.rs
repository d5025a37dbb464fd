//! Propagation engine.
//!
//! [`TransactionInterceptor`] wraps the rest of an invocation chain and
//! establishes the transaction context the method policy asks for:
//!
//! ```text
//!   ENTRY ──▶ precondition ──▶ SUSPENDED? ──▶ STARTED? ──▶ INVOKED
//!                  │                                          │
//!               reject                              COMMIT / ROLLBACK / PROPAGATE
//!                                                             │
//!                                                         RESUMED ──▶ EXIT
//! ```
//!
//! The six container-managed attributes differ only in their [`Plan`]; the
//! two bean-managed variants suspend the caller unconditionally and let the
//! component demarcate.

use std::time::Duration;

use ferrule::config::EngineConfig;
use ferrule::fault::{ContainerFault, Fault};
use ferrule::policy::{ComponentKind, ManagementMode, MethodPolicy, TransactionAttribute};
use ferrule::pool::InstanceId;
use ferrule::txn::TxError;
use tracing::{debug, trace, warn};

use crate::affinity::AffinityStore;
use crate::ambient::{AmbientContext, SuspendScope};
use crate::completion::{self, ExecutionContext};
use crate::context::{InvocationContext, transaction_fault};

// ─── Policy Table ───────────────────────────────────────────────────

/// Propagation variant selected for one method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Propagation {
    Container(TransactionAttribute),
    /// Bean-managed stateless, singleton or message-driven component.
    BeanManagedStateless,
    /// Bean-managed stateful component; transactions may span calls.
    BeanManagedStateful,
}

impl Propagation {
    pub fn of(policy: &MethodPolicy) -> Self {
        match (policy.management(), policy.attribute()) {
            (ManagementMode::ContainerManaged, Some(attribute)) => Self::Container(attribute),
            // Container-managed policies always carry an attribute.
            _ if policy.kind() == ComponentKind::Stateful => Self::BeanManagedStateful,
            _ => Self::BeanManagedStateless,
        }
    }
}

/// Requirement on the caller's transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    Any,
    Required,
    Forbidden,
}

/// When the frame starts its own transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Begin {
    Never,
    IfAbsent,
    Always,
}

/// What a container-managed frame does before invoking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Plan {
    pub precondition: Precondition,
    pub suspend: bool,
    pub begin: Begin,
}

impl Plan {
    pub const fn of(attribute: TransactionAttribute) -> Self {
        use TransactionAttribute::*;
        let (precondition, suspend, begin) = match attribute {
            Required => (Precondition::Any, false, Begin::IfAbsent),
            RequiresNew => (Precondition::Any, true, Begin::Always),
            Mandatory => (Precondition::Required, false, Begin::Never),
            Never => (Precondition::Forbidden, false, Begin::Never),
            NotSupported => (Precondition::Any, true, Begin::Never),
            Supports => (Precondition::Any, false, Begin::Never),
        };
        Self {
            precondition,
            suspend,
            begin,
        }
    }
}

// ─── Interceptor ────────────────────────────────────────────────────

/// Transaction propagation interceptor.
///
/// One instance serves every component of a deployment; it owns the affinity
/// store of bean-managed stateful instances.
#[derive(Debug, Default)]
pub struct TransactionInterceptor {
    affinity: AffinityStore,
    default_timeout: Option<Duration>,
}

impl TransactionInterceptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: &EngineConfig) -> Self {
        Self {
            affinity: AffinityStore::new(),
            default_timeout: config.default_timeout(),
        }
    }

    pub fn affinity(&self) -> &AffinityStore {
        &self.affinity
    }

    /// Run `next` in the transaction context the policy of `ctx` requires.
    ///
    /// Lifecycle callbacks pass straight through.
    pub fn invoke<T, F>(&self, ctx: &mut InvocationContext, next: F) -> Result<T, Fault>
    where
        F: FnOnce(&mut InvocationContext) -> Result<T, Fault>,
    {
        if ctx.phase().is_lifecycle_callback() {
            trace!("{}: {:?} callback passes through", ctx.method(), ctx.phase());
            return next(ctx);
        }
        match Propagation::of(ctx.policy()) {
            Propagation::Container(attribute) => self.container_managed(attribute, ctx, next),
            Propagation::BeanManagedStateless => self.bean_managed_stateless(ctx, next),
            Propagation::BeanManagedStateful => self.bean_managed_stateful(ctx, next),
        }
    }

    /// Forget the affinity record of a removed instance, rolling back any
    /// transaction it still held.
    pub fn release_instance(&self, ambient: &AmbientContext, instance: &InstanceId) {
        if let Some(handle) = self.affinity.forget(instance) {
            warn!("instance {instance} released while holding {handle}, rolling back");
            completion::rollback_detached(ambient, handle);
        }
    }

    // ─── Container-Managed ──────────────────────────────────────────

    fn container_managed<T, F>(
        &self,
        attribute: TransactionAttribute,
        ctx: &mut InvocationContext,
        next: F,
    ) -> Result<T, Fault>
    where
        F: FnOnce(&mut InvocationContext) -> Result<T, Fault>,
    {
        let plan = Plan::of(attribute);
        let ambient = ctx.ambient().clone();
        let method = ctx.method().clone();

        let caller = ambient
            .current()
            .map_err(|e| self.reject(ctx, transaction_fault(&method, e)))?;
        trace!("{method}: {attribute} entered, caller {caller:?}");

        match (plan.precondition, caller) {
            (Precondition::Required, None) => {
                return Err(self.reject(ctx, ContainerFault::TransactionRequired { method }.into()));
            }
            (Precondition::Forbidden, Some(_)) => {
                return Err(self.reject(ctx, ContainerFault::TransactionNotAllowed { method }.into()));
            }
            _ => {}
        }

        let mut scope = if plan.suspend && caller.is_some() {
            SuspendScope::enter(&ambient).map_err(|e| self.reject(ctx, transaction_fault(&method, e)))?
        } else {
            SuspendScope::empty(&ambient)
        };

        let started = match plan.begin {
            Begin::Always => true,
            Begin::IfAbsent => caller.is_none(),
            Begin::Never => false,
        };
        let exec = if started {
            let timeout = ctx.policy().timeout().or(self.default_timeout);
            match scope.begin(timeout) {
                Ok(handle) => ExecutionContext::Container(handle),
                Err(e) => {
                    scope.exit_quietly();
                    return Err(self.reject(ctx, transaction_fault(&method, e)));
                }
            }
        } else {
            match caller {
                Some(handle) if !plan.suspend => ExecutionContext::Caller(handle),
                _ => ExecutionContext::Unspecified,
            }
        };
        trace!("{method}: invoking in {exec:?}");

        let result = match next(ctx) {
            Ok(value) => completion::complete_success(ctx, &self.affinity, exec).map(|()| value),
            Err(fault) => Err(completion::complete_failure(ctx, &self.affinity, exec, fault)),
        };
        self.leave(ctx, scope, result)
    }

    // ─── Bean-Managed ───────────────────────────────────────────────

    fn bean_managed_stateless<T, F>(&self, ctx: &mut InvocationContext, next: F) -> Result<T, Fault>
    where
        F: FnOnce(&mut InvocationContext) -> Result<T, Fault>,
    {
        let ambient = ctx.ambient().clone();
        let scope = SuspendScope::enter(&ambient)
            .map_err(|e| self.reject(ctx, transaction_fault(ctx.method(), e)))?;
        if let Some(caller) = scope.suspended() {
            trace!("{}: suspended caller {caller}", ctx.method());
        }

        let result = match next(ctx) {
            Ok(value) => self.check_completed(ctx, &ambient).map(|()| value),
            Err(fault) => {
                let surfaced =
                    completion::complete_failure(ctx, &self.affinity, ExecutionContext::BeanManaged, fault);
                self.rollback_abandoned(ctx, &ambient);
                Err(surfaced)
            }
        };
        self.leave(ctx, scope, result)
    }

    fn bean_managed_stateful<T, F>(&self, ctx: &mut InvocationContext, next: F) -> Result<T, Fault>
    where
        F: FnOnce(&mut InvocationContext) -> Result<T, Fault>,
    {
        let method = ctx.method().clone();
        let Some(instance) = ctx.instance().cloned() else {
            let fault = ContainerFault::IllegalState {
                method,
                reason: "stateful bean-managed call without an instance",
            };
            return Err(self.reject(ctx, fault.into()));
        };

        let ambient = ctx.ambient().clone();
        let scope = SuspendScope::enter(&ambient)
            .map_err(|e| self.reject(ctx, transaction_fault(&method, e)))?;

        if let Some(held) = self.affinity.lookup(instance.id()) {
            debug!("{method}: resuming {held} held by {}", instance.id());
            if let Err(e) = ambient.resume_handle(held) {
                let fault = self.reject(ctx, transaction_fault(&method, e));
                return self.leave(ctx, scope, Err(fault));
            }
        }

        let mut unwinding = ForgetOnUnwind {
            affinity: &self.affinity,
            instance: instance.id(),
            armed: true,
        };
        let outcome = next(ctx);
        unwinding.armed = false;
        let parked = self.park(&ambient, instance.id());
        let result = match (outcome, parked) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(self.reject(ctx, transaction_fault(&method, e))),
            (Err(fault), parked) => {
                if let Err(e) = parked {
                    warn!("{method}: detaching bean transaction after failure: {e}");
                }
                Err(completion::complete_failure(
                    ctx,
                    &self.affinity,
                    ExecutionContext::BeanManaged,
                    fault,
                ))
            }
        };
        self.leave(ctx, scope, result)
    }

    /// A stateless bean-managed call must not return with its transaction open.
    fn check_completed(&self, ctx: &InvocationContext, ambient: &AmbientContext) -> Result<(), Fault> {
        let method = ctx.method();
        let handle = match ambient.current() {
            Ok(Some(handle)) => handle,
            Ok(None) => return Ok(()),
            Err(e) => return Err(self.reject(ctx, transaction_fault(method, e))),
        };
        let status = ambient
            .status()
            .map_err(|e| self.reject(ctx, transaction_fault(method, e)))?;
        if !status.is_open() {
            return ambient
                .clear_completed()
                .map_err(|e| self.reject(ctx, transaction_fault(method, e)));
        }

        if let Err(e) = ambient.rollback() {
            warn!("{method}: rolling back abandoned {handle}: {e}");
        }
        let fault = ContainerFault::TransactionLeftOpen {
            method: method.clone(),
            handle,
        };
        Err(self.reject(ctx, fault.into()))
    }

    /// After a failed stateless bean-managed call, roll back whatever it left
    /// open. The original fault is what the caller sees.
    fn rollback_abandoned(&self, ctx: &InvocationContext, ambient: &AmbientContext) {
        let method = ctx.method();
        match ambient.status() {
            Ok(status) if status.is_open() => {
                warn!("{method}: rolling back transaction left open by failed call");
                if let Err(e) = ambient.rollback() {
                    warn!("{method}: rollback failed: {e}");
                }
            }
            Ok(_) => {
                if let Err(e) = ambient.clear_completed() {
                    warn!("{method}: clearing completed transaction: {e}");
                }
            }
            Err(e) => warn!("{method}: status unavailable after failure: {e}"),
        }
    }

    /// Detach a transaction the stateful instance left open and hold it for
    /// its next call. Forget the record otherwise.
    fn park(&self, ambient: &AmbientContext, instance: &InstanceId) -> Result<(), TxError> {
        if ambient.status()?.is_open() {
            if let Some(token) = ambient.suspend()? {
                let handle = token.into_handle();
                debug!("holding {handle} for instance {instance}");
                self.affinity.remember(instance, handle);
            }
            return Ok(());
        }
        self.affinity.forget(instance);
        ambient.clear_completed()
    }

    // ─── Exit ───────────────────────────────────────────────────────

    /// Resume the caller's transaction. A resume failure after a successful
    /// call is a SYSTEM failure; after a failed call it is only logged.
    fn leave<T>(
        &self,
        ctx: &InvocationContext,
        scope: SuspendScope<'_>,
        result: Result<T, Fault>,
    ) -> Result<T, Fault> {
        match result {
            Ok(value) => match scope.exit() {
                Ok(()) => Ok(value),
                Err(e) => Err(self.reject(ctx, transaction_fault(ctx.method(), e))),
            },
            Err(fault) => {
                scope.exit_quietly();
                Err(fault)
            }
        }
    }

    fn reject(&self, ctx: &InvocationContext, fault: Fault) -> Fault {
        completion::fail_system(ctx, &self.affinity, fault)
    }
}

/// Drops the affinity record of an instance whose call unwinds. The frame's
/// [`SuspendScope`] rolls back the transaction itself.
struct ForgetOnUnwind<'a> {
    affinity: &'a AffinityStore,
    instance: &'a InstanceId,
    armed: bool,
}

impl Drop for ForgetOnUnwind<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Some(handle) = self.affinity.forget(self.instance) {
            warn!("instance {} unwound while holding {handle}", self.instance);
        }
    }
}
