//! Per-invocation context handed down the interceptor chain.

use std::sync::Arc;
use std::time::Duration;

use ferrule::fault::{ContainerFault, Fault};
use ferrule::policy::{ManagementMode, MethodId, MethodPolicy};
use ferrule::txn::{TransactionHandle, TxError, TxStatus};

use crate::ambient::AmbientContext;
use crate::component::{Component, StatefulInstance};

/// What the chain is executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvocationPhase {
    /// An ordinary business method.
    Business,
    /// Session synchronization callbacks. These run in whatever transaction
    /// the boundary has; the engine neither starts nor suspends one for them.
    AfterBegin,
    BeforeCompletion,
    AfterCompletion,
}

impl InvocationPhase {
    #[inline]
    pub const fn is_lifecycle_callback(&self) -> bool {
        !matches!(self, Self::Business)
    }
}

#[derive(Clone)]
pub struct InvocationContext {
    component: Arc<Component>,
    policy: Arc<MethodPolicy>,
    instance: Option<Arc<StatefulInstance>>,
    phase: InvocationPhase,
    ambient: AmbientContext,
}

impl InvocationContext {
    pub fn new(component: Arc<Component>, policy: Arc<MethodPolicy>, ambient: AmbientContext) -> Self {
        Self {
            component,
            policy,
            instance: None,
            phase: InvocationPhase::Business,
            ambient,
        }
    }

    pub fn with_instance(mut self, instance: Arc<StatefulInstance>) -> Self {
        self.instance = Some(instance);
        self
    }

    /// Same target, different phase.
    pub fn with_phase(&self, phase: InvocationPhase) -> Self {
        Self {
            phase,
            ..self.clone()
        }
    }

    pub fn component(&self) -> &Arc<Component> {
        &self.component
    }

    pub fn policy(&self) -> &Arc<MethodPolicy> {
        &self.policy
    }

    pub fn method(&self) -> &MethodId {
        self.policy.method()
    }

    pub fn instance(&self) -> Option<&Arc<StatefulInstance>> {
        self.instance.as_ref()
    }

    pub fn phase(&self) -> InvocationPhase {
        self.phase
    }

    pub fn ambient(&self) -> &AmbientContext {
        &self.ambient
    }

    /// Doom the current transaction from inside a container-managed method.
    ///
    /// # Errors
    ///
    /// `IllegalState` for bean-managed components or when the method runs
    /// without a transaction.
    pub fn set_rollback_only(&self) -> Result<(), Fault> {
        self.require_container_transaction()?;
        self.ambient
            .mark_rollback_only()
            .map_err(|e| transaction_fault(self.method(), e))
    }

    /// Whether the current transaction is doomed. Same restrictions as
    /// [`set_rollback_only`](Self::set_rollback_only).
    pub fn rollback_only(&self) -> Result<bool, Fault> {
        let status = self.require_container_transaction()?;
        Ok(status == TxStatus::MarkedRollback)
    }

    /// Transaction demarcation for bean-managed methods.
    pub fn user_transaction(&self) -> Result<UserTransaction, Fault> {
        if self.policy.management() != ManagementMode::BeanManaged {
            return Err(self.illegal_state("user transactions are only available to bean-managed components"));
        }
        Ok(UserTransaction {
            ambient: self.ambient.clone(),
            method: self.method().clone(),
            timeout: self.policy.timeout(),
        })
    }

    fn require_container_transaction(&self) -> Result<TxStatus, Fault> {
        if self.policy.management() != ManagementMode::ContainerManaged {
            return Err(self.illegal_state("bean-managed components must use their user transaction"));
        }
        let status = self
            .ambient
            .status()
            .map_err(|e| transaction_fault(self.method(), e))?;
        if !status.is_open() {
            return Err(self.illegal_state("method is not running in a transaction"));
        }
        Ok(status)
    }

    fn illegal_state(&self, reason: &'static str) -> Fault {
        ContainerFault::IllegalState {
            method: self.method().clone(),
            reason,
        }
        .into()
    }
}

pub(crate) fn transaction_fault(method: &MethodId, source: TxError) -> Fault {
    ContainerFault::Transaction {
        method: method.clone(),
        source,
    }
    .into()
}

/// Explicit demarcation handed to bean-managed code.
pub struct UserTransaction {
    ambient: AmbientContext,
    method: MethodId,
    timeout: Option<Duration>,
}

impl UserTransaction {
    /// Begin a transaction on the calling thread.
    pub fn begin(&self) -> Result<TransactionHandle, Fault> {
        self.ambient.begin(self.timeout).map_err(|e| self.fault(e))
    }

    pub fn commit(&self) -> Result<(), Fault> {
        self.ambient.commit().map_err(|e| self.fault(e))
    }

    pub fn rollback(&self) -> Result<(), Fault> {
        self.ambient.rollback().map_err(|e| self.fault(e))
    }

    pub fn set_rollback_only(&self) -> Result<(), Fault> {
        self.ambient.mark_rollback_only().map_err(|e| self.fault(e))
    }

    pub fn status(&self) -> Result<TxStatus, Fault> {
        self.ambient.status().map_err(|e| self.fault(e))
    }

    /// Timeout for transactions begun after this call. `Duration::ZERO`
    /// restores the manager default.
    pub fn set_transaction_timeout(&mut self, timeout: Duration) {
        self.timeout = (!timeout.is_zero()).then_some(timeout);
    }

    fn fault(&self, source: TxError) -> Fault {
        transaction_fault(&self.method, source)
    }
}
