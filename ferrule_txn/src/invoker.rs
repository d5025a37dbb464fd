//! Component invoker.
//!
//! Assembles the interceptor chain of one business call:
//!
//! ```text
//!   instance guard ─▶ propagation ─▶ tx marker ─▶ session sync ─▶ persistence join ─▶ method
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use ferrule::config::ConfigError;
use ferrule::descriptor::{ComponentConfig, DeploymentConfig};
use ferrule::fault::{ContainerFault, Fault};
use ferrule::policy::{MethodId, PolicySource};
use ferrule::pool::InstancePool;
use ferrule::txn::TransactionManager;
use tracing::{error, info};

use crate::ambient::AmbientContext;
use crate::auxiliary::{PersistenceJoin, SessionSynchronizationInterceptor, TransactionMarker};
use crate::component::{Component, StatefulInstance};
use crate::context::InvocationContext;
use crate::propagation::TransactionInterceptor;

pub struct ComponentInvoker {
    ambient: AmbientContext,
    policies: Arc<dyn PolicySource>,
    components: HashMap<String, Arc<Component>>,
    engine: Arc<TransactionInterceptor>,
    marker: TransactionMarker,
    synchronization: SessionSynchronizationInterceptor,
    persistence: PersistenceJoin,
}

impl ComponentInvoker {
    pub fn new(
        manager: Arc<dyn TransactionManager>,
        policies: Arc<dyn PolicySource>,
        engine: Arc<TransactionInterceptor>,
    ) -> Self {
        Self {
            ambient: AmbientContext::new(manager),
            policies,
            components: HashMap::new(),
            synchronization: SessionSynchronizationInterceptor::new(Arc::clone(&engine)),
            engine,
            marker: TransactionMarker,
            persistence: PersistenceJoin,
        }
    }

    /// Build an invoker for a whole deployment.
    ///
    /// `pool_for` supplies the instance pool of each component.
    pub fn from_deployment<P>(
        deployment: &DeploymentConfig,
        manager: Arc<dyn TransactionManager>,
        mut pool_for: P,
    ) -> Result<Self, ConfigError>
    where
        P: FnMut(&ComponentConfig) -> Arc<dyn InstancePool>,
    {
        deployment.validate()?;
        let policies = deployment.policy_table()?;
        let engine = Arc::new(TransactionInterceptor::with_config(&deployment.engine));
        let mut invoker = Self::new(manager, Arc::new(policies), engine);
        for config in &deployment.components {
            invoker.register(Component::from_config(config, pool_for(config)));
        }
        info!(
            "{}: {} components deployed",
            deployment.shared.service_name,
            invoker.components.len()
        );
        Ok(invoker)
    }

    /// Register (or replace) a component by name.
    pub fn register(&mut self, component: Component) -> Option<Arc<Component>> {
        self.components
            .insert(component.name().to_string(), Arc::new(component))
    }

    pub fn engine(&self) -> &Arc<TransactionInterceptor> {
        &self.engine
    }

    pub fn ambient(&self) -> &AmbientContext {
        &self.ambient
    }

    /// Invoke `business` as `method`, optionally on a stateful `instance`.
    ///
    /// # Errors
    ///
    /// Whatever the chain surfaces: application faults unchanged, SYSTEM
    /// failures wrapped, `ConcurrentAccess` / `NoSuchInstance` for an
    /// instance that is busy or discarded.
    pub fn invoke<T, F>(
        &self,
        method: &MethodId,
        instance: Option<&Arc<StatefulInstance>>,
        business: F,
    ) -> Result<T, Fault>
    where
        F: FnOnce(&mut InvocationContext) -> Result<T, Fault>,
    {
        let policy = self.policies.policy(method).ok_or_else(|| ContainerFault::IllegalState {
            method: method.clone(),
            reason: "no transaction policy for method",
        })?;
        let component = self
            .components
            .get(method.component())
            .ok_or_else(|| ContainerFault::IllegalState {
                method: method.clone(),
                reason: "component not deployed",
            })?;

        let mut ctx = InvocationContext::new(Arc::clone(component), policy, self.ambient.clone());
        let _busy = match instance {
            Some(instance) => {
                let guard = instance.enter().map_err(|fault| {
                    error!("{method}: {fault}");
                    fault
                })?;
                ctx = ctx.with_instance(Arc::clone(instance));
                Some(guard)
            }
            None => None,
        };

        self.engine.invoke(&mut ctx, |ctx| {
            self.marker.invoke(ctx, |ctx| {
                self.synchronization
                    .invoke(ctx, |ctx| self.persistence.invoke(ctx, business))
            })
        })
    }

    /// The instance was removed; drop any transaction it still holds.
    pub fn release(&self, instance: &StatefulInstance) {
        self.engine.release_instance(&self.ambient, instance.id());
    }
}
