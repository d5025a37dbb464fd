//! Deployment descriptor.
//!
//! Declares the managed components of a deployment, the transaction policy of
//! each business method and the application exceptions of each component.
//!
//! # TOML Example
//!
//! ```toml
//! [shared]
//! service_name = "orders-container"
//!
//! [engine]
//! default_timeout_secs = 300
//!
//! [[components]]
//! name = "Ledger"
//! kind = "stateless"
//! management = "container_managed"
//! default_attribute = "required"
//!
//! [[components.application_exceptions]]
//! type_name = "Overdrawn"
//! rollback = true
//!
//! [[components.methods]]
//! name = "post"
//! attribute = "requires_new"
//! declared_exceptions = ["AccountClosed"]
//! timeout_secs = 30
//! ```

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, EngineConfig, SharedConfig};
use crate::consts::TIMEOUT_SECS_MAX;
use crate::policy::{
    ComponentKind, ManagementMode, MethodId, MethodPolicy, PolicyTable, TransactionAttribute,
};

/// Top-level deployment file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeploymentConfig {
    pub shared: SharedConfig,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub components: Vec<ComponentConfig>,
}

/// One managed component type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComponentConfig {
    pub name: String,
    pub kind: ComponentKind,
    pub management: ManagementMode,

    /// Attribute for container-managed methods that declare none.
    #[serde(default)]
    pub default_attribute: Option<TransactionAttribute>,

    #[serde(default)]
    pub application_exceptions: Vec<ApplicationExceptionConfig>,

    #[serde(default)]
    pub methods: Vec<MethodConfig>,
}

/// Explicit application-exception declaration for a component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApplicationExceptionConfig {
    /// Fault type name.
    pub type_name: String,

    /// Whether raising it rolls back the transaction.
    #[serde(default)]
    pub rollback: bool,

    /// Whether subtypes are covered too.
    #[serde(default = "default_inherited")]
    pub inherited: bool,
}

fn default_inherited() -> bool {
    true
}

/// One business method.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MethodConfig {
    pub name: String,

    #[serde(default)]
    pub attribute: Option<TransactionAttribute>,

    /// Checked fault types listed by the method signature.
    #[serde(default)]
    pub declared_exceptions: Vec<String>,

    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl ComponentConfig {
    /// Resolve the policy of one method of this component.
    pub fn resolve(&self, method: &MethodConfig) -> Result<MethodPolicy, ConfigError> {
        let attribute = match self.management {
            ManagementMode::ContainerManaged => method.attribute.or(self.default_attribute),
            ManagementMode::BeanManaged => method.attribute,
        };
        let id = MethodId::new(&self.name, &method.name);
        let mut policy = MethodPolicy::resolve(id, self.kind, self.management, attribute)
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?
            .with_declared_exceptions(method.declared_exceptions.iter().cloned());

        if let Some(secs) = method.timeout_secs {
            if secs == 0 || secs > TIMEOUT_SECS_MAX {
                return Err(ConfigError::ValidationError(format!(
                    "{}::{}: timeout_secs {} out of range [1, {}]",
                    self.name, method.name, secs, TIMEOUT_SECS_MAX
                )));
            }
            policy = policy.with_timeout(Duration::from_secs(secs));
        }
        Ok(policy)
    }
}

impl DeploymentConfig {
    /// Validate the whole deployment: names, policy invariants, timeouts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;
        self.engine.validate()?;

        let mut names = HashSet::new();
        for component in &self.components {
            if component.name.is_empty() {
                return Err(ConfigError::ValidationError(
                    "component name cannot be empty".to_string(),
                ));
            }
            if !names.insert(component.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate component '{}'",
                    component.name
                )));
            }
            if component.management == ManagementMode::BeanManaged
                && component.default_attribute.is_some()
            {
                return Err(ConfigError::ValidationError(format!(
                    "{}: bean-managed component cannot declare default_attribute",
                    component.name
                )));
            }

            let mut methods = HashSet::new();
            for method in &component.methods {
                if !methods.insert(method.name.as_str()) {
                    return Err(ConfigError::ValidationError(format!(
                        "{}: duplicate method '{}'",
                        component.name, method.name
                    )));
                }
                component.resolve(method)?;
            }

            let mut declared = HashSet::new();
            for app in &component.application_exceptions {
                if !declared.insert(app.type_name.as_str()) {
                    return Err(ConfigError::ValidationError(format!(
                        "{}: application exception '{}' declared twice",
                        component.name, app.type_name
                    )));
                }
            }
        }
        Ok(())
    }

    /// Build the policy table for every declared method.
    pub fn policy_table(&self) -> Result<PolicyTable, ConfigError> {
        let mut table = PolicyTable::new();
        for component in &self.components {
            for method in &component.methods {
                table.insert(component.resolve(method)?);
            }
        }
        Ok(table)
    }

    pub fn component(&self, name: &str) -> Option<&ComponentConfig> {
        self.components.iter().find(|c| c.name == name)
    }
}
