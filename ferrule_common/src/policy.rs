//! Resolved transaction policy types.
//!
//! A [`MethodPolicy`] is resolved once per method by metadata resolution
//! outside the engine and reused for every invocation. The constructors
//! enforce the policy invariants, so an engine holding a `MethodPolicy` never
//! has to re-check them:
//!
//! - container-managed ⇒ an attribute is present and allowed for the
//!   component kind (message-driven components: `Required`/`NotSupported`);
//! - bean-managed ⇒ no attribute.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::MESSAGE_DRIVEN_ATTRIBUTES;

// ─── Enumerations ───────────────────────────────────────────────────

/// Container-managed transaction demarcation rule for a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionAttribute {
    /// Join the caller's transaction, or begin one if there is none.
    Required,
    /// Always run in a fresh transaction; the caller's is suspended.
    RequiresNew,
    /// The caller must supply a transaction.
    Mandatory,
    /// The caller must not supply a transaction.
    Never,
    /// Run without a transaction; the caller's is suspended.
    NotSupported,
    /// Run in the caller's transaction if any, otherwise without one.
    Supports,
}

impl TransactionAttribute {
    /// All attributes, in declaration order.
    pub const ALL: [TransactionAttribute; 6] = [
        Self::Required,
        Self::RequiresNew,
        Self::Mandatory,
        Self::Never,
        Self::NotSupported,
        Self::Supports,
    ];
}

impl fmt::Display for TransactionAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Required => "REQUIRED",
            Self::RequiresNew => "REQUIRES_NEW",
            Self::Mandatory => "MANDATORY",
            Self::Never => "NEVER",
            Self::NotSupported => "NOT_SUPPORTED",
            Self::Supports => "SUPPORTS",
        };
        f.write_str(name)
    }
}

/// Who demarcates transactions for a component type. Fixed at deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManagementMode {
    /// The component begins and completes its own transactions.
    BeanManaged,
    /// The container demarcates according to a [`TransactionAttribute`].
    ContainerManaged,
}

/// Kind of managed component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    /// Pooled, conversation-free session component.
    Stateless,
    /// Conversational component bound to one client; may hold transactions across calls.
    Stateful,
    /// One shared instance per deployment.
    Singleton,
    /// Asynchronous message consumer.
    MessageDriven,
}

impl ComponentKind {
    /// Returns true if `attribute` may be declared on a component of this kind.
    pub fn allows(&self, attribute: TransactionAttribute) -> bool {
        match self {
            Self::MessageDriven => MESSAGE_DRIVEN_ATTRIBUTES.contains(&attribute),
            _ => true,
        }
    }
}

// ─── Method Identity ────────────────────────────────────────────────

/// Identity of a business method: owning component name + method name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MethodId {
    component: String,
    method: String,
}

impl MethodId {
    /// Create a method identity.
    pub fn new(component: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            method: method.into(),
        }
    }

    /// Owning component name.
    pub fn component(&self) -> &str {
        &self.component
    }

    /// Method name.
    pub fn method(&self) -> &str {
        &self.method
    }
}

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.component, self.method)
    }
}

// ─── Errors ─────────────────────────────────────────────────────────

/// Violations of the [`MethodPolicy`] invariants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    /// A container-managed method has no transaction attribute.
    #[error("{method}: container-managed method has no transaction attribute")]
    MissingAttribute { method: MethodId },

    /// The attribute is not allowed for the component kind.
    #[error("{method}: {attribute} is not allowed on a {kind:?} component")]
    AttributeNotAllowed {
        method: MethodId,
        attribute: TransactionAttribute,
        kind: ComponentKind,
    },

    /// A bean-managed method declares a transaction attribute.
    #[error("{method}: bean-managed method cannot declare {attribute}")]
    AttributeOnBeanManaged {
        method: MethodId,
        attribute: TransactionAttribute,
    },
}

// ─── Method Policy ──────────────────────────────────────────────────

/// Resolved per-method transaction policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodPolicy {
    method: MethodId,
    kind: ComponentKind,
    management: ManagementMode,
    attribute: Option<TransactionAttribute>,
    declared_exceptions: Vec<String>,
    timeout: Option<Duration>,
}

impl MethodPolicy {
    /// Policy for a container-managed method.
    ///
    /// # Errors
    ///
    /// `PolicyError::AttributeNotAllowed` if `kind` forbids `attribute`.
    pub fn container_managed(
        method: MethodId,
        kind: ComponentKind,
        attribute: TransactionAttribute,
    ) -> Result<Self, PolicyError> {
        if !kind.allows(attribute) {
            return Err(PolicyError::AttributeNotAllowed {
                method,
                attribute,
                kind,
            });
        }
        Ok(Self {
            method,
            kind,
            management: ManagementMode::ContainerManaged,
            attribute: Some(attribute),
            declared_exceptions: Vec::new(),
            timeout: None,
        })
    }

    /// Policy for a bean-managed method.
    pub fn bean_managed(method: MethodId, kind: ComponentKind) -> Self {
        Self {
            method,
            kind,
            management: ManagementMode::BeanManaged,
            attribute: None,
            declared_exceptions: Vec::new(),
            timeout: None,
        }
    }

    /// Build a policy from its raw parts, checking every invariant.
    pub fn resolve(
        method: MethodId,
        kind: ComponentKind,
        management: ManagementMode,
        attribute: Option<TransactionAttribute>,
    ) -> Result<Self, PolicyError> {
        match (management, attribute) {
            (ManagementMode::ContainerManaged, Some(attribute)) => {
                Self::container_managed(method, kind, attribute)
            }
            (ManagementMode::ContainerManaged, None) => {
                Err(PolicyError::MissingAttribute { method })
            }
            (ManagementMode::BeanManaged, Some(attribute)) => {
                Err(PolicyError::AttributeOnBeanManaged { method, attribute })
            }
            (ManagementMode::BeanManaged, None) => Ok(Self::bean_managed(method, kind)),
        }
    }

    /// Declare the checked exception types the method signature lists.
    pub fn with_declared_exceptions<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.declared_exceptions = types.into_iter().map(Into::into).collect();
        self
    }

    /// Set the timeout applied to transactions the container starts for this method.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn method(&self) -> &MethodId {
        &self.method
    }

    pub fn kind(&self) -> ComponentKind {
        self.kind
    }

    pub fn management(&self) -> ManagementMode {
        self.management
    }

    /// Transaction attribute; `Some` iff container-managed.
    pub fn attribute(&self) -> Option<TransactionAttribute> {
        self.attribute
    }

    pub fn declared_exceptions(&self) -> &[String] {
        &self.declared_exceptions
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

// ─── Policy Source ──────────────────────────────────────────────────

/// Supplies the resolved [`MethodPolicy`] for a method identity.
pub trait PolicySource: Send + Sync {
    /// Look up the policy of `method`, if one was resolved.
    fn policy(&self, method: &MethodId) -> Option<Arc<MethodPolicy>>;
}

/// Precomputed in-memory policy table.
#[derive(Debug, Clone, Default)]
pub struct PolicyTable {
    entries: HashMap<MethodId, Arc<MethodPolicy>>,
}

impl PolicyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a policy, replacing any previous entry for the same method.
    pub fn insert(&mut self, policy: MethodPolicy) -> Option<Arc<MethodPolicy>> {
        self.entries
            .insert(policy.method().clone(), Arc::new(policy))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over all resolved policies.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<MethodPolicy>> {
        self.entries.values()
    }
}

impl PolicySource for PolicyTable {
    fn policy(&self, method: &MethodId) -> Option<Arc<MethodPolicy>> {
        self.entries.get(method).cloned()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
