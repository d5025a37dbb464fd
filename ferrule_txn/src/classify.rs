//! Exception classification.
//!
//! Decides whether a fault is an APPLICATION outcome (returned to the caller
//! unchanged) or a SYSTEM failure (logged, rolled back, instance discarded).
//! Precedence, first match wins:
//!
//! 1. explicit application-exception declaration of the component
//!    (exact type, or a supertype when the declaration is inherited);
//! 2. unchecked fault → SYSTEM;
//! 3. checked fault declared by the method signature → APPLICATION, no rollback;
//! 4. anything else → SYSTEM.
//!
//! Rule 1 overrides the checked/unchecked heuristic in both directions, and
//! rule 3 never turns an unchecked fault into an application outcome.

use std::collections::HashMap;

use ferrule::consts::CONTAINER_FAILURE;
use ferrule::descriptor::ApplicationExceptionConfig;
use ferrule::fault::Fault;
use ferrule::policy::MethodPolicy;

/// Outcome category of a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultKind {
    /// Expected business outcome.
    Application,
    /// The container or the component failed.
    System,
}

/// Result of classifying one fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub kind: FaultKind,
    /// Whether the transaction must roll back. Always true for SYSTEM.
    pub rollback: bool,
}

impl Classification {
    pub const SYSTEM: Self = Self {
        kind: FaultKind::System,
        rollback: true,
    };

    pub const fn application(rollback: bool) -> Self {
        Self {
            kind: FaultKind::Application,
            rollback,
        }
    }

    #[inline]
    pub const fn is_application(&self) -> bool {
        matches!(self.kind, FaultKind::Application)
    }
}

/// Explicit application-exception declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationException {
    pub rollback: bool,
    pub inherited: bool,
}

/// Per-component classifier.
#[derive(Debug, Clone, Default)]
pub struct ExceptionClassifier {
    declarations: HashMap<String, ApplicationException>,
}

impl ExceptionClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `type_name` an application exception.
    pub fn declare(mut self, type_name: impl Into<String>, rollback: bool, inherited: bool) -> Self {
        self.declarations.insert(
            type_name.into(),
            ApplicationException {
                rollback,
                inherited,
            },
        );
        self
    }

    pub fn from_config(declarations: &[ApplicationExceptionConfig]) -> Self {
        declarations.iter().fold(Self::new(), |classifier, d| {
            classifier.declare(d.type_name.clone(), d.rollback, d.inherited)
        })
    }

    /// Declaration matching `fault`: its own type first, then inherited
    /// declarations of its supertypes, nearest first.
    pub fn application_exception(&self, fault: &Fault) -> Option<&ApplicationException> {
        if let Some(exact) = self.declarations.get(fault.type_name()) {
            return Some(exact);
        }
        supertypes(fault).find_map(|ancestor| {
            self.declarations
                .get(ancestor)
                .filter(|declaration| declaration.inherited)
        })
    }

    /// Classify `fault` raised by the method `policy` describes.
    pub fn classify(&self, policy: &MethodPolicy, fault: &Fault) -> Classification {
        if let Some(declaration) = self.application_exception(fault) {
            return Classification::application(declaration.rollback);
        }
        if !fault.is_checked() {
            return Classification::SYSTEM;
        }
        if policy
            .declared_exceptions()
            .iter()
            .any(|declared| fault.is_assignable_to(declared))
        {
            return Classification::application(false);
        }
        Classification::SYSTEM
    }
}

fn supertypes(fault: &Fault) -> Box<dyn Iterator<Item = &str> + '_> {
    match fault {
        Fault::Business(b) => Box::new(b.ancestors().iter().map(String::as_str)),
        Fault::Container(_) => Box::new(std::iter::once(CONTAINER_FAILURE)),
    }
}
