//! Shared fixtures: one deployment covering every propagation variant.

use std::sync::{Arc, Once};

use ferrule::prelude::*;
use ferrule_testkit::{InMemoryTransactionManager, RecordingPool};
use ferrule_txn::{ComponentInvoker, StatefulInstance};

pub const DEPLOYMENT: &str = r#"
[shared]
service_name = "ferrule-integration"
log_level = "debug"

[engine]
default_timeout_secs = 120

[[components]]
name = "Ledger"
kind = "stateless"
management = "container_managed"
default_attribute = "required"

[[components.application_exceptions]]
type_name = "Frozen"
rollback = true

[[components.application_exceptions]]
type_name = "Audit"
rollback = false

[[components.methods]]
name = "required"
declared_exceptions = ["Overdrawn"]

[[components.methods]]
name = "requires_new"
attribute = "requires_new"
declared_exceptions = ["Overdrawn"]

[[components.methods]]
name = "mandatory"
attribute = "mandatory"

[[components.methods]]
name = "never"
attribute = "never"

[[components.methods]]
name = "not_supported"
attribute = "not_supported"

[[components.methods]]
name = "supports"
attribute = "supports"

[[components.methods]]
name = "timed"
attribute = "requires_new"
timeout_secs = 30

[[components]]
name = "Cart"
kind = "stateful"
management = "container_managed"
default_attribute = "required"

[[components.application_exceptions]]
type_name = "Frozen"
rollback = true

[[components.methods]]
name = "required"
declared_exceptions = ["OutOfStock"]

[[components.methods]]
name = "requires_new"
attribute = "requires_new"

[[components.methods]]
name = "mandatory"
attribute = "mandatory"

[[components.methods]]
name = "never"
attribute = "never"

[[components.methods]]
name = "not_supported"
attribute = "not_supported"

[[components.methods]]
name = "supports"
attribute = "supports"

[[components]]
name = "Job"
kind = "stateless"
management = "bean_managed"

[[components.methods]]
name = "run"
declared_exceptions = ["Retry"]

[[components.methods]]
name = "batch"
timeout_secs = 45

[[components]]
name = "Wizard"
kind = "stateful"
management = "bean_managed"

[[components.methods]]
name = "step"
declared_exceptions = ["Retry"]
"#;

/// Container-managed attribute method names, shared by `Ledger` and `Cart`.
pub const ATTRIBUTE_METHODS: [&str; 6] = [
    "required",
    "requires_new",
    "mandatory",
    "never",
    "not_supported",
    "supports",
];

pub struct Harness {
    pub tm: Arc<InMemoryTransactionManager>,
    pub pool: Arc<RecordingPool>,
    pub invoker: ComponentInvoker,
}

impl Harness {
    pub fn new() -> Self {
        init_logging();
        let deployment = DeploymentConfig::parse(DEPLOYMENT).expect("deployment parses");
        let tm = Arc::new(InMemoryTransactionManager::new());
        let pool = Arc::new(RecordingPool::new());
        let shared: Arc<dyn InstancePool> = pool.clone();
        let invoker = ComponentInvoker::from_deployment(&deployment, tm.clone(), |_| shared.clone())
            .expect("deployment is valid");
        Self { tm, pool, invoker }
    }

    pub fn discards(&self, instance: &StatefulInstance) -> usize {
        self.pool.discard_count(instance.id())
    }
}

pub fn method(component: &str, name: &str) -> MethodId {
    MethodId::new(component, name)
}

pub fn instance(id: &str) -> Arc<StatefulInstance> {
    Arc::new(StatefulInstance::new(InstanceId::new(id)))
}

/// Unchecked fault nobody configured: always SYSTEM.
pub fn runtime_fault() -> Fault {
    BusinessFault::unchecked("NullPointer", "boom").into()
}

pub fn checked_fault(type_name: &str) -> Fault {
    BusinessFault::checked(type_name, "expected").into()
}

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}
