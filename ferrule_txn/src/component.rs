//! Deployed components and stateful instances.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use ferrule::descriptor::ComponentConfig;
use ferrule::fault::{ContainerFault, Fault};
use ferrule::policy::{ComponentKind, ManagementMode};
use ferrule::pool::{InstanceId, InstancePool};
use ferrule::txn::TransactionHandle;
use parking_lot::{Mutex, RwLock};

use crate::classify::ExceptionClassifier;

// ─── Component ──────────────────────────────────────────────────────

/// A deployed component: what the engine needs to know beyond the method policy.
pub struct Component {
    name: String,
    kind: ComponentKind,
    management: ManagementMode,
    classifier: ExceptionClassifier,
    pool: Arc<dyn InstancePool>,
}

impl Component {
    pub fn new(
        name: impl Into<String>,
        kind: ComponentKind,
        management: ManagementMode,
        pool: Arc<dyn InstancePool>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            management,
            classifier: ExceptionClassifier::new(),
            pool,
        }
    }

    pub fn from_config(config: &ComponentConfig, pool: Arc<dyn InstancePool>) -> Self {
        Self::new(config.name.clone(), config.kind, config.management, pool)
            .with_classifier(ExceptionClassifier::from_config(&config.application_exceptions))
    }

    pub fn with_classifier(mut self, classifier: ExceptionClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ComponentKind {
        self.kind
    }

    pub fn management(&self) -> ManagementMode {
        self.management
    }

    pub fn classifier(&self) -> &ExceptionClassifier {
        &self.classifier
    }

    pub fn pool(&self) -> &Arc<dyn InstancePool> {
        &self.pool
    }
}

// ─── Instance Collaborators ─────────────────────────────────────────

/// Transaction boundary callbacks a stateful instance may opt into.
///
/// Called through the engine with a callback phase, so they run in whatever
/// transaction context the boundary has and never start or suspend one.
pub trait SessionSynchronization: Send + Sync {
    /// First call of the instance in a new transaction.
    fn after_begin(&self) -> Result<(), Fault>;
    /// The transaction is about to complete. A failure forces rollback.
    fn before_completion(&self) -> Result<(), Fault>;
    /// The transaction completed.
    fn after_completion(&self, committed: bool) -> Result<(), Fault>;
}

/// Resource bound to a stateful instance across calls that must be enlisted
/// in whatever transaction each call runs in.
pub trait ExtendedResource: Send + Sync {
    fn name(&self) -> &str;
    fn join_transaction(&self, handle: TransactionHandle) -> Result<(), Fault>;
}

// ─── Stateful Instance ──────────────────────────────────────────────

/// One stateful instance, shared between the caller and the engine.
pub struct StatefulInstance {
    id: InstanceId,
    busy: AtomicBool,
    discarded: AtomicBool,
    in_transaction: AtomicBool,
    synchronization: Option<Arc<dyn SessionSynchronization>>,
    sync_registration: Mutex<Option<TransactionHandle>>,
    marker_registration: Mutex<Option<TransactionHandle>>,
    resources: RwLock<Vec<Arc<dyn ExtendedResource>>>,
}

impl StatefulInstance {
    pub fn new(id: impl Into<InstanceId>) -> Self {
        Self {
            id: id.into(),
            busy: AtomicBool::new(false),
            discarded: AtomicBool::new(false),
            in_transaction: AtomicBool::new(false),
            synchronization: None,
            sync_registration: Mutex::new(None),
            marker_registration: Mutex::new(None),
            resources: RwLock::new(Vec::new()),
        }
    }

    pub fn with_synchronization(mut self, sync: Arc<dyn SessionSynchronization>) -> Self {
        self.synchronization = Some(sync);
        self
    }

    pub fn id(&self) -> &InstanceId {
        &self.id
    }

    pub fn synchronization(&self) -> Option<&Arc<dyn SessionSynchronization>> {
        self.synchronization.as_ref()
    }

    pub fn register_resource(&self, resource: Arc<dyn ExtendedResource>) {
        self.resources.write().push(resource);
    }

    pub fn resources(&self) -> Vec<Arc<dyn ExtendedResource>> {
        self.resources.read().clone()
    }

    pub fn is_discarded(&self) -> bool {
        self.discarded.load(Ordering::Acquire)
    }

    /// Whether the instance is enlisted in a transaction that has not completed.
    pub fn is_in_transaction(&self) -> bool {
        self.in_transaction.load(Ordering::Acquire)
    }

    /// Claim the instance for one call.
    ///
    /// # Errors
    ///
    /// `NoSuchInstance` once discarded, `ConcurrentAccess` while another call
    /// holds the instance.
    pub fn enter(self: &Arc<Self>) -> Result<BusyGuard, ContainerFault> {
        if self.is_discarded() {
            return Err(ContainerFault::NoSuchInstance {
                instance: self.id.clone(),
            });
        }
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ContainerFault::ConcurrentAccess {
                instance: self.id.clone(),
            });
        }
        Ok(BusyGuard {
            instance: Arc::clone(self),
        })
    }

    /// Flag the instance discarded. Returns false if it already was.
    pub(crate) fn mark_discarded(&self) -> bool {
        !self.discarded.swap(true, Ordering::AcqRel)
    }

    /// Record that callbacks are registered for `handle`. False if they already are.
    pub(crate) fn claim_sync_registration(&self, handle: TransactionHandle) -> bool {
        claim(&self.sync_registration, handle)
    }

    pub(crate) fn release_sync_registration(&self, handle: TransactionHandle) {
        release(&self.sync_registration, handle);
    }

    /// Enlist the marker in `handle`. False if already enlisted there.
    pub(crate) fn claim_marker(&self, handle: TransactionHandle) -> bool {
        let claimed = claim(&self.marker_registration, handle);
        if claimed {
            self.in_transaction.store(true, Ordering::Release);
        }
        claimed
    }

    pub(crate) fn release_marker(&self, handle: TransactionHandle) {
        if release(&self.marker_registration, handle) {
            self.in_transaction.store(false, Ordering::Release);
        }
    }
}

fn claim(slot: &Mutex<Option<TransactionHandle>>, handle: TransactionHandle) -> bool {
    let mut slot = slot.lock();
    if *slot == Some(handle) {
        return false;
    }
    *slot = Some(handle);
    true
}

fn release(slot: &Mutex<Option<TransactionHandle>>, handle: TransactionHandle) -> bool {
    let mut slot = slot.lock();
    if *slot != Some(handle) {
        return false;
    }
    *slot = None;
    true
}

/// Marks an instance busy until dropped.
pub struct BusyGuard {
    instance: Arc<StatefulInstance>,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.instance.busy.store(false, Ordering::Release);
    }
}
