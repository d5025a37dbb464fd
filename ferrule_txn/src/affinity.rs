//! Transaction affinity for bean-managed stateful instances.
//!
//! A stateful instance may begin a transaction in one call and finish it in a
//! later one. Between calls the transaction lives here, detached from any
//! thread. At most one record per instance.

use std::collections::HashMap;

use ferrule::pool::InstanceId;
use ferrule::txn::TransactionHandle;
use parking_lot::RwLock;
use tracing::trace;

#[derive(Debug, Default)]
pub struct AffinityStore {
    records: RwLock<HashMap<InstanceId, TransactionHandle>>,
}

impl AffinityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `handle` for `instance`, replacing (and returning) any previous record.
    pub fn remember(
        &self,
        instance: &InstanceId,
        handle: TransactionHandle,
    ) -> Option<TransactionHandle> {
        trace!(%instance, %handle, "remember");
        self.records.write().insert(instance.clone(), handle)
    }

    pub fn lookup(&self, instance: &InstanceId) -> Option<TransactionHandle> {
        self.records.read().get(instance).copied()
    }

    /// Remove the record for `instance`. No-op if absent.
    pub fn forget(&self, instance: &InstanceId) -> Option<TransactionHandle> {
        let removed = self.records.write().remove(instance);
        if let Some(handle) = removed {
            trace!(%instance, %handle, "forget");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}
