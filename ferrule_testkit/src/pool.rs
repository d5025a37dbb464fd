//! Recording instance pool.

use std::sync::atomic::{AtomicBool, Ordering};

use ferrule_common::pool::{InstanceId, InstancePool, PoolError};
use parking_lot::Mutex;

/// Pool that records discards and can be told to fail them.
#[derive(Debug, Default)]
pub struct RecordingPool {
    discarded: Mutex<Vec<InstanceId>>,
    failing: AtomicBool,
}

impl RecordingPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `discard` fail (after recording it).
    pub fn fail_discards(&self, fail: bool) {
        self.failing.store(fail, Ordering::SeqCst);
    }

    /// Every discard call so far, in order.
    pub fn discarded(&self) -> Vec<InstanceId> {
        self.discarded.lock().clone()
    }

    /// Number of discard calls for `instance`.
    pub fn discard_count(&self, instance: &InstanceId) -> usize {
        self.discarded.lock().iter().filter(|i| *i == instance).count()
    }
}

impl InstancePool for RecordingPool {
    fn discard(&self, instance: &InstanceId) -> Result<(), PoolError> {
        self.discarded.lock().push(instance.clone());
        if self.failing.load(Ordering::SeqCst) {
            return Err(PoolError::Other(format!("refusing to discard {instance}")));
        }
        Ok(())
    }
}
