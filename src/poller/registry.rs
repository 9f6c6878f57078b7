//! Per-poller task registry with key de-duplication.

use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use super::{CacheKey, PollerError};
use crate::snmp::{Oid, SnmpTarget};
use crate::topology::DataSourceConfig;

/// What a poll task samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskTarget {
    Snmp { target: SnmpTarget, oid: Oid },
    /// Identified by the cache key alone.
    Named,
}

/// One recurring sampling job.
#[derive(Debug, Clone)]
pub struct PollTask {
    pub key: CacheKey,
    pub target: TaskTarget,
    /// OID or logical metric name.
    pub metric: String,
    pub data_source: Arc<DataSourceConfig>,
    pub interval: Duration,
}

#[derive(Debug, Default)]
struct RegistryState {
    tasks: Vec<PollTask>,
    keys: HashSet<CacheKey>,
    started: bool,
}

/// Holds the tasks of one poller until it starts.
///
/// Registration is only accepted before [`TaskRegistry::start`]; afterwards
/// the task set is frozen.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    state: RwLock<RegistryState>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task. Returns `Ok(false)` when a task with the same key is
    /// already registered.
    pub fn add(&self, task: PollTask) -> Result<bool, PollerError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);

        if state.started {
            return Err(PollerError::AlreadyStarted(task.key));
        }

        if !state.keys.insert(task.key.clone()) {
            return Ok(false);
        }

        state.tasks.push(task);
        Ok(true)
    }

    /// Freeze the registry and hand out its tasks. Only the first call
    /// returns them; later calls get `None`.
    pub fn start(&self) -> Option<Vec<PollTask>> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.started {
            return None;
        }
        state.started = true;
        Some(state.tasks.clone())
    }

    pub fn len(&self) -> usize {
        self.state.read().unwrap_or_else(PoisonError::into_inner).tasks.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    pub fn is_started(&self) -> bool {
        self.state.read().unwrap_or_else(PoisonError::into_inner).started
    }
}
