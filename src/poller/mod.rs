//! Backend pollers.
//!
//! Each backend family gets one poller that owns a task registry and a metric
//! cache. Poll loops write to the cache; readers only ever see the cache.

mod cache;
mod factory;
mod mock;
mod rate;
mod registry;
mod snmp;
mod stub;

pub use cache::*;
pub use factory::*;
pub use mock::*;
pub use rate::*;
pub use registry::*;
pub use snmp::*;
pub use stub::*;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::topology::{BackendKind, DataSourceConfig, InterfaceConfig};

/// Poller error types.
#[derive(Error, Debug)]
pub enum PollerError {
    #[error("{0} backend is not implemented")]
    NotImplemented(BackendKind),
    #[error("poller already started, task {0} was not registered")]
    AlreadyStarted(CacheKey),
    #[error("interface {interface:?} has no OID for metric {metric:?}")]
    MissingOid { interface: String, metric: String },
    #[error("metric {0:?} is not produced by the mock backend")]
    UnsupportedMetric(String),
    #[error("data source {data_source:?} is not a {expected} source")]
    BackendMismatch {
        data_source: String,
        expected: BackendKind,
    },
}

/// Common interface of every backend poller.
pub trait Poller: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Register the task sampling `metric` of `interface`. Returns whether a
    /// new task was created; a task with the same cache key is reused.
    fn add_task(
        &self,
        source: &Arc<DataSourceConfig>,
        interface: &InterfaceConfig,
        metric: &str,
        interval: Duration,
    ) -> Result<bool, PollerError>;

    /// Spawn the poll loops of every registered task. Loops stop when
    /// `shutdown` is cancelled. Calling `start` again spawns nothing.
    fn start(&self, shutdown: &CancellationToken) -> Vec<JoinHandle<()>>;

    /// Last cached value, `None` if the metric has not been polled yet.
    fn get_metric(
        &self,
        source: &DataSourceConfig,
        interface: &InterfaceConfig,
        metric: &str,
    ) -> Result<Option<u64>, PollerError>;

    fn task_count(&self) -> usize;
}
