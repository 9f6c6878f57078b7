//! SNMP counter poller.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::{
    compute_rate, CacheKey, MetricCache, PollTask, Poller, PollerError, Sample, TaskRegistry,
    TaskTarget,
};
use crate::snmp::{Oid, SnmpSession, SnmpTarget};
use crate::topology::{BackendConfig, BackendKind, DataSourceConfig, InterfaceConfig};

/// Polls interface octet counters over SNMP and caches them as bytes/second.
pub struct SnmpPoller {
    session: Arc<dyn SnmpSession>,
    registry: TaskRegistry,
    cache: Arc<MetricCache>,
}

impl SnmpPoller {
    pub fn new(session: Arc<dyn SnmpSession>) -> Self {
        Self {
            session,
            registry: TaskRegistry::new(),
            cache: Arc::new(MetricCache::new()),
        }
    }

    fn target_of(source: &DataSourceConfig) -> Result<SnmpTarget, PollerError> {
        match &source.backend {
            BackendConfig::Snmp(params) => Ok(params.target()),
            _ => Err(PollerError::BackendMismatch {
                data_source: source.name.clone(),
                expected: BackendKind::Snmp,
            }),
        }
    }
}

impl Poller for SnmpPoller {
    fn kind(&self) -> BackendKind {
        BackendKind::Snmp
    }

    fn add_task(
        &self,
        source: &Arc<DataSourceConfig>,
        interface: &InterfaceConfig,
        metric: &str,
        interval: Duration,
    ) -> Result<bool, PollerError> {
        let target = Self::target_of(source)?;
        let oid = interface
            .metrics
            .oid(metric)
            .cloned()
            .ok_or_else(|| PollerError::MissingOid {
                interface: interface.name.clone(),
                metric: metric.to_string(),
            })?;

        let key = CacheKey::snmp(&target, &oid);
        self.registry.add(PollTask {
            key,
            metric: oid.to_string(),
            target: TaskTarget::Snmp { target, oid },
            data_source: source.clone(),
            interval,
        })
    }

    fn start(&self, shutdown: &CancellationToken) -> Vec<JoinHandle<()>> {
        let Some(tasks) = self.registry.start() else {
            return Vec::new();
        };

        tracing::info!("SNMP poller: starting {} tasks", tasks.len());

        tasks
            .into_iter()
            .filter_map(|task| {
                let TaskTarget::Snmp { target, oid } = task.target.clone() else {
                    return None;
                };
                Some(tokio::spawn(run_poll_loop(
                    task,
                    target,
                    oid,
                    self.session.clone(),
                    self.cache.clone(),
                    shutdown.child_token(),
                )))
            })
            .collect()
    }

    fn get_metric(
        &self,
        source: &DataSourceConfig,
        interface: &InterfaceConfig,
        metric: &str,
    ) -> Result<Option<u64>, PollerError> {
        let target = Self::target_of(source)?;
        let Some(oid) = interface.metrics.oid(metric) else {
            return Ok(None);
        };
        Ok(self.cache.get(&CacheKey::snmp(&target, oid)))
    }

    fn task_count(&self) -> usize {
        self.registry.len()
    }
}

/// Sample one counter every `task.interval` until cancelled.
///
/// A failed GET skips the tick without touching the cache or the previous
/// sample, so the next successful tick computes its delta against the last
/// good reading.
async fn run_poll_loop(
    task: PollTask,
    target: SnmpTarget,
    oid: Oid,
    session: Arc<dyn SnmpSession>,
    cache: Arc<MetricCache>,
    shutdown: CancellationToken,
) {
    let mut interval = tokio::time::interval(task.interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut prev: Option<Sample> = None;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {
                let reading = match session.get(&target, &oid).await {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!(
                            "SNMP get failed for {} ({}): {}",
                            task.key,
                            task.data_source.name,
                            e
                        );
                        continue;
                    }
                };

                let sample = Sample::new(reading.value, Instant::now());
                if let Some(rate) = compute_rate(prev, sample, reading.bits) {
                    tracing::debug!("SNMP {}: {} B/s", task.key, rate);
                    cache.set(&task.key, rate);
                }
                prev = Some(sample);
            }
        }
    }

    tracing::debug!("SNMP poll loop for {} stopped", task.key);
}
