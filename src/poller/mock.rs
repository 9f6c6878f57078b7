//! Synthetic traffic poller for local development and tests.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::{CacheKey, MetricCache, PollTask, Poller, PollerError, TaskRegistry, TaskTarget};
use crate::topology::{BackendKind, DataSourceConfig, InterfaceConfig};

/// Upper bound (exclusive) of generated rates, in bytes/second.
pub const MOCK_MAX_RATE: u64 = 50_000;

pub const DEFAULT_MOCK_TICK: Duration = Duration::from_secs(1);

/// Which half of the generated pair a metric reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockField {
    In,
    Out,
}

impl MockField {
    pub fn parse(metric: &str) -> Option<Self> {
        match metric {
            "in" => Some(MockField::In),
            "out" => Some(MockField::Out),
            _ => None,
        }
    }

    fn pick(self, pair: TrafficPair) -> u64 {
        match self {
            MockField::In => pair.in_rate,
            MockField::Out => pair.out_rate,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TrafficPair {
    in_rate: u64,
    out_rate: u64,
}

fn synthetic_pair() -> TrafficPair {
    let mut rng = rand::thread_rng();
    TrafficPair {
        in_rate: rng.gen_range(0..MOCK_MAX_RATE),
        out_rate: rng.gen_range(0..MOCK_MAX_RATE),
    }
}

/// Serves rates from one shared generator instead of a real backend.
///
/// A single generator draws a fresh `(in, out)` pair every `tick` and writes
/// the matching half to every task's key, so all mock metrics are populated
/// after the first tick. Task poll intervals do not apply. Values are already
/// rates, so no delta is taken.
pub struct MockPoller {
    tick: Duration,
    registry: TaskRegistry,
    cache: Arc<MetricCache>,
}

impl MockPoller {
    pub fn new(tick: Duration) -> Self {
        Self {
            tick,
            registry: TaskRegistry::new(),
            cache: Arc::new(MetricCache::new()),
        }
    }
}

impl Default for MockPoller {
    fn default() -> Self {
        Self::new(DEFAULT_MOCK_TICK)
    }
}

impl Poller for MockPoller {
    fn kind(&self) -> BackendKind {
        BackendKind::Mock
    }

    fn add_task(
        &self,
        source: &Arc<DataSourceConfig>,
        interface: &InterfaceConfig,
        metric: &str,
        interval: Duration,
    ) -> Result<bool, PollerError> {
        if MockField::parse(metric).is_none() {
            return Err(PollerError::UnsupportedMetric(metric.to_string()));
        }

        self.registry.add(PollTask {
            key: CacheKey::named(&source.name, &interface.name, metric),
            target: TaskTarget::Named,
            metric: metric.to_string(),
            data_source: source.clone(),
            interval,
        })
    }

    fn start(&self, shutdown: &CancellationToken) -> Vec<JoinHandle<()>> {
        let Some(tasks) = self.registry.start() else {
            return Vec::new();
        };

        let targets: Vec<(CacheKey, MockField)> = tasks
            .into_iter()
            .filter_map(|task| MockField::parse(&task.metric).map(|field| (task.key, field)))
            .collect();
        if targets.is_empty() {
            return Vec::new();
        }

        tracing::info!(
            "Mock poller: starting generator for {} tasks, tick {:?}",
            targets.len(),
            self.tick
        );

        vec![tokio::spawn(run_generator(
            self.tick,
            targets,
            self.cache.clone(),
            shutdown.child_token(),
        ))]
    }

    fn get_metric(
        &self,
        source: &DataSourceConfig,
        interface: &InterfaceConfig,
        metric: &str,
    ) -> Result<Option<u64>, PollerError> {
        let key = CacheKey::named(&source.name, &interface.name, metric);
        Ok(self.cache.get(&key))
    }

    fn task_count(&self) -> usize {
        self.registry.len()
    }
}

/// Publish one fresh pair per tick to every registered key.
async fn run_generator(
    tick: Duration,
    targets: Vec<(CacheKey, MockField)>,
    cache: Arc<MetricCache>,
    shutdown: CancellationToken,
) {
    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {
                let pair = synthetic_pair();
                tracing::debug!("Mock generator: in={} out={}", pair.in_rate, pair.out_rate);
                for (key, field) in &targets {
                    cache.set(key, field.pick(pair));
                }
            }
        }
    }
}
