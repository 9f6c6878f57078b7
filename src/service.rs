//! Data source service: builds the pollers, runs them, and answers reads.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{ServerConfig, DEFAULT_POLL_INTERVAL};
use crate::poller::{Poller, PollerError, PollerFactory};
use crate::topology::{BackendKind, DataSourceConfig, InterfaceConfig};

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("data source {0:?} not found")]
    DataSourceNotFound(String),
    #[error("interface {interface:?} not found on data source {data_source:?}")]
    InterfaceNotFound {
        data_source: String,
        interface: String,
    },
    #[error("no poller for backend {0}")]
    PollerNotFound(BackendKind),
    #[error(transparent)]
    Poller(#[from] PollerError),
}

impl ServiceError {
    /// Lookup failures, as opposed to backend failures.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ServiceError::DataSourceNotFound(_)
                | ServiceError::InterfaceNotFound { .. }
                | ServiceError::PollerNotFound(_)
        )
    }
}

/// Owns one poller per backend family and every configured data source.
pub struct DataSourceService {
    /// Every definition of each name, in load order.
    sources: HashMap<String, Vec<Arc<DataSourceConfig>>>,
    pollers: BTreeMap<BackendKind, Arc<dyn Poller>>,
    shutdown: CancellationToken,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl DataSourceService {
    pub fn new(sources: Vec<DataSourceConfig>, config: &ServerConfig) -> Self {
        Self::with_factory(
            sources,
            &PollerFactory::from_config(config),
            config.default_poll_interval,
        )
    }

    /// Build the pollers and register one task per (data source, interface,
    /// metric). Sources are expected flattened across all topology documents.
    ///
    /// Sources sharing a name are read as one: an interface resolves to the
    /// first definition that declares it. Tasks of every definition are
    /// registered, and the registry drops duplicate keys.
    ///
    /// A zero interval falls back to `default_interval`, and a zero
    /// `default_interval` to [`DEFAULT_POLL_INTERVAL`].
    pub fn with_factory(
        sources: Vec<DataSourceConfig>,
        factory: &PollerFactory,
        default_interval: Duration,
    ) -> Self {
        let default_interval = if default_interval.is_zero() {
            tracing::warn!(
                "Zero default poll interval, using {:?}",
                DEFAULT_POLL_INTERVAL
            );
            DEFAULT_POLL_INTERVAL
        } else {
            default_interval
        };

        let mut by_name: HashMap<String, Vec<Arc<DataSourceConfig>>> = HashMap::new();
        let mut pollers: BTreeMap<BackendKind, Arc<dyn Poller>> = BTreeMap::new();

        for source in sources {
            let source = Arc::new(source);
            let kind = source.kind();
            let poller = pollers
                .entry(kind)
                .or_insert_with(|| factory.create(kind))
                .clone();
            let interval = match source.effective_interval(default_interval) {
                i if i.is_zero() => default_interval,
                i => i,
            };

            'interfaces: for iface in &source.interfaces {
                for metric in iface.metrics.names() {
                    match poller.add_task(&source, iface, metric, interval) {
                        Ok(_) => {}
                        Err(PollerError::NotImplemented(kind)) => {
                            tracing::warn!(
                                "Data source {}: {} backend is not implemented, not polling",
                                source.name,
                                kind
                            );
                            break 'interfaces;
                        }
                        Err(e) => {
                            tracing::warn!(
                                "Data source {}: skipping {}/{}: {}",
                                source.name,
                                iface.name,
                                metric,
                                e
                            );
                        }
                    }
                }
            }

            let definitions = by_name.entry(source.name.clone()).or_default();
            if !definitions.is_empty() {
                tracing::warn!(
                    "Data source {} is defined more than once, merging interfaces",
                    source.name
                );
            }
            definitions.push(source);
        }

        for poller in pollers.values() {
            tracing::info!(
                "{} poller: {} tasks registered",
                poller.kind(),
                poller.task_count()
            );
        }

        Self {
            sources: by_name,
            pollers,
            shutdown: CancellationToken::new(),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Start every poller. Safe to call more than once.
    pub fn start(&self) {
        let mut handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        for poller in self.pollers.values() {
            handles.extend(poller.start(&self.shutdown));
        }
        tracing::info!("Data source service: {} poll loops running", handles.len());
    }

    /// Latest cached value of each requested metric, `None` where nothing has
    /// been sampled yet.
    pub fn get_interface_metrics<S: AsRef<str>>(
        &self,
        data_source: &str,
        interface: &str,
        metrics: &[S],
    ) -> Result<BTreeMap<String, Option<u64>>, ServiceError> {
        let (source, iface) = self.lookup(data_source, interface)?;
        let poller = self
            .pollers
            .get(&source.kind())
            .ok_or(ServiceError::PollerNotFound(source.kind()))?;

        let mut values = BTreeMap::new();
        for metric in metrics {
            let metric = metric.as_ref();
            values.insert(metric.to_string(), poller.get_metric(source, iface, metric)?);
        }
        Ok(values)
    }

    fn lookup(
        &self,
        data_source: &str,
        interface: &str,
    ) -> Result<(&DataSourceConfig, &InterfaceConfig), ServiceError> {
        let definitions = self
            .sources
            .get(data_source)
            .ok_or_else(|| ServiceError::DataSourceNotFound(data_source.to_string()))?;
        definitions
            .iter()
            .find_map(|source| source.interface(interface).map(|iface| (&**source, iface)))
            .ok_or_else(|| ServiceError::InterfaceNotFound {
                data_source: data_source.to_string(),
                interface: interface.to_string(),
            })
    }

    /// Metric names configured on an interface.
    pub fn interface_metric_names(
        &self,
        data_source: &str,
        interface: &str,
    ) -> Result<Vec<String>, ServiceError> {
        let (_, iface) = self.lookup(data_source, interface)?;
        Ok(iface.metrics.names().into_iter().map(String::from).collect())
    }

    /// `(name, backend)` of every data source, sorted by name. A name defined
    /// more than once reports the backend of its first definition.
    pub fn data_sources(&self) -> Vec<(String, BackendKind)> {
        let mut list: Vec<_> = self
            .sources
            .iter()
            .filter_map(|(name, defs)| defs.first().map(|s| (name.clone(), s.kind())))
            .collect();
        list.sort();
        list
    }

    pub fn task_count(&self) -> usize {
        self.pollers.values().map(|p| p.task_count()).sum()
    }

    /// Cancel every poll loop and wait for them to exit.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let handles: Vec<_> = {
            let mut guard = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
            guard.drain(..).collect()
        };

        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!("Poll loop ended abnormally: {}", e);
            }
        }
        tracing::info!("Data source service stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snmp::{CounterReading, Oid, SnmpError, SnmpSession, SnmpTarget};
    use crate::topology::{BackendConfig, MetricSpec, SnmpParams};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_test::{assert_err, assert_ok};

    /// Session that counts calls and never answers.
    #[derive(Default)]
    struct SilentSession {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SnmpSession for SilentSession {
        async fn get(&self, _target: &SnmpTarget, _oid: &Oid) -> Result<CounterReading, SnmpError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(SnmpError::Timeout(Duration::from_secs(2)))
        }
    }

    fn factory(session: Arc<SilentSession>) -> PollerFactory {
        PollerFactory::new(session, Duration::from_secs(1))
    }

    fn mock_source(name: &str) -> DataSourceConfig {
        DataSourceConfig {
            name: name.to_string(),
            poll_interval: Some(Duration::from_secs(1)),
            backend: BackendConfig::Mock,
            interfaces: vec![InterfaceConfig {
                name: "eth0".to_string(),
                metrics: MetricSpec::Names(vec!["in".to_string(), "out".to_string()]),
            }],
        }
    }

    fn snmp_source(name: &str) -> DataSourceConfig {
        let mut oids = BTreeMap::new();
        oids.insert("in".to_string(), "1.3.6.1.2.1.2.2.1.10.1".parse().unwrap());
        DataSourceConfig {
            name: name.to_string(),
            poll_interval: None,
            backend: BackendConfig::Snmp(SnmpParams {
                host: "10.0.0.1".to_string(),
                port: 161,
                community: "public".to_string(),
            }),
            interfaces: vec![InterfaceConfig {
                name: "eth0".to_string(),
                metrics: MetricSpec::Oids(oids),
            }],
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_metrics_after_generator_tick() {
        let service = DataSourceService::with_factory(
            vec![mock_source("lab")],
            &factory(Arc::default()),
            Duration::from_secs(3),
        );
        service.start();

        tokio::time::sleep(Duration::from_millis(1_500)).await;

        let values = service
            .get_interface_metrics("lab", "eth0", &["in", "out"])
            .unwrap();
        assert_eq!(values.len(), 2);
        assert!(values.values().all(|v| v.is_some()));

        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_unknown_names_are_not_found() {
        let service = DataSourceService::with_factory(
            vec![mock_source("lab")],
            &factory(Arc::default()),
            Duration::from_secs(3),
        );

        let err = assert_err!(service.get_interface_metrics("unknown-ds", "eth0", &["in"]));
        assert!(matches!(err, ServiceError::DataSourceNotFound(_)));
        assert!(err.is_not_found());

        let err = assert_err!(service.get_interface_metrics("lab", "eth9", &["in"]));
        assert!(matches!(err, ServiceError::InterfaceNotFound { .. }));
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_never_polled_reads_none() {
        let service = DataSourceService::with_factory(
            vec![snmp_source("core-router")],
            &factory(Arc::default()),
            Duration::from_secs(3),
        );

        let values =
            assert_ok!(service.get_interface_metrics("core-router", "eth0", &["in", "errors"]));
        assert_eq!(values.get("in"), Some(&None));
        assert_eq!(values.get("errors"), Some(&None));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shared_key_across_documents_polls_once() {
        let session = Arc::new(SilentSession::default());
        // Same data source declared in two documents
        let service = DataSourceService::with_factory(
            vec![snmp_source("core-router"), snmp_source("core-router")],
            &factory(session.clone()),
            Duration::from_secs(1),
        );
        assert_eq!(service.task_count(), 1);
        assert_eq!(service.data_sources().len(), 1);

        service.start();
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        assert_eq!(session.calls.load(Ordering::SeqCst), 3);

        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_stub_backend_not_implemented() {
        let source = DataSourceConfig {
            name: "prom".to_string(),
            poll_interval: None,
            backend: BackendConfig::Prometheus(Default::default()),
            interfaces: vec![InterfaceConfig {
                name: "eth0".to_string(),
                metrics: MetricSpec::Names(vec!["in".to_string()]),
            }],
        };
        let service = DataSourceService::with_factory(
            vec![source],
            &factory(Arc::default()),
            Duration::from_secs(3),
        );

        let err = service
            .get_interface_metrics("prom", "eth0", &["in"])
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Poller(PollerError::NotImplemented(BackendKind::Prometheus))
        ));
        assert!(!err.is_not_found());
    }

    #[tokio::test]
    async fn test_listing_and_metric_names() {
        let service = DataSourceService::with_factory(
            vec![snmp_source("core-router"), mock_source("lab")],
            &factory(Arc::default()),
            Duration::from_secs(3),
        );

        assert_eq!(
            service.data_sources(),
            vec![
                ("core-router".to_string(), BackendKind::Snmp),
                ("lab".to_string(), BackendKind::Mock),
            ]
        );
        assert_eq!(
            service.interface_metric_names("lab", "eth0").unwrap(),
            vec!["in", "out"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_name_definitions_merge_interfaces() {
        let mut second = mock_source("core-router");
        second.interfaces[0].name = "eth1".to_string();
        let service = DataSourceService::with_factory(
            vec![mock_source("core-router"), second],
            &factory(Arc::default()),
            Duration::from_secs(3),
        );
        assert_eq!(service.task_count(), 4);
        assert_eq!(service.data_sources().len(), 1);

        service.start();
        tokio::time::sleep(Duration::from_millis(500)).await;

        for iface in ["eth0", "eth1"] {
            let values = assert_ok!(service.get_interface_metrics("core-router", iface, &["in"]));
            assert!(values["in"].is_some(), "{iface}");
        }
        let err = assert_err!(service.get_interface_metrics("core-router", "eth2", &["in"]));
        assert!(matches!(err, ServiceError::InterfaceNotFound { .. }));

        service.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_intervals_fall_back_to_default() {
        let session = Arc::new(SilentSession::default());
        let mut source = snmp_source("core-router");
        source.poll_interval = Some(Duration::ZERO);
        let service =
            DataSourceService::with_factory(vec![source], &factory(session.clone()), Duration::ZERO);

        service.start();
        // Ticks at 0s and 3s
        tokio::time::sleep(Duration::from_millis(3_500)).await;
        assert_eq!(session.calls.load(Ordering::SeqCst), 2);

        service.shutdown().await;
    }
}
