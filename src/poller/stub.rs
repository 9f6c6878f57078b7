use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{Poller, PollerError};
use crate::topology::{BackendKind, DataSourceConfig, InterfaceConfig};

/// Placeholder for backends that are configurable but not polled yet
/// (Zabbix, Prometheus). Every call reports `NotImplemented`.
#[derive(Debug, Clone, Copy)]
pub struct StubPoller {
    kind: BackendKind,
}

impl StubPoller {
    pub fn new(kind: BackendKind) -> Self {
        Self { kind }
    }
}

impl Poller for StubPoller {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn add_task(
        &self,
        _source: &Arc<DataSourceConfig>,
        _interface: &InterfaceConfig,
        _metric: &str,
        _interval: Duration,
    ) -> Result<bool, PollerError> {
        Err(PollerError::NotImplemented(self.kind))
    }

    fn start(&self, _shutdown: &CancellationToken) -> Vec<JoinHandle<()>> {
        Vec::new()
    }

    fn get_metric(
        &self,
        _source: &DataSourceConfig,
        _interface: &InterfaceConfig,
        _metric: &str,
    ) -> Result<Option<u64>, PollerError> {
        Err(PollerError::NotImplemented(self.kind))
    }

    fn task_count(&self) -> usize {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::{BackendConfig, MetricSpec};

    #[test]
    fn test_stub_reports_not_implemented() {
        let poller = StubPoller::new(BackendKind::Zabbix);
        let ds = Arc::new(DataSourceConfig {
            name: "zbx".to_string(),
            poll_interval: None,
            backend: BackendConfig::Zabbix(Default::default()),
            interfaces: Vec::new(),
        });
        let iface = InterfaceConfig {
            name: "eth0".to_string(),
            metrics: MetricSpec::Names(vec!["in".to_string()]),
        };

        let err = poller
            .add_task(&ds, &iface, "in", Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, PollerError::NotImplemented(BackendKind::Zabbix)));
        assert!(matches!(
            poller.get_metric(&ds, &iface, "in"),
            Err(PollerError::NotImplemented(BackendKind::Zabbix))
        ));
        assert_eq!(poller.task_count(), 0);
    }
}
