use std::sync::Arc;
use std::time::Duration;

use super::{MockPoller, Poller, SnmpPoller, StubPoller};
use crate::config::ServerConfig;
use crate::snmp::{SnmpSession, UdpSnmpSession};
use crate::topology::BackendKind;

/// Builds one poller per backend family.
#[derive(Clone)]
pub struct PollerFactory {
    snmp_session: Arc<dyn SnmpSession>,
    mock_tick: Duration,
}

impl PollerFactory {
    pub fn new(snmp_session: Arc<dyn SnmpSession>, mock_tick: Duration) -> Self {
        Self {
            snmp_session,
            mock_tick,
        }
    }

    /// Factory backed by real UDP sessions.
    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(
            Arc::new(UdpSnmpSession::new(config.snmp_timeout)),
            config.mock_tick,
        )
    }

    pub fn create(&self, kind: BackendKind) -> Arc<dyn Poller> {
        match kind {
            BackendKind::Snmp => Arc::new(SnmpPoller::new(self.snmp_session.clone())),
            BackendKind::Mock => Arc::new(MockPoller::new(self.mock_tick)),
            BackendKind::Zabbix | BackendKind::Prometheus => Arc::new(StubPoller::new(kind)),
        }
    }
}
