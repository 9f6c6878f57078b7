//! Typed data-source configuration decoded from topology documents.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

use super::ConfigError;
use crate::snmp::{Oid, SnmpTarget};

/// Default SNMP agent port.
pub const DEFAULT_SNMP_PORT: u16 = 161;
/// Community used when a data source does not set one.
pub const DEFAULT_COMMUNITY: &str = "public";

/// The closed set of backend families a data source can use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Snmp,
    Mock,
    Zabbix,
    Prometheus,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Snmp => "snmp",
            BackendKind::Mock => "mock",
            BackendKind::Zabbix => "zabbix",
            BackendKind::Prometheus => "prometheus",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned for a backend type string outside [`BackendKind`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown backend type {0:?}")]
pub struct UnknownBackend(pub String);

impl FromStr for BackendKind {
    type Err = UnknownBackend;

    /// An empty type string selects SNMP.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "snmp" => Ok(BackendKind::Snmp),
            "mock" => Ok(BackendKind::Mock),
            "zabbix" => Ok(BackendKind::Zabbix),
            "prometheus" => Ok(BackendKind::Prometheus),
            _ => Err(UnknownBackend(s.to_string())),
        }
    }
}

/// Connection parameters of an SNMP data source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnmpParams {
    pub host: String,
    pub port: u16,
    pub community: String,
}

impl SnmpParams {
    pub fn target(&self) -> SnmpTarget {
        SnmpTarget {
            host: self.host.clone(),
            port: self.port,
            community: self.community.clone(),
        }
    }
}

/// Backend-specific parameters, one variant per backend family.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendConfig {
    Snmp(SnmpParams),
    Mock,
    /// Parameters are kept as-is until the backend exists.
    Zabbix(Mapping),
    Prometheus(Mapping),
}

impl BackendConfig {
    pub fn kind(&self) -> BackendKind {
        match self {
            BackendConfig::Snmp(_) => BackendKind::Snmp,
            BackendConfig::Mock => BackendKind::Mock,
            BackendConfig::Zabbix(_) => BackendKind::Zabbix,
            BackendConfig::Prometheus(_) => BackendKind::Prometheus,
        }
    }
}

/// The metrics an interface exposes.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricSpec {
    /// SNMP: metric name to OID.
    Oids(BTreeMap<String, Oid>),
    /// Every other backend: plain metric names.
    Names(Vec<String>),
}

impl MetricSpec {
    pub fn names(&self) -> Vec<&str> {
        match self {
            MetricSpec::Oids(oids) => oids.keys().map(String::as_str).collect(),
            MetricSpec::Names(names) => names.iter().map(String::as_str).collect(),
        }
    }

    pub fn oid(&self, metric: &str) -> Option<&Oid> {
        match self {
            MetricSpec::Oids(oids) => oids.get(metric),
            MetricSpec::Names(_) => None,
        }
    }
}

/// A named sub-unit of a data source, e.g. a network port.
#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceConfig {
    pub name: String,
    pub metrics: MetricSpec,
}

/// One polled backend target.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSourceConfig {
    pub name: String,
    /// `None` means the process-wide default applies.
    pub poll_interval: Option<Duration>,
    pub backend: BackendConfig,
    pub interfaces: Vec<InterfaceConfig>,
}

impl DataSourceConfig {
    pub fn kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn interface(&self, name: &str) -> Option<&InterfaceConfig> {
        self.interfaces.iter().find(|i| i.name == name)
    }

    pub fn effective_interval(&self, default: Duration) -> Duration {
        self.poll_interval.unwrap_or(default)
    }
}

// ============================================================================
// Raw document shape
// ============================================================================

/// A data source exactly as it appears in a topology document: a few fixed
/// keys plus backend parameters inlined next to them.
#[derive(Debug, Clone, Deserialize)]
pub struct RawDataSource {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub poll_interval: Option<u64>,
    #[serde(default)]
    pub interfaces: Vec<RawInterface>,
    #[serde(flatten)]
    pub params: Mapping,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawInterface {
    pub name: String,
    #[serde(flatten)]
    pub params: Mapping,
}

impl TryFrom<RawDataSource> for DataSourceConfig {
    type Error = ConfigError;

    /// Interfaces with malformed parameters are dropped with a warning; the
    /// data source itself is rejected only when its own parameters are bad.
    fn try_from(raw: RawDataSource) -> Result<Self, Self::Error> {
        let context = format!("data source {:?}", raw.name);

        let kind: BackendKind = raw.kind.parse().map_err(|e: UnknownBackend| {
            ConfigError::UnknownBackend {
                data_source: raw.name.clone(),
                kind: e.0,
            }
        })?;

        let backend = match kind {
            BackendKind::Snmp => BackendConfig::Snmp(decode_snmp_params(&context, &raw.params)?),
            BackendKind::Mock => BackendConfig::Mock,
            BackendKind::Zabbix => BackendConfig::Zabbix(raw.params.clone()),
            BackendKind::Prometheus => BackendConfig::Prometheus(raw.params.clone()),
        };

        let mut interfaces = Vec::with_capacity(raw.interfaces.len());
        for iface in raw.interfaces {
            let iface_context = format!("{} interface {:?}", context, iface.name);
            match decode_metric_spec(kind, &iface_context, &iface.params) {
                Ok(metrics) => interfaces.push(InterfaceConfig {
                    name: iface.name,
                    metrics,
                }),
                Err(e) => tracing::warn!("Skipping interface: {}", e),
            }
        }

        Ok(Self {
            name: raw.name,
            poll_interval: raw
                .poll_interval
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            backend,
            interfaces,
        })
    }
}

fn decode_snmp_params(context: &str, params: &Mapping) -> Result<SnmpParams, ConfigError> {
    let host = match params.get("host") {
        Some(Value::String(h)) if !h.trim().is_empty() => h.trim().to_string(),
        Some(Value::String(_)) | None => {
            return Err(ConfigError::MissingField {
                context: context.to_string(),
                field: "host",
            })
        }
        Some(_) => return Err(invalid(context, "host", "must be a string")),
    };

    let port = match params.get("port") {
        None | Some(Value::Null) => DEFAULT_SNMP_PORT,
        Some(Value::Number(n)) => n
            .as_u64()
            .and_then(|p| u16::try_from(p).ok())
            .filter(|p| *p > 0)
            .ok_or_else(|| invalid(context, "port", "must be between 1 and 65535"))?,
        Some(_) => return Err(invalid(context, "port", "must be a number")),
    };

    let community = match params.get("community") {
        None | Some(Value::Null) => DEFAULT_COMMUNITY.to_string(),
        Some(Value::String(c)) => c.clone(),
        Some(_) => return Err(invalid(context, "community", "must be a string")),
    };

    Ok(SnmpParams {
        host,
        port,
        community,
    })
}

fn decode_metric_spec(
    kind: BackendKind,
    context: &str,
    params: &Mapping,
) -> Result<MetricSpec, ConfigError> {
    if kind == BackendKind::Snmp {
        let oids = match params.get("oids") {
            Some(Value::Mapping(m)) => m,
            Some(_) => return Err(invalid(context, "oids", "must map metric names to OIDs")),
            None => {
                return Err(ConfigError::MissingField {
                    context: context.to_string(),
                    field: "oids",
                })
            }
        };

        let mut decoded = BTreeMap::new();
        for (metric, oid) in oids {
            let (Value::String(metric), Value::String(oid)) = (metric, oid) else {
                return Err(invalid(context, "oids", "entries must be strings"));
            };
            let oid = oid.parse::<Oid>().map_err(|e| ConfigError::InvalidOid {
                context: format!("{} metric {:?}", context, metric),
                source: e,
            })?;
            decoded.insert(metric.clone(), oid);
        }
        return Ok(MetricSpec::Oids(decoded));
    }

    let metrics = match params.get("metrics") {
        Some(Value::Sequence(seq)) => seq,
        Some(_) => return Err(invalid(context, "metrics", "must be a list of names")),
        None => {
            return Err(ConfigError::MissingField {
                context: context.to_string(),
                field: "metrics",
            })
        }
    };

    let mut names: Vec<String> = Vec::with_capacity(metrics.len());
    for m in metrics {
        let Value::String(name) = m else {
            return Err(invalid(context, "metrics", "entries must be strings"));
        };
        if !names.contains(name) {
            names.push(name.clone());
        }
    }
    Ok(MetricSpec::Names(names))
}

fn invalid(context: &str, field: &'static str, reason: &str) -> ConfigError {
    ConfigError::InvalidField {
        context: context.to_string(),
        field,
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(yaml: &str) -> Result<DataSourceConfig, ConfigError> {
        let raw: RawDataSource = serde_yaml::from_str(yaml).unwrap();
        DataSourceConfig::try_from(raw)
    }

    #[test]
    fn test_backend_kind_parse() {
        assert_eq!("snmp".parse::<BackendKind>().unwrap(), BackendKind::Snmp);
        assert_eq!("".parse::<BackendKind>().unwrap(), BackendKind::Snmp);
        assert_eq!("Mock".parse::<BackendKind>().unwrap(), BackendKind::Mock);
        assert_eq!("prometheus".parse::<BackendKind>().unwrap(), BackendKind::Prometheus);
        assert!("netflow".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_decode_snmp_source() {
        let ds = decode(
            r#"
name: core-router
type: snmp
host: 10.0.0.1
community: secret
poll_interval: 5
interfaces:
  - name: eth0
    oids:
      in: 1.3.6.1.2.1.2.2.1.10.1
      out: 1.3.6.1.2.1.2.2.1.16.1
"#,
        )
        .unwrap();

        assert_eq!(ds.kind(), BackendKind::Snmp);
        assert_eq!(ds.poll_interval, Some(Duration::from_secs(5)));
        assert_eq!(
            ds.backend,
            BackendConfig::Snmp(SnmpParams {
                host: "10.0.0.1".to_string(),
                port: DEFAULT_SNMP_PORT,
                community: "secret".to_string(),
            })
        );

        let eth0 = ds.interface("eth0").unwrap();
        assert_eq!(eth0.metrics.names(), vec!["in", "out"]);
        assert_eq!(
            eth0.metrics.oid("in").unwrap().to_string(),
            "1.3.6.1.2.1.2.2.1.10.1"
        );
    }

    #[test]
    fn test_decode_mock_source() {
        let ds = decode(
            r#"
name: lab
type: mock
interfaces:
  - name: eth0
    metrics: [in, out, in]
"#,
        )
        .unwrap();

        assert_eq!(ds.kind(), BackendKind::Mock);
        assert_eq!(ds.poll_interval, None);
        assert_eq!(
            ds.interface("eth0").unwrap().metrics,
            MetricSpec::Names(vec!["in".to_string(), "out".to_string()])
        );
        assert_eq!(ds.effective_interval(Duration::from_secs(3)), Duration::from_secs(3));
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let err = decode("name: x\ntype: netflow\n").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownBackend { .. }));
    }

    #[test]
    fn test_snmp_requires_host() {
        let err = decode("name: x\ntype: snmp\nport: 161\n").unwrap_err();
        assert!(matches!(err, ConfigError::MissingField { field: "host", .. }));

        let err = decode("name: x\ntype: snmp\nhost: r1\nport: 70000\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidField { field: "port", .. }));
    }

    #[test]
    fn test_bad_interface_is_skipped() {
        let ds = decode(
            r#"
name: core-router
type: snmp
host: r1
interfaces:
  - name: eth0
    oids:
      in: not.an.oid
  - name: eth1
    metrics: [in]
  - name: eth2
    oids:
      in: 1.3.6.1.2.1.2.2.1.10.3
"#,
        )
        .unwrap();

        let names: Vec<_> = ds.interfaces.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["eth2"]);
    }

    #[test]
    fn test_zero_poll_interval_means_default() {
        let ds = decode("name: lab\ntype: mock\npoll_interval: 0\n").unwrap();
        assert_eq!(ds.poll_interval, None);
    }
}
