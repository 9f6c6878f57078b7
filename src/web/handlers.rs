//! HTTP request handlers.

use std::collections::BTreeMap;

use super::AppState;
use crate::poller::PollerError;
use crate::service::ServiceError;
use crate::topology::BackendKind;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};

pub async fn handle_health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

// ============================================================================
// API: Data sources
// ============================================================================

#[derive(Debug, Serialize)]
pub struct DataSourceSummary {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: BackendKind,
}

pub async fn handle_get_data_sources(State(state): State<AppState>) -> impl IntoResponse {
    let list: Vec<DataSourceSummary> = state
        .service
        .data_sources()
        .into_iter()
        .map(|(name, kind)| DataSourceSummary { name, kind })
        .collect();
    Json(list)
}

#[derive(Debug, Default, Deserialize)]
pub struct MetricsQuery {
    /// Comma-separated metric names; all configured metrics when absent.
    pub metrics: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    pub metrics: BTreeMap<String, Option<u64>>,
}

pub async fn handle_get_interface_metrics(
    State(state): State<AppState>,
    Path((source, interface)): Path<(String, String)>,
    Query(query): Query<MetricsQuery>,
) -> Response {
    let requested: Vec<String> = match query.metrics.as_deref() {
        Some(list) => list
            .split(',')
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(String::from)
            .collect(),
        None => match state.service.interface_metric_names(&source, &interface) {
            Ok(names) => names,
            Err(e) => return error_response(e),
        },
    };

    match state
        .service
        .get_interface_metrics(&source, &interface, &requested)
    {
        Ok(metrics) => Json(MetricsResponse { metrics }).into_response(),
        Err(e) => error_response(e),
    }
}

fn error_response(err: ServiceError) -> Response {
    let status = if err.is_not_found() {
        StatusCode::NOT_FOUND
    } else if matches!(err, ServiceError::Poller(PollerError::NotImplemented(_))) {
        StatusCode::NOT_IMPLEMENTED
    } else {
        tracing::error!("Metric read failed: {}", err);
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, err.to_string()).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::poller::PollerFactory;
    use crate::service::DataSourceService;
    use crate::topology::{BackendConfig, DataSourceConfig, InterfaceConfig, MetricSpec};
    use axum::body::to_bytes;
    use std::sync::Arc;
    use std::time::Duration;

    fn state() -> AppState {
        let sources = vec![
            DataSourceConfig {
                name: "lab".to_string(),
                poll_interval: None,
                backend: BackendConfig::Mock,
                interfaces: vec![InterfaceConfig {
                    name: "eth0".to_string(),
                    metrics: MetricSpec::Names(vec!["in".to_string(), "out".to_string()]),
                }],
            },
            DataSourceConfig {
                name: "zbx".to_string(),
                poll_interval: None,
                backend: BackendConfig::Zabbix(Default::default()),
                interfaces: vec![InterfaceConfig {
                    name: "eth0".to_string(),
                    metrics: MetricSpec::Names(vec!["in".to_string()]),
                }],
            },
        ];
        let config = ServerConfig::default();
        let factory = PollerFactory::from_config(&config);
        let service = DataSourceService::with_factory(sources, &factory, Duration::from_secs(3));
        AppState {
            config,
            service: Arc::new(service),
        }
    }

    async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn metrics_path(source: &str) -> Path<(String, String)> {
        Path((source.to_string(), "eth0".to_string()))
    }

    #[tokio::test]
    async fn test_list_data_sources() {
        let resp = handle_get_data_sources(State(state())).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            body_json(resp).await,
            serde_json::json!([
                { "name": "lab", "type": "mock" },
                { "name": "zbx", "type": "zabbix" },
            ])
        );
    }

    #[tokio::test]
    async fn test_metrics_before_first_poll() {
        let query = MetricsQuery {
            metrics: Some("in, out".to_string()),
        };
        let resp =
            handle_get_interface_metrics(State(state()), metrics_path("lab"), Query(query)).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            body_json(resp).await,
            serde_json::json!({ "metrics": { "in": null, "out": null } })
        );
    }

    #[tokio::test]
    async fn test_metrics_default_to_configured_names() {
        let resp = handle_get_interface_metrics(
            State(state()),
            metrics_path("lab"),
            Query(MetricsQuery::default()),
        )
        .await;
        let body = body_json(resp).await;
        let names: Vec<_> = body["metrics"].as_object().unwrap().keys().cloned().collect();
        assert_eq!(names, vec!["in", "out"]);
    }

    #[tokio::test]
    async fn test_error_statuses() {
        let resp = handle_get_interface_metrics(
            State(state()),
            metrics_path("unknown-ds"),
            Query(MetricsQuery::default()),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = handle_get_interface_metrics(
            State(state()),
            metrics_path("zbx"),
            Query(MetricsQuery::default()),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::NOT_IMPLEMENTED);
    }
}
