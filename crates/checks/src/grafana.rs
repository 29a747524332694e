//! Grafana data-source query client.
//!
//! Synapse metrics are read through Grafana's `POST /api/ds/query` rather
//! than from Prometheus directly, since Grafana is what the monitoring host
//! can reach.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::error::CheckError;

/// Data source UID of the Synapse Prometheus in Grafana
pub const DEFAULT_DATASOURCE_UID: &str = "AbuT5CJ4z";

/// Configuration for the Grafana client
#[derive(Debug, Clone)]
pub struct GrafanaConfig {
    /// e.g. `https://grafana.example.org`
    pub base_url: String,
    pub api_key: String,
    pub datasource_uid: String,
    /// Step between data points
    pub interval: Duration,
    /// How far back to query, in minutes
    pub range_minutes: u64,
    pub timeout: Duration,
}

/// One PromQL expression in a data-source query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricQuery {
    pub ref_id: &'static str,
    pub expr: String,
}

impl MetricQuery {
    pub fn new(ref_id: &'static str, expr: impl Into<String>) -> Self {
        Self {
            ref_id,
            expr: expr.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct QueryRequest {
    queries: Vec<serde_json::Value>,
    from: String,
    to: &'static str,
}

/// Response of `/api/ds/query`, keyed by ref ID.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub results: BTreeMap<String, QueryResult>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryResult {
    #[serde(default)]
    pub frames: Vec<Frame>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Frame {
    #[serde(default)]
    pub schema: FrameSchema,
    pub data: FrameData,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FrameSchema {
    #[serde(default)]
    pub name: Option<String>,
}

/// Column-major data: `values[0]` are timestamps, `values[1]` the series.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FrameData {
    #[serde(default)]
    pub values: Vec<Vec<Option<f64>>>,
}

impl Frame {
    /// Series values with gaps (nulls) dropped.
    pub fn series(&self) -> Vec<f64> {
        self.data
            .values
            .get(1)
            .map(|column| column.iter().flatten().copied().collect())
            .unwrap_or_default()
    }

    /// Value of the last label in the series name, e.g. `GET` for
    /// `rate(...){method="GET"}`.
    pub fn label(&self) -> Option<String> {
        let name = self.schema.name.as_deref()?;
        let last = name.rsplit('=').next()?;
        Some(last.trim_matches('}').trim_matches('"').to_string())
    }
}

impl QueryResponse {
    pub fn frames(&self, ref_id: &str) -> Result<&[Frame], CheckError> {
        self.results
            .get(ref_id)
            .map(|r| r.frames.as_slice())
            .ok_or_else(|| CheckError::MissingData(format!("no result for query {ref_id}")))
    }

    pub fn first_frame(&self, ref_id: &str) -> Result<&Frame, CheckError> {
        self.frames(ref_id)?
            .first()
            .ok_or_else(|| CheckError::MissingData(format!("no frames for query {ref_id}")))
    }
}

/// Grafana client for querying metrics
#[derive(Debug, Clone)]
pub struct GrafanaClient {
    config: GrafanaConfig,
    client: reqwest::Client,
}

impl GrafanaClient {
    /// Grafana sits behind a self-signed certificate in this deployment, so
    /// certificate verification is off.
    pub fn new(config: GrafanaConfig) -> Result<Self, CheckError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .danger_accept_invalid_certs(true)
            .build()?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &GrafanaConfig {
        &self.config
    }

    /// JSON body for a set of queries.
    fn request_body(&self, queries: &[MetricQuery]) -> QueryRequest {
        let interval_ms = u64::try_from(self.config.interval.as_millis()).unwrap_or(u64::MAX);
        QueryRequest {
            queries: queries
                .iter()
                .map(|q| {
                    json!({
                        "datasource": {"type": "prometheus", "uid": self.config.datasource_uid},
                        "expr": q.expr,
                        "refId": q.ref_id,
                        "format": "time_series",
                        "queryType": "timeSeriesQuery",
                        "exemplar": false,
                        "interval": "",
                        "legendFormat": "",
                        "intervalMs": interval_ms,
                    })
                })
                .collect(),
            from: format!("now-{}m", self.config.range_minutes),
            to: "now",
        }
    }

    /// Run queries over the configured range.
    pub async fn query(&self, queries: &[MetricQuery]) -> Result<QueryResponse, CheckError> {
        let url = format!(
            "{}/api/ds/query",
            self.config.base_url.trim_end_matches('/')
        );
        debug!(
            refs = ?queries.iter().map(|q| q.ref_id).collect::<Vec<_>>(),
            "Executing Grafana query"
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&self.request_body(queries))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(CheckError::from_response(response).await);
        }
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(name: Option<&str>, series: Vec<Option<f64>>) -> Frame {
        Frame {
            schema: FrameSchema {
                name: name.map(str::to_string),
            },
            data: FrameData {
                values: vec![vec![Some(1.0); series.len()], series],
            },
        }
    }

    #[test]
    fn test_series_drops_nulls() {
        let f = frame(None, vec![Some(1.0), None, Some(3.0)]);
        assert_eq!(f.series(), vec![1.0, 3.0]);
        assert!(Frame {
            schema: FrameSchema::default(),
            data: FrameData::default()
        }
        .series()
        .is_empty());
    }

    #[test]
    fn test_label_from_series_name() {
        let f = frame(
            Some(r#"rate(synapse_http_client_requests_total){method="GET"}"#),
            vec![],
        );
        assert_eq!(f.label().as_deref(), Some("GET"));
        assert_eq!(frame(None, vec![]).label(), None);
    }

    #[test]
    fn test_request_body_shape() {
        let client = GrafanaClient::new(GrafanaConfig {
            base_url: "https://grafana.example.org".into(),
            api_key: "key".into(),
            datasource_uid: DEFAULT_DATASOURCE_UID.into(),
            interval: Duration::from_secs(15),
            range_minutes: 2,
            timeout: Duration::from_secs(30),
        })
        .unwrap();
        let body = serde_json::to_value(client.request_body(&[MetricQuery::new("A", "up")])).unwrap();
        assert_eq!(body["from"], "now-2m");
        assert_eq!(body["to"], "now");
        assert_eq!(body["queries"][0]["refId"], "A");
        assert_eq!(body["queries"][0]["intervalMs"], 15000);
        assert_eq!(body["queries"][0]["datasource"]["uid"], "AbuT5CJ4z");
    }

    #[test]
    fn test_missing_ref_is_error() {
        let resp: QueryResponse = serde_json::from_str(r#"{"results": {}}"#).unwrap();
        assert!(matches!(resp.frames("A"), Err(CheckError::MissingData(_))));
    }
}
