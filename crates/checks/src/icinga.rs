//! Minimal Icinga2 REST API client: object listing by host pattern.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::error::CheckError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Object kinds the bridge reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Host,
    Service,
}

impl ObjectKind {
    fn path(self) -> &'static str {
        match self {
            Self::Host => "hosts",
            Self::Service => "services",
        }
    }
}

/// One entry of `/v1/objects/*` results. Service names have the form
/// `host!service`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IcingaObject {
    pub name: String,
    #[serde(default)]
    pub attrs: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct ObjectList {
    #[serde(default)]
    results: Vec<IcingaObject>,
}

fn truthy(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        _ => false,
    }
}

impl IcingaObject {
    /// State as Icinga reports it, 0 when absent.
    pub fn actual_state(&self) -> i64 {
        self.attrs
            .get("state")
            .and_then(Value::as_f64)
            .map_or(0, |s| s as i64)
    }

    pub fn is_acknowledged(&self) -> bool {
        truthy(self.attrs.get("acknowledgement"))
            || truthy(self.attrs.get("acknowledgement_expiry"))
    }

    /// Acknowledged problems count as OK.
    pub fn effective_state(&self) -> i64 {
        if self.is_acknowledged() {
            0
        } else {
            self.actual_state()
        }
    }

    /// `service` part of `host!service`.
    pub fn short_name(&self) -> &str {
        self.name
            .split_once('!')
            .map_or(self.name.as_str(), |(_, service)| service)
    }
}

/// Icinga2 API client.
#[derive(Debug, Clone)]
pub struct IcingaClient {
    endpoint: String,
    user: String,
    password: String,
    http: reqwest::Client,
}

impl IcingaClient {
    /// Icinga's API uses its own CA, so certificate verification is off.
    pub fn new(
        endpoint: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self, CheckError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .danger_accept_invalid_certs(true)
            .build()?;
        Ok(Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            user: user.into(),
            password: password.into(),
            http,
        })
    }

    /// All objects of `kind` whose host name matches `host_pattern`.
    pub async fn list(
        &self,
        kind: ObjectKind,
        host_pattern: &str,
    ) -> Result<Vec<IcingaObject>, CheckError> {
        let url = format!("{}/v1/objects/{}", self.endpoint, kind.path());
        debug!(url = %url, host_pattern, "listing Icinga objects");

        // Filters go in the body, so the GET is tunnelled through POST.
        let response = self
            .http
            .post(&url)
            .basic_auth(&self.user, Some(&self.password))
            .header("Accept", "application/json")
            .header("X-HTTP-Method-Override", "GET")
            .json(&json!({
                "filter": "match(hpattern, host.name)",
                "filter_vars": {"hpattern": host_pattern},
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(CheckError::from_response(response).await);
        }
        let list: ObjectList = response.json().await?;
        Ok(list.results)
    }

    pub async fn hosts(&self, host_pattern: &str) -> Result<Vec<IcingaObject>, CheckError> {
        self.list(ObjectKind::Host, host_pattern).await
    }

    pub async fn services(&self, host_pattern: &str) -> Result<Vec<IcingaObject>, CheckError> {
        self.list(ObjectKind::Service, host_pattern).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(name: &str, attrs: Value) -> IcingaObject {
        IcingaObject {
            name: name.to_string(),
            attrs: attrs.as_object().cloned().unwrap_or_default(),
        }
    }

    #[test]
    fn test_acknowledged_state_is_ok() {
        let acked = object(
            "web!http",
            json!({"state": 2.0, "acknowledgement": 1.0, "acknowledgement_expiry": 0.0}),
        );
        assert_eq!(acked.actual_state(), 2);
        assert_eq!(acked.effective_state(), 0);

        let expiring = object(
            "web!http",
            json!({"state": 1.0, "acknowledgement": 0.0, "acknowledgement_expiry": 1_700_000_000.0}),
        );
        assert_eq!(expiring.effective_state(), 0);

        let failing = object(
            "web!http",
            json!({"state": 2.0, "acknowledgement": 0.0, "acknowledgement_expiry": 0.0}),
        );
        assert_eq!(failing.effective_state(), 2);
    }

    #[test]
    fn test_short_name() {
        assert_eq!(object("web!disk /", json!({})).short_name(), "disk /");
        assert_eq!(object("web", json!({})).short_name(), "web");
    }

    #[test]
    fn test_missing_state_is_ok() {
        assert_eq!(object("web", json!({})).effective_state(), 0);
    }
}
