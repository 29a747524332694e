//! HTTP bridge exposing Icinga host and service state to Uptime Kuma.
//!
//! `GET /host/{hostid}` answers with the host, its services and which of
//! them are failing. With `kuma=true` any failure turns the response into a
//! 410 so a plain HTTP monitor in Kuma goes down.

use std::collections::BTreeMap;
use std::net::SocketAddr;

use anyhow::Context;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use clap::Parser;
use serde::Serialize;
use serde_json::{json, Map, Value};
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::cli::Verbosity;
use crate::error::CheckError;
use crate::icinga::{IcingaClient, IcingaObject};

#[derive(Debug, Clone, Parser)]
#[command(name = "icinga2kuma", version, about = "Serve Icinga2 host state to Uptime Kuma")]
pub struct KumaBridgeArgs {
    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0:8081")]
    pub listen: SocketAddr,

    /// Icinga2 URL for the API
    #[arg(long, default_value = "https://localhost:8080")]
    pub icinga2_endpoint: String,

    /// API username
    #[arg(long, default_value = "icingaweb2")]
    pub icinga2_user: String,

    /// API password
    #[arg(long, env = "ICINGA2KUMA_ICINGA2_PW", hide_env_values = true)]
    pub icinga2_pw: String,

    #[command(flatten)]
    pub verbosity: Verbosity,
}

/// Query parameters of a host request. Everything but `kuma` may repeat.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostQuery {
    /// Only report these services
    pub services: Vec<String>,
    /// Do not list these services
    pub exclude: Vec<String>,
    /// Do not fail on these services
    pub ignore: Vec<String>,
    pub kuma: bool,
}

impl HostQuery {
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let mut query = Self::default();
        for (key, value) in pairs {
            match key.as_str() {
                "service" => query.services.push(value),
                "exclude" => query.exclude.push(value),
                "ignore" => query.ignore.push(value),
                "kuma" => query.kuma = value == "true",
                other => debug!(param = other, "ignoring unknown query parameter"),
            }
        }
        query
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HostState {
    pub name: String,
    pub state: i64,
    pub actual_state: i64,
    pub attrs: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ServiceState {
    pub state: i64,
    pub actual_state: i64,
    pub attrs: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FailedService {
    pub name: String,
    pub state: i64,
}

/// Response body for a found host.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HostReport {
    pub host: HostState,
    pub services: BTreeMap<String, ServiceState>,
    pub failed_services: Vec<FailedService>,
    pub excluded_services: Vec<String>,
    pub ignored_services: Vec<String>,
}

impl HostReport {
    pub fn is_failing(&self) -> bool {
        !self.failed_services.is_empty()
    }
}

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("must specify host")]
    NoHost,

    #[error("could not find host")]
    HostNotFound,

    #[error("service not found")]
    ServiceNotFound(String),

    #[error("icinga API request failed: {0}")]
    Icinga(#[from] CheckError),
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            Self::NoHost => (StatusCode::NOT_ACCEPTABLE, json!({"error": self.to_string()})),
            Self::HostNotFound => (StatusCode::NOT_FOUND, json!({"error": self.to_string()})),
            Self::ServiceNotFound(service) => (
                StatusCode::BAD_REQUEST,
                json!({"error": self.to_string(), "service": service}),
            ),
            Self::Icinga(e) => {
                error!(error = %e, "Icinga API request failed");
                (
                    StatusCode::BAD_GATEWAY,
                    json!({"error": "icinga API request failed", "detail": e.to_string()}),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

/// Combine a host and its services into the response for `host_id`.
pub fn build_report(
    host_id: &str,
    host: &IcingaObject,
    services: Vec<IcingaObject>,
    query: &HostQuery,
) -> Result<HostReport, BridgeError> {
    let mut report = HostReport {
        host: HostState {
            name: host.name.clone(),
            state: host.effective_state(),
            actual_state: host.actual_state(),
            attrs: host.attrs.clone(),
        },
        services: BTreeMap::new(),
        failed_services: Vec::new(),
        excluded_services: Vec::new(),
        ignored_services: Vec::new(),
    };

    for service in services {
        let name = service.short_name().to_string();
        if query.exclude.contains(&name) {
            report.excluded_services.push(name);
            continue;
        }
        report.services.insert(
            name,
            ServiceState {
                state: service.effective_state(),
                actual_state: service.actual_state(),
                attrs: service.attrs,
            },
        );
    }

    if !query.services.is_empty() {
        let mut selected = BTreeMap::new();
        for name in &query.services {
            let service = report
                .services
                .get(name)
                .cloned()
                .ok_or_else(|| BridgeError::ServiceNotFound(name.clone()))?;
            selected.insert(name.clone(), service);
        }
        report.services = selected;
    }

    for (name, service) in &report.services {
        if service.state == 0 {
            continue;
        }
        if query.ignore.contains(name) {
            report.ignored_services.push(name.clone());
        } else {
            report.failed_services.push(FailedService {
                name: name.clone(),
                state: service.state,
            });
        }
    }
    if report.host.state != 0 {
        report.failed_services.push(FailedService {
            name: host_id.to_string(),
            state: report.host.state,
        });
    }

    Ok(report)
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub icinga: IcingaClient,
}

/// Build the HTTP router for the bridge.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/host", get(missing_host))
        .route("/host/", get(missing_host))
        .route("/host/{hostid}", get(host_state))
        .with_state(state)
}

async fn missing_host() -> BridgeError {
    BridgeError::NoHost
}

async fn host_state(
    State(state): State<AppState>,
    Path(host_id): Path<String>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<(StatusCode, Json<HostReport>), BridgeError> {
    let query = HostQuery::from_pairs(pairs);
    debug!(host = %host_id, ?query, "host state requested");

    let host = state
        .icinga
        .hosts(&host_id)
        .await?
        .into_iter()
        .next()
        .ok_or(BridgeError::HostNotFound)?;
    let services = state.icinga.services(&host_id).await?;
    let report = build_report(&host_id, &host, services, &query)?;

    let status = if query.kuma && report.is_failing() {
        StatusCode::GONE
    } else {
        StatusCode::OK
    };
    Ok((status, Json(report)))
}

/// Bind and serve until the process is stopped.
pub async fn serve(args: &KumaBridgeArgs) -> anyhow::Result<()> {
    let icinga = IcingaClient::new(
        &args.icinga2_endpoint,
        &args.icinga2_user,
        &args.icinga2_pw,
    )?;
    let app = build_router(AppState { icinga });

    let listener = TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("failed to bind to {}", args.listen))?;
    info!(listen = %args.listen, icinga = %args.icinga2_endpoint, "icinga2kuma listening");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(name: &str, state: f64, ack: f64) -> IcingaObject {
        IcingaObject {
            name: name.to_string(),
            attrs: json!({"state": state, "acknowledgement": ack, "acknowledgement_expiry": 0.0})
                .as_object()
                .cloned()
                .unwrap(),
        }
    }

    fn services() -> Vec<IcingaObject> {
        vec![
            object("web!http", 0.0, 0.0),
            object("web!disk", 2.0, 0.0),
            object("web!load", 1.0, 1.0),
            object("web!backup", 1.0, 0.0),
        ]
    }

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_query_from_repeated_pairs() {
        let query = HostQuery::from_pairs(pairs(&[
            ("service", "http"),
            ("service", "disk"),
            ("ignore", "backup"),
            ("kuma", "true"),
            ("other", "x"),
        ]));
        assert_eq!(query.services, vec!["http", "disk"]);
        assert_eq!(query.ignore, vec!["backup"]);
        assert!(query.exclude.is_empty());
        assert!(query.kuma);
        assert!(!HostQuery::from_pairs(pairs(&[("kuma", "yes")])).kuma);
    }

    #[test]
    fn test_report_failures() {
        let report = build_report(
            "web",
            &object("web", 0.0, 0.0),
            services(),
            &HostQuery::from_pairs(pairs(&[("ignore", "backup")])),
        )
        .unwrap();
        assert_eq!(report.services.len(), 4);
        assert_eq!(report.services["load"].state, 0);
        assert_eq!(report.services["load"].actual_state, 1);
        assert_eq!(
            report.failed_services,
            vec![FailedService {
                name: "disk".into(),
                state: 2
            }]
        );
        assert_eq!(report.ignored_services, vec!["backup"]);
    }

    #[test]
    fn test_host_down_is_a_failure() {
        let report = build_report("web", &object("web", 1.0, 0.0), vec![], &HostQuery::default())
            .unwrap();
        assert_eq!(
            report.failed_services,
            vec![FailedService {
                name: "web".into(),
                state: 1
            }]
        );
    }

    #[test]
    fn test_exclude_and_select() {
        let query = HostQuery::from_pairs(pairs(&[("exclude", "disk"), ("service", "http")]));
        let report = build_report("web", &object("web", 0.0, 0.0), services(), &query).unwrap();
        assert_eq!(report.excluded_services, vec!["disk"]);
        assert_eq!(report.services.keys().collect::<Vec<_>>(), vec!["http"]);
        assert!(!report.is_failing());
    }

    #[test]
    fn test_repeated_service_filter() {
        let query = HostQuery::from_pairs(pairs(&[("service", "disk"), ("service", "disk")]));
        let report = build_report("web", &object("web", 0.0, 0.0), services(), &query).unwrap();
        assert_eq!(report.services.keys().collect::<Vec<_>>(), vec!["disk"]);
        assert_eq!(report.failed_services.len(), 1);
    }

    #[test]
    fn test_unknown_service_filter() {
        let query = HostQuery::from_pairs(pairs(&[("service", "disk"), ("exclude", "disk")]));
        let err = build_report("web", &object("web", 0.0, 0.0), services(), &query).unwrap_err();
        assert!(matches!(err, BridgeError::ServiceNotFound(ref s) if s == "disk"));
    }

    #[test]
    fn test_error_statuses() {
        assert_eq!(
            BridgeError::NoHost.into_response().status(),
            StatusCode::NOT_ACCEPTABLE
        );
        assert_eq!(
            BridgeError::HostNotFound.into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            BridgeError::ServiceNotFound("x".into()).into_response().status(),
            StatusCode::BAD_REQUEST
        );
    }
}
