//! Threshold checks on Synapse metrics.
//!
//! Every type except `response-time` reads a Prometheus series through
//! Grafana and averages it; `response-time` times POSTs against the Synapse
//! server directly.

use std::fmt;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use probe::{mean, round_to, CheckOutput, Comparison, PerfData, Severity, Thresholds};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::cli::Verbosity;
use crate::error::CheckError;
use crate::grafana::{
    GrafanaClient, GrafanaConfig, MetricQuery, QueryResponse, DEFAULT_DATASOURCE_UID,
};

const SYNAPSE_JOBS: &str = "(federation-receiver|federation-sender|initialsync|synapse|synchrotron)";

/// Scrape target of the Synapse metrics listener
const DEFAULT_INSTANCE: &str = "10.0.0.34:9000";

/// Per-request timeout for the response-time probe
const PING_TIMEOUT: Duration = Duration::from_secs(10);
const PING_SAMPLES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MetricKind {
    GcTime,
    ResponseTime,
    OutgoingHttpRate,
    AvgSend,
    DbLag,
}

impl MetricKind {
    /// Critical level when `--crit` is not given.
    pub const fn default_crit(self) -> f64 {
        match self {
            Self::GcTime => 0.002,
            Self::ResponseTime | Self::AvgSend => 1.0,
            Self::OutgoingHttpRate => 10.0,
            Self::DbLag => 0.01,
        }
    }

    /// GC time trips at the limit, everything else above it.
    pub const fn comparison(self) -> Comparison {
        match self {
            Self::GcTime => Comparison::AtLeast,
            _ => Comparison::Above,
        }
    }

    /// Used in "failed to check ..." messages.
    pub const fn description(self) -> &'static str {
        match self {
            Self::GcTime => "avg. GC time",
            Self::ResponseTime => "response time",
            Self::OutgoingHttpRate => "outgoing HTTP request rate",
            Self::AvgSend => "average message send time",
            Self::DbLag => "DB lag",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_possible_value() {
            Some(v) => f.write_str(v.get_name()),
            None => write!(f, "{self:?}"),
        }
    }
}

#[derive(Debug, Clone, Parser)]
#[command(name = "check-matrix-synapse", version, about = "Check Synapse health metrics")]
pub struct SynapseMetricsArgs {
    /// Grafana server
    #[arg(long)]
    pub grafana_server: String,

    /// Matrix Synapse server
    #[arg(long)]
    pub synapse_server: String,

    #[arg(long, env = "GRAFANA_API_KEY", hide_env_values = true)]
    pub grafana_api_key: String,

    /// Data interval in seconds
    #[arg(long, default_value_t = 15)]
    pub interval: u64,

    /// Data range in minutes. Used for comparison and averaging
    #[arg(long, default_value_t = 2)]
    pub range: u64,

    #[arg(long = "type", value_enum)]
    pub kind: MetricKind,

    /// Manually set warn level
    #[arg(long)]
    pub warn: Option<f64>,

    /// Manually set critical level
    #[arg(long)]
    pub crit: Option<f64>,

    /// Grafana data source UID of the Synapse Prometheus
    #[arg(long, default_value = DEFAULT_DATASOURCE_UID)]
    pub datasource_uid: String,

    /// Prometheus `instance` label of the Synapse metrics listener
    #[arg(long, default_value = DEFAULT_INSTANCE)]
    pub instance: String,

    #[command(flatten)]
    pub verbosity: Verbosity,
}

impl SynapseMetricsArgs {
    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            warn: self.warn,
            crit: Some(self.crit.unwrap_or_else(|| self.kind.default_crit())),
            comparison: self.kind.comparison(),
        }
    }

    fn grafana_config(&self) -> GrafanaConfig {
        GrafanaConfig {
            base_url: self.grafana_server.clone(),
            api_key: self.grafana_api_key.clone(),
            datasource_uid: self.datasource_uid.clone(),
            interval: Duration::from_secs(self.interval),
            range_minutes: self.range,
            timeout: Duration::from_secs(30),
        }
    }
}

// =============================================================================
// Queries
// =============================================================================

pub fn gc_time_query(instance: &str) -> MetricQuery {
    MetricQuery::new(
        "A",
        format!(
            r#"rate(python_gc_time_sum{{instance="{instance}",job=~"{SYNAPSE_JOBS}",index=~".*"}}[30s])/rate(python_gc_time_count[30s])"#
        ),
    )
}

pub fn outgoing_http_queries(instance: &str) -> [MetricQuery; 2] {
    [
        MetricQuery::new(
            "A",
            format!(
                r#"rate(synapse_http_client_requests_total{{job=~"{SYNAPSE_JOBS}",index=~".*",instance="{instance}"}}[2m])"#
            ),
        ),
        MetricQuery::new(
            "B",
            format!(
                r#"rate(synapse_http_matrixfederationclient_requests_total{{job=~"{SYNAPSE_JOBS}",index=~".*",instance="{instance}"}}[2m])"#
            ),
        ),
    ]
}

pub fn event_send_query(instance: &str) -> MetricQuery {
    MetricQuery::new(
        "E",
        format!(r#"sum(rate(synapse_storage_events_persisted_events_total{{instance="{instance}"}}[2m]))"#),
    )
}

pub fn db_lag_query(instance: &str) -> MetricQuery {
    MetricQuery::new(
        "A",
        format!(
            r#"rate(synapse_storage_schedule_time_sum{{instance="{instance}",job=~"{SYNAPSE_JOBS}",index=~".*"}}[30s])/rate(synapse_storage_schedule_time_count[30s])"#
        ),
    )
}

// =============================================================================
// Reductions
// =============================================================================

fn average(values: &[f64], places: i32, what: &str) -> Result<f64, CheckError> {
    mean(values)
        .map(|m| round_to(m, places))
        .ok_or_else(|| CheckError::MissingData(format!("no data points for {what}")))
}

/// Mean GC time per collection: average each worker's series, then average
/// the workers. Workers without data are skipped.
pub fn gc_time(response: &QueryResponse) -> Result<f64, CheckError> {
    let per_worker: Vec<f64> = response
        .frames("A")?
        .iter()
        .map(|frame| frame.series())
        .filter(|series| !series.is_empty())
        .filter_map(|series| mean(&series).map(|m| round_to(m, 5)))
        .collect();
    average(&per_worker, 5, "GC time")
}

/// Mean request rate per HTTP method, in ref ID order.
pub fn outgoing_http_rates(response: &QueryResponse) -> Result<Vec<(String, f64)>, CheckError> {
    response
        .results
        .keys()
        .map(|ref_id| {
            let frame = response.first_frame(ref_id)?;
            let name = frame.label().unwrap_or_else(|| ref_id.clone());
            Ok((name.clone(), average(&frame.series(), 2, &name)?))
        })
        .collect()
}

pub fn event_send_time(response: &QueryResponse) -> Result<f64, CheckError> {
    average(&response.first_frame("E")?.series(), 2, "event send time")
}

pub fn db_lag(response: &QueryResponse) -> Result<f64, CheckError> {
    average(&response.first_frame("A")?.series(), 5, "DB lag")
}

// =============================================================================
// Evaluation
// =============================================================================

/// Single-value check line plus perf item.
fn single(
    severity: Severity,
    message: impl fmt::Display,
    label: &str,
    value: f64,
) -> CheckOutput {
    CheckOutput::status(severity, message).perf(PerfData::seconds(label, Some(value)))
}

pub fn evaluate_gc_time(value: f64, thresholds: &Thresholds) -> CheckOutput {
    single(
        thresholds.classify(value),
        format!("average GC time per collection is {value} sec."),
        "garbage-collection",
        value,
    )
}

pub fn evaluate_response_time(value: f64, thresholds: &Thresholds) -> CheckOutput {
    single(
        thresholds.classify(value),
        format!("response time is {value} sec."),
        "response-time",
        value,
    )
}

pub fn evaluate_event_send_time(value: f64, thresholds: &Thresholds) -> CheckOutput {
    single(
        thresholds.classify(value),
        format!("average message send time is {value} sec."),
        "avg-send-time",
        value,
    )
}

pub fn evaluate_db_lag(value: f64, thresholds: &Thresholds) -> CheckOutput {
    single(
        thresholds.classify(value),
        format!("DB lag is {value} sec."),
        "db-lag",
        value,
    )
}

/// `{GET: 1.2, PUT: 0.3}`
fn format_rates<'a>(rates: impl IntoIterator<Item = &'a (String, f64)>) -> String {
    let items: Vec<String> = rates
        .into_iter()
        .map(|(name, value)| format!("{name}: {value}"))
        .collect();
    format!("{{{}}}", items.join(", "))
}

pub fn evaluate_outgoing_http_rates(rates: &[(String, f64)], thresholds: &Thresholds) -> CheckOutput {
    let mut severity = Severity::Ok;
    let mut breaching = Vec::new();
    for rate in rates {
        let s = thresholds.classify(rate.1);
        if !s.is_ok() {
            breaching.push(rate);
        }
        severity = severity.combine(s);
    }

    let message = if breaching.is_empty() {
        format!("outgoing HTTP request rate is {} req/sec.", format_rates(rates))
    } else {
        format!("outgoing HTTP request rate for {} req/sec.", format_rates(breaching))
    };
    rates.iter().fold(CheckOutput::status(severity, message), |out, (name, value)| {
        out.perf(PerfData::new(name.clone(), Some(*value), ""))
    })
}

// =============================================================================
// Running
// =============================================================================

/// Time `samples` POSTs to `url`, one `pause` apart. Returns the mean in
/// seconds, two decimals.
pub async fn measure_response_time(
    url: &str,
    samples: usize,
    pause: Duration,
) -> Result<f64, CheckError> {
    let http = reqwest::Client::builder()
        .timeout(PING_TIMEOUT)
        .danger_accept_invalid_certs(true)
        .build()?;

    let mut times = Vec::with_capacity(samples);
    for attempt in 0..samples {
        let started = Instant::now();
        let response = http.post(url).send().await?;
        let elapsed = round_to(started.elapsed().as_secs_f64(), 2);
        debug!(attempt, status = %response.status(), elapsed, "response time sample");
        times.push(elapsed);
        tokio::time::sleep(pause).await;
    }
    average(&times, 2, "response time")
}

async fn evaluate_kind(args: &SynapseMetricsArgs) -> Result<CheckOutput, CheckError> {
    let thresholds = args.thresholds();
    let instance = args.instance.as_str();
    let grafana = || GrafanaClient::new(args.grafana_config());

    Ok(match args.kind {
        MetricKind::ResponseTime => {
            let value =
                measure_response_time(&args.synapse_server, PING_SAMPLES, Duration::from_secs(1))
                    .await?;
            evaluate_response_time(value, &thresholds)
        }
        MetricKind::GcTime => {
            let response = grafana()?.query(&[gc_time_query(instance)]).await?;
            evaluate_gc_time(gc_time(&response)?, &thresholds)
        }
        MetricKind::OutgoingHttpRate => {
            let response = grafana()?.query(&outgoing_http_queries(instance)).await?;
            evaluate_outgoing_http_rates(&outgoing_http_rates(&response)?, &thresholds)
        }
        MetricKind::AvgSend => {
            let response = grafana()?.query(&[event_send_query(instance)]).await?;
            evaluate_event_send_time(event_send_time(&response)?, &thresholds)
        }
        MetricKind::DbLag => {
            let response = grafana()?.query(&[db_lag_query(instance)]).await?;
            evaluate_db_lag(db_lag(&response)?, &thresholds)
        }
    })
}

/// Run the selected check. Failures to gather the metric are UNKNOWN.
pub async fn run(args: &SynapseMetricsArgs) -> CheckOutput {
    match evaluate_kind(args).await {
        Ok(output) => output,
        Err(e) => {
            warn!(kind = %args.kind, error = %e, "metric check failed");
            CheckOutput::status(
                Severity::Unknown,
                format!("failed to check {} \"{e}\"", args.kind.description()),
            )
        }
    }
}
