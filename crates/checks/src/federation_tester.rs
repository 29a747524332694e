//! Report the verdict of a federation-tester endpoint
//! (e.g. `https://federationtester.matrix.org/api/report?server_name=...`).

use clap::Parser;
use probe::{CheckOutput, Severity};
use serde_json::Value;
use tracing::debug;

use crate::cli::{TimeoutArg, Verbosity};

#[derive(Debug, Clone, Parser)]
#[command(
    name = "check-federation-tester",
    version,
    about = "Check a homeserver through a federation tester"
)]
pub struct FederationTesterArgs {
    /// Endpoint to parse. See fed.mau.dev or federationtester.matrix.org
    #[arg(long)]
    pub endpoint: String,

    #[command(flatten)]
    pub timeout: TimeoutArg,

    #[command(flatten)]
    pub verbosity: Verbosity,
}

/// Follow a path of object keys; missing keys yield `Null`.
fn lookup<'a>(report: &'a Value, path: &[&str]) -> &'a Value {
    path.iter()
        .fold(report, |value, key| value.get(key).unwrap_or(&Value::Null))
}

/// Strings bare, everything else as JSON.
fn show(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Turn a tester report into check output.
pub fn evaluate(report: &Value) -> CheckOutput {
    let well_known = show(lookup(report, &["WellKnownResult", "m.server"]));

    if lookup(report, &["FederationOK"]).as_bool().unwrap_or(false) {
        CheckOutput::status(Severity::Ok, "federation tester reported success.")
            .line(format!(
                "Version: {}/{}",
                show(lookup(report, &["Version", "name"])),
                show(lookup(report, &["Version", "version"]))
            ))
            .line(format!("WellKnown: {well_known}"))
    } else {
        CheckOutput::status(Severity::Critical, "federation tester reported failure.")
            .line(format!("WellKnown: {well_known}"))
            .line(format!(
                "WellKnown Result: {}",
                show(lookup(report, &["WellKnownResult", "result"]))
            ))
            .line(format!(
                "DNS Result: {}",
                show(lookup(report, &["DNSResult", "SRVError", "Message"]))
            ))
            .line(format!(
                "Version: {}",
                show(lookup(report, &["Version", "error"]))
            ))
            .line(format!(
                "Connection Report: {}",
                show(lookup(report, &["ConnectionReports"]))
            ))
            .line(format!(
                "Connection Errors: {}",
                show(lookup(report, &["ConnectionErrors"]))
            ))
    }
}

pub async fn run(args: &FederationTesterArgs) -> anyhow::Result<CheckOutput> {
    let http = reqwest::Client::builder().timeout(args.timeout.timeout).build()?;
    debug!(endpoint = %args.endpoint, "querying federation tester");
    let response = http.get(&args.endpoint).send().await?;

    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Ok(CheckOutput::status(
            Severity::Unknown,
            format!("tester endpoint failed with status code {}", status.as_u16()),
        )
        .line(body));
    }

    let report: Value = serde_json::from_str(&body)?;
    Ok(evaluate(&report))
}
