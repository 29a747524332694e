//! Ping times reported by the federation monitor bot's status page.
//!
//! Each remote homeserver is a table row with its name in `span.domain` and
//! a `span.tooltip` holding `Send: 1.2s<br/>Receive: 250ms`.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use clap::Parser;
use probe::{CheckOutput, PerfData, Severity, Thresholds};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::cli::{split_single, TimeoutArg, Verbosity};

static TOOLTIP: LazyLock<Selector> = LazyLock::new(|| Selector::parse("span.tooltip").unwrap());
static DOMAIN: LazyLock<Selector> = LazyLock::new(|| Selector::parse("span.domain").unwrap());
static SEND_RECEIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^\s*Send: (.*?)\s*<br\s*/?>\s*Receive: (.*?)\s*$").unwrap()
});
static MINUTES_SECONDS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)m([\d.]+)s$").unwrap());

#[derive(Debug, Clone, Parser)]
#[command(
    name = "check-monitor-bot",
    version,
    about = "Check federation ping times reported by the monitor bot"
)]
pub struct MonitorBotArgs {
    /// Target URL to scrape
    #[arg(long)]
    pub metrics_endpoint: String,

    /// Our domain
    #[arg(long)]
    pub domain: String,

    /// Ignore these hosts
    #[arg(long, num_args = 0..)]
    pub ignore: Vec<String>,

    #[command(flatten)]
    pub timeout: TimeoutArg,

    /// Warn level for send/receive time in seconds
    #[arg(long, default_value_t = 20.0)]
    pub warn: f64,

    /// Critical level for send/receive time in seconds
    #[arg(long, default_value_t = 30.0)]
    pub crit: f64,

    /// Percentage of hosts that must be at warn level to warn
    #[arg(long, default_value_t = 30)]
    pub warn_percent: u32,

    /// Percentage of hosts that must be critical to go critical
    #[arg(long, default_value_t = 50)]
    pub crit_percent: u32,

    #[command(flatten)]
    pub verbosity: Verbosity,
}

/// Send and receive times of one remote homeserver. `None` when the page
/// shows something that is not a duration.
#[derive(Debug, Clone, PartialEq)]
pub struct HostPing {
    pub host: String,
    pub send: Option<f64>,
    pub receive: Option<f64>,
}

/// Parse the bot's duration strings: `1m2.5s`, `250ms` or `1.5s`.
pub fn parse_duration(value: &str) -> Option<f64> {
    let value = value.trim();
    if let Some(caps) = MINUTES_SECONDS.captures(value) {
        let minutes: f64 = caps[1].parse().ok()?;
        let seconds: f64 = caps[2].parse().ok()?;
        return Some(minutes * 60.0 + seconds);
    }
    if let Some(ms) = value.strip_suffix("ms") {
        return ms.parse::<f64>().ok().map(|ms| ms / 1000.0);
    }
    value.strip_suffix('s')?.parse().ok()
}

/// `span.domain` text of the nearest ancestor that has one.
fn host_of(tooltip: ElementRef<'_>) -> Option<String> {
    let domain = tooltip
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find_map(|ancestor| ancestor.select(&DOMAIN).next())?;
    let text: String = domain.text().collect();
    Some(text.trim().to_string())
}

/// Extract every host's ping times in page order. A host listed twice keeps
/// its last entry.
pub fn scrape(html: &str) -> Vec<HostPing> {
    let document = Html::parse_document(html);
    let mut hosts: Vec<HostPing> = Vec::new();

    for tooltip in document.select(&TOOLTIP) {
        let inner = tooltip.inner_html();
        let Some(caps) = SEND_RECEIVE.captures(&inner) else {
            debug!(tooltip = %inner, "tooltip without ping times");
            continue;
        };
        let Some(host) = host_of(tooltip) else {
            debug!(tooltip = %inner, "tooltip outside a host row");
            continue;
        };
        let ping = HostPing {
            send: parse_duration(&caps[1]),
            receive: parse_duration(&caps[2]),
            host,
        };
        match hosts.iter_mut().find(|h| h.host == ping.host) {
            Some(existing) => *existing = ping,
            None => hosts.push(ping),
        }
    }
    hosts
}

/// Share of `count` in `total` as a whole percentage, rounded down.
fn percent(count: usize, total: usize) -> u32 {
    ((count * 100) / total) as u32
}

/// Grade the scraped hosts.
///
/// Each direction of each host is compared with `>=` against the
/// thresholds. The check goes CRITICAL when at least `crit_percent` of all
/// hosts have a critical direction, else WARNING when at least
/// `warn_percent` have a warning one. Ignored hosts still get perf-data.
pub fn evaluate(
    hosts: &[HostPing],
    thresholds: Thresholds,
    warn_percent: u32,
    crit_percent: u32,
    ignore: &[String],
) -> CheckOutput {
    if hosts.is_empty() {
        return CheckOutput::status(Severity::Unknown, "failed to find any servers.");
    }

    let mut info = Vec::new();
    let mut warn_hosts = BTreeSet::new();
    let mut crit_hosts = BTreeSet::new();
    let mut perf = Vec::new();

    for ping in hosts {
        let directions = [("send", ping.send), ("receive", ping.receive)];
        if !ignore.contains(&ping.host) {
            for (direction, value) in directions {
                let Some(seconds) = value else {
                    info.push(format!("UNKNOWN: {} {direction} is empty.", ping.host));
                    continue;
                };
                match thresholds.classify(seconds) {
                    Severity::Critical => {
                        info.push(format!("CRITICAL: {} {direction} is {seconds}s.", ping.host));
                        crit_hosts.insert(ping.host.as_str());
                    }
                    Severity::Warning => {
                        info.push(format!("WARNING: {} {direction} is {seconds}s.", ping.host));
                        warn_hosts.insert(ping.host.as_str());
                    }
                    _ => {}
                }
            }
        }
        for (direction, value) in directions {
            perf.push(PerfData::seconds(format!("{}-{direction}", ping.host), value));
        }
    }

    let total = hosts.len();
    let crit_share = percent(crit_hosts.len(), total);
    let warn_share = percent(warn_hosts.len(), total);

    let mut output = if crit_hosts.is_empty() && warn_hosts.is_empty() {
        CheckOutput::status(Severity::Ok, "ping time is good.")
    } else if crit_share >= crit_percent {
        let mut out = CheckOutput::status(
            Severity::Critical,
            format!("{crit_share}% of hosts are marked as critical."),
        );
        out.lines.extend(info);
        out
    } else if warn_share >= warn_percent {
        let mut out = CheckOutput::status(
            Severity::Warning,
            format!("{warn_share}% of hosts are marked as warning."),
        );
        out.lines.extend(info);
        out
    } else {
        let list = |set: &BTreeSet<&str>| {
            if set.is_empty() {
                "none".to_string()
            } else {
                set.iter().copied().collect::<Vec<_>>().join(", ")
            }
        };
        CheckOutput::status(Severity::Ok, "ping is good")
            .line(format!("Warn hosts: {}", list(&warn_hosts)))
            .line(format!("Critical hosts: {}", list(&crit_hosts)))
    };
    output.perfdata = perf;
    output
}

pub async fn run(args: &MonitorBotArgs) -> anyhow::Result<CheckOutput> {
    let http = reqwest::Client::builder().timeout(args.timeout.timeout).build()?;
    let response = http.get(&args.metrics_endpoint).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Ok(CheckOutput::status(
            Severity::Unknown,
            format!("metrics endpoint returned status code {}", status.as_u16()),
        ));
    }

    let hosts = scrape(&response.text().await?);
    debug!(hosts = hosts.len(), domain = %args.domain, "scraped ping times");

    let ignore = split_single(args.ignore.clone());
    Ok(evaluate(
        &hosts,
        Thresholds::new(args.warn, args.crit),
        args.warn_percent,
        args.crit_percent,
        &ignore,
    ))
}
