//! Probe framework for Nagios/Icinga style health checks.
//!
//! A check gathers findings, folds them into one [`Severity`], prints a
//! status report with performance data and exits with the severity code.
//!
//! # Building blocks
//!
//! - [`Poller`] repeats a remote call at a fixed cadence until it succeeds,
//!   fails for good, or a [`Deadline`] passes
//! - [`Aggregator`] folds findings so the overall severity never goes down
//! - [`CleanupLedger`] runs best-effort teardown; failures there can at most
//!   lift a clean result to WARNING
//! - [`roundtrip`] measures delivery latency between two [`ChannelParty`]s
//!
//! # Usage
//!
//! ```no_run
//! use probe::{run_check, CheckOutput, PerfData, Severity, Thresholds};
//!
//! #[tokio::main]
//! async fn main() {
//!     run_check(async {
//!         let lag = 0.004;
//!         let severity = Thresholds::critical_only(0.01).classify(lag);
//!         Ok(CheckOutput::status(severity, format!("DB lag is {lag} sec."))
//!             .perf(PerfData::seconds("db-lag", Some(lag))))
//!     })
//!     .await
//! }
//! ```

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod aggregate;
pub mod cleanup;
pub mod logging;
pub mod output;
pub mod poller;
pub mod result;
pub mod roundtrip;
pub mod severity;
pub mod threshold;

pub use aggregate::{aggregate, Aggregator};
pub use cleanup::{CleanupLedger, CleanupOutcome, TeardownAction};
pub use output::{exception_output, run_check, CheckOutput, PerfData};
pub use poller::{CallOutcome, Deadline, PollOutcome, Poller, DEFAULT_POLL_INTERVAL};
pub use result::ProbeResult;
pub use roundtrip::{
    probe_direction, run_round_trip, ChannelParty, DirectionReport, Payload, RoundTripConfig,
    RoundTripReport,
};
pub use severity::Severity;
pub use threshold::{mean, round_to, Comparison, Thresholds};
