//! Federation round-trip latency between two bots on different homeservers.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use probe::{run_round_trip, CheckOutput, RoundTripConfig, Thresholds};
use tracing::info;

use crate::cli::{login, parse_seconds, Verbosity};

#[derive(Debug, Clone, Parser)]
#[command(name = "check-federation", version, about = "Test federation between two homeservers")]
pub struct FederationArgs {
    /// User ID for bot 1
    #[arg(long)]
    pub bot1_user: String,
    /// Password for bot 1
    #[arg(long, env = "BOT1_PW", hide_env_values = true)]
    pub bot1_pw: String,
    /// Homeserver for bot 1
    #[arg(long)]
    pub bot1_hs: String,
    /// File to cache bot 1's login details to
    #[arg(long)]
    pub bot1_auth_file: Option<PathBuf>,

    /// User ID for bot 2
    #[arg(long)]
    pub bot2_user: String,
    /// Password for bot 2
    #[arg(long, env = "BOT2_PW", hide_env_values = true)]
    pub bot2_pw: String,
    /// Homeserver for bot 2
    #[arg(long)]
    pub bot2_hs: String,
    /// File to cache bot 2's login details to
    #[arg(long)]
    pub bot2_auth_file: Option<PathBuf>,

    /// How long to wait for a join or a message, in seconds
    #[arg(long, default_value = "90", value_parser = parse_seconds)]
    pub timeout: Duration,
    /// Pause between join and fetch attempts, in seconds
    #[arg(long, default_value = "0.05", value_parser = parse_seconds)]
    pub poll_interval: Duration,
    /// Pause after creating and after joining the room, in seconds
    #[arg(long, default_value = "2", value_parser = parse_seconds)]
    pub settle: Duration,
    /// Warn when delivery takes at least this many seconds
    #[arg(long, default_value_t = 2.0)]
    pub warn: f64,
    /// Critical when delivery takes at least this many seconds
    #[arg(long, default_value_t = 2.5)]
    pub crit: f64,

    #[command(flatten)]
    pub verbosity: Verbosity,
}

impl FederationArgs {
    pub fn round_trip_config(&self) -> RoundTripConfig {
        RoundTripConfig {
            timeout: self.timeout,
            poll_interval: self.poll_interval,
            settle: self.settle,
            thresholds: Thresholds::new(self.warn, self.crit),
        }
    }
}

/// Run both directions, then sweep every room either bot is still in.
pub async fn run(args: &FederationArgs) -> anyhow::Result<CheckOutput> {
    let bot1 = login(
        &args.bot1_hs,
        &args.bot1_user,
        &args.bot1_pw,
        args.bot1_auth_file.as_deref(),
        Some(args.timeout),
    )
    .await
    .context("bot1 failed to log in")?;
    let bot2 = login(
        &args.bot2_hs,
        &args.bot2_user,
        &args.bot2_pw,
        args.bot2_auth_file.as_deref(),
        Some(args.timeout),
    )
    .await
    .context("bot2 failed to log in")?;

    let mut report = run_round_trip(&bot1, &bot2, &args.round_trip_config()).await;

    // Leftovers from earlier runs that died mid-probe
    bot1.leave_all_rooms(&mut report.cleanup).await;
    bot2.leave_all_rooms(&mut report.cleanup).await;

    info!(severity = %report.severity(), "federation round trip finished");
    Ok(report.to_output())
}
