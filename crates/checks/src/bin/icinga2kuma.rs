//! HTTP bridge serving Icinga2 host state to Uptime Kuma.

use anyhow::Result;
use clap::Parser;
use synapse_checks::kuma::{serve, KumaBridgeArgs};

#[tokio::main]
async fn main() -> Result<()> {
    let args = KumaBridgeArgs::parse();
    args.verbosity.init_logging();
    serve(&args).await
}
