//! Send an Icinga notification to a Matrix room.

use anyhow::Result;
use synapse_checks::cli::parse_or_unknown;
use synapse_checks::notification::{run, NotifyArgs};

#[tokio::main]
async fn main() -> Result<()> {
    let args: NotifyArgs = parse_or_unknown();
    args.verbosity.init_logging();
    run(&args).await
}
