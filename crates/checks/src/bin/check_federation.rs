//! Test federation between two homeservers by sending messages both ways.

use synapse_checks::cli::parse_or_unknown;
use synapse_checks::federation::{run, FederationArgs};

#[tokio::main]
async fn main() {
    let args: FederationArgs = parse_or_unknown();
    args.verbosity.init_logging();
    probe::run_check(run(&args)).await
}
