//! Report what a federation tester says about a homeserver.

use synapse_checks::cli::parse_or_unknown;
use synapse_checks::federation_tester::{run, FederationTesterArgs};

#[tokio::main]
async fn main() {
    let args: FederationTesterArgs = parse_or_unknown();
    args.verbosity.init_logging();
    probe::run_check(run(&args)).await
}
