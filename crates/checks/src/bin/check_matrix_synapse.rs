//! Check Synapse health metrics through Grafana.

use synapse_checks::cli::parse_or_unknown;
use synapse_checks::synapse_metrics::{run, SynapseMetricsArgs};

#[tokio::main]
async fn main() {
    let args: SynapseMetricsArgs = parse_or_unknown();
    args.verbosity.init_logging();
    probe::run_check(async { Ok(run(&args).await) }).await
}
