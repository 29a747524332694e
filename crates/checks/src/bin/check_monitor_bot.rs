//! Check the ping times published by the federation monitor bot.

use synapse_checks::cli::parse_or_unknown;
use synapse_checks::monitor_bot::{run, MonitorBotArgs};

#[tokio::main]
async fn main() {
    let args: MonitorBotArgs = parse_or_unknown();
    args.verbosity.init_logging();
    probe::run_check(run(&args)).await
}
