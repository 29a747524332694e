//! Check that media downloads are redirected to the CDN as configured.

use synapse_checks::cli::parse_or_unknown;
use synapse_checks::media_cdn::{run, MediaCdnArgs};

#[tokio::main]
async fn main() {
    let args: MediaCdnArgs = parse_or_unknown();
    args.verbosity.init_logging();
    probe::run_check(run(&args)).await
}
