//! Tracing setup shared by all check binaries.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Crates whose debug output `--verbose` turns on.
const WORKSPACE_CRATES: &[&str] = &["probe", "matrix_client", "notify", "synapse_checks"];

/// Install the global subscriber.
///
/// Logs go to stderr: stdout belongs to the status output that Icinga
/// parses. `RUST_LOG` wins over `verbose` when set.
pub fn init(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(verbose));

    // A second init (tests, embedding) is harmless, so ignore the error.
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .try_init();
}

fn default_filter(verbose: bool) -> EnvFilter {
    if verbose {
        let directives: Vec<String> = WORKSPACE_CRATES
            .iter()
            .map(|krate| format!("{krate}=debug"))
            .collect();
        EnvFilter::new(format!("warn,{}", directives.join(",")))
    } else {
        EnvFilter::new("warn")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbose_filter_mentions_workspace_crates() {
        let filter = default_filter(true).to_string();
        assert!(filter.contains("matrix_client=debug"));
        assert!(filter.contains("synapse_checks=debug"));
    }

    #[test]
    fn test_init_twice_is_fine() {
        init(false);
        init(true);
    }
}
