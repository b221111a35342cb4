//! Tracing subscriber setup.
//!
//! Log events go to stderr so that stdout stays clean for command output
//! (including `--json`). `RUST_LOG` overrides the level picked from flags.

use tracing_subscriber::EnvFilter;

fn default_directive(verbose: bool, quiet: bool) -> &'static str {
    if verbose {
        "info,debinst=debug,debinst_core=debug"
    } else if quiet {
        "error"
    } else {
        "warn,debinst_core=info"
    }
}

/// Installs the global subscriber.
pub fn init(verbose: bool, quiet: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose, quiet)));

    // A second init (tests) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
