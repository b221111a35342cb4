//! Subcommand implementations.

pub mod extract;
pub mod install;
pub mod verify;

use crate::cli::TrustArgs;
use debinst_core::NetConfig;
use std::time::Duration;

/// Network settings derived from the trust flags.
fn net_config(trust: &TrustArgs) -> NetConfig {
    NetConfig {
        timeout: Duration::from_secs(trust.timeout),
        ..NetConfig::default()
    }
}
