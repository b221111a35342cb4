//! Install command implementation.

use super::net_config;
use crate::cli::InstallArgs;
use crate::error::add_package_context;
use crate::output::OutputFormatter;
use anyhow::Result;
use debinst_core::InstallConfig;
use debinst_core::InstallPipeline;
use debinst_core::PgpVerifier;
use debinst_core::StagingRegistry;

fn build_config(args: &InstallArgs) -> InstallConfig {
    let mut config = args.payload.apply(InstallConfig::default());
    config.net = net_config(&args.trust);
    if !args.subtrees.is_empty() {
        config = config.with_subtrees(args.subtrees.iter().cloned());
    }
    if let Some(dir) = &args.staging_dir {
        config = config.with_staging_parent(dir);
    }
    config.with_dry_run(args.dry_run)
}

pub fn execute(
    args: &InstallArgs,
    registry: &StagingRegistry,
    formatter: &dyn OutputFormatter,
) -> Result<()> {
    let config = build_config(args);
    let verifier = add_package_context(
        PgpVerifier::with_http(args.trust.key_url.clone(), &config.net),
        &args.package,
    )?;

    let pipeline = InstallPipeline::new(config, verifier, registry.clone());
    let report = add_package_context(
        pipeline.install(&args.package, &args.trust.signature_url, &args.dest),
        &args.package,
    )?;

    formatter.format_install_result(&args.dest, &report)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use crate::cli::Commands;
    use clap::Parser;
    use debinst_core::Backend;
    use std::path::PathBuf;

    fn parse(extra: &[&str]) -> InstallArgs {
        let mut argv = vec!["debinst", "install", "app.deb", "--signature-url", "https://x/sig"];
        argv.extend_from_slice(extra);
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Install(args) => args,
            _ => panic!("expected install"),
        }
    }

    #[test]
    fn test_default_config() {
        let config = build_config(&parse(&[]));
        assert_eq!(config.subtrees, vec!["opt", "usr"]);
        assert_eq!(config.backend, Backend::Library);
        assert!(config.staging_parent.is_none());
        assert!(!config.dry_run);
    }

    #[test]
    fn test_flags_override_config() {
        let config = build_config(&parse(&[
            "--subtree",
            "opt",
            "--staging-dir",
            "/var/tmp",
            "--dry-run",
            "--system-tools",
            "--timeout",
            "3",
        ]));
        assert_eq!(config.subtrees, vec!["opt"]);
        assert_eq!(config.staging_parent, Some(PathBuf::from("/var/tmp")));
        assert!(config.dry_run);
        assert_eq!(config.backend, Backend::External);
        assert_eq!(config.net.timeout.as_secs(), 3);
    }
}
