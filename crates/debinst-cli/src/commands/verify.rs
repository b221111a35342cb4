//! Verify command implementation

use super::net_config;
use crate::cli::VerifyArgs;
use crate::error::add_package_context;
use crate::output::OutputFormatter;
use anyhow::Result;
use debinst_core::InstallConfig;
use debinst_core::InstallPipeline;
use debinst_core::PgpVerifier;
use debinst_core::StagingRegistry;

pub fn execute(args: &VerifyArgs, formatter: &dyn OutputFormatter) -> Result<()> {
    let config = InstallConfig {
        net: net_config(&args.trust),
        ..InstallConfig::default()
    };
    let verifier = add_package_context(
        PgpVerifier::with_http(args.trust.key_url.clone(), &config.net),
        &args.package,
    )?;

    let pipeline = InstallPipeline::new(config, verifier, StagingRegistry::new());
    let verified = add_package_context(
        pipeline.verify(&args.package, &args.trust.signature_url),
        &args.package,
    )?;

    formatter.format_verification(&args.package, &verified)
}
