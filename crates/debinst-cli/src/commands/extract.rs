//! Extract command implementation.

use crate::cli::ExtractArgs;
use crate::error::add_package_context;
use crate::output::OutputFormatter;
use anyhow::Result;
use debinst_core::InstallConfig;
use debinst_core::extract_package;

pub fn execute(args: &ExtractArgs, formatter: &dyn OutputFormatter) -> Result<()> {
    formatter.format_warning("extracting without signature verification");

    let config = args.payload.apply(InstallConfig::default());
    let report = add_package_context(
        extract_package(&args.package, &args.output_dir, &config),
        &args.package,
    )?;

    formatter.format_extraction_result(&args.output_dir, &report)
}
