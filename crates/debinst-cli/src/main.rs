//! debinst - installs signature-verified .deb packages.

mod cli;
mod commands;
mod error;
mod interrupt;
mod logging;
mod output;

use clap::Parser;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = cli::Cli::parse();
    logging::init(cli.verbose, cli.quiet);

    let formatter = output::create_formatter(cli.json, cli.verbose, cli.quiet);
    let registry = debinst_core::StagingRegistry::new();

    let (operation, result) = match &cli.command {
        cli::Commands::Install(args) => (
            "install",
            interrupt::install_handler(registry.clone())
                .and_then(|()| commands::install::execute(args, &registry, &*formatter)),
        ),
        cli::Commands::Verify(args) => ("verify", commands::verify::execute(args, &*formatter)),
        cli::Commands::Extract(args) => ("extract", commands::extract::execute(args, &*formatter)),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            formatter.format_error(operation, &err);
            ExitCode::FAILURE
        }
    }
}
