//! CLI argument parsing using clap.

use clap::Parser;
use clap::Subcommand;
use debinst_core::Backend;
use debinst_core::InstallConfig;
use std::path::PathBuf;

/// Keyring used when `--key-url` is not given.
pub const DEFAULT_KEY_URL: &str = "https://packages.debinst.dev/keys/release.asc";

#[derive(Parser)]
#[command(name = "debinst")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output and debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Output results in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Verify a package signature and install its payload
    Install(InstallArgs),
    /// Verify a package signature without installing
    Verify(VerifyArgs),
    /// Extract a package payload without verification (inspection only)
    Extract(ExtractArgs),
}

#[derive(clap::Args)]
pub struct TrustArgs {
    /// URL of the detached OpenPGP signature (.asc)
    #[arg(long, value_name = "URL")]
    pub signature_url: String,

    /// URL of the trusted OpenPGP keyring
    #[arg(long, value_name = "URL", default_value = DEFAULT_KEY_URL)]
    pub key_url: String,

    /// Network timeout in seconds for key and signature fetches
    #[arg(long, value_name = "SECS", default_value = "10", value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: u64,
}

#[derive(clap::Args)]
pub struct PayloadArgs {
    /// Ar member holding the compressed payload
    #[arg(long, value_name = "NAME", default_value = debinst_core::config::DEFAULT_MEMBER)]
    pub member: String,

    /// Decompress with the system `ar` and `xz` tools
    #[arg(long)]
    pub system_tools: bool,
}

impl PayloadArgs {
    pub fn apply(&self, config: InstallConfig) -> InstallConfig {
        let backend = if self.system_tools {
            Backend::External
        } else {
            Backend::Library
        };
        config.with_member(self.member.clone()).with_backend(backend)
    }
}

#[derive(clap::Args)]
pub struct InstallArgs {
    /// Path to the .deb package
    #[arg(value_name = "PACKAGE")]
    pub package: PathBuf,

    #[command(flatten)]
    pub trust: TrustArgs,

    #[command(flatten)]
    pub payload: PayloadArgs,

    /// Destination root
    #[arg(long, value_name = "DIR", default_value = "/")]
    pub dest: PathBuf,

    /// Top-level directory to promote (repeatable; default: opt, usr)
    #[arg(long = "subtree", value_name = "NAME")]
    pub subtrees: Vec<String>,

    /// Parent directory for the staging area (default: system temp dir)
    #[arg(long, value_name = "DIR")]
    pub staging_dir: Option<PathBuf>,

    /// Verify and stage, but do not touch the destination
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(clap::Args)]
pub struct VerifyArgs {
    /// Path to the .deb package
    #[arg(value_name = "PACKAGE")]
    pub package: PathBuf,

    #[command(flatten)]
    pub trust: TrustArgs,
}

#[derive(clap::Args)]
pub struct ExtractArgs {
    /// Path to the .deb package
    #[arg(value_name = "PACKAGE")]
    pub package: PathBuf,

    /// Output directory (must exist)
    #[arg(value_name = "OUTPUT_DIR")]
    pub output_dir: PathBuf,

    #[command(flatten)]
    pub payload: PayloadArgs,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_install_defaults() {
        let cli = Cli::try_parse_from([
            "debinst",
            "install",
            "app.deb",
            "--signature-url",
            "https://example.com/app.deb.asc",
        ])
        .unwrap();

        let Commands::Install(args) = cli.command else {
            panic!("expected install");
        };
        assert_eq!(args.dest, PathBuf::from("/"));
        assert_eq!(args.trust.key_url, DEFAULT_KEY_URL);
        assert_eq!(args.payload.member, "data.tar.xz");
        assert!(args.subtrees.is_empty());
        assert!(!args.dry_run);
    }

    #[test]
    fn test_payload_args_select_backend() {
        let cli = Cli::try_parse_from([
            "debinst",
            "extract",
            "app.deb",
            "out",
            "--system-tools",
            "--member",
            "data.tar",
        ])
        .unwrap();

        let Commands::Extract(args) = cli.command else {
            panic!("expected extract");
        };
        let config = args.payload.apply(InstallConfig::default());
        assert_eq!(config.backend, Backend::External);
        assert_eq!(config.member, "data.tar");
    }

    #[test]
    fn test_signature_url_required() {
        assert!(Cli::try_parse_from(["debinst", "verify", "app.deb"]).is_err());
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["debinst", "-q", "-v", "extract", "a.deb", "out"]).is_err());
    }
}
