//! Verified installation of signed Debian-style packages.
//!
//! `debinst-core` checks a detached OpenPGP signature over a `.deb`
//! package, pulls the `data.tar.xz` payload out of its ar container,
//! decompresses it in-process (or through the system `ar`/`xz` tools), and
//! extracts it into an isolated staging directory. Only when extraction has
//! fully succeeded are the configured top-level subtrees promoted into the
//! destination root. Every tar entry is validated against the staging root:
//! path traversal and escaping symlinks abort the operation.
//!
//! # Examples
//!
//! ```no_run
//! use debinst_core::InstallConfig;
//! use debinst_core::InstallPipeline;
//! use debinst_core::PgpVerifier;
//! use debinst_core::StagingRegistry;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = InstallConfig::default();
//! let verifier = PgpVerifier::with_http("https://example.com/release.asc", &config.net)?;
//! let pipeline = InstallPipeline::new(config, verifier, StagingRegistry::new());
//!
//! let report = pipeline.install("app.deb", "https://example.com/app.deb.asc", "/")?;
//! println!("Installed {} files", report.promotion.files_installed);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod copy;
pub mod decompress;
pub mod error;
pub mod formats;
pub mod pipeline;
pub mod promote;
pub mod report;
pub mod staging;
pub mod types;
pub mod verify;

#[doc(hidden)]
pub mod test_utils;

pub use config::Backend;
pub use config::InstallConfig;
pub use config::NetConfig;
pub use config::ToolConfig;
pub use error::InstallError;
pub use error::Result;
pub use pipeline::ArchiveHandle;
pub use pipeline::InstallPipeline;
pub use pipeline::extract_package;
pub use report::ExtractionReport;
pub use report::InstallReport;
pub use report::PromotionReport;
pub use staging::StagingRegistry;

pub use types::DestDir;
pub use types::SafePath;
pub use types::SafeSymlink;
pub use verify::PgpVerifier;
pub use verify::SignatureVerifier;
pub use verify::Verified;
