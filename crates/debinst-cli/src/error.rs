//! Error conversion utilities for CLI.
//!
//! Converts debinst-core's typed errors (thiserror) into user-friendly
//! contextual errors (anyhow) with actionable guidance.

use anyhow::anyhow;
use debinst_core::InstallError;
use std::path::Path;

/// Converts `InstallError` to a user-facing error with a hint.
pub fn convert_install_error(err: InstallError, package: &Path) -> anyhow::Error {
    match err {
        InstallError::PathTraversal { path } => anyhow!(
            "Security violation: package '{}' contains an entry escaping the root: '{}'\n\
             HINT: This package may be malicious. Nothing was installed.",
            package.display(),
            path.display()
        ),
        InstallError::SymlinkEscape { path, target } => anyhow!(
            "Security violation: package '{}' contains symlink '{}' -> '{}'\n\
             HINT: This package may be malicious. Nothing was installed.",
            package.display(),
            path.display(),
            target.display()
        ),
        InstallError::SignatureInvalid(reason) => anyhow!(
            "Signature check failed for '{}': {reason}\n\
             HINT: The package does not match its signature or was signed by an untrusted key. \
             Re-download both and check --key-url.",
            package.display()
        ),
        InstallError::KeyFetchFailed { url, reason } => anyhow!(
            "Could not load the trusted keyring from {url}: {reason}\n\
             HINT: Check network access or pass --key-url."
        ),
        InstallError::SignatureFetchFailed { url, reason } => anyhow!(
            "Could not download the signature from {url}: {reason}\n\
             HINT: Check --signature-url and network access."
        ),
        InstallError::UnexpectedSignatureFormat(reason) => anyhow!(
            "Unexpected signature format: {reason}\n\
             HINT: Only ASCII-armored OpenPGP detached signatures (.asc) are supported."
        ),
        InstallError::MemberNotFound { member } => anyhow!(
            "Package '{}' has no member '{member}'\n\
             HINT: Use --member to select the payload (e.g. data.tar.xz).",
            package.display()
        ),
        InstallError::BackendUnavailable { tool, reason } => anyhow!(
            "System tool '{tool}' is unavailable: {reason}\n\
             HINT: Install it or drop --system-tools to use the built-in decoder."
        ),
        InstallError::MalformedHeader { .. }
        | InstallError::MalformedArchive(_)
        | InstallError::CorruptStream(_) => anyhow!(
            "Invalid package '{}': {err}\n\
             HINT: The file may be truncated or corrupted. Download it again.",
            package.display()
        ),
        InstallError::Interrupted => anyhow!("Interrupted; staging area removed"),
        _ => anyhow::Error::from(err)
            .context(format!("Error processing package '{}'", package.display())),
    }
}

/// Adds package context to a core result.
pub fn add_package_context<T>(
    result: Result<T, InstallError>,
    package: &Path,
) -> anyhow::Result<T> {
    result.map_err(|e| convert_install_error(e, package))
}
