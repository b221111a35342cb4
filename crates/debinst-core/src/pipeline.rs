//! The verified install pipeline.
//!
//! Steps, in order:
//!
//! 1. verify the detached signature over the package bytes
//! 2. locate the payload member in the ar container
//! 3. decompress it with the configured backend
//! 4. extract it into a fresh staging directory
//! 5. promote the configured subtrees into the destination root
//!
//! Nothing is created on disk before step 1 succeeds, and the destination is
//! not touched before step 4 succeeds. The staging directory is removed on
//! every exit path.
//!
//! The package is read once. Steps 2 to 4 work on the buffer the signature
//! was checked over; the external tools get a copy of that buffer written
//! inside the staging directory, never the original path.

use std::fs::File;
use std::io::Cursor;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use std::path::Path;
use std::path::PathBuf;
use std::time::Instant;

use tracing::debug;
use tracing::info;

use crate::InstallError;
use crate::Result;
use crate::config::Backend;
use crate::config::InstallConfig;
use crate::decompress;
use crate::decompress::ByteStream;
use crate::formats::ArReader;
use crate::formats::TarExtractor;
use crate::promote::promote;
use crate::report::ExtractionReport;
use crate::report::InstallReport;
use crate::staging::StagingDir;
use crate::staging::StagingRegistry;
use crate::types::DestDir;
use crate::verify::SignatureVerifier;
use crate::verify::Verified;

/// A package file opened once for the whole operation.
#[derive(Debug)]
pub struct ArchiveHandle {
    path: PathBuf,
    file: File,
}

impl ArchiveHandle {
    /// Opens the package at `path`.
    ///
    /// # Errors
    ///
    /// Returns `BadInput` if the path is empty or not a regular file, and
    /// `Io` if it cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(InstallError::BadInput("package path is empty".into()));
        }
        if !path.is_file() {
            return Err(InstallError::BadInput(format!(
                "package is not a regular file: {}",
                path.display()
            )));
        }

        Ok(Self {
            path: path.to_path_buf(),
            file: File::open(path)?,
        })
    }

    /// Returns the package path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the whole package from the start.
    ///
    /// # Errors
    ///
    /// Returns `Io` on read failure.
    pub fn read_all(&mut self) -> Result<Vec<u8>> {
        self.rewind()?;
        let mut bytes = Vec::new();
        self.file.read_to_end(&mut bytes)?;
        Ok(bytes)
    }

    /// Seeks back to the first byte.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the seek fails.
    pub fn rewind(&mut self) -> Result<()> {
        self.file.seek(SeekFrom::Start(0))?;
        Ok(())
    }

    fn into_file(self) -> File {
        self.file
    }
}

/// Staging layout: the extraction root and the verified copy handed to
/// external tools.
const STAGED_ROOT: &str = "root";
const STAGED_PACKAGE: &str = "package.deb";

/// Where the locator reads the package from.
enum PackageSource {
    /// The exact bytes the signature was checked over, and the directory to
    /// spill them into when an external tool needs a path.
    Verified { bytes: Vec<u8>, scratch: PathBuf },
    /// A package read straight from disk without verification.
    Unverified(ArchiveHandle),
}

/// Runs verified installs.
///
/// # Examples
///
/// ```no_run
/// use debinst_core::InstallConfig;
/// use debinst_core::InstallPipeline;
/// use debinst_core::PgpVerifier;
/// use debinst_core::StagingRegistry;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = InstallConfig::default();
/// let verifier = PgpVerifier::with_http("https://example.com/release.asc", &config.net)?;
/// let pipeline = InstallPipeline::new(config, verifier, StagingRegistry::new());
///
/// let report = pipeline.install(
///     "app_1.0_amd64.deb",
///     "https://example.com/app_1.0_amd64.deb.asc",
///     "/",
/// )?;
/// println!("installed {} files", report.promotion.files_installed);
/// # Ok(())
/// # }
/// ```
pub struct InstallPipeline {
    config: InstallConfig,
    verifier: Box<dyn SignatureVerifier>,
    registry: StagingRegistry,
}

impl std::fmt::Debug for InstallPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstallPipeline")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl InstallPipeline {
    /// Creates a pipeline.
    ///
    /// The registry is shared with whatever handles interruption.
    pub fn new(
        config: InstallConfig,
        verifier: impl SignatureVerifier + 'static,
        registry: StagingRegistry,
    ) -> Self {
        Self {
            config,
            verifier: Box::new(verifier),
            registry,
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &InstallConfig {
        &self.config
    }

    /// Verifies the package signature without extracting anything.
    ///
    /// # Errors
    ///
    /// Returns `BadInput` for an unusable package path, or any trust failure.
    pub fn verify(&self, archive_path: impl AsRef<Path>, signature_url: &str) -> Result<Verified> {
        let mut handle = ArchiveHandle::open(archive_path)?;
        let bytes = handle.read_all()?;
        self.verifier.verify(&bytes, signature_url)
    }

    /// Verifies, stages and promotes the package into `dest_root`.
    ///
    /// # Errors
    ///
    /// Fails fast with the first error of any step. Errors before promotion
    /// leave `dest_root` untouched; `Interrupted` during promotion may leave
    /// it partially populated.
    pub fn install(
        &self,
        archive_path: impl AsRef<Path>,
        signature_url: &str,
        dest_root: impl AsRef<Path>,
    ) -> Result<InstallReport> {
        let start = Instant::now();
        let archive_path = archive_path.as_ref();
        if self.config.member.is_empty() {
            return Err(InstallError::BadInput("member name is empty".into()));
        }
        let dest = DestDir::new(dest_root.as_ref())?;
        self.registry.check()?;

        let bytes = ArchiveHandle::open(archive_path)?.read_all()?;
        let verified = self.verifier.verify(&bytes, signature_url)?;
        self.registry.check()?;

        let staging = StagingDir::create(&self.registry, self.config.staging_parent.as_deref())?;
        let staged_root = staging.path().join(STAGED_ROOT);
        std::fs::create_dir(&staged_root)?;
        let staging_root = DestDir::new(staged_root)?;
        info!(
            package = %archive_path.display(),
            staging = %staging_root.as_path().display(),
            backend = self.config.backend.name(),
            "extracting into staging"
        );

        let source = PackageSource::Verified {
            bytes,
            scratch: staging.path().to_path_buf(),
        };
        let extraction = unpack(source, &staging_root, &self.config, Some(&self.registry))?;
        self.registry.check()?;

        let promotion = promote(
            &staging_root,
            &dest,
            &self.config.subtrees,
            self.config.dry_run,
        )?;
        drop(staging);

        let report = InstallReport {
            key_id: verified.key_id,
            extraction,
            promotion,
            dry_run: self.config.dry_run,
            duration: start.elapsed(),
        };
        info!(
            package = %archive_path.display(),
            dest = %dest.as_path().display(),
            files = report.promotion.files_installed,
            duration_ms = report.duration.as_millis(),
            dry_run = report.dry_run,
            "install finished"
        );
        Ok(report)
    }
}

/// Extracts the payload member of a package into `dest` without verifying
/// it and without staging.
///
/// Meant for inspecting packages. Uses `config.member` and `config.backend`.
///
/// # Errors
///
/// Any locator, decompression or extraction error.
pub fn extract_package(
    archive_path: impl AsRef<Path>,
    dest: impl AsRef<Path>,
    config: &InstallConfig,
) -> Result<ExtractionReport> {
    if config.member.is_empty() {
        return Err(InstallError::BadInput("member name is empty".into()));
    }
    let dest = DestDir::new(dest.as_ref())?;
    let handle = ArchiveHandle::open(archive_path)?;
    unpack(PackageSource::Unverified(handle), &dest, config, None)
}

fn unpack(
    source: PackageSource,
    dest: &DestDir,
    config: &InstallConfig,
    registry: Option<&StagingRegistry>,
) -> Result<ExtractionReport> {
    // Backend availability is checked before any member is read.
    let decompressor = decompress::for_backend(config)?;
    let member = open_member(source, config)?;
    debug!(
        member = %config.member,
        decompressor = decompressor.name(),
        "member located"
    );

    let payload = decompressor.decompress(member)?;
    let mut extractor = TarExtractor::new(dest.clone());
    if let Some(registry) = registry {
        extractor = extractor.with_registry(registry.clone());
    }
    extractor.extract(payload)
}

fn open_member(source: PackageSource, config: &InstallConfig) -> Result<ByteStream> {
    match (config.backend, source) {
        (Backend::Library, PackageSource::Verified { bytes, .. }) => {
            let reader = ArReader::new(Cursor::new(bytes))?.locate(&config.member)?;
            Ok(Box::new(reader))
        }
        (Backend::Library, PackageSource::Unverified(handle)) => {
            let reader = ArReader::new(handle.into_file())?.locate(&config.member)?;
            Ok(Box::new(reader))
        }
        (Backend::External, PackageSource::Verified { bytes, scratch }) => {
            let copy = scratch.join(STAGED_PACKAGE);
            std::fs::write(&copy, &bytes)?;
            debug!(path = %copy.display(), "wrote verified copy for system tools");
            external_member(&copy, config)
        }
        (Backend::External, PackageSource::Unverified(handle)) => {
            external_member(handle.path(), config)
        }
    }
}

#[cfg(feature = "external-tools")]
fn external_member(package: &Path, config: &InstallConfig) -> Result<ByteStream> {
    decompress::process::system_ar_member(&config.tools, package, &config.member)
}

#[cfg(not(feature = "external-tools"))]
fn external_member(_package: &Path, _config: &InstallConfig) -> Result<ByteStream> {
    Err(InstallError::BackendUnavailable {
        tool: "ar",
        reason: "built without the external-tools feature".into(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::test_utils::TarTestBuilder;
    use crate::test_utils::build_deb;
    use crate::test_utils::sample_payload;
    use tempfile::TempDir;

    struct AcceptAll;

    impl SignatureVerifier for AcceptAll {
        fn verify(&self, _content: &[u8], _signature_url: &str) -> Result<Verified> {
            Ok(Verified {
                key_id: "test-key".into(),
            })
        }
    }

    struct RejectAll;

    impl SignatureVerifier for RejectAll {
        fn verify(&self, _content: &[u8], _signature_url: &str) -> Result<Verified> {
            Err(InstallError::SignatureInvalid("rejected".into()))
        }
    }

    fn write_package(dir: &Path, bytes: &[u8]) -> PathBuf {
        let path = dir.join("app.deb");
        std::fs::write(&path, bytes).unwrap();
        path
    }

    struct Fixture {
        _temp: TempDir,
        package: PathBuf,
        staging_parent: PathBuf,
        dest: PathBuf,
    }

    fn fixture(payload: &[u8]) -> Fixture {
        let temp = TempDir::new().unwrap();
        let package = write_package(temp.path(), &build_deb(payload));
        let staging_parent = temp.path().join("staging");
        let dest = temp.path().join("root");
        std::fs::create_dir(&staging_parent).unwrap();
        std::fs::create_dir(&dest).unwrap();
        Fixture {
            _temp: temp,
            package,
            staging_parent,
            dest,
        }
    }

    fn pipeline(fx: &Fixture, verifier: impl SignatureVerifier + 'static) -> InstallPipeline {
        let config = InstallConfig::default().with_staging_parent(&fx.staging_parent);
        InstallPipeline::new(config, verifier, StagingRegistry::new())
    }

    fn is_empty(dir: &Path) -> bool {
        std::fs::read_dir(dir).unwrap().next().is_none()
    }

    #[test]
    fn test_install_sample_package() {
        let fx = fixture(&sample_payload());
        let report = pipeline(&fx, AcceptAll)
            .install(&fx.package, "sig", &fx.dest)
            .unwrap();

        assert_eq!(report.key_id, "test-key");
        assert_eq!(report.promotion.files_installed, 2);
        assert!(fx.dest.join("opt/app/bin/app").is_file());
        assert!(fx.dest.join("usr/share/app/icon.png").is_file());
        assert!(is_empty(&fx.staging_parent));
    }

    /// Accepts the bytes it was shown, then rewrites the package on disk.
    struct SwapAfterCheck {
        package: PathBuf,
        replacement: Vec<u8>,
    }

    impl SignatureVerifier for SwapAfterCheck {
        fn verify(&self, _content: &[u8], _signature_url: &str) -> Result<Verified> {
            std::fs::write(&self.package, &self.replacement).unwrap();
            Ok(Verified {
                key_id: "test-key".into(),
            })
        }
    }

    #[test]
    fn test_installs_the_bytes_that_were_verified() {
        let fx = fixture(&sample_payload());
        let unsigned = TarTestBuilder::new()
            .add_file("./opt/app/bin/app", b"unsigned")
            .build();
        let verifier = SwapAfterCheck {
            package: fx.package.clone(),
            replacement: build_deb(&unsigned),
        };

        pipeline(&fx, verifier)
            .install(&fx.package, "sig", &fx.dest)
            .unwrap();

        assert_eq!(
            std::fs::read(fx.dest.join("opt/app/bin/app")).unwrap(),
            b"#!/bin/sh\necho app\n"
        );
        assert!(fx.dest.join("usr/share/app/icon.png").is_file());
    }

    #[test]
    fn test_rejected_signature_writes_nothing() {
        let fx = fixture(&sample_payload());
        let result = pipeline(&fx, RejectAll).install(&fx.package, "sig", &fx.dest);

        assert!(matches!(result, Err(InstallError::SignatureInvalid(_))));
        assert!(is_empty(&fx.staging_parent));
        assert!(is_empty(&fx.dest));
    }

    #[test]
    fn test_traversal_leaves_destination_untouched() {
        let payload = TarTestBuilder::new()
            .add_file("./opt/app/ok", b"fine")
            .add_file("../../escape", b"evil")
            .build();
        let fx = fixture(&payload);

        let result = pipeline(&fx, AcceptAll).install(&fx.package, "sig", &fx.dest);

        assert!(matches!(result, Err(InstallError::PathTraversal { .. })));
        assert!(is_empty(&fx.dest));
        assert!(is_empty(&fx.staging_parent));
    }

    #[test]
    fn test_missing_member() {
        let fx = fixture(&sample_payload());
        let config = InstallConfig::default()
            .with_staging_parent(&fx.staging_parent)
            .with_member("data.tar.zst");
        let pipeline = InstallPipeline::new(config, AcceptAll, StagingRegistry::new());

        let result = pipeline.install(&fx.package, "sig", &fx.dest);
        assert!(matches!(
            result,
            Err(InstallError::MemberNotFound { ref member }) if member == "data.tar.zst"
        ));
        assert!(is_empty(&fx.staging_parent));
    }

    #[test]
    fn test_empty_member_name_is_bad_input() {
        let fx = fixture(&sample_payload());
        let config = InstallConfig::default().with_member("");
        let pipeline = InstallPipeline::new(config, AcceptAll, StagingRegistry::new());
        assert!(matches!(
            pipeline.install(&fx.package, "sig", &fx.dest),
            Err(InstallError::BadInput(_))
        ));
    }

    #[test]
    fn test_missing_package_is_bad_input() {
        let fx = fixture(&sample_payload());
        let result = pipeline(&fx, AcceptAll).install(fx.dest.join("nope.deb"), "sig", &fx.dest);
        assert!(matches!(result, Err(InstallError::BadInput(_))));
    }

    #[test]
    fn test_interrupted_registry_refuses_install() {
        let fx = fixture(&sample_payload());
        let registry = StagingRegistry::new();
        registry.interrupt();
        let config = InstallConfig::default().with_staging_parent(&fx.staging_parent);
        let pipeline = InstallPipeline::new(config, AcceptAll, registry);

        let result = pipeline.install(&fx.package, "sig", &fx.dest);
        assert!(matches!(result, Err(InstallError::Interrupted)));
        assert!(is_empty(&fx.dest));
    }

    #[test]
    fn test_dry_run_stages_only() {
        let fx = fixture(&sample_payload());
        let config = InstallConfig::default()
            .with_staging_parent(&fx.staging_parent)
            .with_dry_run(true);
        let pipeline = InstallPipeline::new(config, AcceptAll, StagingRegistry::new());

        let report = pipeline.install(&fx.package, "sig", &fx.dest).unwrap();
        assert!(report.dry_run);
        assert_eq!(report.extraction.files_extracted, 2);
        assert_eq!(report.promotion.files_installed, 2);
        assert!(is_empty(&fx.dest));
        assert!(is_empty(&fx.staging_parent));
    }

    #[test]
    fn test_extract_package_without_staging() {
        let fx = fixture(&sample_payload());
        let report = extract_package(&fx.package, &fx.dest, &InstallConfig::default()).unwrap();

        assert_eq!(report.files_extracted, 2);
        assert!(fx.dest.join("opt/app/bin/app").is_file());
    }

    #[test]
    fn test_archive_handle_rewinds() {
        let temp = TempDir::new().unwrap();
        let path = write_package(temp.path(), b"!<arch>\n");
        let mut handle = ArchiveHandle::open(&path).unwrap();

        assert_eq!(handle.read_all().unwrap(), b"!<arch>\n");
        assert_eq!(handle.read_all().unwrap(), b"!<arch>\n");
        assert_eq!(handle.path(), path);
    }
}
