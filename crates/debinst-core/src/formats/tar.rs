//! Confined tar extraction.
//!
//! Entries are read sequentially from an already decompressed stream. Each
//! entry path is normalized and checked against the destination root before
//! anything touches the filesystem; the first violation aborts the whole
//! extraction.

use std::io::Read;
use std::io::{self};

use tracing::debug;

use crate::ExtractionReport;
use crate::InstallError;
use crate::Result;
use crate::copy::CopyBuffer;
use crate::staging::StagingRegistry;
use crate::types::DestDir;
use crate::types::EntryKind;
use crate::types::SafePath;
use crate::types::SafeSymlink;
use crate::types::TarEntry;

use super::common;

/// Extracts tar streams under one destination root.
///
/// # Examples
///
/// ```no_run
/// use debinst_core::formats::TarExtractor;
/// use debinst_core::types::DestDir;
/// use std::fs::File;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let dest = DestDir::new("/tmp/staging")?;
/// let report = TarExtractor::new(dest).extract(File::open("data.tar")?)?;
/// println!("Extracted {} files", report.files_extracted);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct TarExtractor {
    dest: DestDir,
    registry: Option<StagingRegistry>,
}

impl TarExtractor {
    /// Creates an extractor writing under `dest`.
    #[must_use]
    pub const fn new(dest: DestDir) -> Self {
        Self {
            dest,
            registry: None,
        }
    }

    /// Stops before each entry once `registry` has been interrupted.
    #[must_use]
    pub fn with_registry(mut self, registry: StagingRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Extracts every entry of `reader`.
    ///
    /// After the end-of-archive marker the rest of the stream is drained, so
    /// a decoder's trailing integrity check always runs.
    ///
    /// # Errors
    ///
    /// - `PathTraversal` / `SymlinkEscape` for entries leaving the root
    /// - `MalformedArchive` for unreadable tar headers
    /// - `CorruptStream` when the underlying decoder fails
    /// - `Interrupted` when the registry was interrupted mid-stream
    /// - `Io` for filesystem failures
    pub fn extract<R: Read>(&self, reader: R) -> Result<ExtractionReport> {
        let mut archive = tar::Archive::new(reader);
        let mut report = ExtractionReport::new();
        let mut copy_buffer = CopyBuffer::new();

        {
            let entries = archive.entries().map_err(classify_tar_error)?;
            for entry in entries {
                if let Some(registry) = &self.registry {
                    registry.check()?;
                }
                let mut entry = entry.map_err(classify_tar_error)?;
                let meta = TarEntry::from_entry(&entry).map_err(classify_tar_error)?;
                self.extract_entry(&mut entry, &meta, &mut report, &mut copy_buffer)?;
            }
        }

        let mut rest = archive.into_inner();
        io::copy(&mut rest, &mut io::sink()).map_err(InstallError::from_stream_io)?;

        debug!(
            files = report.files_extracted,
            directories = report.directories_created,
            symlinks = report.symlinks_created,
            placeholders = report.placeholders_created,
            skipped = report.entries_skipped,
            bytes = report.bytes_written,
            "tar extraction finished"
        );
        Ok(report)
    }

    fn extract_entry<R: Read>(
        &self,
        body: &mut R,
        meta: &TarEntry,
        report: &mut ExtractionReport,
        copy_buffer: &mut CopyBuffer,
    ) -> Result<()> {
        let Some(safe_path) = SafePath::validate(&meta.raw_path, &self.dest)? else {
            debug!(path = %meta.raw_path.display(), "skipping root entry");
            return Ok(());
        };

        match meta.kind {
            EntryKind::Directory => {
                debug!(path = %safe_path.as_path().display(), mode = meta.mode, "directory");
                common::create_directory(&safe_path, meta.mode, &self.dest, report)
            }
            EntryKind::File => {
                debug!(
                    path = %safe_path.as_path().display(),
                    mode = meta.mode,
                    size = meta.size,
                    "file"
                );
                common::extract_file(body, &safe_path, meta.mode, &self.dest, report, copy_buffer)
            }
            EntryKind::Placeholder => {
                debug!(path = %safe_path.as_path().display(), "placeholder for link or device");
                common::create_placeholder(&safe_path, meta.mode, &self.dest, report)
            }
            EntryKind::Symlink => {
                let target = meta.link_target.as_deref().ok_or_else(|| {
                    InstallError::MalformedArchive(format!(
                        "symlink {} has no target",
                        meta.raw_path.display()
                    ))
                })?;
                let symlink = SafeSymlink::validate(&safe_path, target)?;
                debug!(
                    path = %symlink.link_path().display(),
                    target = %symlink.target_path().display(),
                    "symlink"
                );
                common::create_symlink(&symlink, &self.dest, report)
            }
            EntryKind::Other => {
                debug!(path = %meta.raw_path.display(), "skipping unsupported entry type");
                report.entries_skipped += 1;
                Ok(())
            }
        }
    }
}

/// Extracts a tar stream under `dest`.
///
/// # Errors
///
/// See [`TarExtractor::extract`].
pub fn extract_tar<R: Read>(reader: R, dest: &DestDir) -> Result<ExtractionReport> {
    TarExtractor::new(dest.clone()).extract(reader)
}

/// Maps an error surfaced by the `tar` crate.
///
/// Decoder faults keep their classification. The crate reports header
/// problems (bad checksum, short block, undecodable field) as `Other`.
fn classify_tar_error(err: io::Error) -> InstallError {
    match InstallError::from_stream_io(err) {
        InstallError::Io(e) if e.kind() == io::ErrorKind::Other => {
            InstallError::MalformedArchive(format!("invalid tar data: {e}"))
        }
        other => other,
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_utils::TarTestBuilder;
    use std::io::Cursor;
    use std::path::Path;
    use tempfile::TempDir;

    fn create_test_dest() -> (TempDir, DestDir) {
        let temp = TempDir::new().expect("failed to create temp dir");
        let dest = DestDir::new(temp.path()).expect("failed to create dest");
        (temp, dest)
    }

    fn dir_is_empty(path: &Path) -> bool {
        std::fs::read_dir(path).unwrap().next().is_none()
    }

    #[test]
    fn test_extract_simple_tree() {
        let (temp, dest) = create_test_dest();
        let data = TarTestBuilder::new()
            .add_directory("./", 0o755)
            .add_directory("./opt/app/bin/", 0o755)
            .add_file_with_mode("./opt/app/bin/app", b"#!/bin/sh\n", 0o755)
            .add_file("./usr/share/app/icon.png", b"\x89PNG")
            .build();

        let report = extract_tar(Cursor::new(data), &dest).unwrap();

        assert_eq!(report.files_extracted, 2);
        assert_eq!(report.directories_created, 1);
        assert_eq!(report.bytes_written, 14);
        assert!(temp.path().join("opt/app/bin/app").is_file());
        assert_eq!(
            std::fs::read(temp.path().join("usr/share/app/icon.png")).unwrap(),
            b"\x89PNG"
        );
    }

    #[test]
    fn test_traversal_aborts_before_writing() {
        let (temp, dest) = create_test_dest();
        let data = TarTestBuilder::new()
            .add_file("../evil", b"pwned")
            .add_file("later.txt", b"never")
            .build();

        let result = extract_tar(Cursor::new(data), &dest);

        assert!(matches!(result, Err(InstallError::PathTraversal { .. })));
        assert!(dir_is_empty(temp.path()));
        assert!(!temp.path().parent().unwrap().join("evil").exists());
    }

    #[test]
    fn test_absolute_entry_is_root_relative() {
        let (temp, dest) = create_test_dest();
        let data = TarTestBuilder::new()
            .add_file("/etc/app.conf", b"k=v")
            .build();

        extract_tar(Cursor::new(data), &dest).unwrap();
        assert!(temp.path().join("etc/app.conf").is_file());
    }

    #[test]
    #[cfg(unix)]
    fn test_symlink_escape_rejected() {
        let (temp, dest) = create_test_dest();
        let data = TarTestBuilder::new()
            .add_symlink("bin/tool", "../../etc/passwd")
            .build();

        let result = extract_tar(Cursor::new(data), &dest);

        assert!(matches!(result, Err(InstallError::SymlinkEscape { .. })));
        assert!(!temp.path().join("bin/tool").exists());
    }

    #[test]
    #[cfg(unix)]
    fn test_symlinks_created_relative_to_root() {
        let (temp, dest) = create_test_dest();
        let data = TarTestBuilder::new()
            .add_file("opt/app/tool", b"bin")
            .add_symlink("bin/tool", "/opt/app/tool")
            .add_symlink("opt/app/current", "tool")
            .build();

        let report = extract_tar(Cursor::new(data), &dest).unwrap();

        assert_eq!(report.symlinks_created, 2);
        assert_eq!(
            std::fs::read_link(temp.path().join("bin/tool")).unwrap(),
            Path::new("../opt/app/tool")
        );
        assert_eq!(std::fs::read(temp.path().join("bin/tool")).unwrap(), b"bin");
    }

    #[test]
    #[cfg(unix)]
    fn test_chained_symlinks_stay_inside_root() {
        for prefix in ["a/", "a/a/", "a/a/a/a/"] {
            let outer = TempDir::new().unwrap();
            let root = outer.path().join("root");
            std::fs::create_dir(&root).unwrap();
            let dest = DestDir::new(&root).unwrap();
            let data = TarTestBuilder::new()
                .add_symlink("a", ".")
                .add_symlink(&format!("{prefix}l"), "/")
                .add_file("l/escaped.txt", b"x")
                .build();

            extract_tar(Cursor::new(data), &dest).unwrap();

            assert_eq!(std::fs::read_link(root.join("l")).unwrap(), Path::new("."));
            assert!(root.join("escaped.txt").is_file());
            assert!(!outer.path().join("escaped.txt").exists(), "escaped via {prefix}l");
        }
    }

    #[test]
    fn test_interrupted_registry_stops_before_next_entry() {
        let (temp, dest) = create_test_dest();
        let registry = StagingRegistry::new();
        registry.interrupt();
        let data = TarTestBuilder::new()
            .add_file("opt/app/a", b"a")
            .add_file("opt/app/b", b"b")
            .build();

        let result = TarExtractor::new(dest)
            .with_registry(registry)
            .extract(Cursor::new(data));

        assert!(matches!(result, Err(InstallError::Interrupted)));
        assert!(dir_is_empty(temp.path()));
    }

    #[test]
    fn test_placeholders_for_hardlinks_and_fifos() {
        let (temp, dest) = create_test_dest();
        let data = TarTestBuilder::new()
            .add_file("usr/bin/a", b"data")
            .add_hardlink("usr/bin/b", "usr/bin/a")
            .add_entry_of_type("run/fifo", tar::EntryType::Fifo)
            .build();

        let report = extract_tar(Cursor::new(data), &dest).unwrap();

        assert_eq!(report.placeholders_created, 2);
        assert_eq!(std::fs::read(temp.path().join("usr/bin/b")).unwrap(), b"");
        assert_eq!(std::fs::read(temp.path().join("run/fifo")).unwrap(), b"");
    }

    #[test]
    fn test_root_markers_skipped_silently() {
        let (temp, dest) = create_test_dest();
        let data = TarTestBuilder::new()
            .add_directory("./", 0o755)
            .add_directory("/", 0o755)
            .build();

        let report = extract_tar(Cursor::new(data), &dest).unwrap();
        assert_eq!(report.total_items(), 0);
        assert!(dir_is_empty(temp.path()));
    }

    #[test]
    fn test_garbage_is_malformed() {
        let (_temp, dest) = create_test_dest();
        let garbage = vec![0x41u8; 1024];
        let result = extract_tar(Cursor::new(garbage), &dest);
        assert!(matches!(result, Err(InstallError::MalformedArchive(_))));
    }

    #[test]
    fn test_empty_stream_extracts_nothing() {
        let (_temp, dest) = create_test_dest();
        let report = extract_tar(Cursor::new(Vec::new()), &dest).unwrap();
        assert_eq!(report.total_items(), 0);
    }

    #[test]
    fn test_trailing_data_is_drained() {
        struct Counting<R> {
            inner: R,
            eof_seen: bool,
        }

        impl<R: Read> Read for Counting<R> {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                let n = self.inner.read(buf)?;
                if n == 0 {
                    self.eof_seen = true;
                }
                Ok(n)
            }
        }

        let (_temp, dest) = create_test_dest();
        let mut data = TarTestBuilder::new().add_file("a.txt", b"a").build();
        data.extend_from_slice(&[0u8; 8192]);

        let mut reader = Counting {
            inner: Cursor::new(data),
            eof_seen: false,
        };
        TarExtractor::new(dest).extract(&mut reader).unwrap();
        assert!(reader.eof_seen);
    }
}
