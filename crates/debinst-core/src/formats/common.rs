//! Materialization helpers for validated entries.
//!
//! Internal to the extractor. Every function here takes paths that have
//! already been confined lexically by [`SafePath`] or [`SafeSymlink`].
//! Directories are then walked one component at a time on disk: an ancestor
//! that is a symlink (created by an earlier entry) is resolved and must land
//! inside the root, so writes never follow a link out of it.

use std::fs::File;
use std::io::BufWriter;
use std::io::Read;
use std::io::Write;
use std::io::{self};
use std::path::Path;
use std::path::PathBuf;

use crate::ExtractionReport;
use crate::InstallError;
use crate::Result;
use crate::copy::CopyBuffer;
use crate::copy::copy_with_buffer;
use crate::types::DestDir;
use crate::types::SafePath;
use crate::types::SafeSymlink;

/// Creates a directory and applies `mode`.
///
/// Idempotent: an existing directory only gets its mode updated.
///
/// # Errors
///
/// Returns an error if directory creation or permission setting fails.
pub fn create_directory(
    safe_path: &SafePath,
    mode: u32,
    dest: &DestDir,
    report: &mut ExtractionReport,
) -> Result<()> {
    let dir_path = confined_dir(dest, safe_path.as_path(), safe_path.as_path())?;
    set_mode(&dir_path, mode)?;

    report.directories_created += 1;
    Ok(())
}

/// Writes a regular file from `reader`, then applies `mode`.
///
/// The file is created or truncated. A symlink already at the path is
/// replaced rather than followed.
///
/// # Errors
///
/// Returns an error if parent creation, the copy, or permission setting
/// fails. Decoder faults surface as `CorruptStream`/`MalformedArchive`.
pub fn extract_file<R: Read>(
    reader: &mut R,
    safe_path: &SafePath,
    mode: u32,
    dest: &DestDir,
    report: &mut ExtractionReport,
    copy_buffer: &mut CopyBuffer,
) -> Result<()> {
    let output_path = prepare_target(dest, safe_path)?;

    let output_file = File::create(&output_path)?;
    let mut writer = BufWriter::with_capacity(64 * 1024, output_file);
    let bytes_written = copy_with_buffer(reader, &mut writer, copy_buffer)?;
    writer.flush()?;
    drop(writer);

    set_mode(&output_path, mode)?;

    report.files_extracted += 1;
    report.bytes_written += bytes_written;
    Ok(())
}

/// Writes an empty file standing in for a hard link, device or fifo.
///
/// # Errors
///
/// Returns an error if the file cannot be created.
pub fn create_placeholder(
    safe_path: &SafePath,
    mode: u32,
    dest: &DestDir,
    report: &mut ExtractionReport,
) -> Result<()> {
    let output_path = prepare_target(dest, safe_path)?;

    File::create(&output_path)?;
    set_mode(&output_path, mode)?;

    report.placeholders_created += 1;
    Ok(())
}

/// Creates a symbolic link, replacing whatever non-directory sits at the
/// link path.
///
/// Absolute targets are rebased against the directory the link really lands
/// in, which differs from its lexical parent when an ancestor is an in-root
/// symlink.
///
/// # Errors
///
/// Returns an error if the platform has no symlinks or creation fails.
#[allow(unused_variables)]
pub fn create_symlink(
    safe_symlink: &SafeSymlink,
    dest: &DestDir,
    report: &mut ExtractionReport,
) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::symlink;

        let link = safe_symlink.link_path();
        let parent = confined_parent(dest, link)?;
        let depth = parent
            .strip_prefix(dest.as_path())
            .map_or(0, |rel| rel.components().count());
        let link_path = parent.join(file_name(link)?);
        remove_non_directory(&link_path)?;

        symlink(safe_symlink.target_for_depth(depth), &link_path)?;

        report.symlinks_created += 1;
        Ok(())
    }

    #[cfg(not(unix))]
    {
        Err(InstallError::Io(io::Error::new(
            io::ErrorKind::Unsupported,
            "symlinks are not supported on this platform",
        )))
    }
}

/// Resolves the real location of `safe_path`, creating missing parents and
/// removing a file or symlink already there.
fn prepare_target(dest: &DestDir, safe_path: &SafePath) -> Result<PathBuf> {
    let rel = safe_path.as_path();
    let path = confined_parent(dest, rel)?.join(file_name(rel)?);
    remove_non_directory(&path)?;
    Ok(path)
}

fn confined_parent(dest: &DestDir, rel: &Path) -> Result<PathBuf> {
    confined_dir(dest, rel.parent().unwrap_or_else(|| Path::new("")), rel)
}

/// Walks `dir` below the root one component at a time, creating missing
/// directories. An existing symlink is resolved and must stay inside the
/// root and be a directory. Returns the real directory path.
///
/// `entry` is reported on violation.
fn confined_dir(dest: &DestDir, dir: &Path, entry: &Path) -> Result<PathBuf> {
    let root = dest.as_path();
    let mut current = root.to_path_buf();

    for component in dir.components() {
        current.push(component);
        match std::fs::symlink_metadata(&current) {
            Ok(meta) if meta.file_type().is_symlink() => {
                let resolved = current.canonicalize()?;
                if !resolved.starts_with(root) || !resolved.is_dir() {
                    return Err(InstallError::PathTraversal {
                        path: entry.to_path_buf(),
                    });
                }
                current = resolved;
            }
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(InstallError::Io(io::Error::new(
                    io::ErrorKind::NotADirectory,
                    format!("{} is not a directory", current.display()),
                )));
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => std::fs::create_dir(&current)?,
            Err(e) => return Err(e.into()),
        }
    }

    Ok(current)
}

fn file_name(rel: &Path) -> Result<&std::ffi::OsStr> {
    rel.file_name().ok_or_else(|| {
        InstallError::MalformedArchive(format!("entry has no file name: {}", rel.display()))
    })
}

fn remove_non_directory(path: &Path) -> Result<()> {
    if let Ok(meta) = std::fs::symlink_metadata(path)
        && !meta.is_dir()
    {
        std::fs::remove_file(path)?;
    }
    Ok(())
}

#[cfg(unix)]
pub(crate) fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
pub(crate) fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}
