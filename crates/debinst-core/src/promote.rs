//! Promotion of staged subtrees into the destination root.
//!
//! Runs only after extraction into staging has fully succeeded. Each
//! configured top-level subtree is walked and copied into place:
//! directories are created idempotently, files are created or truncated and
//! get their staged mode, symlinks are recreated as symlinks. An interruption
//! mid-walk can leave the destination partially populated.

use std::fs::File;
use std::io::BufWriter;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use tracing::debug;
use tracing::info;
use walkdir::WalkDir;

use crate::InstallError;
use crate::PromotionReport;
use crate::Result;
use crate::copy::CopyBuffer;
use crate::copy::copy_with_buffer;
use crate::formats::common::set_mode;
use crate::types::DestDir;
use crate::types::SafePath;

/// Copies `staging/<subtree>` to `dest/<subtree>` for every listed subtree.
///
/// With `dry_run` the walk happens and the report lists the paths that
/// would be written, but the destination is not touched.
///
/// # Errors
///
/// - `BadInput` if a subtree name leaves the staging root
/// - `Io` on any filesystem failure
pub fn promote(
    staging: &DestDir,
    dest: &DestDir,
    subtrees: &[String],
    dry_run: bool,
) -> Result<PromotionReport> {
    let mut report = PromotionReport::default();
    let mut copy_buffer = CopyBuffer::new();

    for subtree in subtrees {
        let safe = SafePath::validate(Path::new(subtree), staging)
            .ok()
            .flatten()
            .ok_or_else(|| InstallError::BadInput(format!("invalid subtree name: {subtree:?}")))?;

        let source = staging.join(&safe);
        if std::fs::symlink_metadata(&source).is_err() {
            info!(subtree = %subtree, "package has no such subtree, skipping");
            report.missing_subtrees.push(subtree.clone());
            continue;
        }

        let walker = WalkDir::new(&source)
            .follow_links(false)
            .follow_root_links(false)
            .sort_by_file_name();

        for entry in walker {
            let entry = entry.map_err(|e| InstallError::Io(e.into()))?;
            let relative = entry
                .path()
                .strip_prefix(staging.as_path())
                .map_err(|_| {
                    InstallError::BadInput(format!(
                        "walked outside staging: {}",
                        entry.path().display()
                    ))
                })?;
            let target = dest.as_path().join(relative);

            promote_entry(&entry, &target, dry_run, &mut report, &mut copy_buffer)?;
            report.installed_paths.push(target);
        }
    }

    info!(
        files = report.files_installed,
        directories = report.directories_created,
        symlinks = report.symlinks_created,
        bytes = report.bytes_copied,
        dry_run,
        "promotion finished"
    );
    Ok(report)
}

fn promote_entry(
    entry: &walkdir::DirEntry,
    target: &Path,
    dry_run: bool,
    report: &mut PromotionReport,
    copy_buffer: &mut CopyBuffer,
) -> Result<()> {
    let file_type = entry.file_type();

    if file_type.is_dir() {
        if !dry_run {
            std::fs::create_dir_all(target)?;
            set_mode(target, source_mode(entry)?)?;
        }
        report.directories_created += 1;
    } else if file_type.is_symlink() {
        let link_target = std::fs::read_link(entry.path())?;
        if !dry_run {
            replace_symlink(&link_target, target)?;
        }
        debug!(path = %target.display(), target = %link_target.display(), "symlink");
        report.symlinks_created += 1;
    } else {
        let size = entry.metadata().map_err(|e| InstallError::Io(e.into()))?.len();
        if !dry_run {
            copy_file(entry.path(), target, source_mode(entry)?, copy_buffer)?;
        }
        debug!(path = %target.display(), size, "file");
        report.files_installed += 1;
        report.bytes_copied += size;
    }
    Ok(())
}

#[cfg(unix)]
fn source_mode(entry: &walkdir::DirEntry) -> Result<u32> {
    use std::os::unix::fs::PermissionsExt;
    let metadata = entry.metadata().map_err(|e| InstallError::Io(e.into()))?;
    Ok(metadata.permissions().mode() & 0o7777)
}

#[cfg(not(unix))]
fn source_mode(_entry: &walkdir::DirEntry) -> Result<u32> {
    Ok(0)
}

fn copy_file(source: &Path, target: &Path, mode: u32, copy_buffer: &mut CopyBuffer) -> Result<()> {
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if std::fs::symlink_metadata(target).is_ok_and(|m| m.file_type().is_symlink()) {
        std::fs::remove_file(target)?;
    }

    let mut input = File::open(source)?;
    let mut writer = BufWriter::with_capacity(64 * 1024, File::create(target)?);
    copy_with_buffer(&mut input, &mut writer, copy_buffer)?;
    writer.flush()?;
    drop(writer);

    set_mode(target, mode)
}

#[cfg(unix)]
fn replace_symlink(link_target: &PathBuf, target: &Path) -> Result<()> {
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if let Ok(meta) = std::fs::symlink_metadata(target)
        && !meta.is_dir()
    {
        std::fs::remove_file(target)?;
    }
    std::os::unix::fs::symlink(link_target, target)?;
    Ok(())
}

#[cfg(not(unix))]
fn replace_symlink(_link_target: &PathBuf, _target: &Path) -> Result<()> {
    Err(InstallError::Io(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "symlinks are not supported on this platform",
    )))
}
