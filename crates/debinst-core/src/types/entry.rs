//! Tar entry model.

use std::path::PathBuf;

/// How an entry is materialized.
///
/// # Examples
///
/// ```
/// use debinst_core::types::EntryKind;
///
/// assert_eq!(EntryKind::from_tar(tar::EntryType::Regular), EntryKind::File);
/// assert_eq!(EntryKind::from_tar(tar::EntryType::Fifo), EntryKind::Placeholder);
/// assert!(EntryKind::from_tar(tar::EntryType::XGlobalHeader).is_skipped());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    /// Directory.
    Directory,
    /// Regular file; the body is copied verbatim.
    File,
    /// Symbolic link.
    Symlink,
    /// Hard link, character or block device, or fifo.
    ///
    /// Written as an empty regular file with the entry's mode. Link and
    /// device semantics are not reproduced.
    Placeholder,
    /// Anything else (metadata records, sparse files); skipped.
    Other,
}

impl EntryKind {
    /// Maps a tar header type onto a materialization kind.
    #[must_use]
    pub fn from_tar(entry_type: tar::EntryType) -> Self {
        if entry_type.is_dir() {
            Self::Directory
        } else if entry_type.is_file() {
            Self::File
        } else if entry_type.is_symlink() {
            Self::Symlink
        } else if entry_type.is_hard_link()
            || entry_type.is_character_special()
            || entry_type.is_block_special()
            || entry_type.is_fifo()
        {
            Self::Placeholder
        } else {
            Self::Other
        }
    }

    /// Returns `true` for kinds that are not materialized.
    #[must_use]
    pub const fn is_skipped(self) -> bool {
        matches!(self, Self::Other)
    }
}

/// Header data of one tar entry, before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TarEntry {
    /// Path exactly as stored in the archive.
    pub raw_path: PathBuf,
    /// Materialization kind.
    pub kind: EntryKind,
    /// Link target for symlinks and hard links, unvalidated.
    pub link_target: Option<PathBuf>,
    /// Permission bits.
    pub mode: u32,
    /// Body size in bytes.
    pub size: u64,
}

impl TarEntry {
    /// Reads the header fields of a `tar` crate entry.
    ///
    /// # Errors
    ///
    /// Returns the `tar` crate's I/O error when a header field cannot be
    /// decoded.
    pub fn from_entry<R: std::io::Read>(entry: &tar::Entry<'_, R>) -> std::io::Result<Self> {
        let header = entry.header();
        Ok(Self {
            raw_path: entry.path()?.into_owned(),
            kind: EntryKind::from_tar(header.entry_type()),
            link_target: entry.link_name()?.map(std::borrow::Cow::into_owned),
            mode: header.mode()? & 0o7777,
            size: entry.size(),
        })
    }
}
