//! Extraction and installation reporting.

use std::path::PathBuf;
use std::time::Duration;

/// Report of a tar extraction into a directory.
#[derive(Debug, Clone, Default)]
pub struct ExtractionReport {
    /// Number of regular files written.
    pub files_extracted: usize,

    /// Number of directory entries processed.
    pub directories_created: usize,

    /// Number of symlinks created.
    pub symlinks_created: usize,

    /// Empty files written for hard links, devices and fifos.
    pub placeholders_created: usize,

    /// Entries skipped because their type is not materialized.
    pub entries_skipped: usize,

    /// Total bytes written to disk.
    pub bytes_written: u64,
}

impl ExtractionReport {
    /// Creates a new empty extraction report.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns total number of items materialized.
    #[must_use]
    pub fn total_items(&self) -> usize {
        self.files_extracted
            + self.directories_created
            + self.symlinks_created
            + self.placeholders_created
    }
}

/// Report of promoting staged trees into the destination root.
#[derive(Debug, Clone, Default)]
pub struct PromotionReport {
    /// Files copied into place.
    pub files_installed: usize,

    /// Directories created or already present.
    pub directories_created: usize,

    /// Symlinks recreated.
    pub symlinks_created: usize,

    /// Bytes copied.
    pub bytes_copied: u64,

    /// Final paths touched, in walk order.
    pub installed_paths: Vec<PathBuf>,

    /// Configured subtrees that the package did not contain.
    pub missing_subtrees: Vec<String>,
}

/// Report of a complete install operation.
#[derive(Debug, Clone, Default)]
pub struct InstallReport {
    /// Id of the key that verified the signature.
    pub key_id: String,

    /// Staging extraction statistics.
    pub extraction: ExtractionReport,

    /// Promotion statistics; paths are listed but not written in dry-run mode.
    pub promotion: PromotionReport,

    /// Whether the destination was left untouched on purpose.
    pub dry_run: bool,

    /// Duration of the whole operation.
    pub duration: Duration,
}
