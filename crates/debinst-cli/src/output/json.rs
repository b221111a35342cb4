//! JSON output formatter for machine-readable results.

use super::formatter::JsonOutput;
use super::formatter::OutputFormatter;
use anyhow::Result;
use debinst_core::ExtractionReport;
use debinst_core::InstallReport;
use debinst_core::Verified;
use serde::Serialize;
use std::io::Write;
use std::io::{self};
use std::path::Path;

pub struct JsonFormatter;

impl JsonFormatter {
    fn output<T: Serialize>(value: &T) -> Result<()> {
        let json = serde_json::to_string_pretty(value)?;
        writeln!(io::stdout(), "{json}")?;
        Ok(())
    }
}

#[derive(Serialize)]
struct InstallOutput {
    destination: String,
    key_id: String,
    dry_run: bool,
    files_extracted: usize,
    files_installed: usize,
    directories_created: usize,
    symlinks_created: usize,
    bytes_copied: u64,
    installed_paths: Vec<String>,
    missing_subtrees: Vec<String>,
    duration_ms: u128,
}

impl InstallOutput {
    fn new(dest: &Path, report: &InstallReport) -> Self {
        let promotion = &report.promotion;
        Self {
            destination: dest.display().to_string(),
            key_id: report.key_id.clone(),
            dry_run: report.dry_run,
            files_extracted: report.extraction.files_extracted,
            files_installed: promotion.files_installed,
            directories_created: promotion.directories_created,
            symlinks_created: promotion.symlinks_created,
            bytes_copied: promotion.bytes_copied,
            installed_paths: promotion
                .installed_paths
                .iter()
                .map(|p| p.display().to_string())
                .collect(),
            missing_subtrees: promotion.missing_subtrees.clone(),
            duration_ms: report.duration.as_millis(),
        }
    }
}

impl OutputFormatter for JsonFormatter {
    fn format_install_result(&self, dest: &Path, report: &InstallReport) -> Result<()> {
        Self::output(&JsonOutput::success("install", InstallOutput::new(dest, report)))
    }

    fn format_verification(&self, package: &Path, verified: &Verified) -> Result<()> {
        #[derive(Serialize)]
        struct VerifyOutput {
            package: String,
            valid: bool,
            key_id: String,
        }

        let data = VerifyOutput {
            package: package.display().to_string(),
            valid: true,
            key_id: verified.key_id.clone(),
        };
        Self::output(&JsonOutput::success("verify", data))
    }

    fn format_extraction_result(&self, output_dir: &Path, report: &ExtractionReport) -> Result<()> {
        #[derive(Serialize)]
        struct ExtractionOutput {
            output_dir: String,
            files_extracted: usize,
            directories_created: usize,
            symlinks_created: usize,
            placeholders_created: usize,
            entries_skipped: usize,
            bytes_written: u64,
        }

        let data = ExtractionOutput {
            output_dir: output_dir.display().to_string(),
            files_extracted: report.files_extracted,
            directories_created: report.directories_created,
            symlinks_created: report.symlinks_created,
            placeholders_created: report.placeholders_created,
            entries_skipped: report.entries_skipped,
            bytes_written: report.bytes_written,
        };
        Self::output(&JsonOutput::success("extract", data))
    }

    fn format_error(&self, operation: &str, error: &anyhow::Error) {
        let output = JsonOutput::<()>::error(operation, format!("{error:#}"));
        let _ = Self::output(&output);
    }

    fn format_warning(&self, message: &str) {
        // stdout carries exactly one JSON document.
        tracing::warn!("{message}");
    }
}
