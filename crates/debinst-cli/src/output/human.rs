//! Human-readable output formatter with colors and styling.

use super::formatter::OutputFormatter;
use anyhow::Result;
use console::Term;
use console::style;
use debinst_core::ExtractionReport;
use debinst_core::InstallReport;
use debinst_core::Verified;
use std::path::Path;

pub struct HumanFormatter {
    verbose: bool,
    quiet: bool,
    use_colors: bool,
    term: Term,
    err_term: Term,
}

impl HumanFormatter {
    pub fn new(verbose: bool, quiet: bool) -> Self {
        Self {
            verbose,
            quiet,
            use_colors: console::colors_enabled(),
            term: Term::stdout(),
            err_term: Term::stderr(),
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn format_size(bytes: u64) -> String {
        const KB: u64 = 1024;
        const MB: u64 = KB * 1024;
        const GB: u64 = MB * 1024;

        if bytes >= GB {
            format!("{:.1} GB", bytes as f64 / GB as f64)
        } else if bytes >= MB {
            format!("{:.1} MB", bytes as f64 / MB as f64)
        } else if bytes >= KB {
            format!("{:.1} KB", bytes as f64 / KB as f64)
        } else {
            format!("{bytes} B")
        }
    }

    fn headline(&self, text: &str) {
        if self.use_colors {
            let _ = self
                .term
                .write_line(&format!("{} {text}", style("✓").green().bold()));
        } else {
            let _ = self.term.write_line(text);
        }
    }

    fn line(&self, text: &str) {
        let _ = self.term.write_line(text);
    }
}

impl OutputFormatter for HumanFormatter {
    fn format_install_result(&self, dest: &Path, report: &InstallReport) -> Result<()> {
        if self.quiet {
            return Ok(());
        }

        if report.dry_run {
            self.headline(&format!("Dry run complete (nothing written to {})", dest.display()));
        } else {
            self.headline(&format!("Installed into {}", dest.display()));
        }

        let promotion = &report.promotion;
        self.line(&format!("  Signed by key:  {}", report.key_id));
        self.line(&format!("  Files:          {}", promotion.files_installed));
        self.line(&format!("  Directories:    {}", promotion.directories_created));
        self.line(&format!("  Symlinks:       {}", promotion.symlinks_created));
        self.line(&format!(
            "  Total size:     {}",
            Self::format_size(promotion.bytes_copied)
        ));

        for subtree in &promotion.missing_subtrees {
            self.format_warning(&format!("package has no '{subtree}' directory"));
        }

        if self.verbose || report.dry_run {
            self.line("");
            for path in &promotion.installed_paths {
                self.line(&format!("  {}", path.display()));
            }
        }

        if self.verbose {
            self.line(&format!("  Duration: {:?}", report.duration));
        }

        Ok(())
    }

    fn format_verification(&self, package: &Path, verified: &Verified) -> Result<()> {
        if self.quiet {
            return Ok(());
        }

        self.headline(&format!("Signature valid: {}", package.display()));
        self.line(&format!("  Signed by key: {}", verified.key_id));
        Ok(())
    }

    fn format_extraction_result(&self, output_dir: &Path, report: &ExtractionReport) -> Result<()> {
        if self.quiet {
            return Ok(());
        }

        self.headline(&format!("Extraction complete: {}", output_dir.display()));
        self.line(&format!("  Files extracted: {}", report.files_extracted));
        self.line(&format!("  Directories: {}", report.directories_created));
        self.line(&format!(
            "  Total size: {}",
            Self::format_size(report.bytes_written)
        ));

        if self.verbose {
            self.line(&format!("  Symlinks: {}", report.symlinks_created));
            self.line(&format!("  Placeholders: {}", report.placeholders_created));
            self.line(&format!("  Skipped entries: {}", report.entries_skipped));
        }

        Ok(())
    }

    fn format_error(&self, _operation: &str, error: &anyhow::Error) {
        // Always show errors, even in quiet mode
        if self.use_colors {
            let _ = self
                .err_term
                .write_line(&format!("{} {error:?}", style("ERROR:").red().bold()));
        } else {
            let _ = self.err_term.write_line(&format!("ERROR: {error:?}"));
        }
    }

    fn format_warning(&self, message: &str) {
        if self.quiet {
            return;
        }

        if self.use_colors {
            let _ = self
                .err_term
                .write_line(&format!("{} {message}", style("⚠").yellow().bold()));
        } else {
            let _ = self.err_term.write_line(&format!("WARNING: {message}"));
        }
    }
}
