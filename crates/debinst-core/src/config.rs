//! Configuration for package installation.

use std::path::PathBuf;
use std::time::Duration;

/// Name of the payload member inside a `.deb` container.
pub const DEFAULT_MEMBER: &str = "data.tar.xz";

/// Decompression backend selection.
///
/// The choice is made by the caller; it is never inferred from the
/// environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Backend {
    /// In-process ar parsing and xz decoding.
    #[default]
    Library,
    /// Pipe through the system `ar` and `xz` utilities.
    External,
}

impl Backend {
    /// Returns a human-readable name for this backend.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Library => "library",
            Self::External => "external",
        }
    }
}

/// Network settings for key and signature fetches.
#[derive(Debug, Clone)]
pub struct NetConfig {
    /// Total time allowed for one request.
    pub timeout: Duration,
    /// Time allowed for establishing the connection.
    pub connect_timeout: Duration,
    /// User agent sent with every request.
    pub user_agent: String,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
            user_agent: format!("debinst/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Settings for the external-process backend.
#[derive(Debug, Clone)]
pub struct ToolConfig {
    /// Explicit path to `ar`; looked up on `PATH` when `None`.
    pub ar: Option<PathBuf>,
    /// Explicit path to `xz`; looked up on `PATH` when `None`.
    pub xz: Option<PathBuf>,
    /// How long to wait for a tool to exit once its output is drained.
    ///
    /// The process is killed when this elapses.
    pub exit_timeout: Duration,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            ar: None,
            xz: None,
            exit_timeout: Duration::from_secs(30),
        }
    }
}

/// Configuration for one install operation.
///
/// # Examples
///
/// ```
/// use debinst_core::Backend;
/// use debinst_core::InstallConfig;
///
/// let config = InstallConfig::default()
///     .with_backend(Backend::External)
///     .with_subtrees(["opt"]);
/// assert_eq!(config.subtrees, vec!["opt".to_string()]);
/// ```
#[derive(Debug, Clone)]
pub struct InstallConfig {
    /// Ar member holding the compressed tar payload.
    pub member: String,
    /// Decompression backend.
    pub backend: Backend,
    /// Top-level staged directories promoted into the destination root.
    pub subtrees: Vec<String>,
    /// Parent directory for staging areas; system temp dir when `None`.
    pub staging_parent: Option<PathBuf>,
    /// Memory limit for the in-process xz decoder, in bytes.
    pub xz_memlimit: u64,
    /// Verify and stage, but leave the destination untouched.
    pub dry_run: bool,
    /// Network settings.
    pub net: NetConfig,
    /// External tool settings.
    pub tools: ToolConfig,
}

impl Default for InstallConfig {
    /// Creates an `InstallConfig` for a standard `.deb` payload.
    ///
    /// Default values:
    /// - `member`: `data.tar.xz`
    /// - `backend`: [`Backend::Library`]
    /// - `subtrees`: `["opt", "usr"]`
    /// - `xz_memlimit`: 256 MiB
    /// - `dry_run`: false
    fn default() -> Self {
        Self {
            member: DEFAULT_MEMBER.to_string(),
            backend: Backend::Library,
            subtrees: vec!["opt".to_string(), "usr".to_string()],
            staging_parent: None,
            xz_memlimit: 256 * 1024 * 1024,
            dry_run: false,
            net: NetConfig::default(),
            tools: ToolConfig::default(),
        }
    }
}

impl InstallConfig {
    /// Sets the ar member to extract.
    #[must_use]
    pub fn with_member(mut self, member: impl Into<String>) -> Self {
        self.member = member.into();
        self
    }

    /// Sets the decompression backend.
    #[must_use]
    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    /// Replaces the list of promoted subtrees.
    #[must_use]
    pub fn with_subtrees<I, S>(mut self, subtrees: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subtrees = subtrees.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the parent directory for staging areas.
    #[must_use]
    pub fn with_staging_parent(mut self, parent: impl Into<PathBuf>) -> Self {
        self.staging_parent = Some(parent.into());
        self
    }

    /// Enables or disables dry-run mode.
    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}
