//! Ephemeral staging directories and the registry used to clean them up on
//! interruption.
//!
//! Each install extracts into a fresh directory created by [`StagingDir`].
//! The directory is removed when the guard drops, on success and on error.
//! A signal handler cannot rely on unwinding, so every live staging
//! directory is also recorded in a [`StagingRegistry`]; the handler calls
//! [`StagingRegistry::interrupt`], which removes them synchronously before
//! the process exits.

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use tempfile::TempDir;
use tracing::debug;
use tracing::warn;

use crate::InstallError;
use crate::Result;

/// Prefix of every staging directory name.
pub const STAGING_PREFIX: &str = "debinst-";

#[derive(Debug, Default)]
struct RegistryState {
    dirs: Vec<PathBuf>,
    interrupted: bool,
}

/// Process-wide record of in-flight staging directories.
///
/// Cheap to clone; clones share state.
///
/// # Examples
///
/// ```
/// use debinst_core::StagingRegistry;
/// use debinst_core::staging::StagingDir;
///
/// # fn main() -> Result<(), debinst_core::InstallError> {
/// let registry = StagingRegistry::new();
/// let staging = StagingDir::create(&registry, None)?;
/// assert_eq!(registry.active(), vec![staging.path().to_path_buf()]);
///
/// drop(staging);
/// assert!(registry.active().is_empty());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct StagingRegistry {
    state: Arc<Mutex<RegistryState>>,
}

impl StagingRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records a staging directory.
    ///
    /// # Errors
    ///
    /// Returns `Interrupted` if the registry was already interrupted; the
    /// caller must not start writing.
    pub fn register(&self, path: &Path) -> Result<()> {
        let mut state = self.lock();
        if state.interrupted {
            return Err(InstallError::Interrupted);
        }
        state.dirs.push(path.to_path_buf());
        Ok(())
    }

    /// Forgets a staging directory without touching it.
    pub fn unregister(&self, path: &Path) {
        self.lock().dirs.retain(|p| p != path);
    }

    /// Returns the registered directories.
    #[must_use]
    pub fn active(&self) -> Vec<PathBuf> {
        self.lock().dirs.clone()
    }

    /// Returns `true` once [`interrupt`](Self::interrupt) has been called.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.lock().interrupted
    }

    /// Fails with `Interrupted` once the registry has been interrupted.
    ///
    /// # Errors
    ///
    /// Returns `Interrupted` after [`interrupt`](Self::interrupt).
    pub fn check(&self) -> Result<()> {
        if self.is_interrupted() {
            Err(InstallError::Interrupted)
        } else {
            Ok(())
        }
    }

    /// Marks the registry interrupted and removes every registered
    /// directory. Returns how many were removed.
    ///
    /// Safe to call from a signal-handling thread while an install is
    /// running; later registrations are refused.
    pub fn interrupt(&self) -> usize {
        let mut state = self.lock();
        state.interrupted = true;

        let mut removed = 0;
        for dir in state.dirs.drain(..) {
            match std::fs::remove_dir_all(&dir) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %dir.display(), error = %e, "failed to remove staging directory"),
            }
        }
        removed
    }
}

/// A registered staging directory, removed on drop.
#[derive(Debug)]
pub struct StagingDir {
    dir: TempDir,
    registry: StagingRegistry,
}

impl StagingDir {
    /// Creates a `debinst-*` directory in `parent` (system temp dir when
    /// `None`) and registers it.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the directory cannot be created and `Interrupted` if
    /// the registry refuses it (the directory is removed again).
    pub fn create(registry: &StagingRegistry, parent: Option<&Path>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(STAGING_PREFIX);
        let dir = match parent {
            Some(parent) => builder.tempdir_in(parent)?,
            None => builder.tempdir()?,
        };

        registry.register(dir.path())?;
        debug!(path = %dir.path().display(), "created staging directory");

        Ok(Self {
            dir,
            registry: registry.clone(),
        })
    }

    /// Returns the directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        self.registry.unregister(self.dir.path());
        debug!(path = %self.dir.path().display(), "removing staging directory");
    }
}
