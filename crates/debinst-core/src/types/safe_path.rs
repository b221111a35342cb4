//! Confined entry path type.

use crate::InstallError;
use crate::Result;
use std::path::Component;
use std::path::Path;
use std::path::PathBuf;

use super::DestDir;

/// A normalized, root-relative path proven to stay inside a [`DestDir`].
///
/// # Security Properties
///
/// - Can ONLY be constructed through [`SafePath::validate`]
/// - Never empty, never absolute, never contains `.` or `..`
/// - Containment is decided lexically, before any filesystem access
///
/// # Examples
///
/// ```no_run
/// use debinst_core::types::DestDir;
/// use debinst_core::types::SafePath;
/// use std::path::Path;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let dest = DestDir::new("/tmp")?;
///
/// let safe = SafePath::validate(Path::new("./opt/app/../app/bin"), &dest)?;
/// assert_eq!(safe.unwrap().as_path(), Path::new("opt/app/bin"));
///
/// assert!(SafePath::validate(Path::new("../etc/passwd"), &dest).is_err());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SafePath(PathBuf);

impl SafePath {
    /// Normalizes an archive entry path and checks it against the root.
    ///
    /// Returns `Ok(None)` when the path normalizes to the root itself (the
    /// `./` marker most packages start with).
    ///
    /// # Validation Steps
    ///
    /// 1. Reject NUL bytes
    /// 2. Normalize lexically: drop `.`, fold `name/..`, treat a leading `/`
    ///    as root-relative
    /// 3. Join to the root and re-derive the relative path; reject if it
    ///    begins with `..`
    ///
    /// # Errors
    ///
    /// - `MalformedArchive` for NUL bytes
    /// - `PathTraversal` when the path escapes the root
    pub fn validate(path: &Path, dest: &DestDir) -> Result<Option<Self>> {
        if has_null_bytes(path) {
            return Err(InstallError::MalformedArchive(format!(
                "entry path contains null bytes: {}",
                path.display()
            )));
        }

        let normalized = normalize_lexically(path);
        if normalized.as_os_str().is_empty() {
            return Ok(None);
        }

        let joined = dest.as_path().join(&normalized);
        let escapes = joined
            .strip_prefix(dest.as_path())
            .map_or(true, |rel| {
                matches!(rel.components().next(), Some(Component::ParentDir))
            });
        if escapes {
            return Err(InstallError::PathTraversal {
                path: path.to_path_buf(),
            });
        }

        Ok(Some(Self(normalized)))
    }

    /// Returns the path as a `&Path`.
    #[inline]
    #[must_use]
    pub fn as_path(&self) -> &Path {
        &self.0
    }

    /// Converts into the inner `PathBuf`.
    #[inline]
    #[must_use]
    pub fn into_path_buf(self) -> PathBuf {
        self.0
    }
}

/// Resolves `.` and `..` without consulting the filesystem.
///
/// Root and prefix components are dropped, so absolute inputs come back
/// root-relative. A `..` that cannot be folded is kept at the front, where
/// the containment check will see it.
pub(crate) fn normalize_lexically(path: &Path) -> PathBuf {
    let mut parts: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => parts.clear(),
            Component::CurDir => {}
            Component::ParentDir => match parts.last() {
                Some(Component::Normal(_)) => {
                    parts.pop();
                }
                _ => parts.push(component),
            },
            Component::Normal(_) => parts.push(component),
        }
    }
    parts.iter().collect()
}

#[cfg(unix)]
fn has_null_bytes(path: &Path) -> bool {
    use std::os::unix::ffi::OsStrExt;
    path.as_os_str().as_bytes().contains(&b'\0')
}

#[cfg(not(unix))]
fn has_null_bytes(path: &Path) -> bool {
    path.to_str().is_none_or(|s| s.contains('\0'))
}
