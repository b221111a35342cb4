//! Confined symlink type.

use crate::InstallError;
use crate::Result;
use std::path::Component;
use std::path::Path;
use std::path::PathBuf;

use super::SafePath;
use super::safe_path::normalize_lexically;

/// A symlink whose target cannot leave the destination root.
///
/// # Security Properties
///
/// - Can ONLY be constructed through [`SafeSymlink::validate`]
/// - The target never contains `..`
/// - Absolute targets are kept root-relative and only turned into a relative
///   path once the directory the link really lands in is known, so the link
///   resolves the same way in staging and after promotion
///
/// # Examples
///
/// ```no_run
/// use debinst_core::types::DestDir;
/// use debinst_core::types::SafePath;
/// use debinst_core::types::SafeSymlink;
/// use std::path::Path;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let dest = DestDir::new("/tmp")?;
/// let link = SafePath::validate(Path::new("usr/bin/tool"), &dest)?.unwrap();
///
/// let symlink = SafeSymlink::validate(&link, Path::new("/opt/app/tool"))?;
/// assert_eq!(symlink.target_for_depth(2), Path::new("../../opt/app/tool"));
///
/// assert!(SafeSymlink::validate(&link, Path::new("../../etc/passwd")).is_err());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafeSymlink {
    link_path: PathBuf,
    target: PathBuf,
    absolute: bool,
}

impl SafeSymlink {
    /// Validates a symlink target for the given link location.
    ///
    /// # Errors
    ///
    /// - `MalformedArchive` if the target is empty or contains NUL bytes
    /// - `SymlinkEscape` if the target has any `..` component
    pub fn validate(link: &SafePath, target: &Path) -> Result<Self> {
        if target.as_os_str().is_empty() {
            return Err(InstallError::MalformedArchive(format!(
                "symlink {} has an empty target",
                link.as_path().display()
            )));
        }

        if target.to_string_lossy().contains('\0') {
            return Err(InstallError::MalformedArchive(format!(
                "symlink {} target contains null bytes",
                link.as_path().display()
            )));
        }

        if target.components().any(|c| c == Component::ParentDir) {
            return Err(InstallError::SymlinkEscape {
                path: link.as_path().to_path_buf(),
                target: target.to_path_buf(),
            });
        }

        let absolute = target.has_root();
        let target = if absolute {
            normalize_lexically(target)
        } else {
            target.to_path_buf()
        };

        Ok(Self {
            link_path: link.as_path().to_path_buf(),
            target,
            absolute,
        })
    }

    /// Returns the root-relative location of the link itself.
    #[inline]
    #[must_use]
    pub fn link_path(&self) -> &Path {
        &self.link_path
    }

    /// Returns the target as recorded: unchanged when relative, relative to
    /// the root when it was absolute.
    #[inline]
    #[must_use]
    pub fn target_path(&self) -> &Path {
        &self.target
    }

    /// Returns the target to write into a link whose real parent sits
    /// `parent_depth` directories below the root.
    ///
    /// `usr/bin/tool -> /opt/app/tool` at depth 2 becomes
    /// `../../opt/app/tool`. Relative targets are returned unchanged.
    #[must_use]
    pub fn target_for_depth(&self, parent_depth: usize) -> PathBuf {
        if !self.absolute {
            return self.target.clone();
        }

        let mut rebased = PathBuf::new();
        for _ in 0..parent_depth {
            rebased.push("..");
        }
        rebased.push(&self.target);
        if rebased.as_os_str().is_empty() {
            rebased.push(".");
        }
        rebased
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::DestDir;
    use tempfile::TempDir;

    fn create_test_dest() -> (TempDir, DestDir) {
        let temp = TempDir::new().expect("failed to create temp dir");
        let dest = DestDir::new(temp.path()).expect("failed to create dest");
        (temp, dest)
    }

    fn link(raw: &str, dest: &DestDir) -> SafePath {
        SafePath::validate(Path::new(raw), dest).unwrap().unwrap()
    }

    #[test]
    fn test_relative_target_kept() {
        let (_temp, dest) = create_test_dest();
        let symlink =
            SafeSymlink::validate(&link("usr/bin/tool", &dest), Path::new("tool-1.2")).unwrap();
        assert_eq!(symlink.link_path(), Path::new("usr/bin/tool"));
        assert_eq!(symlink.target_path(), Path::new("tool-1.2"));
    }

    #[test]
    fn test_parent_component_rejected() {
        let (_temp, dest) = create_test_dest();
        let link = link("bin/tool", &dest);
        for target in ["../../etc/passwd", "../sibling", "a/../b", "/opt/../etc"] {
            let result = SafeSymlink::validate(&link, Path::new(target));
            assert!(
                matches!(result, Err(InstallError::SymlinkEscape { .. })),
                "should reject {target}"
            );
        }
    }

    #[test]
    fn test_absolute_target_rebased() {
        let (_temp, dest) = create_test_dest();
        let symlink =
            SafeSymlink::validate(&link("usr/bin/tool", &dest), Path::new("/opt/app/tool"))
                .unwrap();
        assert_eq!(symlink.target_path(), Path::new("opt/app/tool"));
        assert_eq!(symlink.target_for_depth(2), Path::new("../../opt/app/tool"));
        assert_eq!(symlink.target_for_depth(0), Path::new("opt/app/tool"));
    }

    #[test]
    fn test_relative_target_ignores_depth() {
        let (_temp, dest) = create_test_dest();
        let symlink =
            SafeSymlink::validate(&link("usr/bin/tool", &dest), Path::new("tool-1.2")).unwrap();
        assert_eq!(symlink.target_for_depth(5), Path::new("tool-1.2"));
    }

    #[test]
    fn test_target_to_root_itself() {
        let (_temp, dest) = create_test_dest();
        let symlink = SafeSymlink::validate(&link("usr/root", &dest), Path::new("/")).unwrap();
        assert_eq!(symlink.target_for_depth(1), Path::new(".."));
        assert_eq!(symlink.target_for_depth(0), Path::new("."));
    }

    #[test]
    fn test_empty_target_malformed() {
        let (_temp, dest) = create_test_dest();
        let result = SafeSymlink::validate(&link("bin/tool", &dest), Path::new(""));
        assert!(matches!(result, Err(InstallError::MalformedArchive(_))));
    }
}
