//! Type-safe wrappers for confined extraction.
//!
//! Every path that reaches the filesystem during extraction passes through
//! one of these types. They are validated on construction and have no
//! `From<PathBuf>` implementations.

pub mod dest_dir;
pub mod entry;
pub mod safe_path;
pub mod safe_symlink;

pub use dest_dir::DestDir;
pub use entry::EntryKind;
pub use entry::TarEntry;
pub use safe_path::SafePath;
pub use safe_symlink::SafeSymlink;
