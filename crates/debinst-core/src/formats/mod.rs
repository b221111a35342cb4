//! Container and archive formats of a `.deb` package.

pub mod ar;
pub(crate) mod common;
pub mod tar;

pub use ar::ArMember;
pub use ar::ArReader;
pub use ar::locate_member;
pub use tar::TarExtractor;
pub use tar::extract_tar;
