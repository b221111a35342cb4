//! Decompression backends for the package payload.
//!
//! Two interchangeable strategies sit behind [`Decompressor`]:
//!
//! - [`LibraryXz`]: in-process `liblzma` via `xz2`, bounded by a decoder
//!   memory limit
//! - [`ExternalXz`]: pipes the stream through `xz -d -c` (feature
//!   `external-tools`)
//!
//! Both consume and produce `Box<dyn Read + Send>`, so the extractor never
//! knows which one is in use. Faults raised while reading the output are
//! tagged so that [`InstallError::from_stream_io`] reports `CorruptStream`.
//!
//! [`InstallError::from_stream_io`]: crate::InstallError::from_stream_io

use std::io::Read;

use crate::Result;
use crate::config::Backend;
use crate::config::InstallConfig;

#[cfg(feature = "external-tools")]
pub mod process;
pub mod xz;

#[cfg(feature = "external-tools")]
pub use process::ExternalXz;
pub use xz::LibraryXz;

/// A boxed byte stream handed between pipeline stages.
pub type ByteStream = Box<dyn Read + Send>;

/// Turns a compressed byte stream into a decompressed one.
///
/// # Examples
///
/// ```no_run
/// use debinst_core::decompress::Decompressor;
/// use debinst_core::decompress::LibraryXz;
/// use std::fs::File;
/// use std::io::Read;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let xz = LibraryXz::default();
/// let mut tar = xz.decompress(Box::new(File::open("data.tar.xz")?))?;
/// let mut bytes = Vec::new();
/// tar.read_to_end(&mut bytes)?;
/// # Ok(())
/// # }
/// ```
pub trait Decompressor: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Wraps `input`.
    ///
    /// Errors in the compressed data are reported lazily, while reading the
    /// returned stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the decoder cannot be set up (for the external
    /// backend: the tool cannot be started).
    fn decompress(&self, input: ByteStream) -> Result<ByteStream>;
}

/// Builds the decompressor selected by `config.backend`.
///
/// # Errors
///
/// Returns `BackendUnavailable` if the external backend is selected but
/// `xz` cannot be found, or the crate was built without `external-tools`.
pub fn for_backend(config: &InstallConfig) -> Result<Box<dyn Decompressor>> {
    match config.backend {
        Backend::Library => Ok(Box::new(LibraryXz::new(config.xz_memlimit))),
        Backend::External => external(config),
    }
}

#[cfg(feature = "external-tools")]
fn external(config: &InstallConfig) -> Result<Box<dyn Decompressor>> {
    Ok(Box::new(ExternalXz::new(&config.tools)?))
}

#[cfg(not(feature = "external-tools"))]
fn external(_config: &InstallConfig) -> Result<Box<dyn Decompressor>> {
    Err(crate::InstallError::BackendUnavailable {
        tool: "xz",
        reason: "built without the external-tools feature".into(),
    })
}
