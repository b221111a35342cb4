//! In-process xz decoding.

use std::io::ErrorKind;
use std::io::Read;
use std::io::{self};

use xz2::read::XzDecoder;
use xz2::stream::CONCATENATED;
use xz2::stream::Stream;

use super::ByteStream;
use super::Decompressor;
use crate::InstallError;
use crate::Result;
use crate::error::StreamFault;

/// Default decoder memory limit (256 MiB).
pub const DEFAULT_MEMLIMIT: u64 = 256 * 1024 * 1024;

/// `liblzma` decoder with a memory limit.
///
/// Concatenated streams are accepted, as `xz -d` does.
#[derive(Debug, Clone, Copy)]
pub struct LibraryXz {
    memlimit: u64,
}

impl LibraryXz {
    /// Creates a decoder factory with the given memory limit in bytes.
    #[must_use]
    pub const fn new(memlimit: u64) -> Self {
        Self { memlimit }
    }

    /// Returns the memory limit.
    #[must_use]
    pub const fn memlimit(&self) -> u64 {
        self.memlimit
    }
}

impl Default for LibraryXz {
    fn default() -> Self {
        Self::new(DEFAULT_MEMLIMIT)
    }
}

impl Decompressor for LibraryXz {
    fn name(&self) -> &'static str {
        "library-xz"
    }

    fn decompress(&self, input: ByteStream) -> Result<ByteStream> {
        let stream = Stream::new_stream_decoder(self.memlimit, CONCATENATED).map_err(|e| {
            InstallError::CorruptStream(format!("failed to initialise xz decoder: {e}"))
        })?;
        Ok(Box::new(TaggedXz {
            inner: XzDecoder::new_stream(input, stream),
        }))
    }
}

/// Marks decoder failures as [`StreamFault::Corrupt`].
///
/// Errors coming from the wrapped input are passed through unchanged.
struct TaggedXz<R: Read> {
    inner: XzDecoder<R>,
}

impl<R: Read> Read for TaggedXz<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf).map_err(|e| {
            let from_decoder = e
                .get_ref()
                .is_some_and(|inner| inner.is::<xz2::stream::Error>());
            if from_decoder {
                StreamFault::Corrupt(format!("xz: {e}")).into_io()
            } else if e.kind() == ErrorKind::UnexpectedEof {
                StreamFault::Corrupt("xz: truncated input".into()).into_io()
            } else {
                e
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_utils::xz_compress;
    use std::io::Cursor;

    fn decode(xz: &LibraryXz, data: Vec<u8>) -> std::result::Result<Vec<u8>, InstallError> {
        let mut out = xz.decompress(Box::new(Cursor::new(data)))?;
        let mut buf = Vec::new();
        out.read_to_end(&mut buf)
            .map_err(InstallError::from_stream_io)?;
        Ok(buf)
    }

    #[test]
    fn test_decode_roundtrip() {
        let payload = b"tar payload bytes".repeat(1000);
        let decoded = decode(&LibraryXz::default(), xz_compress(&payload)).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_concatenated_streams() {
        let mut data = xz_compress(b"first-");
        data.extend(xz_compress(b"second"));
        assert_eq!(decode(&LibraryXz::default(), data).unwrap(), b"first-second");
    }

    #[test]
    fn test_garbage_is_corrupt() {
        let result = decode(&LibraryXz::default(), b"definitely not xz".to_vec());
        assert!(matches!(result, Err(InstallError::CorruptStream(_))));
    }

    #[test]
    fn test_truncated_is_corrupt() {
        let mut data = xz_compress(&b"x".repeat(10_000));
        data.truncate(data.len() / 2);
        let result = decode(&LibraryXz::default(), data);
        assert!(matches!(result, Err(InstallError::CorruptStream(_))));
    }

    #[test]
    fn test_checksum_mismatch_is_corrupt() {
        let mut data = xz_compress(b"checked payload");
        // One-record index and footer take the last 20 bytes; the CRC64 of
        // the block sits right before them.
        let len = data.len();
        data[len - 21] ^= 0xff;
        let result = decode(&LibraryXz::default(), data);
        assert!(matches!(result, Err(InstallError::CorruptStream(_))));
    }

    #[test]
    fn test_memlimit_violation_is_corrupt() {
        let result = decode(&LibraryXz::new(1024), xz_compress(b"needs a dictionary"));
        assert!(matches!(result, Err(InstallError::CorruptStream(_))));
    }

    #[test]
    fn test_input_errors_pass_through() {
        struct Failing;

        impl Read for Failing {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::new(ErrorKind::PermissionDenied, "denied"))
            }
        }

        let mut out = LibraryXz::default().decompress(Box::new(Failing)).unwrap();
        let err = out.read_to_end(&mut Vec::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    }
}
