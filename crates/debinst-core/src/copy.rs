//! Fixed-size buffered copying.
//!
//! Every byte moved between stages (member body to decoder, decoder to file,
//! staged file to final location) goes through a [`CopyBuffer`], so memory
//! use per copy is constant regardless of payload size.

use std::io::Read;
use std::io::Write;
use std::io::{self};

use crate::InstallError;

/// Buffer size for I/O operations (64KB).
const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Reusable buffer for copying.
///
/// # Examples
///
/// ```no_run
/// # use debinst_core::copy::{CopyBuffer, copy_with_buffer};
/// # use debinst_core::InstallError;
/// # fn example() -> Result<(), InstallError> {
/// let mut buffer = CopyBuffer::new();
/// let mut input = std::fs::File::open("input.bin")?;
/// let mut output = std::fs::File::create("output.bin")?;
///
/// let bytes_copied = copy_with_buffer(&mut input, &mut output, &mut buffer)?;
/// println!("Copied {bytes_copied} bytes");
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct CopyBuffer {
    #[allow(clippy::large_stack_arrays)]
    buf: [u8; COPY_BUFFER_SIZE],
}

impl CopyBuffer {
    /// Creates a new zeroed copy buffer.
    #[inline]
    #[must_use]
    #[allow(clippy::large_stack_arrays)]
    pub fn new() -> Self {
        Self {
            buf: [0u8; COPY_BUFFER_SIZE],
        }
    }

    /// Returns the buffer size in bytes.
    #[inline]
    #[must_use]
    pub fn size(&self) -> usize {
        COPY_BUFFER_SIZE
    }
}

impl Default for CopyBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Copies data from reader to writer using the provided buffer.
///
/// Read failures are classified with [`InstallError::from_stream_io`], so a
/// decoder fault surfacing mid-copy becomes `CorruptStream` rather than a
/// generic I/O error. Write failures are reported as `Io`.
///
/// # Errors
///
/// Returns an error if reading or writing fails.
#[inline]
pub fn copy_with_buffer<R: Read + ?Sized, W: Write + ?Sized>(
    reader: &mut R,
    writer: &mut W,
    buffer: &mut CopyBuffer,
) -> Result<u64, InstallError> {
    let mut total: u64 = 0;

    loop {
        let bytes_read = match reader.read(&mut buffer.buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(InstallError::from_stream_io(e)),
        };

        writer
            .write_all(&buffer.buf[..bytes_read])
            .map_err(InstallError::Io)?;

        total += bytes_read as u64;
    }

    Ok(total)
}

/// Raw I/O variant of [`copy_with_buffer`] for pump threads.
///
/// Errors are passed through untouched so that fault payloads survive the
/// trip across a thread boundary.
pub(crate) fn pump<R: Read + ?Sized, W: Write + ?Sized>(
    reader: &mut R,
    writer: &mut W,
    buffer: &mut CopyBuffer,
) -> io::Result<u64> {
    let mut total: u64 = 0;
    loop {
        let n = match reader.read(&mut buffer.buf) {
            Ok(0) => return Ok(total),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        writer.write_all(&buffer.buf[..n])?;
        total += n as u64;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::StreamFault;
    use std::io::Cursor;

    #[test]
    fn test_copy_buffer_new() {
        let buffer = CopyBuffer::new();
        assert_eq!(buffer.size(), 64 * 1024);
    }

    #[test]
    fn test_copy_empty_source() {
        let mut buffer = CopyBuffer::new();
        let mut input = Cursor::new(Vec::<u8>::new());
        let mut output = Vec::new();

        assert_eq!(
            copy_with_buffer(&mut input, &mut output, &mut buffer).unwrap(),
            0
        );
        assert!(output.is_empty());
    }

    #[test]
    fn test_copy_multiple_chunks() {
        let mut buffer = CopyBuffer::new();
        let input_data = vec![0x55u8; COPY_BUFFER_SIZE * 3 + 1000];
        let mut input = Cursor::new(&input_data);
        let mut output = Vec::new();

        let copied = copy_with_buffer(&mut input, &mut output, &mut buffer).unwrap();
        assert_eq!(copied, input_data.len() as u64);
        assert_eq!(output, input_data);
    }

    #[test]
    fn test_copy_with_interrupted_reads() {
        use std::io::Error;
        use std::io::ErrorKind;

        struct InterruptedReader {
            data: Vec<u8>,
            position: usize,
            calls: usize,
        }

        impl Read for InterruptedReader {
            fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
                self.calls += 1;
                if self.calls % 2 == 1 && self.position < self.data.len() {
                    return Err(Error::new(ErrorKind::Interrupted, "interrupted"));
                }
                let to_read = (self.data.len() - self.position).min(buf.len()).min(100);
                buf[..to_read].copy_from_slice(&self.data[self.position..self.position + to_read]);
                self.position += to_read;
                Ok(to_read)
            }
        }

        let test_data = vec![0x42u8; 1000];
        let mut reader = InterruptedReader {
            data: test_data.clone(),
            position: 0,
            calls: 0,
        };
        let mut output = Vec::new();

        copy_with_buffer(&mut reader, &mut output, &mut CopyBuffer::new()).unwrap();
        assert_eq!(output, test_data);
    }

    #[test]
    fn test_copy_classifies_decoder_fault() {
        struct FaultyReader;

        impl Read for FaultyReader {
            fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
                Err(StreamFault::Corrupt("bad block".into()).into_io())
            }
        }

        let result = copy_with_buffer(&mut FaultyReader, &mut Vec::new(), &mut CopyBuffer::new());
        assert!(matches!(result, Err(InstallError::CorruptStream(_))));
    }

    #[test]
    fn test_pump_keeps_raw_error() {
        struct FaultyReader;

        impl Read for FaultyReader {
            fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
                Err(StreamFault::Archive("short".into()).into_io())
            }
        }

        let err = pump(&mut FaultyReader, &mut Vec::new(), &mut CopyBuffer::new()).unwrap_err();
        assert!(matches!(
            InstallError::from_stream_io(err),
            InstallError::MalformedArchive(_)
        ));
    }
}
