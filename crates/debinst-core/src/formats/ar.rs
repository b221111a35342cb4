//! Unix `ar` container reading.
//!
//! A `.deb` is an ar container: the 8-byte magic `!<arch>\n` followed by
//! members, each introduced by a fixed 60-byte ASCII header. Only the parts
//! needed to find one member by name are implemented:
//!
//! | bytes  | field                                  |
//! |--------|----------------------------------------|
//! | 0..16  | name, padded with spaces (GNU adds `/`) |
//! | 48..58 | body size, ASCII decimal               |
//! | 58..60 | terminator `` `\n ``                   |
//!
//! Bodies with an odd size are followed by one padding byte.

use std::io::ErrorKind;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use std::io::Take;

use crate::InstallError;
use crate::Result;

/// Global header of every ar container.
pub const AR_MAGIC: &[u8; 8] = b"!<arch>\n";

const HEADER_LEN: usize = 60;
const HEADER_TERMINATOR: &[u8; 2] = b"`\n";

/// Reader bounded to exactly one member's body.
pub type MemberReader<R> = Take<R>;

/// One member header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArMember {
    /// Member name with trailing spaces and slashes removed.
    pub name: String,
    /// Body size in bytes, excluding padding.
    pub size: u64,
    /// Offset of the first body byte within the container.
    pub body_offset: u64,
}

impl ArMember {
    /// Bytes occupied by the body including the padding byte.
    #[must_use]
    pub const fn padded_size(&self) -> u64 {
        self.size + (self.size & 1)
    }
}

/// An ar container whose magic has been checked.
///
/// [`ArReader::locate`] consumes the reader: the scan is a single forward
/// pass.
///
/// # Examples
///
/// ```no_run
/// use debinst_core::formats::ArReader;
/// use std::fs::File;
/// use std::io::Read;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let file = File::open("app_1.0_amd64.deb")?;
/// let mut payload = ArReader::new(file)?.locate("data.tar.xz")?;
///
/// let mut compressed = Vec::new();
/// payload.read_to_end(&mut compressed)?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ArReader<R> {
    source: R,
}

impl<R: Read + Seek> ArReader<R> {
    /// Reads and checks the container magic.
    ///
    /// # Errors
    ///
    /// Returns `MalformedArchive` if the source does not start with
    /// `!<arch>\n`.
    pub fn new(mut source: R) -> Result<Self> {
        let mut magic = [0u8; AR_MAGIC.len()];
        source.read_exact(&mut magic).map_err(|e| {
            if e.kind() == ErrorKind::UnexpectedEof {
                InstallError::MalformedArchive("file too short for ar magic".into())
            } else {
                InstallError::Io(e)
            }
        })?;

        if &magic != AR_MAGIC {
            return Err(InstallError::MalformedArchive(
                "not an ar archive (bad magic)".into(),
            ));
        }

        Ok(Self { source })
    }

    /// Returns a reader over the body of the named member.
    ///
    /// # Errors
    ///
    /// See [`locate_member`].
    pub fn locate(self, name: &str) -> Result<MemberReader<R>> {
        locate_member(self.source, name)
    }
}

/// Scans an ar container for `name` and bounds the source to its body.
///
/// `source` must be positioned just past the magic. It is consumed by the
/// scan.
///
/// # Errors
///
/// - `MemberNotFound` if the container ends cleanly before `name` is seen
/// - `MalformedHeader` if a header is truncated, has a non-decimal size or
///   lacks its terminator
/// - `Io` if reading or seeking fails
pub fn locate_member<R: Read + Seek>(mut source: R, name: &str) -> Result<MemberReader<R>> {
    while let Some(member) = read_header(&mut source)? {
        if member.name == name {
            tracing::debug!(
                member = %member.name,
                size = member.size,
                offset = member.body_offset,
                "located ar member"
            );
            return Ok(source.take(member.size));
        }

        tracing::debug!(member = %member.name, size = member.size, "skipping ar member");
        skip_body(&mut source, &member)?;
    }

    Err(InstallError::MemberNotFound {
        member: name.to_string(),
    })
}

/// Reads the next header. `Ok(None)` on a clean end of stream.
fn read_header<R: Read + Seek>(source: &mut R) -> Result<Option<ArMember>> {
    let offset = source.stream_position()?;
    let mut header = [0u8; HEADER_LEN];

    let filled = read_full(source, &mut header)?;
    if filled == 0 {
        return Ok(None);
    }
    if filled < HEADER_LEN {
        return Err(InstallError::MalformedHeader {
            offset,
            reason: format!("truncated header ({filled} of {HEADER_LEN} bytes)"),
        });
    }

    if &header[58..60] != HEADER_TERMINATOR {
        return Err(InstallError::MalformedHeader {
            offset,
            reason: "missing header terminator".into(),
        });
    }

    let name = String::from_utf8_lossy(&header[0..16])
        .trim_end_matches([' ', '/'])
        .to_string();

    let size = std::str::from_utf8(&header[48..58])
        .ok()
        .map(str::trim)
        .and_then(|field| field.parse::<u64>().ok())
        .ok_or_else(|| InstallError::MalformedHeader {
            offset,
            reason: format!(
                "size field is not a decimal number: {:?}",
                String::from_utf8_lossy(&header[48..58])
            ),
        })?;

    Ok(Some(ArMember {
        name,
        size,
        body_offset: offset + HEADER_LEN as u64,
    }))
}

fn skip_body<R: Seek>(source: &mut R, member: &ArMember) -> Result<()> {
    let skip = i64::try_from(member.padded_size()).map_err(|_| InstallError::MalformedHeader {
        offset: member.body_offset - HEADER_LEN as u64,
        reason: format!("member size {} out of range", member.size),
    })?;
    source.seek(SeekFrom::Current(skip))?;
    Ok(())
}

/// Like `read_exact`, but reports how much was read instead of failing on
/// a short read.
fn read_full<R: Read>(source: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
