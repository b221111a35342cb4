//! Error types for package verification, extraction and installation.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using `InstallError`.
pub type Result<T> = std::result::Result<T, InstallError>;

/// Errors that can occur while installing a signed package.
#[derive(Error, Debug)]
pub enum InstallError {
    /// An input path or name was empty or otherwise unusable.
    #[error("invalid input: {0}")]
    BadInput(String),

    /// Archive entry resolves outside the destination root.
    #[error("path traversal detected: {path}")]
    PathTraversal {
        /// The entry path as stored in the archive.
        path: PathBuf,
    },

    /// Symlink target would leave the destination root.
    #[error("invalid symlink target: {path} -> {target}")]
    SymlinkEscape {
        /// The symlink path.
        path: PathBuf,
        /// The rejected target.
        target: PathBuf,
    },

    /// The requested member is not present in the ar container.
    #[error("member {member:?} not found in archive")]
    MemberNotFound {
        /// Name of the missing member.
        member: String,
    },

    /// An ar member header could not be parsed.
    #[error("malformed ar header at offset {offset}: {reason}")]
    MalformedHeader {
        /// Byte offset of the header within the container.
        offset: u64,
        /// What was wrong with it.
        reason: String,
    },

    /// Archive structure is corrupted or invalid.
    #[error("malformed archive: {0}")]
    MalformedArchive(String),

    /// Compressed payload could not be decoded.
    #[error("corrupt compressed stream: {0}")]
    CorruptStream(String),

    /// A required external utility is missing or cannot be started.
    #[error("{tool} backend unavailable: {reason}")]
    BackendUnavailable {
        /// Name of the utility.
        tool: &'static str,
        /// Why it could not be used.
        reason: String,
    },

    /// The signature does not match the archive under any trusted key.
    #[error("signature invalid: {0}")]
    SignatureInvalid(String),

    /// The trusted keyring could not be fetched or decoded.
    #[error("failed to fetch signing key from {url}: {reason}")]
    KeyFetchFailed {
        /// Keyring location.
        url: String,
        /// Underlying failure.
        reason: String,
    },

    /// The detached signature could not be fetched.
    #[error("failed to fetch signature from {url}: {reason}")]
    SignatureFetchFailed {
        /// Signature location.
        url: String,
        /// Underlying failure.
        reason: String,
    },

    /// The fetched document is not a detached signature.
    #[error("unexpected signature format: {0}")]
    UnexpectedSignatureFormat(String),

    /// I/O operation failed while staging or promoting files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The operation was cancelled by an interruption request.
    #[error("operation interrupted")]
    Interrupted,
}

impl InstallError {
    /// Returns `true` if this error represents a containment violation.
    ///
    /// # Examples
    ///
    /// ```
    /// use debinst_core::InstallError;
    /// use std::path::PathBuf;
    ///
    /// let err = InstallError::PathTraversal {
    ///     path: PathBuf::from("../etc/passwd"),
    /// };
    /// assert!(err.is_security_violation());
    ///
    /// let err = InstallError::Interrupted;
    /// assert!(!err.is_security_violation());
    /// ```
    #[must_use]
    pub const fn is_security_violation(&self) -> bool {
        matches!(self, Self::PathTraversal { .. } | Self::SymlinkEscape { .. })
    }

    /// Returns `true` if the package could not be authenticated.
    #[must_use]
    pub const fn is_trust_failure(&self) -> bool {
        matches!(
            self,
            Self::SignatureInvalid(_)
                | Self::KeyFetchFailed { .. }
                | Self::SignatureFetchFailed { .. }
                | Self::UnexpectedSignatureFormat(_)
        )
    }

    /// Returns `true` if the package bytes are structurally broken.
    #[must_use]
    pub const fn is_malformed(&self) -> bool {
        matches!(
            self,
            Self::MalformedHeader { .. } | Self::MalformedArchive(_) | Self::CorruptStream(_)
        )
    }

    /// Returns a context string for this error, if available.
    ///
    /// # Examples
    ///
    /// ```
    /// use debinst_core::InstallError;
    ///
    /// let err = InstallError::MalformedArchive("bad header".to_string());
    /// assert_eq!(err.context(), Some("bad header"));
    ///
    /// let err = InstallError::Interrupted;
    /// assert_eq!(err.context(), None);
    /// ```
    #[must_use]
    pub fn context(&self) -> Option<&str> {
        match self {
            Self::BadInput(msg)
            | Self::MalformedArchive(msg)
            | Self::CorruptStream(msg)
            | Self::SignatureInvalid(msg)
            | Self::UnexpectedSignatureFormat(msg) => Some(msg),
            Self::MalformedHeader { reason, .. }
            | Self::BackendUnavailable { reason, .. }
            | Self::KeyFetchFailed { reason, .. }
            | Self::SignatureFetchFailed { reason, .. } => Some(reason),
            _ => None,
        }
    }

    /// Classifies an I/O error raised while reading a member or decompressed
    /// stream.
    ///
    /// Decoders attach a [`StreamFault`] payload to the errors they raise.
    /// The `tar` crate wraps reader errors in its own type, so the payload is
    /// searched for along the whole chain. Errors without one stay `Io`.
    #[must_use]
    pub fn from_stream_io(err: std::io::Error) -> Self {
        match find_stream_fault(&err) {
            Some(StreamFault::Corrupt(msg)) => Self::CorruptStream(msg.clone()),
            Some(StreamFault::Archive(msg)) => Self::MalformedArchive(msg.clone()),
            Some(StreamFault::MissingMember(member)) => Self::MemberNotFound {
                member: member.clone(),
            },
            None => Self::Io(err),
        }
    }
}

/// Marker payload for I/O errors produced by a decoding stage.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub(crate) enum StreamFault {
    /// The compressed data is invalid.
    #[error("{0}")]
    Corrupt(String),
    /// The container could not be read.
    #[error("{0}")]
    Archive(String),
    /// The container has no member of this name.
    #[error("member {0:?} not found in archive")]
    MissingMember(String),
}

impl StreamFault {
    pub(crate) fn into_io(self) -> std::io::Error {
        std::io::Error::new(std::io::ErrorKind::InvalidData, self)
    }
}

fn find_stream_fault(err: &std::io::Error) -> Option<&StreamFault> {
    let mut current: Option<&(dyn std::error::Error + 'static)> = err
        .get_ref()
        .map(|inner| inner as &(dyn std::error::Error + 'static));

    while let Some(e) = current {
        if let Some(fault) = e.downcast_ref::<StreamFault>() {
            return Some(fault);
        }
        // io::Error::source() skips its own payload, so unwrap it explicitly.
        current = match e.downcast_ref::<std::io::Error>() {
            Some(io) => io
                .get_ref()
                .map(|inner| inner as &(dyn std::error::Error + 'static)),
            None => e.source(),
        };
    }
    None
}
