//! Detached-signature verification of package bytes.
//!
//! Nothing is extracted before a [`SignatureVerifier`] accepts the exact bytes
//! that will later be unpacked. Production code uses [`PgpVerifier`] over
//! [`HttpFetcher`]; tests substitute in-memory fetchers or their own
//! verifier.

pub mod fetch;
pub mod pgp;

pub use fetch::Fetch;
pub use fetch::FetchError;
pub use fetch::HttpFetcher;
pub use pgp::PgpVerifier;

use crate::Result;

/// Outcome of a successful verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verified {
    /// Id of the key that accepted the signature.
    pub key_id: String,
}

/// Checks a detached signature over a byte buffer.
pub trait SignatureVerifier: Send + Sync {
    /// Fetches the signature at `signature_url` and checks it against
    /// `content`.
    ///
    /// # Errors
    ///
    /// Returns `KeyFetchFailed`, `SignatureFetchFailed`,
    /// `UnexpectedSignatureFormat` or `SignatureInvalid`.
    fn verify(&self, content: &[u8], signature_url: &str) -> Result<Verified>;
}
