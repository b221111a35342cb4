//! OpenPGP detached signatures over package bytes.

use std::fmt;

use sequoia_openpgp as openpgp;

use openpgp::Cert;
use openpgp::KeyHandle;
use openpgp::cert::CertParser;
use openpgp::parse::Parse;
use openpgp::parse::stream::DetachedVerifierBuilder;
use openpgp::parse::stream::GoodChecksum;
use openpgp::parse::stream::MessageLayer;
use openpgp::parse::stream::MessageStructure;
use openpgp::parse::stream::VerificationHelper;
use openpgp::policy::StandardPolicy;
use tracing::debug;
use tracing::info;

use super::Fetch;
use super::HttpFetcher;
use super::SignatureVerifier;
use super::Verified;
use crate::InstallError;
use crate::Result;
use crate::config::NetConfig;

const ARMOR_BEGIN: &str = "-----BEGIN ";
const SIGNATURE_ARMOR: &str = "-----BEGIN PGP SIGNATURE-----";

/// Parses every certificate in an armored or binary keyring.
///
/// Certificates that do not parse are skipped.
///
/// # Examples
///
/// ```
/// use debinst_core::verify::pgp::parse_keyring;
///
/// assert!(parse_keyring("not a keyring\n").is_empty());
/// ```
#[must_use]
pub fn parse_keyring(text: &str) -> Vec<Cert> {
    let parser = match CertParser::from_bytes(text.as_bytes()) {
        Ok(parser) => parser,
        Err(e) => {
            debug!(error = %e, "keyring is not OpenPGP data");
            return Vec::new();
        }
    };

    parser
        .filter_map(|cert| match cert {
            Ok(cert) => Some(cert),
            Err(e) => {
                debug!(error = %e, "skipping unparseable certificate");
                None
            }
        })
        .collect()
}

/// Returns the first armor header line of `text`, if any.
fn armor_header(text: &str) -> Option<&str> {
    text.lines().map(str::trim).find(|line| line.starts_with(ARMOR_BEGIN))
}

/// Checks `content` against an armored detached signature.
///
/// # Errors
///
/// - `UnexpectedSignatureFormat` if `armored` is not a `PGP SIGNATURE`
///   armor block or its packets do not parse
/// - `SignatureInvalid` if no key in `keys` made a good signature
pub fn verify_with_keys(content: &[u8], armored: &str, keys: &[Cert]) -> Result<Verified> {
    match armor_header(armored) {
        Some(SIGNATURE_ARMOR) => {}
        Some(other) => {
            return Err(InstallError::UnexpectedSignatureFormat(format!(
                "expected a detached signature block, found `{other}`"
            )));
        }
        None => {
            return Err(InstallError::UnexpectedSignatureFormat(
                "not an ASCII-armored OpenPGP signature".into(),
            ));
        }
    }

    let policy = StandardPolicy::new();
    let helper = KeyringHelper {
        keys,
        signer: None,
        failures: Vec::new(),
    };
    let mut verifier = DetachedVerifierBuilder::from_bytes(armored.as_bytes())
        .and_then(|builder| builder.with_policy(&policy, None, helper))
        .map_err(|e| InstallError::UnexpectedSignatureFormat(e.to_string()))?;

    let outcome = verifier.verify_bytes(content);
    let helper = verifier.into_helper();
    match (outcome, helper.signer) {
        (Ok(()), Some(key_id)) => Ok(Verified { key_id }),
        (result, _) => {
            let mut reason = format!(
                "no trusted key among {} certificate(s) made a good signature",
                keys.len()
            );
            if let Some(last) = helper.failures.last() {
                reason.push_str(&format!(" (last error: {last})"));
            } else if let Err(e) = result {
                reason.push_str(&format!(" ({e})"));
            }
            Err(InstallError::SignatureInvalid(reason))
        }
    }
}

/// Hands the trusted keyring to the streaming verifier and records which key
/// made the first good signature.
struct KeyringHelper<'k> {
    keys: &'k [Cert],
    signer: Option<String>,
    failures: Vec<String>,
}

impl VerificationHelper for KeyringHelper<'_> {
    fn get_certs(&mut self, _ids: &[KeyHandle]) -> openpgp::Result<Vec<Cert>> {
        Ok(self.keys.to_vec())
    }

    fn check(&mut self, structure: MessageStructure) -> openpgp::Result<()> {
        for layer in structure {
            if let MessageLayer::SignatureGroup { results } = layer {
                for result in results {
                    match result {
                        Ok(GoodChecksum { ka, .. }) => {
                            self.signer = Some(ka.key().keyid().to_hex());
                            return Ok(());
                        }
                        Err(e) => {
                            debug!(error = %e, "signature not accepted");
                            self.failures.push(e.to_string());
                        }
                    }
                }
            }
        }

        Err(openpgp::Error::InvalidOperation("no good signature".into()).into())
    }
}

/// Verifies OpenPGP detached signatures against a keyring fetched per call.
///
/// Neither keyring nor signature is cached: every [`verify`] fetches both.
///
/// [`verify`]: SignatureVerifier::verify
pub struct PgpVerifier {
    key_url: String,
    fetcher: Box<dyn Fetch>,
}

impl fmt::Debug for PgpVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgpVerifier")
            .field("key_url", &self.key_url)
            .finish_non_exhaustive()
    }
}

impl PgpVerifier {
    /// Creates a verifier reading the keyring at `key_url` through `fetcher`.
    pub fn new(key_url: impl Into<String>, fetcher: impl Fetch + 'static) -> Self {
        Self {
            key_url: key_url.into(),
            fetcher: Box::new(fetcher),
        }
    }

    /// Creates a verifier over HTTP.
    ///
    /// # Errors
    ///
    /// Returns `KeyFetchFailed` if the HTTP client cannot be built.
    pub fn with_http(key_url: impl Into<String>, net: &NetConfig) -> Result<Self> {
        let key_url = key_url.into();
        let fetcher = HttpFetcher::new(net).map_err(|e| InstallError::KeyFetchFailed {
            url: key_url.clone(),
            reason: e.to_string(),
        })?;
        Ok(Self::new(key_url, fetcher))
    }

    /// Returns the keyring location.
    #[must_use]
    pub fn key_url(&self) -> &str {
        &self.key_url
    }

    fn load_keyring(&self) -> Result<Vec<Cert>> {
        let text = self
            .fetcher
            .fetch(&self.key_url)
            .map_err(|e| InstallError::KeyFetchFailed {
                url: self.key_url.clone(),
                reason: e.to_string(),
            })?;

        let keys = parse_keyring(&text);
        if keys.is_empty() {
            return Err(InstallError::KeyFetchFailed {
                url: self.key_url.clone(),
                reason: "document contains no OpenPGP certificate".into(),
            });
        }
        debug!(count = keys.len(), "loaded trusted certificates");
        Ok(keys)
    }
}

impl SignatureVerifier for PgpVerifier {
    fn verify(&self, content: &[u8], signature_url: &str) -> Result<Verified> {
        let keys = self.load_keyring()?;

        let text = self
            .fetcher
            .fetch(signature_url)
            .map_err(|e| InstallError::SignatureFetchFailed {
                url: signature_url.to_string(),
                reason: e.to_string(),
            })?;

        let verified = verify_with_keys(content, &text, &keys).map_err(|e| match e {
            InstallError::UnexpectedSignatureFormat(reason) => {
                InstallError::UnexpectedSignatureFormat(format!("{signature_url}: {reason}"))
            }
            other => other,
        })?;
        info!(key_id = %verified.key_id, bytes = content.len(), "signature verified");
        Ok(verified)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::test_utils::StaticFetcher;
    use crate::test_utils::TestSigner;
    use crate::test_utils::armored_keyring;

    const KEY_URL: &str = "https://example.invalid/release.asc";
    const SIG_URL: &str = "https://example.invalid/app.deb.asc";

    fn verifier(keyring: String, signature: Option<String>) -> PgpVerifier {
        let mut fetcher = StaticFetcher::new().with(KEY_URL, keyring);
        if let Some(signature) = signature {
            fetcher = fetcher.with(SIG_URL, signature);
        }
        PgpVerifier::new(KEY_URL, fetcher)
    }

    #[test]
    fn test_valid_signature_reports_signing_key() {
        let signer = TestSigner::generate();
        let content = b"package bytes";

        let verified = verifier(signer.keyring(), Some(signer.sign(content)))
            .verify(content, SIG_URL)
            .unwrap();
        assert_eq!(verified.key_id, signer.signing_key_id());
        assert_eq!(verified.key_id.len(), 16);
    }

    #[test]
    fn test_any_certificate_in_keyring_may_sign() {
        let other = TestSigner::generate();
        let signer = TestSigner::generate();
        let content = b"package bytes";
        let keyring = armored_keyring(&[&other, &signer]);

        assert_eq!(parse_keyring(&keyring).len(), 2);
        let result = verifier(keyring, Some(signer.sign(content))).verify(content, SIG_URL);
        assert!(result.is_ok(), "{result:?}");
    }

    #[test]
    fn test_tampered_content_rejected() {
        let signer = TestSigner::generate();
        let signature = signer.sign(b"original");

        let result = verifier(signer.keyring(), Some(signature)).verify(b"tampered", SIG_URL);
        assert!(matches!(result, Err(InstallError::SignatureInvalid(_))));
    }

    #[test]
    fn test_untrusted_key_rejected() {
        let trusted = TestSigner::generate();
        let attacker = TestSigner::generate();
        let content = b"package bytes";

        let result = verifier(trusted.keyring(), Some(attacker.sign(content)))
            .verify(content, SIG_URL);
        assert!(matches!(result, Err(InstallError::SignatureInvalid(_))));
    }

    #[test]
    fn test_key_block_as_signature_is_unexpected_format() {
        let signer = TestSigner::generate();

        let result = verifier(signer.keyring(), Some(signer.keyring())).verify(b"x", SIG_URL);
        match result {
            Err(InstallError::UnexpectedSignatureFormat(reason)) => {
                assert!(reason.contains("PGP PUBLIC KEY BLOCK"), "{reason}");
            }
            other => panic!("expected UnexpectedSignatureFormat, got {other:?}"),
        }
    }

    #[test]
    fn test_unarmored_signature_is_unexpected_format() {
        let signer = TestSigner::generate();
        let result = verifier(signer.keyring(), Some("iQEzBAABCAAdFiEE\n".into()))
            .verify(b"x", SIG_URL);
        assert!(matches!(result, Err(InstallError::UnexpectedSignatureFormat(_))));
    }

    #[test]
    fn test_missing_signature_is_fetch_failure() {
        let signer = TestSigner::generate();
        let result = verifier(signer.keyring(), None).verify(b"x", SIG_URL);
        assert!(matches!(
            result,
            Err(InstallError::SignatureFetchFailed { ref url, .. }) if url == SIG_URL
        ));
    }

    #[test]
    fn test_keyring_without_certificates() {
        let result = verifier("not a key\n".to_string(), None).verify(b"x", SIG_URL);
        assert!(matches!(result, Err(InstallError::KeyFetchFailed { .. })));
    }

    #[test]
    fn test_unreachable_keyring() {
        let verifier = PgpVerifier::new(KEY_URL, StaticFetcher::new());
        let result = verifier.verify(b"x", SIG_URL);
        assert!(matches!(
            result,
            Err(InstallError::KeyFetchFailed { ref url, .. }) if url == KEY_URL
        ));
    }

    #[test]
    fn test_armor_header_detection() {
        assert_eq!(
            armor_header("\n  -----BEGIN PGP SIGNATURE-----\n\nabc\n"),
            Some(SIGNATURE_ARMOR)
        );
        assert_eq!(armor_header("plain text"), None);
    }
}
