//! Test utilities for building packages in memory.
//!
//! Used by unit tests, the integration tests and the CLI tests. Not part of
//! the supported API.
//!
//! # Panics
//!
//! All functions in this module may panic on I/O errors since they are
//! designed for test use only where panics are acceptable.

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::io::Write;

use sequoia_openpgp as openpgp;

use openpgp::armor;
use openpgp::cert::CertBuilder;
use openpgp::packet::signature::SignatureBuilder;
use openpgp::policy::StandardPolicy;
use openpgp::serialize::Serialize;
use openpgp::types::SignatureType;

use crate::formats::ar::AR_MAGIC;

/// Builder for tar payloads with arbitrary entries.
///
/// Names and link targets are written verbatim into the header, bypassing
/// the `tar` crate's own path checks, so hostile entries (`../x`, `/etc/x`,
/// root markers) can be expressed.
///
/// # Examples
///
/// ```
/// use debinst_core::test_utils::TarTestBuilder;
///
/// let tar_data = TarTestBuilder::new()
///     .add_directory("./", 0o755)
///     .add_file("./opt/app/README", b"content")
///     .add_symlink("./usr/bin/app", "/opt/app/bin/app")
///     .build();
/// ```
pub struct TarTestBuilder {
    builder: tar::Builder<Vec<u8>>,
}

impl TarTestBuilder {
    /// Creates a new tar test builder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            builder: tar::Builder::new(Vec::new()),
        }
    }

    /// Adds a regular file with mode 0644.
    #[must_use]
    pub fn add_file(self, path: &str, data: &[u8]) -> Self {
        self.add_file_with_mode(path, data, 0o644)
    }

    /// Adds a regular file with custom mode.
    #[must_use]
    pub fn add_file_with_mode(self, path: &str, data: &[u8], mode: u32) -> Self {
        self.append_raw(path, None, tar::EntryType::Regular, mode, data)
    }

    /// Adds a directory.
    #[must_use]
    pub fn add_directory(self, path: &str, mode: u32) -> Self {
        self.append_raw(path, None, tar::EntryType::Directory, mode, &[])
    }

    /// Adds a symlink.
    #[must_use]
    pub fn add_symlink(self, path: &str, target: &str) -> Self {
        self.append_raw(path, Some(target), tar::EntryType::Symlink, 0o777, &[])
    }

    /// Adds a hard link.
    #[must_use]
    pub fn add_hardlink(self, path: &str, target: &str) -> Self {
        self.append_raw(path, Some(target), tar::EntryType::Link, 0o644, &[])
    }

    /// Adds a body-less entry of any type.
    #[must_use]
    pub fn add_entry_of_type(self, path: &str, entry_type: tar::EntryType) -> Self {
        self.append_raw(path, None, entry_type, 0o644, &[])
    }

    fn append_raw(
        mut self,
        path: &str,
        link: Option<&str>,
        entry_type: tar::EntryType,
        mode: u32,
        data: &[u8],
    ) -> Self {
        let mut header = tar::Header::new_gnu();
        {
            let old = header.as_old_mut();
            old.name[..path.len()].copy_from_slice(path.as_bytes());
            if let Some(link) = link {
                old.linkname[..link.len()].copy_from_slice(link.as_bytes());
            }
        }
        header.set_entry_type(entry_type);
        header.set_mode(mode);
        header.set_size(data.len() as u64);
        header.set_mtime(1_700_000_000);
        header.set_cksum();
        self.builder.append(&header, data).unwrap();
        self
    }

    /// Builds and returns the tar archive data.
    #[must_use]
    pub fn build(self) -> Vec<u8> {
        self.builder.into_inner().unwrap()
    }
}

impl Default for TarTestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for ar containers.
///
/// # Examples
///
/// ```
/// use debinst_core::test_utils::ArBuilder;
///
/// let deb = ArBuilder::new()
///     .member("debian-binary", b"2.0\n")
///     .member("data.tar.xz", b"...")
///     .build();
/// assert!(deb.starts_with(b"!<arch>\n"));
/// ```
pub struct ArBuilder {
    data: Vec<u8>,
}

impl ArBuilder {
    /// Creates a builder holding only the magic.
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: AR_MAGIC.to_vec(),
        }
    }

    /// Appends a member in the `dpkg-deb` style (no trailing slash).
    #[must_use]
    pub fn member(self, name: &str, body: &[u8]) -> Self {
        self.raw_name(name, body)
    }

    /// Appends a member whose 16-byte name field is written as given.
    #[must_use]
    pub fn raw_name(mut self, name: &str, body: &[u8]) -> Self {
        write!(
            self.data,
            "{name:<16}{mtime:<12}{uid:<6}{gid:<6}{mode:<8}{size:<10}`\n",
            mtime = 0,
            uid = 0,
            gid = 0,
            mode = 100_644,
            size = body.len(),
        )
        .unwrap();
        self.data.extend_from_slice(body);
        if body.len() % 2 == 1 {
            self.data.push(b'\n');
        }
        self
    }

    /// Returns the container bytes.
    #[must_use]
    pub fn build(self) -> Vec<u8> {
        self.data
    }
}

impl Default for ArBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Compresses `data` into a single xz stream.
#[must_use]
pub fn xz_compress(data: &[u8]) -> Vec<u8> {
    let mut encoder = xz2::write::XzEncoder::new(Vec::new(), 6);
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Wraps a tar payload into a `.deb` layout.
///
/// Members: `debian-binary`, an empty `control.tar.xz`, and the xz-compressed
/// payload as `data.tar.xz`.
#[must_use]
pub fn build_deb(data_tar: &[u8]) -> Vec<u8> {
    let control = TarTestBuilder::new()
        .add_file("./control", b"Package: app\nVersion: 1.0\n")
        .build();
    ArBuilder::new()
        .member("debian-binary", b"2.0\n")
        .member("control.tar.xz", &xz_compress(&control))
        .member("data.tar.xz", &xz_compress(data_tar))
        .build()
}

/// A payload with `opt/app/bin/app` (0755) and `usr/share/app/icon.png`.
#[must_use]
pub fn sample_payload() -> Vec<u8> {
    TarTestBuilder::new()
        .add_directory("./", 0o755)
        .add_directory("./opt/", 0o755)
        .add_directory("./opt/app/", 0o755)
        .add_directory("./opt/app/bin/", 0o755)
        .add_file_with_mode("./opt/app/bin/app", b"#!/bin/sh\necho app\n", 0o755)
        .add_directory("./usr/", 0o755)
        .add_directory("./usr/share/", 0o755)
        .add_directory("./usr/share/app/", 0o755)
        .add_file("./usr/share/app/icon.png", b"\x89PNG\r\n\x1a\nfake-icon")
        .build()
}

/// In-memory [`Fetch`](crate::verify::Fetch) serving fixed documents.
///
/// Unknown URLs answer with HTTP 404.
#[derive(Debug, Default, Clone)]
pub struct StaticFetcher {
    documents: std::collections::HashMap<String, String>,
}

impl StaticFetcher {
    /// Creates a fetcher that serves nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves `body` at `url`.
    #[must_use]
    pub fn with(mut self, url: &str, body: impl Into<String>) -> Self {
        self.documents.insert(url.to_string(), body.into());
        self
    }
}

impl crate::verify::Fetch for StaticFetcher {
    fn fetch(&self, url: &str) -> Result<String, crate::verify::FetchError> {
        self.documents
            .get(url)
            .cloned()
            .ok_or(crate::verify::FetchError::Status { status: 404 })
    }
}

/// An OpenPGP certificate with secret keys for signing fixtures.
pub struct TestSigner {
    cert: openpgp::Cert,
}

impl TestSigner {
    /// Generates a fresh general-purpose certificate.
    #[must_use]
    pub fn generate() -> Self {
        let (cert, _revocation) =
            CertBuilder::general_purpose(None, Some("debinst tests <tests@debinst.invalid>"))
                .generate()
                .unwrap();
        Self { cert }
    }

    fn signing_key(&self) -> openpgp::crypto::KeyPair {
        let policy = StandardPolicy::new();
        self.cert
            .keys()
            .unencrypted_secret()
            .with_policy(&policy, None)
            .supported()
            .alive()
            .revoked(false)
            .for_signing()
            .next()
            .unwrap()
            .key()
            .clone()
            .into_keypair()
            .unwrap()
    }

    /// Returns the id of the key [`sign`](Self::sign) uses, as reported by
    /// the verifier.
    #[must_use]
    pub fn signing_key_id(&self) -> String {
        self.signing_key().public().keyid().to_hex()
    }

    /// Returns the public certificate as an armored keyring.
    #[must_use]
    pub fn keyring(&self) -> String {
        armored_keyring(&[self])
    }

    /// Returns an armored detached signature over `content`.
    #[must_use]
    pub fn sign(&self, content: &[u8]) -> String {
        let mut keypair = self.signing_key();
        let signature = SignatureBuilder::new(SignatureType::Binary)
            .sign_message(&mut keypair, content)
            .unwrap();

        let mut armored = Vec::new();
        let mut writer = armor::Writer::new(&mut armored, armor::Kind::Signature).unwrap();
        openpgp::Packet::from(signature).serialize(&mut writer).unwrap();
        writer.finalize().unwrap();
        String::from_utf8(armored).unwrap()
    }
}

/// Armors the public certificates of `signers` into one keyring block.
#[must_use]
pub fn armored_keyring(signers: &[&TestSigner]) -> String {
    let mut armored = Vec::new();
    let mut writer = armor::Writer::new(&mut armored, armor::Kind::PublicKey).unwrap();
    for signer in signers {
        signer.cert.serialize(&mut writer).unwrap();
    }
    writer.finalize().unwrap();
    String::from_utf8(armored).unwrap()
}
