//! Checksum parsing and code-signing verification (§4.4.1 steps 3-4).
//!
//! The signature check is delegated to a pluggable [`SignatureVerifier`] so
//! the chain-of-trust root can be supplied by the caller rather than baked
//! into the crate.

use sha2::{Digest, Sha256};

use crate::error::{ChromiumError, Result};

/// A single `sha256  filename` line from a `SHA256SUMS` manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumEntry {
    pub filename: String,
    pub sha256_hex: String,
}

/// Parse a `SHA256SUMS`-style manifest. Each non-blank line must be a
/// 64-character hex digest followed by whitespace and a filename (the
/// conventional leading `*` for binary mode is stripped).
pub fn parse_checksums(text: &str) -> Result<Vec<ChecksumEntry>> {
    let mut entries = Vec::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut parts = line.splitn(2, char::is_whitespace);
        let hex = parts.next().unwrap_or("");
        let filename = parts
            .next()
            .unwrap_or("")
            .trim_start_matches(['*', ' '])
            .to_string();

        if !is_sha256_hex(hex) || filename.is_empty() {
            return Err(ChromiumError::Corrupted(format!(
                "malformed checksum manifest entry: {line:?}"
            )));
        }
        entries.push(ChecksumEntry {
            filename,
            sha256_hex: hex.to_ascii_lowercase(),
        });
    }

    if entries.is_empty() {
        return Err(ChromiumError::Corrupted(
            "checksum manifest contained no entries".to_string(),
        ));
    }
    Ok(entries)
}

fn is_sha256_hex(s: &str) -> bool {
    s.len() == 64 && s.chars().all(|c| c.is_ascii_hexdigit())
}

/// Hash `data` and compare it against an expected hex digest.
pub fn verify_sha256(data: &[u8], expected_hex: &str) -> Result<()> {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let actual = hex::encode(hasher.finalize());
    if actual.eq_ignore_ascii_case(expected_hex) {
        Ok(())
    } else {
        Err(ChromiumError::Corrupted(format!(
            "checksum mismatch: expected {expected_hex}, computed {actual}"
        )))
    }
}

/// Verifies that a detached signature over the checksum manifest was
/// produced by a certificate that chains to a trusted root, was issued for
/// the expected OIDC issuer, and names the expected build identity in its
/// subject alternative name. Implementations are expected to reject on any
/// failed link in that chain rather than return a partial result.
pub trait SignatureVerifier: Send + Sync {
    fn verify(
        &self,
        manifest: &[u8],
        signature: &[u8],
        certificate_pem: &[u8],
        expected_oidc_issuer: &str,
        expected_identity: &str,
    ) -> Result<()>;
}

/// OID of the Fulcio-style "OIDC Issuer" certificate extension used by
/// keyless code-signing certificates.
const OIDC_ISSUER_OID: &str = "1.3.6.1.4.1.57264.1.8";

/// Chain-to-root, issuer, and identity verification using `x509-parser` and
/// an ECDSA P-256/SHA-256 signature over the manifest bytes. The trust
/// anchor is supplied by the caller, not compiled into this crate.
#[cfg(feature = "embedding")]
pub struct DefaultSignatureVerifier {
    root_cert_pem: Vec<u8>,
}

#[cfg(feature = "embedding")]
impl DefaultSignatureVerifier {
    pub fn new(root_cert_pem: Vec<u8>) -> Self {
        Self { root_cert_pem }
    }
}

#[cfg(feature = "embedding")]
impl SignatureVerifier for DefaultSignatureVerifier {
    fn verify(
        &self,
        manifest: &[u8],
        signature: &[u8],
        certificate_pem: &[u8],
        expected_oidc_issuer: &str,
        expected_identity: &str,
    ) -> Result<()> {
        let leaf_der = pem_to_der(certificate_pem)?;
        let root_der = pem_to_der(&self.root_cert_pem)?;

        let (_, leaf) = x509_parser::parse_x509_certificate(&leaf_der)
            .map_err(|e| ChromiumError::Corrupted(format!("invalid leaf certificate: {e}")))?;
        let (_, root) = x509_parser::parse_x509_certificate(&root_der)
            .map_err(|e| ChromiumError::Corrupted(format!("invalid root certificate: {e}")))?;

        leaf.verify_signature(Some(root.public_key()))
            .map_err(|_| ChromiumError::Corrupted("certificate does not chain to trusted root".into()))?;

        verify_oidc_issuer(&leaf, expected_oidc_issuer)?;
        verify_san_identity(&leaf, expected_identity)?;
        verify_ecdsa_signature(manifest, signature, &leaf)?;

        Ok(())
    }
}

#[cfg(feature = "embedding")]
fn pem_to_der(pem: &[u8]) -> Result<Vec<u8>> {
    let mut cursor = std::io::Cursor::new(pem);
    let items = rustls_pemfile::certs(&mut cursor)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| ChromiumError::Corrupted(format!("failed to parse pem: {e}")))?;
    items
        .into_iter()
        .next()
        .map(|c| c.as_ref().to_vec())
        .ok_or_else(|| ChromiumError::Corrupted("pem contained no certificate".into()))
}

#[cfg(feature = "embedding")]
fn verify_oidc_issuer(
    cert: &x509_parser::certificate::X509Certificate,
    expected_issuer: &str,
) -> Result<()> {
    for ext in cert.extensions() {
        if ext.oid.to_id_string() == OIDC_ISSUER_OID {
            let value = String::from_utf8_lossy(ext.value);
            if value.trim_matches(|c: char| c.is_control() || !c.is_ascii_graphic() && c != ' ')
                == expected_issuer
                || value.contains(expected_issuer)
            {
                return Ok(());
            }
            return Err(ChromiumError::Corrupted(format!(
                "unexpected oidc issuer in signing certificate: {value}"
            )));
        }
    }
    Err(ChromiumError::Corrupted(
        "signing certificate is missing the oidc issuer extension".to_string(),
    ))
}

#[cfg(feature = "embedding")]
fn verify_san_identity(
    cert: &x509_parser::certificate::X509Certificate,
    expected_identity: &str,
) -> Result<()> {
    use x509_parser::extensions::GeneralName;

    let Ok(Some(san)) = cert.subject_alternative_name() else {
        return Err(ChromiumError::Corrupted(
            "signing certificate has no subject alternative name".to_string(),
        ));
    };
    for name in &san.value.general_names {
        if let GeneralName::URI(uri) = name {
            if *uri == expected_identity {
                return Ok(());
            }
        }
    }
    Err(ChromiumError::Corrupted(format!(
        "signing certificate identity does not match expected {expected_identity}"
    )))
}

#[cfg(feature = "embedding")]
fn verify_ecdsa_signature(
    message: &[u8],
    signature: &[u8],
    cert: &x509_parser::certificate::X509Certificate,
) -> Result<()> {
    use ring::signature::{UnparsedPublicKey, ECDSA_P256_SHA256_ASN1};

    let public_key = cert.public_key().subject_public_key.as_ref();
    let key = UnparsedPublicKey::new(&ECDSA_P256_SHA256_ASN1, public_key);
    key.verify(message, signature)
        .map_err(|_| ChromiumError::Corrupted("manifest signature verification failed".into()))
}
